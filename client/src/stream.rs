//! Tolerant parsing of the service's pseudo-SSE streamed payload.
//!
//! The wire format is a sequence of frames, each `data: <json>`, separated by
//! a blank-line boundary, with every frame after the first restating the
//! `data: ` marker:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Go"}}]}\r\n\r\ndata: {"choices":[{"delta":{"content":"alie"}}]}\r\n\r\n
//! ```
//!
//! Decoding is strict-then-salvage-then-drop: each fragment gets one strict
//! JSON decode; on failure it is truncated at the first interior boundary and
//! retried once; if that also fails the fragment is dropped and counted, never
//! aborting the rest of the stream. A fresh parse is required per response.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::rules::RuleMatchRecord;

/// Marker opening every frame.
pub const DATA_MARKER: &str = "data: ";
/// Boundary closing every frame.
pub const FRAME_BOUNDARY: &str = "\r\n\r\n";
/// Separator between consecutive frames: the boundary plus the restated marker.
pub const FRAME_SEPARATOR: &str = "\r\n\r\ndata: ";

/// One decoded unit of a response.
///
/// Streamed frames carry their text in `choices[0].delta.content`; a full
/// completion document carries a top-level `content` instead (and possibly
/// the retrieved-rule listing), so both shapes decode into this one type and
/// the single-document path is a one-frame stream by construction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "rule_matches_df")]
    pub rule_matches: Option<BTreeMap<String, RuleMatchRecord>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamFrame {
    /// The incremental text this frame contributes, if any.
    ///
    /// Control and terminator frames have neither field and contribute
    /// nothing; that is an expected case, not a failure.
    #[must_use]
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .or(self.content.as_deref())
    }
}

/// Result of one parse pass over a raw streamed payload.
///
/// `dropped` counts fragments that failed both the strict and the salvage
/// decode; it exists for diagnostics only and is never surfaced as an error.
#[derive(Debug, Default)]
pub struct ParsedStream {
    pub frames: Vec<StreamFrame>,
    pub dropped: usize,
}

/// Split a raw streamed payload into decoded frames, preserving arrival order.
///
/// An empty payload yields an empty sequence. A single malformed frame never
/// aborts the parse.
#[must_use]
pub fn parse_frames(raw: &str) -> ParsedStream {
    let mut parsed = ParsedStream::default();
    if raw.is_empty() {
        return parsed;
    }

    let body = raw.strip_prefix(DATA_MARKER).unwrap_or(raw);
    let body = body.strip_suffix(FRAME_BOUNDARY).unwrap_or(body);

    for fragment in body.split(FRAME_SEPARATOR) {
        if fragment.trim().is_empty() {
            continue;
        }
        match decode_fragment(fragment) {
            Some(frame) => parsed.frames.push(frame),
            None => {
                parsed.dropped = parsed.dropped.saturating_add(1);
                tracing::warn!(
                    fragment_bytes = fragment.len(),
                    "Dropping undecodable stream fragment"
                );
            }
        }
    }

    parsed
}

fn decode_fragment(fragment: &str) -> Option<StreamFrame> {
    match serde_json::from_str(fragment) {
        Ok(frame) => Some(frame),
        Err(_) => salvage_decode(fragment),
    }
}

/// Salvage decode: a fragment can carry a valid frame followed by trailing
/// bytes past an interior boundary (a `[DONE]` sentinel, a truncated tail).
/// Truncate at the first boundary and retry once.
fn salvage_decode(fragment: &str) -> Option<StreamFrame> {
    let cut = fragment.find(FRAME_BOUNDARY)?;
    serde_json::from_str(&fragment[..cut]).ok()
}

/// Fold an ordered frame sequence into the final answer string.
///
/// Each frame's incremental content is appended verbatim, no separators
/// added; frames without content are skipped silently.
#[must_use]
pub fn accumulate(frames: &[StreamFrame]) -> String {
    let mut answer = String::new();
    for frame in frames {
        if let Some(delta) = frame.delta_content() {
            answer.push_str(delta);
        }
    }
    answer
}
