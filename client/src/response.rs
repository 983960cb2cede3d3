//! HTTP-status classification and user-facing rendering.
//!
//! The status contract with the chat server is fixed: 200 success, 403
//! invalid credential, 404 backend offline, anything else a generic failure.
//! Classification happens before any body decode, because non-success bodies
//! are not guaranteed to be well-formed. Failures become fixed displayable
//! strings rather than raised errors; the consuming front-end always has
//! something to render.

use reqwest::StatusCode;

use crate::rules::format_rule_matches;
use crate::{ChatError, ChatReply};

/// Fixed message shown when the backend answers 404.
pub const OFFLINE_MESSAGE: &str =
    "It looks like the chat server is currently offline. Try again later.";
/// Fixed message shown when the backend answers 403.
pub const BAD_KEY_MESSAGE: &str = "Incorrect Rulebot API key, correct it and try again.";
/// Fixed message for everything else that goes wrong.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong. Please reach out if this error persists.";

const RULES_HEADER: &str = "*Rules Retrieved for Analysis:*\n";
const RULES_DIVIDER: &str = "\n---\n";
const BOT_RESPONSE_PREFIX: &str = "*Bot Response:* \n\n";

/// What an HTTP status means for a response, decided exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 200: the body holds an answer and parsing proceeds.
    Success,
    /// 404: the backend service is unreachable at its published address.
    NotFound,
    /// 403: the access credential was rejected.
    Forbidden,
    /// Any other code.
    OtherFailure,
}

impl Outcome {
    #[must_use]
    pub fn classify(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Outcome::Success,
            StatusCode::NOT_FOUND => Outcome::NotFound,
            StatusCode::FORBIDDEN => Outcome::Forbidden,
            _ => Outcome::OtherFailure,
        }
    }
}

/// Assemble the displayable text for one finished turn.
///
/// Failures render their fixed message regardless of what the wire carried.
/// The rules listing appears only when requested and when the payload
/// actually carried one (the streamed shape never does).
#[must_use]
pub fn render_reply(result: &Result<ChatReply, ChatError>, show_rules: bool) -> String {
    let reply = match result {
        Ok(reply) => reply,
        Err(error) => return error.user_message().to_string(),
    };

    let mut output = String::new();
    if show_rules
        && let Some(matches) = &reply.rule_matches
    {
        output.push_str(RULES_HEADER);
        output.push_str(&format_rule_matches(matches));
        output.push_str(RULES_DIVIDER);
    }
    output.push_str(BOT_RESPONSE_PREFIX);
    output.push_str(&reply.answer);
    output
}
