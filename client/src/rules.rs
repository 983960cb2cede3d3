//! Retrieved-rule metadata: wire decoding and deterministic rendering.

use std::collections::BTreeMap;

use serde::Deserialize;

/// One retrieval result linking the query to a rulebook section.
///
/// The upstream serializes an aggregated table whose column names arrive as
/// flattened tuples, hence the awkward rename keys.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleMatchRecord {
    #[serde(rename = "('title', '')")]
    pub title: String,
    #[serde(rename = "('score', 'sum')")]
    pub score: f64,
    #[serde(rename = "('chunk_id', 'unique')", default)]
    pub chunk_ids: Vec<String>,
}

/// Render the retrieved-rule listing, one line per rule.
///
/// The upstream mapping's iteration order carries no meaning, so render order
/// is imposed explicitly: descending aggregated score, ties broken by
/// ascending rule key. Duplicate subsection ids collapse to their first
/// occurrence. Equal inputs always render equal text.
#[must_use]
pub fn format_rule_matches(matches: &BTreeMap<String, RuleMatchRecord>) -> String {
    let mut entries: Vec<(&String, &RuleMatchRecord)> = matches.iter().collect();
    entries.sort_by(|(key_a, record_a), (key_b, record_b)| {
        record_b
            .score
            .total_cmp(&record_a.score)
            .then_with(|| key_a.cmp(key_b))
    });

    let mut lines = Vec::with_capacity(entries.len());
    for (key, record) in entries {
        let mut subsections: Vec<&str> = Vec::with_capacity(record.chunk_ids.len());
        for chunk_id in &record.chunk_ids {
            if !subsections.contains(&chunk_id.as_str()) {
                subsections.push(chunk_id);
            }
        }
        lines.push(format!(
            "* **Rule {key}. {title}** (score={score:.2}, subsections=[{subsections}])",
            title = record.title,
            score = record.score,
            subsections = subsections.join(", "),
        ));
    }

    lines.join("\n").trim_end().to_string()
}
