//! The answering-model allow-list.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Models the chat server accepts for the `llm_model` request parameter.
///
/// This is a closed set: the server rejects anything else, so unknown ids are
/// rejected here before a request is ever built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LlmModel {
    #[default]
    Gpt4Turbo,
    Gpt4o,
    Gpt35Turbo,
}

const MODEL_IDS: &[&str] = &[
    "gpt-4-turbo-2024-04-09",
    "gpt-4o-2024-05-13",
    "gpt-3.5-turbo-0125",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model '{raw}'; expected one of: {expected:?}")]
pub struct ModelParseError {
    raw: String,
    expected: &'static [&'static str],
}

impl ModelParseError {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn expected(&self) -> &'static [&'static str] {
        self.expected
    }
}

impl LlmModel {
    #[must_use]
    pub const fn all() -> &'static [LlmModel] {
        &[LlmModel::Gpt4Turbo, LlmModel::Gpt4o, LlmModel::Gpt35Turbo]
    }

    /// The dated id the server expects on the wire.
    #[must_use]
    pub const fn model_id(self) -> &'static str {
        match self {
            LlmModel::Gpt4Turbo => "gpt-4-turbo-2024-04-09",
            LlmModel::Gpt4o => "gpt-4o-2024-05-13",
            LlmModel::Gpt35Turbo => "gpt-3.5-turbo-0125",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            LlmModel::Gpt4Turbo => "GPT-4 Turbo",
            LlmModel::Gpt4o => "GPT-4o",
            LlmModel::Gpt35Turbo => "GPT-3.5 Turbo",
        }
    }

    /// Parse a model id, accepting the dated ids and their undated aliases,
    /// case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ModelParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelParseError {
                raw: trimmed.to_string(),
                expected: MODEL_IDS,
            });
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "gpt-4-turbo-2024-04-09" | "gpt-4-turbo" => Ok(LlmModel::Gpt4Turbo),
            "gpt-4o-2024-05-13" | "gpt-4o" => Ok(LlmModel::Gpt4o),
            "gpt-3.5-turbo-0125" | "gpt-3.5-turbo" => Ok(LlmModel::Gpt35Turbo),
            _ => Err(ModelParseError {
                raw: trimmed.to_string(),
                expected: MODEL_IDS,
            }),
        }
    }
}

impl fmt::Display for LlmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}
