//! Core domain types for Rulebot.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod model;
pub use model::{LlmModel, ModelParseError};

use thiserror::Error;

// ============================================================================
// Access Credential
// ============================================================================

/// The opaque credential carried on every request to the chat server.
///
/// Note: `Debug` is manually implemented to redact the token value, preventing
/// accidental credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

#[derive(Debug, Error)]
#[error("access token must not be empty")]
pub struct EmptyTokenError;

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyTokenError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<redacted>)")
    }
}

// ============================================================================
// Top-K Rule Matches
// ============================================================================

/// Number of retrieved rule matches handed to the answering model.
///
/// The service accepts a small bounded set of values; anything else is
/// rejected before a request is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopK(u8);

pub const TOP_K_ALLOWED: &[u8] = &[4, 5, 6];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("top-k value {raw} is not supported; expected one of: {TOP_K_ALLOWED:?}")]
pub struct TopKRangeError {
    raw: u8,
}

impl TopK {
    pub fn new(value: u8) -> Result<Self, TopKRangeError> {
        if TOP_K_ALLOWED.contains(&value) {
            Ok(Self(value))
        } else {
            Err(TopKRangeError { raw: value })
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self(5)
    }
}

impl std::fmt::Display for TopK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Query
// ============================================================================

/// One user question, constructed once per chat turn.
///
/// The text is guaranteed non-empty (after trimming); model and top-k are
/// optional and fall back to the server defaults when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    model: Option<LlmModel>,
    top_k: Option<TopK>,
}

#[derive(Debug, Error)]
#[error("query text must not be empty")]
pub struct EmptyQueryError;

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyQueryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EmptyQueryError);
        }
        Ok(Self {
            text,
            model: None,
            top_k: None,
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: LlmModel) -> Self {
        self.model = Some(model);
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: TopK) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn model(&self) -> Option<LlmModel> {
        self.model
    }

    #[must_use]
    pub const fn top_k(&self) -> Option<TopK> {
        self.top_k
    }
}
