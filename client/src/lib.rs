//! Chat-completion ingestion client for the Rulebot service.
//!
//! # Architecture
//!
//! The crate is organized around one request/response exchange per chat turn:
//!
//! - [`ask`] - Entry point: build, send with retries, classify, parse, accumulate
//! - [`request`] - Outbound request construction (parameterized or streamed-JSON shape)
//! - [`response`] - HTTP-status classification and user-facing rendering
//! - [`stream`] - Tolerant pseudo-SSE frame parsing and delta accumulation
//! - [`rules`] - Retrieved-rule metadata decoding and deterministic formatting
//! - [`retry`] - Exponential-backoff retry for transient transport failures
//!
//! # Status Contract
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | Success; the body is parsed |
//! | 403 | Invalid access credential |
//! | 404 | Backend service offline |
//! | other | Generic failure |
//!
//! Classification happens exactly once per response, before any body decode.
//!
//! # Error Handling
//!
//! Status- and transport-level failures come back as [`ChatError`] variants,
//! each carrying a fixed user-facing message, so the front-end always has
//! something to render. Malformed stream frames are never surfaced: they are
//! dropped locally and counted in [`ChatReply::dropped_frames`], and the
//! partial answer accumulated from the frames that did decode is final.

pub mod request;
pub mod response;
pub mod retry;
pub mod rules;
pub mod stream;

pub use request::RequestMode;
pub use response::{Outcome, render_reply};
pub use rules::{RuleMatchRecord, format_rule_matches};
pub use stream::{ParsedStream, StreamFrame, accumulate, parse_frames};

use std::collections::BTreeMap;
use std::slice;
use std::sync::OnceLock;
use std::time::Duration;

use rulebot_types::{AccessToken, Query};
use thiserror::Error;

/// Path of the chat-completion endpoint under the configured base URL.
pub const CHAT_ENDPOINT_PATH: &str = "context/chat/completions";
/// Header carrying the access credential.
pub const ACCESS_TOKEN_HEADER: &str = "access_token";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Process-wide HTTP client.
///
/// The service is reached over HTTPS in production but plain HTTP during
/// local development, so `https_only` is not forced here.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build tuned HTTP client: {e}. Falling back to defaults.");
            reqwest::Client::new()
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Why a chat turn failed.
///
/// Each variant maps to a fixed user-facing message via [`ChatError::user_message`].
#[derive(Debug, Error)]
pub enum ChatError {
    /// Rejected before any network call.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Status 403: the access credential was rejected. Not retried.
    #[error("access token rejected by the chat server")]
    Unauthorized,
    /// Status 404: the backend is unreachable at its published address.
    #[error("chat server unavailable")]
    ServiceUnavailable,
    /// Connection failure, timeout, or any other unexpected status.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl ChatError {
    /// The fixed displayable message for this failure.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::Unauthorized => response::BAD_KEY_MESSAGE,
            ChatError::ServiceUnavailable => response::OFFLINE_MESSAGE,
            ChatError::InvalidConfiguration(_) | ChatError::TransportFailure(_) => {
                response::GENERIC_FAILURE_MESSAGE
            }
        }
    }
}

/// Endpoint and credential configuration, validated at construction.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    base_url: String,
    token: AccessToken,
    mode: RequestMode,
    timeout: Option<Duration>,
}

impl ChatConfig {
    pub fn new(base_url: impl Into<String>, token: AccessToken) -> Result<Self, ChatError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(ChatError::InvalidConfiguration(
                "base URL must not be empty".to_string(),
            ));
        }
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(ChatError::InvalidConfiguration(format!(
                "base URL '{trimmed}' must use http or https"
            )));
        }

        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            token,
            mode: RequestMode::default(),
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound the whole exchange (including retries) by a wall-clock timeout;
    /// expiry surfaces as [`ChatError::TransportFailure`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    #[must_use]
    pub const fn mode(&self) -> RequestMode {
        self.mode
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Finalized result of one chat turn. A new turn always builds a new value.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// The accumulated answer text.
    pub answer: String,
    /// Retrieved-rule metadata, when the payload carried it (the streamed
    /// wire shape never does).
    pub rule_matches: Option<BTreeMap<String, RuleMatchRecord>>,
    /// Frames dropped by the tolerant stream parse; diagnostics only.
    pub dropped_frames: usize,
}

/// Run one chat turn against the configured service.
pub async fn ask(config: &ChatConfig, query: &Query) -> Result<ChatReply, ChatError> {
    ask_with_client(http_client(), config, query).await
}

/// [`ask`] with an explicit client, for callers managing their own pool.
pub async fn ask_with_client(
    client: &reqwest::Client,
    config: &ChatConfig,
    query: &Query,
) -> Result<ChatReply, ChatError> {
    let retry_config = retry::RetryConfig::default();
    let exchange = retry::send_with_retry(
        || request::build_request(client, config, query),
        &retry_config,
    );

    let outcome = match config.timeout() {
        Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
            ChatError::TransportFailure(format!("no response within {}s", limit.as_secs()))
        })?,
        None => exchange.await,
    };

    let response = match outcome {
        retry::RetryOutcome::Completed(response) => response,
        retry::RetryOutcome::ConnectionError { attempts, source } => {
            return Err(ChatError::TransportFailure(format!(
                "request failed after {attempts} attempts: {source}"
            )));
        }
        retry::RetryOutcome::NonRetryable(source) => {
            return Err(ChatError::TransportFailure(format!(
                "request failed: {source}"
            )));
        }
    };

    // The status is classified exactly once; non-success bodies are never decoded.
    let status = response.status();
    match Outcome::classify(status) {
        Outcome::Success => {}
        Outcome::Forbidden => return Err(ChatError::Unauthorized),
        Outcome::NotFound => return Err(ChatError::ServiceUnavailable),
        Outcome::OtherFailure => {
            return Err(ChatError::TransportFailure(format!(
                "unexpected status {status}"
            )));
        }
    }

    let body = response.text().await.map_err(|e| {
        ChatError::TransportFailure(format!("failed to read response body: {e}"))
    })?;

    match config.mode() {
        RequestMode::StreamedJson => {
            let parsed = stream::parse_frames(&body);
            if parsed.dropped > 0 {
                tracing::warn!(
                    dropped = parsed.dropped,
                    decoded = parsed.frames.len(),
                    "Stream contained undecodable frames"
                );
            }
            Ok(ChatReply {
                answer: stream::accumulate(&parsed.frames),
                rule_matches: None,
                dropped_frames: parsed.dropped,
            })
        }
        RequestMode::Parameterized => {
            // The single JSON document is the degenerate one-frame stream.
            let frame: StreamFrame = serde_json::from_str(&body).map_err(|e| {
                ChatError::TransportFailure(format!("malformed completion document: {e}"))
            })?;
            let answer = stream::accumulate(slice::from_ref(&frame));
            Ok(ChatReply {
                answer,
                rule_matches: frame.rule_matches,
                dropped_frames: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rulebot_types::AccessToken;

    use super::{ChatConfig, ChatError, RequestMode};

    fn token() -> AccessToken {
        AccessToken::new("rb-test-key").unwrap()
    }

    #[test]
    fn config_rejects_empty_base_url() {
        let result = ChatConfig::new("", token());
        assert!(matches!(result, Err(ChatError::InvalidConfiguration(_))));
    }

    #[test]
    fn config_rejects_non_http_base_url() {
        let result = ChatConfig::new("ftp://rulebot.example", token());
        assert!(matches!(result, Err(ChatError::InvalidConfiguration(_))));
    }

    #[test]
    fn config_normalizes_trailing_slash() {
        let config = ChatConfig::new("https://rulebot.example/", token()).unwrap();
        assert_eq!(config.base_url(), "https://rulebot.example");
    }

    #[test]
    fn config_defaults_to_parameterized_mode() {
        let config = ChatConfig::new("https://rulebot.example", token()).unwrap();
        assert_eq!(config.mode(), RequestMode::Parameterized);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn every_error_has_a_displayable_message() {
        let errors = [
            ChatError::InvalidConfiguration("bad".to_string()),
            ChatError::Unauthorized,
            ChatError::ServiceUnavailable,
            ChatError::TransportFailure("reset".to_string()),
        ];
        for error in errors {
            assert!(!error.user_message().is_empty());
        }
    }
}
