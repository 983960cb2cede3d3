//! Outbound request construction.
//!
//! Pure construction, no IO: both wire shapes target
//! `{base_url}/context/chat/completions` and carry the credential in the
//! `access_token` header, never in the URL or the body.

use reqwest::Client;
use serde_json::json;

use rulebot_types::Query;

use crate::{ACCESS_TOKEN_HEADER, CHAT_ENDPOINT_PATH, ChatConfig};

/// Which wire shape an outbound request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// POST with `query`, `llm_model`, `top_k_rules` as URL query parameters;
    /// the server answers with a single JSON completion document.
    #[default]
    Parameterized,
    /// POST with a single-message conversation JSON body and `stream: true`;
    /// the server answers with the pseudo-SSE frame stream.
    StreamedJson,
}

/// Build the outbound request for one query under the configured mode.
#[must_use]
pub fn build_request(
    client: &Client,
    config: &ChatConfig,
    query: &Query,
) -> reqwest::RequestBuilder {
    let url = format!("{}/{CHAT_ENDPOINT_PATH}", config.base_url());
    let request = client
        .post(url)
        .header(ACCESS_TOKEN_HEADER, config.token().expose_secret());

    match config.mode() {
        RequestMode::Parameterized => {
            let mut params: Vec<(&str, String)> = vec![("query", query.text().to_string())];
            if let Some(model) = query.model() {
                params.push(("llm_model", model.model_id().to_string()));
            }
            if let Some(top_k) = query.top_k() {
                params.push(("top_k_rules", top_k.get().to_string()));
            }
            request.query(&params)
        }
        RequestMode::StreamedJson => request.json(&json!({
            "model": "",
            "messages": [{ "role": "user", "content": query.text() }],
            "stream": true,
            "user": "string",
        })),
    }
}
