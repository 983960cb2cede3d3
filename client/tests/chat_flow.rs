//! End-to-end exchange tests against a mock chat server.
//!
//! These cover the full turn: request construction, retry layer, status
//! classification, body parsing, accumulation, and rendering.

use rulebot_types::{AccessToken, LlmModel, Query, TopK};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rulebot_client::{ChatConfig, ChatError, RequestMode, ask_with_client, render_reply};

const ENDPOINT: &str = "/context/chat/completions";

fn config_for(server: &MockServer, mode: RequestMode) -> ChatConfig {
    ChatConfig::new(server.uri(), AccessToken::new("rb-test-key").unwrap())
        .unwrap()
        .with_mode(mode)
}

fn goalie_query() -> Query {
    Query::new("Can the goalie throw the puck?")
        .unwrap()
        .with_model(LlmModel::Gpt4Turbo)
        .with_top_k(TopK::new(5).unwrap())
}

/// Assemble a streamed body the way the server writes it: every frame opens
/// with `data: `, frames separated by a blank-line boundary.
fn streamed_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let frame = serde_json::json!({
            "choices": [{ "delta": { "content": chunk } }]
        });
        body.push_str(&format!("data: {frame}\r\n\r\n"));
    }
    body
}

#[tokio::test]
async fn single_document_answer_round_trips() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("access_token", "rb-test-key"))
        .and(query_param("query", "Can the goalie throw the puck?"))
        .and(query_param("llm_model", "gpt-4-turbo-2024-04-09"))
        .and(query_param("top_k_rules", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "No, the goalie may not throw the puck."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let reply = ask_with_client(&reqwest::Client::new(), &config, &goalie_query())
        .await
        .unwrap();

    assert_eq!(reply.answer, "No, the goalie may not throw the puck.");
    assert_eq!(reply.dropped_frames, 0);
    assert!(reply.rule_matches.is_none());

    let rendered = render_reply(&Ok(reply), false);
    assert_eq!(
        rendered,
        "*Bot Response:* \n\nNo, the goalie may not throw the puck."
    );
    assert!(!rendered.contains("Rules Retrieved"));
}

#[tokio::test]
async fn rule_matches_render_when_enabled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "Icing is waved off when...",
            "rule_matches_df": {
                "84": {
                    "('title', '')": "Icing",
                    "('score', 'sum')": 1.5,
                    "('chunk_id', 'unique')": ["84.1", "84.1", "84.2-QA"]
                },
                "81": {
                    "('title', '')": "Rink",
                    "('score', 'sum')": 0.7,
                    "('chunk_id', 'unique')": ["81.2"]
                }
            }
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let result = ask_with_client(&reqwest::Client::new(), &config, &goalie_query()).await;
    let reply = result.as_ref().unwrap();
    assert!(reply.rule_matches.is_some());

    let rendered = render_reply(&result, true);
    assert!(rendered.starts_with("*Rules Retrieved for Analysis:*\n"));
    let icing_line = rendered.lines().nth(1).unwrap();
    assert!(icing_line.contains("Rule 84"));
    assert!(icing_line.contains("score=1.50"));
    assert_eq!(icing_line.matches("84.1").count(), 1);
    let rink_line = rendered.lines().nth(2).unwrap();
    assert!(rink_line.contains("Rule 81"));
    assert!(rendered.contains("*Bot Response:* \n\nIcing is waved off when..."));
}

#[tokio::test]
async fn streamed_answer_accumulates_in_order() {
    let server = MockServer::start().await;

    let mut body = streamed_body(&["No, ", "the goalie ", "may not ", "throw the puck."]);
    body.push_str("data: [DONE]\r\n\r\n");

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("access_token", "rb-test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::StreamedJson);
    let reply = ask_with_client(&reqwest::Client::new(), &config, &goalie_query())
        .await
        .unwrap();

    assert_eq!(reply.answer, "No, the goalie may not throw the puck.");
    assert!(reply.rule_matches.is_none());
}

#[tokio::test]
async fn partially_malformed_stream_yields_partial_answer() {
    let server = MockServer::start().await;

    let body = format!(
        "{}data: {{broken json\r\n\r\n{}",
        streamed_body(&["first "]),
        streamed_body(&["second"])
    );

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::StreamedJson);
    let reply = ask_with_client(&reqwest::Client::new(), &config, &goalie_query())
        .await
        .unwrap();

    assert_eq!(reply.answer, "first second");
    assert_eq!(reply.dropped_frames, 1);
}

#[tokio::test]
async fn empty_streamed_body_yields_empty_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::StreamedJson);
    let reply = ask_with_client(&reqwest::Client::new(), &config, &goalie_query())
        .await
        .unwrap();

    assert_eq!(reply.answer, "");
    assert_eq!(reply.dropped_frames, 0);
}

#[tokio::test]
async fn forbidden_renders_the_fixed_key_message_whatever_the_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("<html>scary proxy error page</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let result = ask_with_client(&reqwest::Client::new(), &config, &goalie_query()).await;

    assert!(matches!(result, Err(ChatError::Unauthorized)));
    assert_eq!(
        render_reply(&result, true),
        "Incorrect Rulebot API key, correct it and try again."
    );
}

#[tokio::test]
async fn not_found_renders_the_fixed_offline_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(404).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let result = ask_with_client(&reqwest::Client::new(), &config, &goalie_query()).await;

    assert!(matches!(result, Err(ChatError::ServiceUnavailable)));
    assert_eq!(
        render_reply(&result, false),
        "It looks like the chat server is currently offline. Try again later."
    );
}

#[tokio::test]
async fn unexpected_status_renders_the_generic_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let result = ask_with_client(&reqwest::Client::new(), &config, &goalie_query()).await;

    assert!(matches!(result, Err(ChatError::TransportFailure(_))));
    assert_eq!(
        render_reply(&result, false),
        "Sorry, something went wrong. Please reach out if this error persists."
    );
}

#[tokio::test]
async fn transient_server_error_is_retried_to_success() {
    use std::sync::atomic::{AtomicU32, Ordering};
    let server = MockServer::start().await;
    let attempt = AtomicU32::new(0);

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(move |_: &wiremock::Request| {
            if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "content": "eventually"
                }))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let config = config_for(&server, RequestMode::Parameterized);
    let reply = ask_with_client(&reqwest::Client::new(), &config, &goalie_query())
        .await
        .unwrap();

    assert_eq!(reply.answer, "eventually");
}

#[tokio::test]
async fn timeout_surfaces_as_transport_failure() {
    use std::time::Duration;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "content": "too late" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config =
        config_for(&server, RequestMode::Parameterized).with_timeout(Duration::from_millis(50));
    let result = ask_with_client(&reqwest::Client::new(), &config, &goalie_query()).await;

    assert!(matches!(result, Err(ChatError::TransportFailure(_))));
    assert_eq!(
        render_reply(&result, false),
        "Sorry, something went wrong. Please reach out if this error persists."
    );
}
