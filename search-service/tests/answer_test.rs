//! Integration tests for the streamed answer endpoint.

mod common;

use axum::{
    body::{Body, Bytes},
    http::StatusCode,
    routing::post,
    Router,
};
use common::{body_string, sse_body, sse_delta, test_config, TestApp, TEST_API_KEY};
use http_body_util::BodyExt;
use search_service::{build_router, AppState};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::util::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn answer_body(prompt: &str) -> String {
    json!({ "prompt": prompt, "apiKey": TEST_API_KEY }).to_string()
}

#[tokio::test]
async fn answer_relays_concatenated_deltas() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", format!("Bearer {}", TEST_API_KEY).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hel", "lo", ", w\u{f6}rld"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&app.provider)
        .await;

    let response = app.post_json("/api/answer", answer_body("Say hello")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_string(response).await, "Hello, w\u{f6}rld");
}

#[tokio::test]
async fn answer_sends_prompt_as_streaming_chat_request() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["ok"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&app.provider)
        .await;

    let response = app.post_json("/api/answer", answer_body("What is a moat?")).await;
    assert_eq!(body_string(response).await, "ok");

    let requests = app.provider.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(sent["model"], "gpt-3.5-turbo");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["max_tokens"], 150);
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["role"], "user");
    assert_eq!(sent["messages"][1]["content"], "What is a moat?");
}

#[tokio::test]
async fn answer_ends_body_when_upstream_closes_without_done() {
    let app = TestApp::spawn().await;

    let body = format!("{}{}", sse_delta("partial "), sse_delta("answer"));
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&app.provider)
        .await;

    let response = app.post_json("/api/answer", answer_body("q")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "partial answer");
}

#[tokio::test]
async fn answer_returns_error_when_provider_rejects() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let response = app.post_json("/api/answer", answer_body("q")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Error");
}

#[tokio::test]
async fn answer_rejects_malformed_bodies_without_calling_provider() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.provider)
        .await;

    let bodies = [
        "not json".to_string(),
        json!({ "prompt": "no key" }).to_string(),
        json!({ "apiKey": TEST_API_KEY }).to_string(),
        json!({ "prompt": "", "apiKey": TEST_API_KEY }).to_string(),
        json!({ "prompt": "p", "apiKey": "" }).to_string(),
    ];

    for body in bodies {
        let response = app.post_json("/api/answer", body.clone()).await;
        assert_eq!(
            response.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "body: {}",
            body
        );
        assert_eq!(body_string(response).await, "Error");
    }
}

#[tokio::test]
async fn answer_returns_flat_error_for_oversized_body() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.provider)
        .await;

    let prompt = "a".repeat(3 * 1024 * 1024);
    let response = app.post_json("/api/answer", answer_body(&prompt)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Error");
}

#[tokio::test]
async fn answer_returns_error_when_provider_unreachable() {
    // Bind then drop a listener so the port is closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let database = MockServer::start().await;
    let state = AppState::from_config(&test_config(&dead_uri, &database.uri())).unwrap();
    let router = build_router(state);

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/answer")
                .body(Body::from(answer_body("q")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Error");
}

/// Upstream whose body is fed by the test one event at a time.
async fn spawn_controlled_provider() -> (String, mpsc::Sender<Result<Bytes, Infallible>>) {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(8);
    let rx = Arc::new(Mutex::new(Some(rx)));

    let app = Router::new().route(
        "/chat/completions",
        post(move || {
            let rx = rx.lock().unwrap().take().expect("provider called twice");
            async move { Body::from_stream(ReceiverStream::new(rx)) }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (uri, tx)
}

#[tokio::test]
async fn answer_streams_before_upstream_finishes() {
    let (provider_uri, upstream) = spawn_controlled_provider().await;
    let database = MockServer::start().await;
    let state = AppState::from_config(&test_config(&provider_uri, &database.uri())).unwrap();
    let router = build_router(state);

    upstream
        .send(Ok(Bytes::from(sse_delta("first"))))
        .await
        .unwrap();

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/answer")
                .body(Body::from(answer_body("q")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();

    // The upstream is still open; the first chunk must already be readable.
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("first chunk was not relayed while upstream was open")
        .unwrap()
        .unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from("first"));

    upstream
        .send(Ok(Bytes::from(sse_delta(" second"))))
        .await
        .unwrap();
    upstream
        .send(Ok(Bytes::from("data: [DONE]\n\n")))
        .await
        .unwrap();

    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(rest, Bytes::from(" second"));
}
