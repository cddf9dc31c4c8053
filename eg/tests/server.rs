//! HTTP submission endpoint over a real listener

mod common;

use serde_json::{Value, json};

use common::*;
use exgen::llm::CompletionResponse;
use exgen::server;

async fn start(p: &Pipeline) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(p.service.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Event names and payloads from a finished SSE body
fn parse_events(body: &str) -> Vec<(String, Value)> {
    let mut events = Vec::new();
    let mut name = None;
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:")
            && let Some(n) = name.take()
        {
            events.push((n, serde_json::from_str(rest.trim()).unwrap()));
        }
    }
    events
}

#[tokio::test]
async fn health_reports_ok() {
    let p = Pipeline::new(15).await;
    let base = start(&p).await;

    let body = reqwest::get(format!("{base}/health")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn chat_rejects_unknown_exercise() {
    let p = Pipeline::new(15).await;
    let base = start(&p).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": "no-such-thing", "messages": [{"role": "user", "content": "Build it"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert!(p.llm.requests().is_empty());
}

#[tokio::test]
async fn chat_rejects_conversation_without_user_prompt() {
    let p = Pipeline::new(15).await;
    let base = start(&p).await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": SLUG, "messages": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let trailing_assistant = client
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": SLUG, "messages": [
            {"role": "user", "content": "Build it"},
            {"role": "assistant", "content": "Sure"}
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(trailing_assistant.status(), 400);

    // No generation was opened
    assert!(p.service.history(SLUG).await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_streams_turn_until_completed() {
    let p = Pipeline::new(15).await;
    p.llm
        .push(verified_write("g1", vec![file("index.tsx", "export default 1;")], "Done."));
    let base = start(&p).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": SLUG, "messages": [{"role": "user", "content": "Build it"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let events = parse_events(&response.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names.first(), Some(&"started"));
    assert_eq!(names.last(), Some(&"completed"));
    assert!(names.contains(&"capability-called"));

    let (_, completed) = events.last().unwrap();
    assert_eq!(completed["summary"], "Done.");
    let snapshot_ref = completed["snapshot_ref"].as_str().unwrap().to_string();

    let generations: Value = client
        .get(format!("{base}/api/exercises/{SLUG}/generations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(generations[0]["status"], "completed");
    assert_eq!(generations[0]["snapshot_ref"], snapshot_ref.as_str());

    let files: Value = client
        .get(format!("{base}/api/exercises/{SLUG}/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        files,
        json!([{"path": "exercises/odd-one-out/index.tsx", "content": "export default 1;"}])
    );
}

#[tokio::test]
async fn chat_reports_aborted_turn_as_error_event() {
    let p = Pipeline::new(15).await;
    p.llm.push(vec![write("c1", vec![file("index.tsx", "unverified")])]);
    let base = start(&p).await;

    let body = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": SLUG, "messages": [{"role": "user", "content": "Build it"}]}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = parse_events(&body);
    let (name, payload) = events.last().unwrap();
    assert_eq!(name, "error");
    assert_eq!(payload["message"], "Generation failed");
    assert_eq!(p.snapshot_count(), 0);
}

#[tokio::test]
async fn chat_awaiting_input_keeps_generation_open() {
    let p = Pipeline::new(15).await;
    p.llm.push(vec![CompletionResponse::text("Color or shape?")]);
    let base = start(&p).await;

    let body = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({"slug": SLUG, "messages": [{"role": "user", "content": "Build it"}]}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = parse_events(&body);
    let (name, payload) = events.last().unwrap();
    assert_eq!(name, "awaiting-input");
    assert_eq!(payload["text"], "Color or shape?");

    let history = p.service.history(SLUG).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_generating());
}

#[tokio::test]
async fn unknown_exercise_files_is_not_found() {
    let p = Pipeline::new(15).await;
    let base = start(&p).await;

    let response = reqwest::get(format!("{base}/api/exercises/missing/files")).await.unwrap();
    assert_eq!(response.status(), 404);
}
