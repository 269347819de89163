mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_create_then_list_item() {
    let t = spawn_app().await;

    let (status, id) = send(
        &t.app,
        json_request(
            "POST",
            "/items",
            json!({ "name": "Desk lamp", "desc": "Brass", "visibleTo": ["ops"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = id.as_str().unwrap().to_string();

    let (status, list) = send(&t.app, empty_request("GET", "/items")).await;
    assert_eq!(status, StatusCode::OK);

    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(id));
    assert_eq!(items[0]["name"], json!("Desk lamp"));
    assert_eq!(items[0]["desc"], json!("Brass"));
    assert_eq!(items[0]["visibleTo"], json!(["ops"]));
    assert_eq!(items[0]["photos"], json!([]));
    assert!(items[0]["createdOn"].is_string());
}

#[tokio::test]
async fn test_list_is_oldest_first() {
    let t = spawn_app().await;
    let now = Utc::now();
    insert_item(&t.db, "newest", now).await;
    insert_item(&t.db, "oldest", now - Duration::days(2)).await;
    insert_item(&t.db, "middle", now - Duration::days(1)).await;

    let (_, list) = send(&t.app, empty_request("GET", "/items")).await;
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();

    assert_eq!(ids, vec!["oldest", "middle", "newest"]);
}

#[tokio::test]
async fn test_create_rejects_empty_name() {
    let t = spawn_app().await;

    let (status, body) = send(&t.app, json_request("POST", "/items", json!({ "name": "" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Name"));

    let (_, list) = send(&t.app, empty_request("GET", "/items")).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_delete_item() {
    let t = spawn_app().await;
    insert_item(&t.db, "abc123", Utc::now()).await;
    t.upload("abc123", "photo.jpg", "image/jpeg", &jpeg_bytes(1024))
        .await;

    let (status, body) = send(&t.app, empty_request("DELETE", "/items/abc123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Successfully deleted item"));

    let (_, list) = send(&t.app, empty_request("GET", "/items")).await;
    assert_eq!(list, json!([]));

    // Images are left for the background reconciler
    assert_eq!(t.storage.keys().len(), 1);

    let (_, body) = t
        .upload("abc123", "photo.jpg", "image/jpeg", &jpeg_bytes(1024))
        .await;
    assert_eq!(body, json!({ "code": 101 }));
}

#[tokio::test]
async fn test_delete_unknown_item_succeeds() {
    let t = spawn_app().await;

    let (status, _) = send(&t.app, empty_request("DELETE", "/items/nothing-here")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let t = spawn_app().await;

    let (status, body) = send(&t.app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["database"], json!("connected"));
    assert_eq!(body["storage"], json!("connected"));

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_create_rejects_malformed_bodies() {
    let t = spawn_app().await;

    let bodies = [
        json!({}),
        json!({ "name": 5 }),
        json!({ "name": "x", "visibleTo": "ops" }),
    ];
    for body in bodies {
        let (status, response) = send(&t.app, json_request("POST", "/items", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        assert!(response["error"].is_string(), "body {body}");
    }

    let (_, list) = send(&t.app, empty_request("GET", "/items")).await;
    assert_eq!(list, json!([]));
}

/// Records the `request_id` field of every `http_request` span.
#[derive(Clone, Default)]
struct RequestSpans(Arc<Mutex<Vec<String>>>);

struct RequestIdField(Option<String>);

impl Visit for RequestIdField {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "request_id" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for RequestSpans {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        if attrs.metadata().name() != "http_request" {
            return;
        }
        let mut field = RequestIdField(None);
        attrs.record(&mut field);
        if let Some(request_id) = field.0 {
            self.0.lock().unwrap().push(request_id);
        }
    }
}

#[tokio::test]
async fn test_request_span_carries_assigned_request_id() {
    let t = spawn_app().await;
    let spans = RequestSpans::default();
    let _guard = tracing_subscriber::registry()
        .with(spans.clone())
        .set_default();

    let response = t
        .app
        .clone()
        .oneshot(empty_request("GET", "/items"))
        .await
        .unwrap();
    let assigned = response.headers()["x-request-id"].to_str().unwrap().to_string();

    assert_eq!(*spans.0.lock().unwrap(), vec![assigned]);
}
