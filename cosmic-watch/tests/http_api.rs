//! HTTP surface tests against an in-memory engine.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{hazardous, harness, FeedStep, Harness, ScriptedFeed};
use cosmic_common::config::Config;
use cosmic_watch::anchor::{MessageLog, ThreadMessage};
use cosmic_watch::{build_router, WatchState};

fn app(h: &Harness) -> Router {
    let state = WatchState::from_parts(Config::default(), h.engine.clone(), None);
    build_router(Arc::new(state))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let h = harness(ScriptedFeed::new(vec![]));
    let (status, body) = call(&app(&h), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "cosmic-watch");
}

#[tokio::test]
async fn test_manual_cycle_then_feed_and_status() {
    let h = harness(ScriptedFeed::new(vec![FeedStep::Records(vec![hazardous("3542519")])]));
    let app = app(&h);

    let (status, report) = call(&app, Method::POST, "/api/v1/cycles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["fetched"], 1);
    assert_eq!(report["anchors_created"], 1);
    assert_eq!(report["alerts"][0]["identity"], "3542519");

    let (status, feed) = call(&app, Method::GET, "/api/v1/feed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["objects"][0]["id"], "3542519");
    assert_eq!(feed["objects"][0]["risk_score"], 90.0);

    let (status, body) = call(&app, Method::GET, "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loop_state"], "idle");
    assert_eq!(body["cycles_completed"], 1);
    assert_eq!(body["tracked_identities"], 1);
    assert_eq!(body["last_cycle"]["fetched"], 1);
}

#[tokio::test]
async fn test_failed_cycle_maps_to_bad_gateway() {
    let h = harness(ScriptedFeed::new(vec![FeedStep::Fail]));
    let (status, _) = call(&app(&h), Method::POST, "/api/v1/cycles", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_anchor_listing_messages_and_delete() {
    let h = harness(ScriptedFeed::new(vec![FeedStep::Records(vec![hazardous("3542519")])]));
    let app = app(&h);
    h.engine.run_cycle_once().await.unwrap();

    h.store
        .append(
            "3542519",
            &ThreadMessage {
                username: "ada".into(),
                text: "tracking it".into(),
                created_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let (status, body) = call(&app, Method::GET, "/api/v1/anchors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["anchors"][0]["identity"], "3542519");
    assert_eq!(body["anchors"][0]["handle"], "100");

    let (status, body) = call(&app, Method::GET, "/api/v1/anchors/3542519/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["text"], "tracking it");

    let (status, _) = call(&app, Method::DELETE, "/api/v1/anchors/3542519", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::DELETE, "/api/v1/anchors/3542519", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/api/v1/anchors/3542519/messages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.store.messages("3542519").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_anchor_is_recreated_next_cycle() {
    let h = harness(ScriptedFeed::new(vec![FeedStep::Records(vec![hazardous("3542519")])]));
    let app = app(&h);
    h.engine.run_cycle_once().await.unwrap();

    let (status, _) = call(&app, Method::DELETE, "/api/v1/anchors/3542519", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let report = h.engine.run_cycle_once().await.unwrap();
    assert_eq!(report.anchors_created, 1);
    assert_eq!(h.transport.post_count(), 2);
}

#[tokio::test]
async fn test_invalid_identity_rejected() {
    let h = harness(ScriptedFeed::new(vec![]));
    let (status, _) = call(&app(&h), Method::DELETE, "/api/v1/anchors/bad%20id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_recipient() {
    let h = harness(ScriptedFeed::new(vec![]));
    let app = app(&h);

    let body = serde_json::json!({ "chat_id": 42 });
    let (status, resp) = call(&app, Method::POST, "/api/v1/recipients", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["registered"], true);
    assert_eq!(resp["total"], 1);

    let (_, resp) = call(&app, Method::POST, "/api/v1/recipients", Some(body)).await;
    assert_eq!(resp["registered"], false);
    assert_eq!(h.recipients.snapshot().await, vec![42]);
}

#[tokio::test]
async fn test_register_recipient_rejects_bad_body() {
    let h = harness(ScriptedFeed::new(vec![]));
    let body = serde_json::json!({ "chat_id": "not-a-number" });
    let (status, _) = call(&app(&h), Method::POST, "/api/v1/recipients", Some(body)).await;
    assert!(status.is_client_error());
}
