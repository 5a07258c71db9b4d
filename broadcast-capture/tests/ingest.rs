use assert_json_diff::assert_json_eq;
use axum::body::Body;
use axum::http::{Method, StatusCode};
use serde_json::json;

mod common;
use common::*;

#[tokio::test]
async fn ingested_events_become_searchable() -> anyhow::Result<()> {
    let app = TestApp::new().await;
    let batch = json!([
        {"uuid": "b", "timestamp": "2025-09-06T12:00:10Z", "label": "ad-break"},
        {"uuid": "a", "timestamp": "2025-09-06T12:00:00Z", "label": "start"},
        {"label": "no id"},
    ]);

    let (status, body) = app
        .json(
            Method::POST,
            "/ingest/channel-events",
            Some(INGEST_KEY),
            batch.to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(body, json!({"ingested": 2, "invalid": 1}));

    app.queue.wait_idle().await;

    let (status, body) = app
        .json(
            Method::GET,
            "/search/events?index=channel-events",
            Some(ADMIN_KEY),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(
        body,
        json!({"events": [
            {"uuid": "a", "timestamp": "2025-09-06T12:00:00Z", "label": "start"},
            {"uuid": "b", "timestamp": "2025-09-06T12:00:10Z", "label": "ad-break"},
        ]})
    );

    let dead_letters: Vec<_> = std::fs::read_dir(app.root().join("deadletter/channel-events"))?
        .collect::<Result<_, _>>()?;
    assert_eq!(dead_letters.len(), 1);
    Ok(())
}

#[tokio::test]
async fn search_filters_by_range_and_limit() -> anyhow::Result<()> {
    let app = TestApp::new().await;
    let batch = json!([
        {"uuid": "1", "timestamp": "2025-09-06T11:00:00Z"},
        {"uuid": "2", "timestamp": "2025-09-06T12:00:00Z"},
        {"uuid": "3", "timestamp": "2025-09-06T13:00:00Z"},
        {"uuid": "4", "timestamp": "2025-09-06T14:00:00Z"},
    ]);
    app.json(
        Method::POST,
        "/ingest/scte-events",
        Some(INGEST_KEY),
        batch.to_string(),
    )
    .await;
    app.queue.wait_idle().await;

    let (status, body) = app
        .json(
            Method::GET,
            "/search/events?index=scte-events&from=2025-09-06T12:00:00Z&to=2025-09-06T14:00:00Z&limit=2",
            Some(ADMIN_KEY),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["uuid"].clone())
        .collect();
    assert_eq!(ids, vec![json!("2"), json!("3")]);

    let (_, body) = app
        .json(Method::GET, "/search/events", Some(ADMIN_KEY), Body::empty())
        .await;
    assert_json_eq!(body, json!({"events": []}));
    Ok(())
}

#[tokio::test]
async fn empty_bounds_search_everything() -> anyhow::Result<()> {
    let app = TestApp::new().await;
    let event = json!({"uuid": "1", "timestamp": "2025-09-06T12:00:00Z", "label": "start"});
    app.json(
        Method::POST,
        "/ingest/channel-events",
        Some(INGEST_KEY),
        event.to_string(),
    )
    .await;
    app.queue.wait_idle().await;

    let (status, body) = app
        .json(
            Method::GET,
            "/search/events?index=channel-events&from=&to=",
            Some(ADMIN_KEY),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(body, json!({"events": [event]}));
    Ok(())
}

#[tokio::test]
async fn retries_are_logged_but_indexed_once() -> anyhow::Result<()> {
    let app = TestApp::new().await;
    let first = json!({"uuid": "dup", "timestamp": "2025-09-06T12:00:00Z", "label": "first"});
    let retry = json!({"uuid": "dup", "timestamp": "2025-09-06T12:00:00Z", "label": "retry"});

    for event in [&first, &retry] {
        app.json(
            Method::POST,
            "/ingest/channel-events",
            Some(INGEST_KEY),
            event.to_string(),
        )
        .await;
        app.queue.wait_idle().await;
    }

    let (_, body) = app
        .json(Method::GET, "/search/events", Some(ADMIN_KEY), Body::empty())
        .await;
    assert_json_eq!(body, json!({"events": [first]}));

    let mut logged = 0;
    let mut stack = vec![app.root().join("events/channel-events")];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                logged += std::fs::read_to_string(path)?.lines().count();
            }
        }
    }
    assert_eq!(logged, 2);
    Ok(())
}

#[tokio::test]
async fn rejects_bad_requests() {
    let app = TestApp::new().await;
    let event = json!({"uuid": "1", "timestamp": "2025-09-06T12:00:00Z"}).to_string();

    let (status, _) = app
        .request(Method::POST, "/ingest/channel-events", None, event.clone())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/ingest/channel-events",
            Some(ADMIN_KEY),
            event.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, "/search/events", Some(INGEST_KEY), Body::empty())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/ingest/billing-events",
            Some(INGEST_KEY),
            event.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::GET,
            "/search/events?index=billing-events",
            Some(ADMIN_KEY),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::POST,
            "/ingest/channel-events",
            Some(INGEST_KEY),
            "{not json",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let oversized = format!(r#"{{"uuid":"1","timestamp":"t","pad":"{}"}}"#, "x".repeat(4096));
    let (status, _) = app
        .request(
            Method::POST,
            "/ingest/channel-events",
            Some(INGEST_KEY),
            oversized,
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn status_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"broadcast-capture");

    let (status, _) = app
        .request(Method::GET, "/_readiness", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
}
