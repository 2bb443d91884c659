//! Read-path endpoints: recent events, stats, and health.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use eventgate_broker::{Publish, PublishError};
use eventgate_db::{create_pool, DbRuntimeSettings, IN_MEMORY};
use eventgate_server::{app, store::StoreClient, tail::TailSettings, AppState};
use eventgate_types::{Analysis, StoredEvent};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

struct NullPublisher;

impl Publish for NullPublisher {
    fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<(), PublishError> {
        Ok(())
    }
}

fn make_store() -> StoreClient {
    let pool = create_pool(IN_MEMORY, DbRuntimeSettings::default()).unwrap();
    eventgate_events::ensure_schema(&pool.get().unwrap()).unwrap();
    StoreClient::new(pool)
}

fn make_state(store: StoreClient) -> AppState {
    AppState::new(
        Arc::new(NullPublisher),
        "raw_events",
        store,
        TailSettings::default(),
    )
}

fn stored(id: &str, source: &str, timestamp: &str, analysis: Option<(&str, Option<f64>)>) -> StoredEvent {
    let mut payload = Map::new();
    payload.insert("text".to_string(), json!(format!("event {id}")));
    StoredEvent {
        id: id.to_string(),
        source: source.to_string(),
        payload,
        analysis: analysis.map(|(sentiment, score)| Analysis {
            sentiment: Some(sentiment.to_string()),
            score,
            ..Analysis::default()
        }),
        timestamp: timestamp.to_string(),
    }
}

fn insert(store: &StoreClient, events: &[StoredEvent]) {
    let conn = store.pool().get().unwrap();
    for event in events {
        eventgate_events::insert_event(&conn, event).unwrap();
    }
}

fn ts(n: u32) -> String {
    format!("2026-10-18T09:{:02}:{:02}.000Z", n / 60, n % 60)
}

async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
    let response = app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn list_events_on_empty_store_is_empty_array() {
    let (status, json) = get_json(make_state(make_store()), "/api/events").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn list_events_returns_newest_first_capped_at_100() {
    let store = make_store();
    let events: Vec<StoredEvent> = (0..105)
        .map(|i| stored(&format!("e{i:03}"), "web", &ts(i), None))
        .collect();
    insert(&store, &events);

    let (status, json) = get_json(make_state(store), "/api/events").await;

    assert_eq!(status, StatusCode::OK);
    let listed = json.as_array().unwrap();
    assert_eq!(listed.len(), 100);
    assert_eq!(listed[0]["id"], "e104");
    assert_eq!(listed[99]["id"], "e005");
    assert_eq!(listed[0]["payload"]["text"], "event e104");
}

#[tokio::test]
async fn list_events_includes_analysis_when_present() {
    let store = make_store();
    insert(
        &store,
        &[
            stored("plain", "web", &ts(1), None),
            stored("scored", "web", &ts(2), Some(("Positive", Some(0.9)))),
        ],
    );

    let (_, json) = get_json(make_state(store), "/api/events").await;

    assert_eq!(json[0]["id"], "scored");
    assert_eq!(json[0]["analysis"]["sentiment"], "Positive");
    assert_eq!(json[0]["analysis"]["score"], 0.9);
    assert!(json[1]["analysis"].is_null());
}

#[tokio::test]
async fn list_events_survives_documents_with_odd_analysis() {
    let store = make_store();
    insert(&store, &[stored("good", "web", &ts(1), Some(("Positive", Some(0.4))))]);
    store
        .pool()
        .get()
        .unwrap()
        .execute(
            "INSERT INTO events (id, source, payload_json, analysis_json, timestamp)
             VALUES ('odd', 'web', '{\"text\":\"odd\"}', '{\"score\":\"high\"}', ?1)",
            [ts(2)],
        )
        .unwrap();

    let (status, json) = get_json(make_state(store), "/api/events").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["id"], "odd");
    assert_eq!(json[0]["analysis"]["score"], "high");
    assert_eq!(json[1]["id"], "good");
}

#[tokio::test]
async fn stats_on_empty_store_is_zero_summary() {
    let (status, json) = get_json(make_state(make_store()), "/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "total_events": 0,
            "avg_score": "0.0000",
            "sentiment_breakdown": {"positive": 0, "neutral": 0, "negative": 0},
            "top_sources": [],
            "last_event_at": ""
        })
    );
}

#[tokio::test]
async fn stats_average_excludes_missing_scores() {
    let store = make_store();
    insert(
        &store,
        &[
            stored("a", "web", &ts(1), Some(("Positive", Some(1.0)))),
            stored("b", "web", &ts(2), Some(("Positive", Some(0.5)))),
            stored("c", "mobile", &ts(3), Some(("Neutral", None))),
            stored("d", "mobile", &ts(4), Some(("Negative", Some(0.2)))),
        ],
    );

    let (status, json) = get_json(make_state(store), "/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_events"], 4);
    assert_eq!(json["avg_score"], "0.5667");
    assert_eq!(
        json["sentiment_breakdown"],
        json!({"positive": 2, "neutral": 1, "negative": 1})
    );
    assert_eq!(json["last_event_at"], ts(4));
}

#[tokio::test]
async fn stats_top_sources_keeps_five_largest() {
    let store = make_store();
    let mut events = Vec::new();
    let mut n = 0;
    for (source, count) in [("A", 5), ("B", 3), ("C", 3), ("D", 2), ("E", 1), ("F", 1)] {
        for _ in 0..count {
            events.push(stored(&format!("{source}{n}"), source, &ts(n), None));
            n += 1;
        }
    }
    insert(&store, &events);

    let (_, json) = get_json(make_state(store), "/api/stats").await;

    let top = json["top_sources"].as_array().unwrap();
    assert_eq!(top.len(), 5);
    assert_eq!(top[0], json!({"source": "A", "count": 5}));
    assert_eq!(top[1]["count"], 3);
    assert_eq!(top[2]["count"], 3);
    let names: Vec<&str> = top.iter().map(|s| s["source"].as_str().unwrap()).collect();
    assert!(names.contains(&"B") && names.contains(&"C"));
}

#[tokio::test]
async fn store_failure_is_a_server_error() {
    let store = make_store();
    store
        .pool()
        .get()
        .unwrap()
        .execute_batch("DROP TABLE events")
        .unwrap();

    let state = make_state(store);
    let (list_status, list_json) = get_json(state.clone(), "/api/events").await;
    let (stats_status, stats_json) = get_json(state, "/api/stats").await;

    assert_eq!(list_status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(list_json["error"].as_str().unwrap().contains("events"));
    assert_eq!(stats_status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(stats_json["error"].is_string());
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (status, json) = get_json(make_state(make_store()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
