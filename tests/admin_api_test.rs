use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use streambridge::api;
use streambridge::config::QueueConfig;
use streambridge::models::EventStatus;
use streambridge::repositories::EventRepository;
use streambridge::services::SinkRegistry;
use tower::ServiceExt;

fn app(pool: &PgPool) -> Router {
    api::build_router(pool.clone(), SinkRegistry::new(), QueueConfig::default())
}

async fn request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    (status, parsed)
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_submit_rejects_incomplete_gift(pool: PgPool) {
    let (status, _) = request(
        app(&pool),
        "POST",
        "/events",
        Some(json!({"event_type": "gift", "payload": {"gift_name": "Rose"}})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(EventRepository::new(&pool).pending_count().await.unwrap(), 0);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_submit_then_status_reflects_backlog(pool: PgPool) {
    let (status, body) = request(
        app(&pool),
        "POST",
        "/events",
        Some(json!({
            "event_type": "chat",
            "payload": {"username": "a", "comment": "hello"},
            "service_id": "gmod1",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["event_id"].as_i64().is_some());
    assert_eq!(body["coalesced"], false);
    assert_eq!(body["priority"], 10);

    let (status, body) = request(app(&pool), "GET", "/queue/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["pending"], 1);
    assert_eq!(body["counts"]["processing"], 0);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_health_reports_backlog_pressure(pool: PgPool) {
    let (status, body) = request(app(&pool), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending"], 0);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_clear_reports_affected_rows(pool: PgPool) {
    for i in 0..3 {
        request(
            app(&pool),
            "POST",
            "/events",
            Some(json!({
                "event_type": "chat",
                "payload": {"username": "a", "comment": format!("m{}", i)},
            })),
        )
        .await;
    }

    let (status, body) = request(app(&pool), "POST", "/queue/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 3);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_retry_unknown_event_is_not_found(pool: PgPool) {
    let (status, _) = request(app(&pool), "POST", "/queue/events/99999/retry", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_clear_completed_honors_retention_window(pool: PgPool) {
    for comment in ["old", "new"] {
        request(
            app(&pool),
            "POST",
            "/events",
            Some(json!({
                "event_type": "chat",
                "payload": {"username": "a", "comment": comment},
            })),
        )
        .await;
    }

    sqlx::query("UPDATE bridge_events SET status = 'completed', processed_at = NOW()")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "UPDATE bridge_events SET processed_at = NOW() - INTERVAL '48 hours'
         WHERE payload->>'comment' = 'old'",
    )
    .execute(&pool)
    .await
    .unwrap();

    let (status, body) = request(
        app(&pool),
        "POST",
        "/queue/clear-completed",
        Some(json!({"older_than_hours": 24})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let counts = EventRepository::new(&pool).status_counts().await.unwrap();
    assert_eq!(counts.completed, 1);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_optimize_merges_streaks_via_api(pool: PgPool) {
    for _ in 0..2 {
        sqlx::query(
            "INSERT INTO bridge_events (event_type, payload, priority, repeat_end)
             VALUES ('gift', '{\"username\": \"a\", \"gift_name\": \"Rose\", \"count\": 1}', 100, FALSE)",
        )
        .execute(&pool)
        .await
        .unwrap();
    }

    let (status, body) = request(app(&pool), "POST", "/queue/optimize", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["merged"], 1);

    let repo = EventRepository::new(&pool);
    assert_eq!(repo.pending_count().await.unwrap(), 1);
    let remaining = repo.dequeue_batch(10).await.unwrap();
    assert_eq!(remaining[0].gift_count(), 2);
    assert_eq!(remaining[0].status, EventStatus::Processing);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_reset_stuck_via_api(pool: PgPool) {
    request(
        app(&pool),
        "POST",
        "/events",
        Some(json!({"event_type": "follow", "payload": {"username": "a"}})),
    )
    .await;

    let repo = EventRepository::new(&pool);
    repo.dequeue_batch(1).await.unwrap();
    sqlx::query("UPDATE bridge_events SET claimed_at = NOW() - INTERVAL '1 hour'")
        .execute(&pool)
        .await
        .unwrap();

    let (status, body) = request(
        app(&pool),
        "POST",
        "/queue/reset-stuck",
        Some(json!({"timeout_secs": 60.0})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reclaimed"], 1);
}
