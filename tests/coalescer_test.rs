use serde_json::json;
use sqlx::PgPool;
use streambridge::engine::{Coalescer, Normalizer};
use streambridge::models::{EventType, NewEvent};
use streambridge::repositories::EventRepository;

async fn submit_gift(
    pool: &PgPool,
    username: &str,
    gift_name: &str,
    repeat_end: bool,
    service_id: Option<&str>,
) -> streambridge::engine::coalescer::Enqueued {
    let new_event = Normalizer::normalize(
        EventType::Gift,
        json!({
            "username": username,
            "gift_name": gift_name,
            "count": 1,
            "cost": 5,
            "repeat_end": repeat_end,
        }),
        service_id.map(String::from),
    )
    .unwrap();

    Coalescer::enqueue(pool, new_event, 1000).await.unwrap()
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_gift_streak_coalesces_to_one_entry(pool: PgPool) {
    let first = submit_gift(&pool, "a", "Rose", false, Some("gmod1")).await;
    let second = submit_gift(&pool, "a", "Rose", false, Some("gmod1")).await;
    let last = submit_gift(&pool, "a", "Rose", true, Some("gmod1")).await;

    assert!(!first.coalesced);
    assert!(second.coalesced);
    assert!(last.coalesced);
    assert_eq!(second.event.id, first.event.id);
    assert_eq!(last.event.id, first.event.id);

    let repo = EventRepository::new(&pool);
    assert_eq!(repo.pending_count().await.unwrap(), 1);

    let event = repo.find_by_id(first.event.id).await.unwrap().unwrap();
    assert_eq!(event.gift_count(), 3);
    assert_eq!(event.payload["cost"], 15);
    assert_eq!(event.repeat_end, Some(true));
    assert_eq!(event.priority, 100);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_finalized_streak_does_not_absorb_later_gifts(pool: PgPool) {
    let first = submit_gift(&pool, "a", "Rose", true, None).await;
    let second = submit_gift(&pool, "a", "Rose", false, None).await;

    assert!(!second.coalesced);
    assert_ne!(second.event.id, first.event.id);
    assert_eq!(EventRepository::new(&pool).pending_count().await.unwrap(), 2);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_claimed_streak_is_not_coalesced(pool: PgPool) {
    let first = submit_gift(&pool, "a", "Rose", false, None).await;

    // The dispatcher claims the open streak row mid-burst.
    let claimed = EventRepository::new(&pool).dequeue_batch(1).await.unwrap();
    assert_eq!(claimed[0].id, first.event.id);

    let next = submit_gift(&pool, "a", "Rose", true, None).await;
    assert!(!next.coalesced);
    assert_ne!(next.event.id, first.event.id);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_streak_key_separates_senders_gifts_and_services(pool: PgPool) {
    let base = submit_gift(&pool, "a", "Rose", false, Some("gmod1")).await;

    let other_sender = submit_gift(&pool, "b", "Rose", false, Some("gmod1")).await;
    let other_gift = submit_gift(&pool, "a", "Lion", false, Some("gmod1")).await;
    let other_service = submit_gift(&pool, "a", "Rose", false, Some("gmod2")).await;

    assert!(!other_sender.coalesced);
    assert!(!other_gift.coalesced);
    assert!(!other_service.coalesced);
    assert_ne!(other_sender.event.id, base.event.id);
    assert_eq!(EventRepository::new(&pool).pending_count().await.unwrap(), 4);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_coalescing_pins_fifo_position(pool: PgPool) {
    let first = submit_gift(&pool, "a", "Rose", false, None).await;
    let created_at = first.event.created_at;

    // A later arrival merges in without moving the row's queue position.
    let merged = submit_gift(&pool, "a", "Rose", true, None).await;
    assert_eq!(merged.event.created_at, created_at);
    assert_eq!(merged.event.priority, first.event.priority);
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_optimize_merges_duplicate_streak_rows(pool: PgPool) {
    // Duplicate open rows can exist when a burst raced a dispatch claim
    // that was later reaped. Insert them directly.
    let repo = EventRepository::new(&pool);
    for _ in 0..2 {
        repo.insert(&NewEvent {
            event_type: EventType::Gift,
            payload: json!({"username": "a", "gift_name": "Rose", "count": 2, "cost": 10}),
            priority: 100,
            service_id: None,
            repeat_end: Some(false),
        })
        .await
        .unwrap();
    }
    let closing = repo
        .insert(&NewEvent {
            event_type: EventType::Gift,
            payload: json!({"username": "a", "gift_name": "Rose", "count": 1, "cost": 5}),
            priority: 100,
            service_id: None,
            repeat_end: Some(true),
        })
        .await
        .unwrap();

    let (merged, evicted) = Coalescer::optimize(&pool, 1000).await.unwrap();
    assert_eq!(merged, 2);
    assert_eq!(evicted, 0);

    assert_eq!(repo.pending_count().await.unwrap(), 1);
    let batch = repo.dequeue_batch(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].gift_count(), 5);
    assert_eq!(batch[0].repeat_end, Some(true));
    assert!(repo.find_by_id(closing.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "src/db/migrations")]
async fn test_optimize_leaves_distinct_streaks_alone(pool: PgPool) {
    submit_gift(&pool, "a", "Rose", true, None).await;
    submit_gift(&pool, "b", "Lion", true, None).await;

    let (merged, _) = Coalescer::optimize(&pool, 1000).await.unwrap();
    assert_eq!(merged, 0);
    assert_eq!(EventRepository::new(&pool).pending_count().await.unwrap(), 2);
}
