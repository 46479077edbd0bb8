//! Behaviour every `Persistence` backend must share, checked against the
//! in-memory store directly and through the contention wrapper.

#![cfg(feature = "test-util")]

use bubblestore::{
    generate_uuid,
    persistence::{Persistence, RecordOutcome, inmemory},
    test::{ContendedPersistence, PersistenceTestExt, SeedError},
};
use serde_json::json;

async fn first_write_wins<P: Persistence>(store: &P) {
    let bubble_uuid = generate_uuid();
    let first = generate_uuid();

    let created = store
        .record_first_event(&bubble_uuid, &first, &generate_uuid(), &json!("a"), &json!({"n": 1}))
        .await
        .unwrap();
    let duplicate = store
        .record_first_event(
            &bubble_uuid,
            &generate_uuid(),
            &generate_uuid(),
            &json!("b"),
            &json!({"n": 2}),
        )
        .await
        .unwrap();

    assert_eq!(created, RecordOutcome::Successful);
    assert_eq!(duplicate, RecordOutcome::Collision);
    let bubble = store
        .get_bubble::<serde_json::Value>(&bubble_uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bubble.current_state, json!({"n": 1}));
    assert_eq!(bubble.latest_event_uuid, first);
}

async fn chain_advances_one_link_at_a_time<P: Persistence>(store: &P) {
    let bubble_uuid = generate_uuid();
    let mut latest = generate_uuid();
    let seeded = store
        .record_first_event(&bubble_uuid, &latest, &generate_uuid(), &json!(0), &json!(0))
        .await
        .unwrap();
    assert_eq!(seeded, RecordOutcome::Successful);

    for n in 1..=5 {
        let next = generate_uuid();
        let outcome = store
            .record_subsequent_event(
                &bubble_uuid,
                &latest,
                &next,
                &generate_uuid(),
                &json!(n),
                &json!(n),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Successful);

        // The link just replaced is now stale.
        let stale = store
            .record_subsequent_event(
                &bubble_uuid,
                &latest,
                &generate_uuid(),
                &generate_uuid(),
                &json!(-1),
                &json!(-1),
            )
            .await
            .unwrap();
        assert_eq!(stale, RecordOutcome::Collision);

        latest = next;
    }

    let bubble = store
        .get_bubble::<i64>(&bubble_uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bubble.current_state, 5);
    assert_eq!(bubble.latest_event_uuid, latest);
}

async fn unknown_bubbles_are_absent<P: Persistence>(store: &P) {
    let bubble_uuid = generate_uuid();

    assert!(store.get_bubble::<i64>(&bubble_uuid).await.unwrap().is_none());
    let outcome = store
        .record_subsequent_event(
            &bubble_uuid,
            &generate_uuid(),
            &generate_uuid(),
            &generate_uuid(),
            &json!(1),
            &json!(1),
        )
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Collision);
    assert!(store.get_bubble::<i64>(&bubble_uuid).await.unwrap().is_none());
}

async fn check_contract<P: Persistence>(store: &P) {
    store.initialize().await.unwrap();
    first_write_wins(store).await;
    chain_advances_one_link_at_a_time(store).await;
    unknown_bubbles_are_absent(store).await;
    store.initialize().await.unwrap();
}

#[tokio::test]
async fn in_memory_store_honours_contract() {
    let store = inmemory::Store::new();

    check_contract(&store).await;

    // One root from the first-write check, a root and five links from the chain.
    assert_eq!(store.event_count(), 1 + 6);
}

#[tokio::test]
async fn contention_wrapper_without_collisions_is_transparent() {
    let store = ContendedPersistence::new(inmemory::Store::new());

    check_contract(&store).await;

    assert_eq!(store.inner().event_count(), 7);
}

#[tokio::test]
async fn seeding_an_existing_bubble_is_refused() {
    let store = inmemory::Store::new();
    let bubble_uuid = generate_uuid();
    store
        .seed_bubble(&bubble_uuid, &generate_uuid(), &json!("created"), &json!({}))
        .await
        .unwrap();

    let result = store
        .seed_bubble(&bubble_uuid, &generate_uuid(), &json!("created"), &json!({}))
        .await;

    assert!(matches!(result, Err(SeedError::BubbleExists(uuid)) if uuid == bubble_uuid));
    assert_eq!(store.event_count(), 1);
}
