//! Counter service tests: identity derivation wired to storage

use std::sync::Arc;
use tally::counter::{CounterError, CounterService, MAX_PAGE_SIZE};
use tally::cursor::CursorSigner;
use tally::identity::{IdentityHasher, VISITOR_ID_LEN};
use tally::storage::{SqliteStorage, Storage};

async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_service(secret: &str, max_likes: i64) -> CounterService {
    CounterService::new(
        create_test_storage().await,
        Arc::new(IdentityHasher::new(secret).unwrap()),
        Arc::new(CursorSigner::new(Some("cursor-test-secret"))),
        max_likes,
    )
}

#[tokio::test]
async fn test_identity_token_is_stable() {
    let service = create_service("s3cret", 3).await;

    let first = service.visitor_id("203.0.113.4");
    let second = service.visitor_id("203.0.113.4");

    assert_eq!(first, second);
    assert_eq!(first.as_str().len(), VISITOR_ID_LEN);
}

#[tokio::test]
async fn test_first_view_counts_second_does_not() {
    let service = create_service("s3cret", 3).await;

    let first = service
        .record_view("hello-world", "203.0.113.4")
        .await
        .unwrap();
    assert_eq!(first.views, 1);
    assert!(first.counted);

    let second = service
        .record_view("hello-world", "203.0.113.4")
        .await
        .unwrap();
    assert_eq!(second.views, 1);
    assert!(!second.counted);
}

#[tokio::test]
async fn test_views_from_distinct_addresses_accumulate() {
    let service = create_service("s3cret", 3).await;

    for i in 1..=4 {
        let outcome = service
            .record_view("hello-world", &format!("203.0.113.{}", i))
            .await
            .unwrap();
        assert_eq!(outcome.views, i);
    }
}

#[tokio::test]
async fn test_concurrent_views_same_address_count_once() {
    let service = Arc::new(create_service("s3cret", 3).await);

    let mut handles = vec![];
    for _ in 0..25 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.record_view("hello-world", "203.0.113.4").await
        }));
    }

    let mut counted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().counted {
            counted += 1;
        }
    }
    assert_eq!(counted, 1);

    let stats = service
        .post_stats("hello-world", "203.0.113.4")
        .await
        .unwrap();
    assert_eq!(stats.views, 1);
    assert!(stats.viewed);
}

#[tokio::test]
async fn test_three_likes_with_max_one() {
    let service = create_service("s3cret", 1).await;

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            service
                .apply_like("hello-world", "203.0.113.4", 1)
                .await
                .unwrap(),
        );
    }

    let last = last.unwrap();
    assert_eq!(last.likes, 1);
    assert_eq!(last.visitor_likes, 1);
    assert_eq!(last.applied, 0);
}

#[tokio::test]
async fn test_unlike_reports_applied_delta() {
    let service = create_service("s3cret", 3).await;

    service
        .apply_like("hello-world", "203.0.113.4", 1)
        .await
        .unwrap();
    service
        .apply_like("hello-world", "198.51.100.1", 1)
        .await
        .unwrap();

    let unlike = service
        .apply_like("hello-world", "203.0.113.4", -1)
        .await
        .unwrap();
    assert_eq!(unlike.applied, -1);
    assert_eq!(unlike.likes, 1);

    // Nothing left to withdraw
    let again = service
        .apply_like("hello-world", "203.0.113.4", -1)
        .await
        .unwrap();
    assert_eq!(again.applied, 0);
    assert_eq!(again.likes, 1);
    assert_eq!(again.visitor_likes, 0);
}

#[tokio::test]
async fn test_like_sequence_stays_within_bounds() {
    let service = create_service("s3cret", 3).await;
    let deltas = [1, 1, -1, 1, 1, 1, 1, -1, -1, -1, -1, -1, 1];

    let mut expected = 0i64;
    for delta in deltas {
        let outcome = service
            .apply_like("bounded", "203.0.113.4", delta)
            .await
            .unwrap();
        expected = (expected + delta).clamp(0, 3);

        assert!((0..=3).contains(&outcome.visitor_likes));
        assert_eq!(outcome.visitor_likes, expected);
        assert_eq!(outcome.likes, expected);
    }
}

#[tokio::test]
async fn test_rotated_secret_is_a_new_visitor() {
    let storage = create_test_storage().await;
    let cursors = Arc::new(CursorSigner::new(Some("cursor-test-secret")));

    let before = CounterService::new(
        Arc::clone(&storage),
        Arc::new(IdentityHasher::new("old-secret").unwrap()),
        Arc::clone(&cursors),
        3,
    );
    let after = CounterService::new(
        Arc::clone(&storage),
        Arc::new(IdentityHasher::new("new-secret").unwrap()),
        cursors,
        3,
    );

    before
        .record_view("hello-world", "203.0.113.4")
        .await
        .unwrap();
    let outcome = after
        .record_view("hello-world", "203.0.113.4")
        .await
        .unwrap();

    assert!(outcome.counted);
    assert_eq!(outcome.views, 2);
}

#[tokio::test]
async fn test_invalid_input_rejected() {
    let service = create_service("s3cret", 3).await;

    assert!(matches!(
        service.record_view("", "203.0.113.4").await,
        Err(CounterError::InvalidSlug)
    ));
    assert!(matches!(
        service.record_view("Not A Slug", "203.0.113.4").await,
        Err(CounterError::InvalidSlug)
    ));
    assert!(matches!(
        service.apply_like("hello-world", "203.0.113.4", 2).await,
        Err(CounterError::InvalidDelta)
    ));
    assert!(matches!(
        service.apply_like("hello-world", "203.0.113.4", 0).await,
        Err(CounterError::InvalidDelta)
    ));
}

#[tokio::test]
async fn test_list_posts_pages_through_everything() {
    let service = create_service("s3cret", 3).await;

    for i in 0..7 {
        service
            .record_view(&format!("post-{}", i), "203.0.113.4")
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = service
            .list_posts(Some(3), cursor.as_deref())
            .await
            .unwrap();
        assert!(page.posts.len() <= 3);
        seen.extend(page.posts.into_iter().map(|p| p.slug));

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 7);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 7);
}

#[tokio::test]
async fn test_list_posts_exact_page_has_no_next_cursor() {
    let service = create_service("s3cret", 3).await;

    for i in 0..2 {
        service
            .record_view(&format!("post-{}", i), "203.0.113.4")
            .await
            .unwrap();
    }

    let page = service.list_posts(Some(2), None).await.unwrap();
    assert_eq!(page.posts.len(), 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_list_posts_limit_is_clamped() {
    let service = create_service("s3cret", 3).await;

    for i in 0..3 {
        service
            .record_view(&format!("post-{}", i), "203.0.113.4")
            .await
            .unwrap();
    }

    let page = service.list_posts(Some(0), None).await.unwrap();
    assert_eq!(page.posts.len(), 1);

    let page = service
        .list_posts(Some(MAX_PAGE_SIZE * 10), None)
        .await
        .unwrap();
    assert_eq!(page.posts.len(), 3);
}

#[tokio::test]
async fn test_list_posts_rejects_tampered_cursor() {
    let service = create_service("s3cret", 3).await;

    assert!(matches!(
        service.list_posts(None, Some("garbage")).await,
        Err(CounterError::InvalidCursor)
    ));
    assert!(matches!(
        service.list_posts(None, Some("eyJ4IjoxfQ.c2lnbmF0dXJl")).await,
        Err(CounterError::InvalidCursor)
    ));
}
