//! Event fetcher behavior over an in-memory catalog

mod helpers;

use encore_gf::services::EventFetcher;
use helpers::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn catalog() -> MockEventCatalog {
    MockEventCatalog::new().with_artist(
        "Phoenix",
        "K8vZ917G",
        vec![
            raw_event("past", "v1", 40.75, -73.99, &days_from_today(-10)),
            raw_event("soon", "v1", 40.75, -73.99, &days_from_today(5)),
            raw_event("later", "v2", 40.75, -73.99, &days_from_today(40)),
        ],
    )
}

fn event_ids(concerts: &[encore_gf::types::Concert]) -> Vec<&str> {
    concerts.iter().map(|c| c.event_id.as_str()).collect()
}

#[tokio::test]
async fn test_upcoming_events_by_name() {
    let fetcher = EventFetcher::new(Arc::new(catalog()));

    let concerts = fetcher.events_for("phoenix").await;

    assert_eq!(event_ids(&concerts), vec!["soon", "later"]);
}

#[tokio::test]
async fn test_filtered_query_failure_falls_back() {
    let catalog = Arc::new(catalog());
    catalog.fail_filtered.store(true, Ordering::SeqCst);
    let fetcher = EventFetcher::new(catalog.clone());

    let concerts = fetcher.events_for("Phoenix").await;

    assert_eq!(event_ids(&concerts), vec!["soon", "later"]);
    assert_eq!(catalog.event_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_catalog_failure_yields_empty() {
    let catalog = Arc::new(catalog());
    catalog.fail_all.store(true, Ordering::SeqCst);

    let fetched = EventFetcher::new(catalog).fetch("Phoenix", None).await;

    assert!(fetched.concerts.is_empty());
    assert!(fetched.attraction_id.is_none());
}

#[tokio::test]
async fn test_unknown_artist_yields_empty() {
    let fetcher = EventFetcher::new(Arc::new(catalog()));
    assert!(fetcher.events_for("Nobody Knows").await.is_empty());
}

#[tokio::test]
async fn test_cached_attraction_skips_search() {
    let catalog = Arc::new(catalog());
    let fetcher = EventFetcher::new(catalog.clone());

    let fetched = fetcher.fetch("renamed artist", Some("K8vZ917G")).await;

    assert_eq!(fetched.concerts.len(), 2);
    assert_eq!(fetched.attraction_id.as_deref(), Some("K8vZ917G"));
    assert_eq!(catalog.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_catalog_times_out() {
    let catalog = Arc::new(catalog().with_delay(Duration::from_secs(5)));
    let fetcher = EventFetcher::new(catalog).with_timeout(Duration::from_millis(50));

    let started = std::time::Instant::now();
    let concerts = fetcher.events_for("Phoenix").await;

    assert!(concerts.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_same_venue_and_date_collapsed() {
    let catalog = MockEventCatalog::new().with_artist(
        "Phoenix",
        "K1",
        vec![
            raw_event("early", "v1", 40.75, -73.99, &days_from_today(3)),
            raw_event("late", "v1", 40.75, -73.99, &days_from_today(3)),
        ],
    );

    let concerts = EventFetcher::new(Arc::new(catalog)).events_for("Phoenix").await;

    assert_eq!(event_ids(&concerts), vec!["early"]);
}
