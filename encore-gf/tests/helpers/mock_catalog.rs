//! In-memory event catalog

use async_trait::async_trait;
use chrono::NaiveDate;
use encore_gf::types::{Attraction, EventCatalog, RawEvent};
use encore_gf::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Event catalog serving canned attractions and events
///
/// Failure modes can be toggled at runtime through the atomic flags.
#[derive(Default)]
pub struct MockEventCatalog {
    attractions: HashMap<String, Vec<Attraction>>,
    events: HashMap<String, Vec<RawEvent>>,
    delay: Option<Duration>,
    /// Date-filtered event queries fail
    pub fail_filtered: AtomicBool,
    /// Every call fails
    pub fail_all: AtomicBool,
    pub search_calls: AtomicUsize,
    pub event_calls: AtomicUsize,
}

impl MockEventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artist under `attraction_id` with its events
    pub fn with_artist(mut self, name: &str, attraction_id: &str, events: Vec<RawEvent>) -> Self {
        self.attractions
            .entry(name.to_lowercase())
            .or_default()
            .push(Attraction {
                id: attraction_id.to_string(),
                name: name.to_string(),
            });
        self.events.entry(attraction_id.to_string()).or_default().extend(events);
        self
    }

    /// Sleep this long before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn before_call(&self) -> EngineResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(EngineError::Upstream("catalog unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventCatalog for MockEventCatalog {
    async fn search_by_name(&self, name: &str) -> EngineResult<Vec<Attraction>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        Ok(self.attractions.get(&name.to_lowercase()).cloned().unwrap_or_default())
    }

    async fn events_for(&self, attraction_id: &str, since: Option<NaiveDate>) -> EngineResult<Vec<RawEvent>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        if since.is_some() && self.fail_filtered.load(Ordering::SeqCst) {
            return Err(EngineError::Upstream("startDateTime rejected".to_string()));
        }

        let events = self.events.get(attraction_id).cloned().unwrap_or_default();

        Ok(match since {
            Some(since) => events
                .into_iter()
                .filter(|e| {
                    e.local_date
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                        .map(|d| d >= since)
                        .unwrap_or(true)
                })
                .collect(),
            None => events,
        })
    }
}

/// Raw event at a venue with coordinates and a local date
pub fn raw_event(id: &str, venue_id: &str, latitude: f64, longitude: f64, local_date: &str) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        name: format!("Event {}", id),
        venue_id: Some(venue_id.to_string()),
        venue_name: Some(format!("Venue {}", venue_id)),
        venue_city: Some("New York".to_string()),
        venue_state: Some("NY".to_string()),
        venue_country: Some("US".to_string()),
        latitude: Some(latitude),
        longitude: Some(longitude),
        local_date: Some(local_date.to_string()),
        local_time: Some("20:00:00".to_string()),
        url: Some(format!("https://tickets.example/{}", id)),
    }
}
