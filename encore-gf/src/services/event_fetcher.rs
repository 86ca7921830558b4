//! Event fetcher
//!
//! Resolves an artist name to upcoming concerts through an [`EventCatalog`],
//! normalizing the catalog's loosely-typed events into [`Concert`]s.
//!
//! Lookups never fail from the caller's point of view: any upstream problem
//! is logged and yields no concerts for that artist.

use crate::error::{EngineError, EngineResult};
use crate::types::{Attraction, Concert, EventCatalog, GeoPoint, RawEvent};
use chrono::{NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on each catalog call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Concerts for one artist plus the attraction id they were found under
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedEvents {
    pub attraction_id: Option<String>,
    pub concerts: Vec<Concert>,
}

/// Best attraction for `artist_name`: exact (case-insensitive) name match,
/// else the catalog's first result
pub fn pick_attraction<'a>(artist_name: &str, attractions: &'a [Attraction]) -> Option<&'a Attraction> {
    let wanted = artist_name.trim().to_lowercase();
    attractions
        .iter()
        .find(|a| a.name.trim().to_lowercase() == wanted)
        .or_else(|| attractions.first())
}

/// Convert a raw catalog event; `None` if venue id, coordinates or date are
/// missing or malformed
pub fn normalize(raw: &RawEvent) -> Option<Concert> {
    let venue_id = raw.venue_id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;

    let latitude = raw.latitude.filter(|lat| lat.is_finite() && (-90.0..=90.0).contains(lat))?;
    let longitude = raw.longitude.filter(|lon| lon.is_finite() && (-180.0..=180.0).contains(lon))?;

    let date = raw
        .local_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())?;

    let time = raw.local_time.as_deref().and_then(|t| {
        NaiveTime::parse_from_str(t.trim(), "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t.trim(), "%H:%M"))
            .ok()
    });

    Some(Concert {
        event_id: raw.id.clone(),
        event_name: raw.name.clone(),
        venue_id: venue_id.to_string(),
        venue_name: raw.venue_name.clone().unwrap_or_default(),
        venue_city: raw.venue_city.clone().unwrap_or_default(),
        venue_state: raw.venue_state.clone(),
        venue_country: raw.venue_country.clone(),
        venue_location: GeoPoint::new(latitude, longitude),
        date,
        time,
        ticket_url: raw.url.clone(),
    })
}

pub struct EventFetcher {
    catalog: Arc<dyn EventCatalog>,
    timeout: Duration,
}

impl EventFetcher {
    pub fn new(catalog: Arc<dyn EventCatalog>) -> Self {
        Self {
            catalog,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upcoming concerts for an artist, looked up by name
    pub async fn events_for(&self, artist_name: &str) -> Vec<Concert> {
        self.fetch(artist_name, None).await.concerts
    }

    /// Upcoming concerts, skipping the name search when `cached_attraction`
    /// is known
    pub async fn fetch(&self, artist_name: &str, cached_attraction: Option<&str>) -> FetchedEvents {
        let today = Utc::now().date_naive();

        match self.try_fetch(artist_name, cached_attraction, today).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(artist = artist_name, error = %e, "Event lookup failed, treating as no events");
                FetchedEvents::default()
            }
        }
    }

    async fn try_fetch(
        &self,
        artist_name: &str,
        cached_attraction: Option<&str>,
        today: NaiveDate,
    ) -> EngineResult<FetchedEvents> {
        let attraction_id = match cached_attraction {
            Some(id) => id.to_string(),
            None => {
                let attractions = self
                    .bounded("attraction search", self.catalog.search_by_name(artist_name))
                    .await?;
                match pick_attraction(artist_name, &attractions) {
                    Some(attraction) => attraction.id.clone(),
                    None => {
                        debug!(artist = artist_name, "No catalog attraction matches artist");
                        return Ok(FetchedEvents::default());
                    }
                }
            }
        };

        let raw_events = match self
            .bounded("event query", self.catalog.events_for(&attraction_id, Some(today)))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    artist = artist_name,
                    attraction_id = %attraction_id,
                    error = %e,
                    "Date-filtered event query failed, retrying unfiltered"
                );
                self.bounded("event query", self.catalog.events_for(&attraction_id, None))
                    .await?
            }
        };

        let mut seen = HashSet::new();
        let mut concerts = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            let Some(concert) = normalize(raw) else {
                debug!(artist = artist_name, event_id = %raw.id, "Dropping event without venue, coordinates or date");
                continue;
            };
            if concert.date < today {
                continue;
            }
            // Two shows on one night share a group
            if seen.insert((concert.venue_id.clone(), concert.date)) {
                concerts.push(concert);
            }
        }

        Ok(FetchedEvents {
            attraction_id: Some(attraction_id),
            concerts,
        })
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = EngineResult<T>>) -> EngineResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(format!(
                "{} exceeded {}ms",
                what,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(venue: Option<&str>, date: Option<&str>) -> RawEvent {
        RawEvent {
            id: "e1".to_string(),
            name: "Tour".to_string(),
            venue_id: venue.map(str::to_string),
            venue_name: Some("Arena".to_string()),
            latitude: Some(40.75),
            longitude: Some(-73.99),
            local_date: date.map(str::to_string),
            local_time: Some("19:30:00".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pick_exact_match_case_insensitive() {
        let attractions = vec![
            Attraction {
                id: "1".to_string(),
                name: "Phoenix Tribute".to_string(),
            },
            Attraction {
                id: "2".to_string(),
                name: "PHOENIX".to_string(),
            },
        ];

        assert_eq!(pick_attraction("Phoenix", &attractions).unwrap().id, "2");
        assert_eq!(pick_attraction("Unrelated", &attractions).unwrap().id, "1");
        assert!(pick_attraction("x", &[]).is_none());
    }

    #[test]
    fn test_normalize_complete_event() {
        let concert = normalize(&raw(Some("KovZpZA7AAEA"), Some("2030-03-14"))).unwrap();

        assert_eq!(concert.venue_id, "KovZpZA7AAEA");
        assert_eq!(concert.venue_city, "");
        assert_eq!(concert.date, NaiveDate::from_ymd_opt(2030, 3, 14).unwrap());
        assert_eq!(concert.time, NaiveTime::from_hms_opt(19, 30, 0));
    }

    #[test]
    fn test_normalize_drops_incomplete_events() {
        assert!(normalize(&raw(None, Some("2030-03-14"))).is_none());
        assert!(normalize(&raw(Some(" "), Some("2030-03-14"))).is_none());
        assert!(normalize(&raw(Some("v"), None)).is_none());
        assert!(normalize(&raw(Some("v"), Some("TBA"))).is_none());

        let mut no_coords = raw(Some("v"), Some("2030-03-14"));
        no_coords.latitude = None;
        assert!(normalize(&no_coords).is_none());
    }

    #[test]
    fn test_unparseable_time_kept_as_none() {
        let mut event = raw(Some("v"), Some("2030-03-14"));
        event.local_time = Some("late".to_string());
        assert_eq!(normalize(&event).unwrap().time, None);
    }
}
