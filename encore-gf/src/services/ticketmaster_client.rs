//! Ticketmaster Discovery API client
//!
//! Production [`EventCatalog`]: attraction search by keyword and event listing
//! by attraction id (Discovery API v2).
//!
//! Requests are paced by a token bucket (default 4 req/s, below the API's
//! 5 req/s cap) and carry connect and total timeouts.

use crate::error::{EngineError, EngineResult};
use crate::types::{Attraction, EventCatalog, RawEvent};
use chrono::NaiveDate;
use encore_common::config::TicketmasterConfig;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Ticketmaster client errors
#[derive(Debug, Error)]
pub enum TicketmasterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by Ticketmaster")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<TicketmasterError> for EngineError {
    fn from(err: TicketmasterError) -> Self {
        EngineError::Upstream(format!("Ticketmaster: {}", err))
    }
}

// Discovery API response shapes (only the fields used)

#[derive(Debug, Deserialize)]
struct AttractionsPage {
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedAttractions>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedAttractions {
    #[serde(default)]
    attractions: Vec<TmAttraction>,
}

#[derive(Debug, Deserialize)]
struct TmAttraction {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedEvents>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedEvents {
    #[serde(default)]
    events: Vec<TmEvent>,
}

#[derive(Debug, Deserialize)]
struct TmEvent {
    id: String,
    #[serde(default)]
    name: String,
    url: Option<String>,
    dates: Option<TmDates>,
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedVenues>,
}

#[derive(Debug, Deserialize)]
struct TmDates {
    start: Option<TmStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmStart {
    local_date: Option<String>,
    local_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedVenues {
    #[serde(default)]
    venues: Vec<TmVenue>,
}

#[derive(Debug, Deserialize)]
struct TmVenue {
    id: Option<String>,
    name: Option<String>,
    city: Option<TmName>,
    state: Option<TmState>,
    country: Option<TmCountry>,
    location: Option<TmLocation>,
}

#[derive(Debug, Deserialize)]
struct TmName {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmState {
    state_code: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmCountry {
    country_code: Option<String>,
}

/// Coordinates arrive as strings
#[derive(Debug, Deserialize)]
struct TmLocation {
    latitude: Option<String>,
    longitude: Option<String>,
}

/// Attractions from a `/attractions.json` body, in response order
pub fn parse_attractions(body: &str) -> Result<Vec<Attraction>, TicketmasterError> {
    let page: AttractionsPage =
        serde_json::from_str(body).map_err(|e| TicketmasterError::Parse(e.to_string()))?;

    Ok(page
        .embedded
        .map(|e| e.attractions)
        .unwrap_or_default()
        .into_iter()
        .map(|a| Attraction { id: a.id, name: a.name })
        .collect())
}

/// Events from an `/events.json` body; the first venue of each event is used
pub fn parse_events(body: &str) -> Result<Vec<RawEvent>, TicketmasterError> {
    let page: EventsPage = serde_json::from_str(body).map_err(|e| TicketmasterError::Parse(e.to_string()))?;

    Ok(page
        .embedded
        .map(|e| e.events)
        .unwrap_or_default()
        .into_iter()
        .map(raw_event)
        .collect())
}

fn raw_event(event: TmEvent) -> RawEvent {
    let start = event.dates.and_then(|d| d.start);
    let venue = event.embedded.and_then(|e| e.venues.into_iter().next());

    let mut raw = RawEvent {
        id: event.id,
        name: event.name,
        url: event.url,
        local_date: start.as_ref().and_then(|s| s.local_date.clone()),
        local_time: start.and_then(|s| s.local_time),
        ..Default::default()
    };

    if let Some(venue) = venue {
        let location = venue.location;
        raw.venue_id = venue.id;
        raw.venue_name = venue.name;
        raw.venue_city = venue.city.and_then(|c| c.name);
        raw.venue_state = venue.state.and_then(|s| s.state_code.or(s.name));
        raw.venue_country = venue.country.and_then(|c| c.country_code);
        raw.latitude = location
            .as_ref()
            .and_then(|l| l.latitude.as_deref())
            .and_then(|v| v.trim().parse().ok());
        raw.longitude = location
            .as_ref()
            .and_then(|l| l.longitude.as_deref())
            .and_then(|v| v.trim().parse().ok());
    }

    raw
}

/// Ticketmaster Discovery API client
pub struct TicketmasterClient {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TicketmasterClient {
    /// Build a client; `timeout` bounds each request end to end
    pub fn new(api_key: String, config: &TicketmasterConfig, timeout: Duration) -> Result<Self, TicketmasterError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("encore-gf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TicketmasterError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.page_size.clamp(1, 200),
            rate_limiter,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, TicketmasterError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(url = %url, "Querying Ticketmaster");

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| TicketmasterError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TicketmasterError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| TicketmasterError::Network(e.to_string()))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(TicketmasterError::Api(status.as_u16(), snippet));
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl EventCatalog for TicketmasterClient {
    async fn search_by_name(&self, name: &str) -> EngineResult<Vec<Attraction>> {
        let body = self
            .get(
                "attractions.json",
                &[
                    ("keyword", name.to_string()),
                    ("classificationName", "music".to_string()),
                ],
            )
            .await?;

        Ok(parse_attractions(&body)?)
    }

    async fn events_for(&self, attraction_id: &str, since: Option<NaiveDate>) -> EngineResult<Vec<RawEvent>> {
        let mut query = vec![
            ("attractionId", attraction_id.to_string()),
            ("sort", "date,asc".to_string()),
            ("size", self.page_size.to_string()),
        ];
        if let Some(date) = since {
            query.push(("startDateTime", format!("{}T00:00:00Z", date.format("%Y-%m-%d"))));
        }

        let body = self.get("events.json", &query).await?;

        Ok(parse_events(&body)?)
    }
}
