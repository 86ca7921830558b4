//! Core Types and Trait Definitions for encore-gf
//!
//! Domain records shared by the formation pipeline, and the collaborator
//! traits the engine consumes:
//! - **UserDirectory:** user existence and home coordinates
//! - **FriendshipGraph:** accepted, unblocked friendship edges
//! - **ListeningHistory / ArtistCatalog:** who follows which artist
//! - **EventCatalog:** upstream concert listings
//! - **GroupStore:** persisted concert groups and their members
//!
//! SQLite implementations live in [`crate::db`]; the Ticketmaster catalog in
//! [`crate::services::ticketmaster_client`]. Tests substitute their own.

use crate::error::EngineResult;
use chrono::{NaiveDate, NaiveTime};
use encore_common::{ArtistId, GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// Common Types
// ============================================================================

/// Latitude/longitude in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Upcoming concert, normalized from the event catalog
///
/// Produced fresh on every run; never cached by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concert {
    /// Upstream event id (diagnostics only)
    pub event_id: String,
    pub event_name: String,
    pub venue_id: String,
    pub venue_name: String,
    pub venue_city: String,
    pub venue_state: Option<String>,
    pub venue_country: Option<String>,
    pub venue_location: GeoPoint,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub ticket_url: Option<String>,
}

/// Catalog entity matched by artist name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attraction {
    pub id: String,
    pub name: String,
}

/// Event as returned by the catalog, before normalization
///
/// Every field the engine needs may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub name: String,
    pub venue_id: Option<String>,
    pub venue_name: Option<String>,
    pub venue_city: Option<String>,
    pub venue_state: Option<String>,
    pub venue_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `YYYY-MM-DD`
    pub local_date: Option<String>,
    /// `HH:MM:SS`
    pub local_time: Option<String>,
    pub url: Option<String>,
}

/// Artist catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistInfo {
    pub artist_id: ArtistId,
    pub name: String,
    /// Ticketmaster attraction id remembered from an earlier run
    pub attraction_id: Option<String>,
}

/// One unit of orchestrator work: an artist followed by at least two users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedArtist {
    pub artist_id: ArtistId,
    pub artist_name: String,
    pub attraction_id: Option<String>,
    pub user_ids: BTreeSet<UserId>,
}

/// Persisted concert group
#[derive(Debug, Clone, PartialEq)]
pub struct ConcertGroup {
    pub id: GroupId,
    pub artist_id: ArtistId,
    pub venue_id: String,
    pub venue_name: String,
    pub venue_city: String,
    pub venue_state: Option<String>,
    pub venue_country: Option<String>,
    pub venue_location: Option<GeoPoint>,
    pub concert_date: NaiveDate,
    pub concert_time: Option<NaiveTime>,
    pub ticket_url: Option<String>,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// User records owned by the identity sync
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user: &UserId) -> EngineResult<bool>;

    /// Home coordinates, if the user shared them
    async fn location_of(&self, user: &UserId) -> EngineResult<Option<GeoPoint>>;

    /// Coordinates for every user in `users` that has them (others omitted)
    async fn locations_of(&self, users: &BTreeSet<UserId>) -> EngineResult<HashMap<UserId, GeoPoint>>;

    /// Subset of `users` present in the directory
    async fn known_users(&self, users: &BTreeSet<UserId>) -> EngineResult<BTreeSet<UserId>>;
}

/// Friendship relation store
///
/// Only `accepted` relations with neither block flag set count as edges.
#[async_trait::async_trait]
pub trait FriendshipGraph: Send + Sync {
    /// Edges with both endpoints in `users`, each pair in canonical order
    async fn accepted_edges_among(&self, users: &BTreeSet<UserId>) -> EngineResult<Vec<(UserId, UserId)>>;
}

/// Per-user artist follows, fed by the listening-history sync
#[async_trait::async_trait]
pub trait ListeningHistory: Send + Sync {
    async fn follows(&self) -> EngineResult<HashMap<UserId, BTreeSet<ArtistId>>>;
}

/// Artist names and remembered catalog ids
#[async_trait::async_trait]
pub trait ArtistCatalog: Send + Sync {
    async fn artist_info(&self, artist: &ArtistId) -> EngineResult<Option<ArtistInfo>>;

    /// Remember which catalog attraction an artist resolved to
    async fn remember_attraction(&self, artist: &ArtistId, attraction_id: &str) -> EngineResult<()>;
}

/// Upstream concert listings
#[async_trait::async_trait]
pub trait EventCatalog: Send + Sync {
    async fn search_by_name(&self, name: &str) -> EngineResult<Vec<Attraction>>;

    /// Events for an attraction; `since` restricts to events on or after that date
    async fn events_for(&self, attraction_id: &str, since: Option<NaiveDate>) -> EngineResult<Vec<RawEvent>>;
}

/// Durable concert group state
///
/// At most one group exists per (artist, venue, date). Membership is
/// append-only.
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_group(
        &self,
        artist: &ArtistId,
        venue_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Option<ConcertGroup>>;

    /// Create the group and all member rows atomically
    ///
    /// Fails with `DuplicateGroup` when the business key is already taken and
    /// with `Contract` for fewer than two members.
    async fn create_group(
        &self,
        artist: &ArtistId,
        concert: &Concert,
        members: &BTreeSet<UserId>,
    ) -> EngineResult<GroupId>;

    async fn get_members(&self, group: GroupId) -> EngineResult<BTreeSet<UserId>>;

    /// Add members, ignoring ones already present; returns the users actually inserted
    async fn add_members(&self, group: GroupId, users: &BTreeSet<UserId>) -> EngineResult<BTreeSet<UserId>>;
}
