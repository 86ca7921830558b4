//! Error types for encore-gf
//!
//! Failures fall into four groups: store errors, upstream (catalog or
//! listening-history) failures, business-key races that the merge resolver
//! recovers from, and contract violations that must surface.

use chrono::NaiveDate;
use encore_common::ArtistId;
use thiserror::Error;

/// Group formation engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database failure
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    /// Another writer created the group for this business key first
    #[error("Concert group already exists for artist {artist_id}, venue {venue_id}, date {date}")]
    DuplicateGroup {
        artist_id: ArtistId,
        venue_id: String,
        date: NaiveDate,
    },

    /// Caller broke an invariant (e.g. a group with fewer than two members)
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Event catalog or listening-history failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// External call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// encore-common error
    #[error(transparent)]
    Common(#[from] encore_common::Error),
}

impl EngineError {
    /// Contract violations indicate a bug upstream and are logged at error level
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, EngineError::Contract(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
