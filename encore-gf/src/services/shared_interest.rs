//! Shared-interest selection
//!
//! Finds the artists that at least two users follow; each becomes one unit of
//! orchestrator work.

use crate::error::EngineResult;
use crate::types::{ArtistCatalog, ListeningHistory, SharedArtist};
use encore_common::{ArtistId, UserId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Invert per-user follows into per-artist followers, keeping artists with
/// at least two distinct followers (ordered by artist id)
pub fn select_shared(follows: &HashMap<UserId, BTreeSet<ArtistId>>) -> BTreeMap<ArtistId, BTreeSet<UserId>> {
    let mut followers: BTreeMap<ArtistId, BTreeSet<UserId>> = BTreeMap::new();

    for (user, artists) in follows {
        for artist in artists {
            followers.entry(artist.clone()).or_default().insert(user.clone());
        }
    }

    followers.retain(|_, users| users.len() >= 2);
    followers
}

pub struct SharedInterestSelector {
    history: Arc<dyn ListeningHistory>,
    catalog: Arc<dyn ArtistCatalog>,
}

impl SharedInterestSelector {
    pub fn new(history: Arc<dyn ListeningHistory>, catalog: Arc<dyn ArtistCatalog>) -> Self {
        Self { history, catalog }
    }

    /// Artists with ≥2 followers, with names resolved from the catalog
    pub async fn shared_artists(&self) -> EngineResult<Vec<SharedArtist>> {
        let follows = self.history.follows().await?;
        let shared = select_shared(&follows);

        let mut artists = Vec::with_capacity(shared.len());
        for (artist_id, user_ids) in shared {
            match self.catalog.artist_info(&artist_id).await? {
                Some(info) if !info.name.trim().is_empty() => artists.push(SharedArtist {
                    artist_id,
                    artist_name: info.name,
                    attraction_id: info.attraction_id,
                    user_ids,
                }),
                _ => {
                    tracing::warn!(artist_id = %artist_id, "Shared artist has no catalog name, skipping");
                }
            }
        }

        tracing::debug!(users = follows.len(), shared_artists = artists.len(), "Shared artists selected");

        Ok(artists)
    }
}
