//! Formation orchestrator
//!
//! One pass of the daily job:
//! shared artists → upcoming concerts → nearby followers → friendship
//! clusters → create or merge groups.
//!
//! Artists are processed one at a time with a pacing delay between them. A
//! failure while processing one artist is logged and counted, and the pass
//! moves on. The stop token is honored between artists; an artist already
//! started is finished.

use crate::db::runs::save_run;
use crate::db::{SqliteFriendshipGraph, SqliteGroupStore, SqliteListeningHistory, SqliteUserDirectory};
use crate::error::EngineResult;
use crate::models::{RunReport, RunState, RunStats};
use crate::services::event_fetcher::EventFetcher;
use crate::services::friendship_clusterer::cluster;
use crate::services::geo_filter::{GeoFilter, DEFAULT_RADIUS_MILES};
use crate::services::merge_resolver::{MergeOutcome, MergeResolver};
use crate::services::shared_interest::SharedInterestSelector;
use crate::types::{
    ArtistCatalog, EventCatalog, FriendshipGraph, GroupStore, ListeningHistory, SharedArtist, UserDirectory,
};
use encore_common::config::FormationConfig;
use encore_common::UserId;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Tunables for one orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub radius_miles: f64,
    /// Pause between consecutive artists
    pub artist_delay: Duration,
    /// Bound on each event catalog call
    pub request_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            radius_miles: DEFAULT_RADIUS_MILES,
            artist_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&FormationConfig> for OrchestratorSettings {
    fn from(config: &FormationConfig) -> Self {
        Self {
            radius_miles: config.radius_miles,
            artist_delay: Duration::from_millis(config.artist_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Collaborators the engine runs against
#[derive(Clone)]
pub struct EngineParts {
    pub directory: Arc<dyn UserDirectory>,
    pub graph: Arc<dyn FriendshipGraph>,
    pub history: Arc<dyn ListeningHistory>,
    pub artists: Arc<dyn ArtistCatalog>,
    pub events: Arc<dyn EventCatalog>,
    pub store: Arc<dyn GroupStore>,
}

impl EngineParts {
    /// SQLite-backed collaborators over one pool, plus an event catalog
    pub fn sqlite(pool: SqlitePool, events: Arc<dyn EventCatalog>) -> Self {
        let listening = Arc::new(SqliteListeningHistory::new(pool.clone()));
        Self {
            directory: Arc::new(SqliteUserDirectory::new(pool.clone())),
            graph: Arc::new(SqliteFriendshipGraph::new(pool.clone())),
            history: listening.clone(),
            artists: listening,
            events,
            store: Arc::new(SqliteGroupStore::new(pool)),
        }
    }
}

pub struct FormationOrchestrator {
    selector: SharedInterestSelector,
    fetcher: EventFetcher,
    geo: GeoFilter,
    resolver: MergeResolver,
    graph: Arc<dyn FriendshipGraph>,
    artists: Arc<dyn ArtistCatalog>,
    settings: OrchestratorSettings,
    run_log: Option<SqlitePool>,
}

impl FormationOrchestrator {
    pub fn new(parts: EngineParts, settings: OrchestratorSettings) -> Self {
        Self {
            selector: SharedInterestSelector::new(parts.history, parts.artists.clone()),
            fetcher: EventFetcher::new(parts.events).with_timeout(settings.request_timeout),
            geo: GeoFilter::new(parts.directory.clone()),
            resolver: MergeResolver::new(parts.store, parts.graph.clone(), parts.directory),
            graph: parts.graph,
            artists: parts.artists,
            settings,
            run_log: None,
        }
    }

    /// Orchestrator over the SQLite collaborators, recording runs in the same database
    pub fn from_pool(pool: SqlitePool, events: Arc<dyn EventCatalog>, settings: OrchestratorSettings) -> Self {
        Self::new(EngineParts::sqlite(pool.clone(), events), settings).with_run_log(pool)
    }

    /// Persist a `formation_runs` row at start and end of each run
    pub fn with_run_log(mut self, pool: SqlitePool) -> Self {
        self.run_log = Some(pool);
        self
    }

    /// Execute one formation pass
    pub async fn run(&self, stop: &CancellationToken) -> RunReport {
        let mut report = RunReport::start();
        let span = info_span!("formation_run", run_id = %report.run_id);

        async {
            info!(
                radius_miles = self.settings.radius_miles,
                artist_delay_ms = self.settings.artist_delay.as_millis() as u64,
                "Formation run started"
            );
            self.record(&report).await;

            let state = self.run_artists(stop, &mut report).await;

            report.finish(state);
            self.record(&report).await;

            let stats = &report.stats;
            info!(
                state = state.as_str(),
                duration_ms = report.duration_ms().unwrap_or_default(),
                artists_total = stats.artists_total,
                artists_processed = stats.artists_processed,
                artists_failed = stats.artists_failed,
                groups_created = stats.groups_created,
                groups_extended = stats.groups_extended,
                members_added = stats.members_added,
                "Formation run finished"
            );
        }
        .instrument(span)
        .await;

        report
    }

    async fn run_artists(&self, stop: &CancellationToken, report: &mut RunReport) -> RunState {
        if stop.is_cancelled() {
            info!("Stop requested before run began");
            return RunState::Stopped;
        }

        let artists = match self.selector.shared_artists().await {
            Ok(artists) => artists,
            Err(e) => {
                error!(error = %e, "Failed to load shared artists, aborting run");
                return RunState::Failed;
            }
        };
        report.stats.artists_total = artists.len();
        info!(artists = artists.len(), "Shared artists loaded");

        for (index, artist) in artists.iter().enumerate() {
            if stop.is_cancelled() {
                info!(remaining = artists.len() - index, "Stop requested, ending run");
                return RunState::Stopped;
            }

            if index > 0 && !self.settings.artist_delay.is_zero() {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!(remaining = artists.len() - index, "Stop requested during pacing delay, ending run");
                        return RunState::Stopped;
                    }
                    _ = tokio::time::sleep(self.settings.artist_delay) => {}
                }
            }

            let span = info_span!(
                "artist",
                artist_id = %artist.artist_id,
                artist_name = %artist.artist_name
            );
            let result = self
                .process_artist(artist, &mut report.stats)
                .instrument(span)
                .await;

            report.stats.artists_processed += 1;

            if let Err(e) = result {
                report.stats.artists_failed += 1;
                if e.is_contract_violation() {
                    error!(
                        artist_id = %artist.artist_id,
                        artist_name = %artist.artist_name,
                        error = %e,
                        "Contract violation while processing artist"
                    );
                } else {
                    warn!(
                        artist_id = %artist.artist_id,
                        artist_name = %artist.artist_name,
                        error = %e,
                        "Artist processing failed, continuing with next artist"
                    );
                }
            }
        }

        RunState::Completed
    }

    /// Form or grow groups for every upcoming concert of one artist
    pub async fn process_artist(&self, artist: &SharedArtist, stats: &mut RunStats) -> EngineResult<()> {
        let fetched = self
            .fetcher
            .fetch(&artist.artist_name, artist.attraction_id.as_deref())
            .await;

        if artist.attraction_id.is_none() {
            if let Some(attraction_id) = &fetched.attraction_id {
                if let Err(e) = self.artists.remember_attraction(&artist.artist_id, attraction_id).await {
                    warn!(error = %e, "Failed to remember attraction id");
                }
            }
        }

        stats.events_seen += fetched.concerts.len();

        for concert in &fetched.concerts {
            let nearby = self
                .geo
                .nearby(concert.venue_location, self.settings.radius_miles, &artist.user_ids)
                .await?;
            if nearby.len() < 2 {
                continue;
            }
            stats.events_with_candidates += 1;

            let candidates: BTreeSet<UserId> = nearby.into_iter().map(|n| n.user_id).collect();
            let edges = self.graph.accepted_edges_among(&candidates).await?;
            let clusters = cluster(&candidates, &edges);
            stats.clusters_found += clusters.len();

            for members in &clusters {
                match self.resolver.resolve(&artist.artist_id, concert, members).await? {
                    MergeOutcome::Created { group_id, members } => {
                        stats.groups_created += 1;
                        info!(
                            group_id = %group_id,
                            venue_id = %concert.venue_id,
                            date = %concert.date,
                            members = members.len(),
                            "Group formed"
                        );
                    }
                    MergeOutcome::Extended { added, .. } => {
                        stats.groups_extended += 1;
                        stats.members_added += added.len();
                    }
                    MergeOutcome::Unchanged { .. } => stats.groups_unchanged += 1,
                    MergeOutcome::Skipped { reason } => {
                        stats.clusters_skipped += 1;
                        warn!(venue_id = %concert.venue_id, date = %concert.date, reason = %reason, "Cluster skipped");
                    }
                }
            }
        }

        Ok(())
    }

    async fn record(&self, report: &RunReport) {
        if let Some(pool) = &self.run_log {
            if let Err(e) = save_run(pool, report).await {
                warn!(error = %e, "Failed to record formation run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = FormationConfig {
            radius_miles: 25.0,
            artist_delay_ms: 0,
            request_timeout_secs: 3,
        };

        let settings = OrchestratorSettings::from(&config);

        assert_eq!(settings.radius_miles, 25.0);
        assert!(settings.artist_delay.is_zero());
        assert_eq!(settings.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_default_settings() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.radius_miles, 50.0);
        assert_eq!(settings.artist_delay, Duration::from_millis(1000));
    }
}
