//! Formation run record
//!
//! One [`RunReport`] per orchestrator invocation, persisted to
//! `formation_runs` with the counters serialized as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final state of a formation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Every shared artist was visited
    Completed,
    /// Stop signal observed before the last artist
    Stopped,
    /// Run aborted before iterating artists (listening history unavailable)
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Completed => "completed",
            RunState::Stopped => "stopped",
            RunState::Failed => "failed",
        }
    }
}

/// Counters accumulated across one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Artists followed by at least two users
    pub artists_total: usize,
    /// Artists attempted, including failed ones
    pub artists_processed: usize,
    pub artists_failed: usize,
    /// Normalized upcoming concerts returned by the event fetcher
    pub events_seen: usize,
    /// Concerts with at least two followers inside the radius
    pub events_with_candidates: usize,
    pub clusters_found: usize,
    pub groups_created: usize,
    pub groups_extended: usize,
    pub groups_unchanged: usize,
    pub clusters_skipped: usize,
    /// Users added to existing groups
    pub members_added: usize,
}

/// Outcome of one orchestrator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Completed,
            started_at: Utc::now(),
            ended_at: None,
            stats: RunStats::default(),
        }
    }

    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunState::Stopped).unwrap(), "\"stopped\"");
        assert_eq!(RunState::Completed.as_str(), "completed");
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut report = RunReport::start();
        assert!(report.duration_ms().is_none());

        report.finish(RunState::Stopped);

        assert_eq!(report.state, RunState::Stopped);
        assert!(report.duration_ms().unwrap() >= 0);
    }
}
