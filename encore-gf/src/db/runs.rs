//! Formation run database operations

use crate::models::{RunReport, RunState, RunStats};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use chrono::{DateTime, Utc};
use encore_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert or update a run record
pub async fn save_run(pool: &SqlitePool, report: &RunReport) -> Result<()> {
    // Prepare all data before touching the database
    let run_id = report.run_id.to_string();
    let state = report.state.as_str();
    let started_at = report.started_at.to_rfc3339();
    let ended_at = report.ended_at.map(|dt| dt.to_rfc3339());
    let stats = serde_json::to_string(&report.stats)
        .map_err(|e| Error::Internal(format!("Failed to serialize run stats: {}", e)))?;

    retry_on_lock("save_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO formation_runs (run_id, state, started_at, ended_at, stats)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                ended_at = excluded.ended_at,
                stats = excluded.stats
            "#,
        )
        .bind(&run_id)
        .bind(state)
        .bind(&started_at)
        .bind(&ended_at)
        .bind(&stats)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
    .map_err(|e| match e {
        crate::error::EngineError::Common(inner) => inner,
        crate::error::EngineError::Store(db_err) => Error::Database(db_err),
        other => Error::Internal(other.to_string()),
    })
}

/// Load a run record
pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<RunReport>> {
    let row = sqlx::query("SELECT run_id, state, started_at, ended_at, stats FROM formation_runs WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.get("state");
    let state = match state.as_str() {
        "completed" => RunState::Completed,
        "stopped" => RunState::Stopped,
        "failed" => RunState::Failed,
        other => return Err(Error::Internal(format!("Unknown run state '{}'", other))),
    };

    let stats: String = row.get("stats");
    let stats: RunStats = serde_json::from_str(&stats)
        .map_err(|e| Error::Internal(format!("Failed to deserialize run stats: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = parse_timestamp(&started_at)?;

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at.as_deref().map(parse_timestamp).transpose()?;

    Ok(Some(RunReport {
        run_id,
        state,
        started_at,
        ended_at,
        stats,
    }))
}

/// Most recent runs, newest first
pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunReport>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT run_id FROM formation_runs ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?;

    let mut runs = Vec::with_capacity(ids.len());
    for id in ids {
        let run_id = Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Bad run id '{}': {}", id, e)))?;
        if let Some(run) = load_run(pool, run_id).await? {
            runs.push(run);
        }
    }

    Ok(runs)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}
