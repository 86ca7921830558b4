//! Concert group database operations
//!
//! The `(artist_id, venue_id, concert_date)` unique constraint is the only
//! arbiter between concurrent creators; a losing insert surfaces as
//! [`EngineError::DuplicateGroup`] and the caller merges into the winner.

use crate::error::{EngineError, EngineResult};
use crate::types::{Concert, ConcertGroup, GeoPoint, GroupStore};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use chrono::{NaiveDate, NaiveTime};
use encore_common::{ArtistId, Error, GroupId, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const GROUP_COLUMNS: &str = "id, artist_id, venue_id, venue_name, venue_city, venue_state, venue_country, \
     venue_latitude, venue_longitude, concert_date, concert_time, ticket_url";

const GROUP_COLUMNS_G: &str = "g.id, g.artist_id, g.venue_id, g.venue_name, g.venue_city, g.venue_state, \
     g.venue_country, g.venue_latitude, g.venue_longitude, g.concert_date, g.concert_time, g.ticket_url";

/// SQLite-backed [`GroupStore`]
#[derive(Clone)]
pub struct SqliteGroupStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteGroupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Groups the user belongs to, soonest concert first
    pub async fn list_groups_for_user(&self, user: &UserId) -> EngineResult<Vec<ConcertGroup>> {
        let sql = format!(
            "SELECT {} FROM concert_groups g \
             JOIN concert_group_members m ON m.group_id = g.id \
             WHERE m.user_id = ? ORDER BY g.concert_date, g.id",
            GROUP_COLUMNS_G
        );

        let rows = sqlx::query(&sql).bind(user.as_str()).fetch_all(&self.pool).await?;
        rows.iter().map(group_from_row).collect()
    }

    pub async fn group_count(&self) -> EngineResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concert_groups")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_group(
        &self,
        artist: &ArtistId,
        concert: &Concert,
        members: &BTreeSet<UserId>,
    ) -> EngineResult<GroupId> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO concert_groups (
                artist_id, venue_id, venue_name, venue_city, venue_state, venue_country,
                venue_latitude, venue_longitude, concert_date, concert_time, ticket_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artist.as_str())
        .bind(&concert.venue_id)
        .bind(&concert.venue_name)
        .bind(&concert.venue_city)
        .bind(&concert.venue_state)
        .bind(&concert.venue_country)
        .bind(concert.venue_location.latitude)
        .bind(concert.venue_location.longitude)
        .bind(concert.date.format(DATE_FORMAT).to_string())
        .bind(concert.time.map(|t| t.format(TIME_FORMAT).to_string()))
        .bind(&concert.ticket_url)
        .execute(&mut *tx)
        .await;

        let group_id = match inserted {
            Ok(result) => GroupId(result.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                return Err(EngineError::DuplicateGroup {
                    artist_id: artist.clone(),
                    venue_id: concert.venue_id.clone(),
                    date: concert.date,
                })
            }
            Err(e) => return Err(e.into()),
        };

        for user in members {
            sqlx::query("INSERT INTO concert_group_members (group_id, user_id) VALUES (?, ?)")
                .bind(group_id.0)
                .bind(user.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(group_id)
    }

    async fn insert_members(&self, group: GroupId, users: &BTreeSet<UserId>) -> EngineResult<BTreeSet<UserId>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM concert_groups WHERE id = ?)")
            .bind(group.0)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("concert group {}", group)).into());
        }

        let mut added = BTreeSet::new();
        for user in users {
            let result =
                sqlx::query("INSERT OR IGNORE INTO concert_group_members (group_id, user_id) VALUES (?, ?)")
                    .bind(group.0)
                    .bind(user.as_str())
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() > 0 {
                added.insert(user.clone());
            }
        }

        if !added.is_empty() {
            sqlx::query("UPDATE concert_groups SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(group.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(added)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

fn group_from_row(row: &SqliteRow) -> EngineResult<ConcertGroup> {
    let date: String = row.try_get("concert_date")?;
    let concert_date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| Error::Internal(format!("Bad concert_date '{}': {}", date, e)))?;

    let time: Option<String> = row.try_get("concert_time")?;
    let concert_time = match time {
        Some(t) => Some(
            NaiveTime::parse_from_str(&t, TIME_FORMAT)
                .map_err(|e| Error::Internal(format!("Bad concert_time '{}': {}", t, e)))?,
        ),
        None => None,
    };

    let latitude: Option<f64> = row.try_get("venue_latitude")?;
    let longitude: Option<f64> = row.try_get("venue_longitude")?;

    Ok(ConcertGroup {
        id: GroupId(row.try_get("id")?),
        artist_id: ArtistId::new(row.try_get::<String, _>("artist_id")?),
        venue_id: row.try_get("venue_id")?,
        venue_name: row.try_get("venue_name")?,
        venue_city: row.try_get("venue_city")?,
        venue_state: row.try_get("venue_state")?,
        venue_country: row.try_get("venue_country")?,
        venue_location: match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        },
        concert_date,
        concert_time,
        ticket_url: row.try_get("ticket_url")?,
    })
}

#[async_trait::async_trait]
impl GroupStore for SqliteGroupStore {
    async fn find_group(
        &self,
        artist: &ArtistId,
        venue_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Option<ConcertGroup>> {
        let sql = format!(
            "SELECT {} FROM concert_groups WHERE artist_id = ? AND venue_id = ? AND concert_date = ?",
            GROUP_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(artist.as_str())
            .bind(venue_id)
            .bind(date.format(DATE_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    async fn create_group(
        &self,
        artist: &ArtistId,
        concert: &Concert,
        members: &BTreeSet<UserId>,
    ) -> EngineResult<GroupId> {
        if members.len() < 2 {
            return Err(EngineError::Contract(format!(
                "Concert group for artist {} at venue {} needs at least two members, got {}",
                artist,
                concert.venue_id,
                members.len()
            )));
        }

        let group_id = retry_on_lock("create_group", self.max_lock_wait_ms, || {
            self.insert_group(artist, concert, members)
        })
        .await?;

        tracing::info!(
            group_id = %group_id,
            artist_id = %artist,
            venue_id = %concert.venue_id,
            date = %concert.date,
            members = members.len(),
            "Concert group created"
        );

        Ok(group_id)
    }

    async fn get_members(&self, group: GroupId) -> EngineResult<BTreeSet<UserId>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM concert_group_members WHERE group_id = ? ORDER BY user_id")
                .bind(group.0)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(UserId::from).collect())
    }

    async fn add_members(&self, group: GroupId, users: &BTreeSet<UserId>) -> EngineResult<BTreeSet<UserId>> {
        if users.is_empty() {
            return Ok(BTreeSet::new());
        }

        retry_on_lock("add_members", self.max_lock_wait_ms, || self.insert_members(group, users)).await
    }
}
