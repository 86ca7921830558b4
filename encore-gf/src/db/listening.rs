//! Listening history database operations
//!
//! A user "follows" an artist if they follow it directly (`user_artists`) or
//! it appears in any of their top-artist rankings (`user_top_artists`).

use crate::error::EngineResult;
use crate::types::{ArtistCatalog, ArtistInfo, ListeningHistory};
use encore_common::{ArtistId, Error, Result, UserId};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};

/// Top-artist ranking window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl Term {
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::ShortTerm => "short_term",
            Term::MediumTerm => "medium_term",
            Term::LongTerm => "long_term",
        }
    }
}

/// Insert or update an artist; at most two genres are kept
pub async fn upsert_artist(pool: &SqlitePool, artist: &ArtistId, name: &str, genres: &[&str]) -> Result<()> {
    if artist.as_str().is_empty() {
        return Err(Error::InvalidInput("Artist id must not be empty".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO artists (spotify_id, name, genre1, genre2)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(spotify_id) DO UPDATE SET
            name = excluded.name,
            genre1 = excluded.genre1,
            genre2 = excluded.genre2,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(artist.as_str())
    .bind(name)
    .bind(genres.first().copied())
    .bind(genres.get(1).copied())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record that a user follows an artist (no-op if already followed)
pub async fn follow_artist(pool: &SqlitePool, user: &UserId, artist: &ArtistId) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_artists (user_id, artist_id) VALUES (?, ?)")
        .bind(user.as_str())
        .bind(artist.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

/// Stop following an artist directly
pub async fn unfollow_artist(pool: &SqlitePool, user: &UserId, artist: &ArtistId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM user_artists WHERE user_id = ? AND artist_id = ?")
        .bind(user.as_str())
        .bind(artist.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace a user's ranking for one term; `artists[0]` is rank 1
pub async fn set_top_artists(pool: &SqlitePool, user: &UserId, term: Term, artists: &[ArtistId]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_top_artists WHERE user_id = ? AND term = ?")
        .bind(user.as_str())
        .bind(term.as_str())
        .execute(&mut *tx)
        .await?;

    for (index, artist) in artists.iter().enumerate() {
        sqlx::query("INSERT INTO user_top_artists (user_id, rank, term, artist_id) VALUES (?, ?, ?, ?)")
            .bind(user.as_str())
            .bind(index as i64 + 1)
            .bind(term.as_str())
            .bind(artist.as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::debug!(user = %user, term = term.as_str(), count = artists.len(), "Top artists replaced");

    Ok(())
}

/// SQLite-backed [`ListeningHistory`] and [`ArtistCatalog`]
#[derive(Clone)]
pub struct SqliteListeningHistory {
    pool: SqlitePool,
}

impl SqliteListeningHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ListeningHistory for SqliteListeningHistory {
    async fn follows(&self) -> EngineResult<HashMap<UserId, BTreeSet<ArtistId>>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT user_id, artist_id FROM user_artists
            UNION
            SELECT user_id, artist_id FROM user_top_artists
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut follows: HashMap<UserId, BTreeSet<ArtistId>> = HashMap::new();
        for (user, artist) in rows {
            follows
                .entry(UserId::from(user))
                .or_default()
                .insert(ArtistId::new(artist));
        }

        Ok(follows)
    }
}

#[async_trait::async_trait]
impl ArtistCatalog for SqliteListeningHistory {
    async fn artist_info(&self, artist: &ArtistId) -> EngineResult<Option<ArtistInfo>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT name, ticketmaster_id FROM artists WHERE spotify_id = ?")
                .bind(artist.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(name, attraction_id)| ArtistInfo {
            artist_id: artist.clone(),
            name,
            attraction_id,
        }))
    }

    async fn remember_attraction(&self, artist: &ArtistId, attraction_id: &str) -> EngineResult<()> {
        // Another artist may already claim this attraction id; keep the first
        let result = sqlx::query(
            r#"
            UPDATE artists SET ticketmaster_id = ?, updated_at = CURRENT_TIMESTAMP
            WHERE spotify_id = ?
              AND NOT EXISTS (SELECT 1 FROM artists WHERE ticketmaster_id = ? AND spotify_id != ?)
            "#,
        )
        .bind(attraction_id)
        .bind(artist.as_str())
        .bind(attraction_id)
        .bind(artist.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                artist_id = %artist,
                attraction_id,
                "Attraction id not remembered (unknown artist or id already claimed)"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::upsert_user;
    use encore_common::db::init_memory_database;

    async fn setup() -> (SqlitePool, SqliteListeningHistory) {
        let pool = init_memory_database().await.unwrap();
        for id in ["u1", "u2"] {
            upsert_user(&pool, &UserId::from(id), id).await.unwrap();
        }
        for (id, name) in [("a1", "Artist One"), ("a2", "Artist Two"), ("a3", "Artist Three")] {
            upsert_artist(&pool, &ArtistId::from(id), name, &["rock"]).await.unwrap();
        }
        (pool.clone(), SqliteListeningHistory::new(pool))
    }

    #[tokio::test]
    async fn test_follows_unions_direct_and_top_artists() {
        let (pool, history) = setup().await;
        let u1 = UserId::from("u1");
        follow_artist(&pool, &u1, &ArtistId::from("a1")).await.unwrap();
        set_top_artists(&pool, &u1, Term::ShortTerm, &[ArtistId::from("a1"), ArtistId::from("a2")])
            .await
            .unwrap();

        let follows = history.follows().await.unwrap();

        let expected: BTreeSet<ArtistId> = ["a1", "a2"].into_iter().map(ArtistId::from).collect();
        assert_eq!(follows[&u1], expected);
        assert!(!follows.contains_key(&UserId::from("u2")));
    }

    #[tokio::test]
    async fn test_set_top_artists_replaces_term() {
        let (pool, history) = setup().await;
        let u2 = UserId::from("u2");
        set_top_artists(&pool, &u2, Term::LongTerm, &[ArtistId::from("a1")]).await.unwrap();
        set_top_artists(&pool, &u2, Term::LongTerm, &[ArtistId::from("a3")]).await.unwrap();

        let follows = history.follows().await.unwrap();
        assert_eq!(follows[&u2], [ArtistId::from("a3")].into_iter().collect());
    }

    #[tokio::test]
    async fn test_unknown_artist_in_ranking_rolls_back() {
        let (pool, history) = setup().await;
        let u1 = UserId::from("u1");
        set_top_artists(&pool, &u1, Term::MediumTerm, &[ArtistId::from("a1")]).await.unwrap();

        let result = set_top_artists(
            &pool,
            &u1,
            Term::MediumTerm,
            &[ArtistId::from("a2"), ArtistId::from("missing")],
        )
        .await;
        assert!(result.is_err());

        let follows = history.follows().await.unwrap();
        assert_eq!(follows[&u1], [ArtistId::from("a1")].into_iter().collect());
    }

    #[tokio::test]
    async fn test_artist_info_and_remember_attraction() {
        let (_pool, history) = setup().await;
        let a1 = ArtistId::from("a1");

        let info = history.artist_info(&a1).await.unwrap().unwrap();
        assert_eq!(info.name, "Artist One");
        assert_eq!(info.attraction_id, None);

        history.remember_attraction(&a1, "K8vZ917G").await.unwrap();
        let info = history.artist_info(&a1).await.unwrap().unwrap();
        assert_eq!(info.attraction_id.as_deref(), Some("K8vZ917G"));

        assert!(history.artist_info(&ArtistId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attraction_id_claimed_once() {
        let (_pool, history) = setup().await;
        history.remember_attraction(&ArtistId::from("a1"), "K1").await.unwrap();
        history.remember_attraction(&ArtistId::from("a2"), "K1").await.unwrap();

        let a2 = history.artist_info(&ArtistId::from("a2")).await.unwrap().unwrap();
        assert_eq!(a2.attraction_id, None);
    }

    #[tokio::test]
    async fn test_unfollow_artist() {
        let (pool, history) = setup().await;
        let u1 = UserId::from("u1");
        follow_artist(&pool, &u1, &ArtistId::from("a1")).await.unwrap();

        assert!(unfollow_artist(&pool, &u1, &ArtistId::from("a1")).await.unwrap());
        assert!(history.follows().await.unwrap().is_empty());
    }
}
