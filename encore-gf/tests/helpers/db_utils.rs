//! Database Test Utilities
//!
//! Temp-file databases and seeding helpers for the Encore schema

use chrono::Utc;
use encore_common::{ArtistId, UserId};
use encore_gf::db::listening::{follow_artist, upsert_artist};
use encore_gf::db::relations::{respond_to_request, send_friend_request, RelationStatus};
use encore_gf::db::users::{set_location, upsert_user};
use encore_gf::types::GeoPoint;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tempfile::TempDir;

/// Create temporary test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> anyhow::Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_encore.db");

    let pool = encore_common::db::init_database(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Insert a user with home coordinates
pub async fn seed_user(pool: &SqlitePool, id: &str, latitude: f64, longitude: f64) {
    let user = UserId::from(id);
    upsert_user(pool, &user, id).await.unwrap();
    set_location(pool, &user, Some(GeoPoint::new(latitude, longitude)))
        .await
        .unwrap();
}

pub async fn seed_artist(pool: &SqlitePool, id: &str, name: &str) {
    upsert_artist(pool, &ArtistId::from(id), name, &[]).await.unwrap();
}

pub async fn follow(pool: &SqlitePool, user: &str, artist: &str) {
    follow_artist(pool, &UserId::from(user), &ArtistId::from(artist))
        .await
        .unwrap();
}

/// Request and accept a friendship between `a` and `b`
pub async fn befriend(pool: &SqlitePool, a: &str, b: &str) {
    send_friend_request(pool, &UserId::from(a), &UserId::from(b))
        .await
        .unwrap();
    respond_to_request(pool, &UserId::from(b), &UserId::from(a), RelationStatus::Accepted)
        .await
        .unwrap();
}

pub fn set_of(users: &[&str]) -> BTreeSet<UserId> {
    users.iter().map(|u| UserId::from(*u)).collect()
}

pub fn ids(users: &BTreeSet<UserId>) -> Vec<&str> {
    users.iter().map(|u| u.as_str()).collect()
}

/// Members of the only group for `artist`, sorted
pub async fn member_ids(pool: &SqlitePool, artist: &str) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT m.user_id FROM concert_group_members m
         JOIN concert_groups g ON g.id = m.group_id
         WHERE g.artist_id = ?
         ORDER BY m.user_id",
    )
    .bind(artist)
    .fetch_all(pool)
    .await
    .unwrap()
}

/// `YYYY-MM-DD` for today plus `days`
pub fn days_from_today(days: i64) -> String {
    (Utc::now().date_naive() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
