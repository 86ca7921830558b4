//! User directory database operations
//!
//! Rows are written by the identity sync; the engine only reads them. The
//! write helpers here cover what that sync does (upsert, location, delete).

use crate::db::{push_user_list, user_chunks};
use crate::error::EngineResult;
use crate::types::{GeoPoint, UserDirectory};
use encore_common::{Result, UserId};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashMap};

/// Insert a user or refresh their display name
pub async fn upsert_user(pool: &SqlitePool, user: &UserId, display_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, display_name, created_at, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user.as_str())
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set (or clear) a user's home coordinates
pub async fn set_location(pool: &SqlitePool, user: &UserId, location: Option<GeoPoint>) -> Result<()> {
    let result = sqlx::query(
        "UPDATE users SET latitude = ?, longitude = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(location.map(|l| l.latitude))
    .bind(location.map(|l| l.longitude))
    .bind(user.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(encore_common::Error::NotFound(format!("user {}", user)));
    }

    Ok(())
}

/// Remove a user; returns whether a row was deleted
pub async fn delete_user(pool: &SqlitePool, user: &UserId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// SQLite-backed [`UserDirectory`]
#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn exists(&self, user: &UserId) -> EngineResult<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn location_of(&self, user: &UserId) -> EngineResult<Option<GeoPoint>> {
        let row: Option<(Option<f64>, Option<f64>)> =
            sqlx::query_as("SELECT latitude, longitude FROM users WHERE id = ?")
                .bind(user.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((Some(lat), Some(lon))) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        })
    }

    async fn locations_of(&self, users: &BTreeSet<UserId>) -> EngineResult<HashMap<UserId, GeoPoint>> {
        let mut locations = HashMap::new();

        for chunk in user_chunks(users) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT id, latitude, longitude FROM users \
                 WHERE latitude IS NOT NULL AND longitude IS NOT NULL AND id IN ",
            );
            push_user_list(&mut builder, chunk);

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                let id: String = row.try_get("id")?;
                let latitude: f64 = row.try_get("latitude")?;
                let longitude: f64 = row.try_get("longitude")?;
                locations.insert(UserId::from(id), GeoPoint::new(latitude, longitude));
            }
        }

        Ok(locations)
    }

    async fn known_users(&self, users: &BTreeSet<UserId>) -> EngineResult<BTreeSet<UserId>> {
        let mut known = BTreeSet::new();

        for chunk in user_chunks(users) {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM users WHERE id IN ");
            push_user_list(&mut builder, chunk);

            let ids: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
            known.extend(ids.into_iter().map(UserId::from));
        }

        Ok(known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_common::db::init_memory_database;

    async fn setup() -> (SqlitePool, SqliteUserDirectory) {
        let pool = init_memory_database().await.unwrap();
        (pool.clone(), SqliteUserDirectory::new(pool))
    }

    #[tokio::test]
    async fn test_upsert_and_exists() {
        let (pool, directory) = setup().await;
        let user = UserId::from("user1");

        assert!(!directory.exists(&user).await.unwrap());

        upsert_user(&pool, &user, "User One").await.unwrap();
        upsert_user(&pool, &user, "Renamed").await.unwrap();

        assert!(directory.exists(&user).await.unwrap());
        let name: String = sqlx::query_scalar("SELECT display_name FROM users WHERE id = 'user1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Renamed");
    }

    #[tokio::test]
    async fn test_locations_skip_users_without_coordinates() {
        let (pool, directory) = setup().await;
        let located = UserId::from("located");
        let nowhere = UserId::from("nowhere");
        upsert_user(&pool, &located, "L").await.unwrap();
        upsert_user(&pool, &nowhere, "N").await.unwrap();
        set_location(&pool, &located, Some(GeoPoint::new(40.0, -74.0)))
            .await
            .unwrap();

        let users: BTreeSet<UserId> = [located.clone(), nowhere.clone(), UserId::from("ghost")]
            .into_iter()
            .collect();
        let locations = directory.locations_of(&users).await.unwrap();

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[&located], GeoPoint::new(40.0, -74.0));
        assert_eq!(directory.location_of(&nowhere).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_known_users_filters_missing() {
        let (pool, directory) = setup().await;
        upsert_user(&pool, &UserId::from("a"), "A").await.unwrap();

        let users: BTreeSet<UserId> = ["a", "b"].into_iter().map(UserId::from).collect();
        let known = directory.known_users(&users).await.unwrap();

        assert_eq!(known, [UserId::from("a")].into_iter().collect());
    }

    #[tokio::test]
    async fn test_set_location_unknown_user() {
        let (pool, _) = setup().await;
        let result = set_location(&pool, &UserId::from("ghost"), None).await;
        assert!(matches!(result, Err(encore_common::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (pool, directory) = setup().await;
        let user = UserId::from("gone");
        upsert_user(&pool, &user, "Gone").await.unwrap();

        assert!(delete_user(&pool, &user).await.unwrap());
        assert!(!delete_user(&pool, &user).await.unwrap());
        assert!(!directory.exists(&user).await.unwrap());
    }

    /// Insert `count` located users `u00000`, `u00001`, ... in one statement
    async fn seed_many(pool: &SqlitePool, count: usize) {
        sqlx::query(
            "WITH RECURSIVE seq(n) AS (SELECT 0 UNION ALL SELECT n + 1 FROM seq WHERE n + 1 < ?) \
             INSERT INTO users (id, display_name, latitude, longitude) \
             SELECT printf('u%05d', n), '', 40.0, -74.0 FROM seq",
        )
        .bind(count as i64)
        .execute(pool)
        .await
        .unwrap();
    }

    fn many_ids(count: usize) -> BTreeSet<UserId> {
        (0..count).map(|n| UserId::from(format!("u{:05}", n))).collect()
    }

    #[tokio::test]
    async fn test_lookups_beyond_sqlite_parameter_limit() {
        let (pool, directory) = setup().await;
        seed_many(&pool, 40_000).await;

        let mut users = many_ids(40_000);
        users.insert(UserId::from("ghost"));

        let locations = directory.locations_of(&users).await.unwrap();
        assert_eq!(locations.len(), 40_000);
        assert_eq!(locations[&UserId::from("u39999")], GeoPoint::new(40.0, -74.0));

        let known = directory.known_users(&users).await.unwrap();
        assert_eq!(known.len(), 40_000);
        assert!(!known.contains(&UserId::from("ghost")));
    }
}
