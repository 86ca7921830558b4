//! Friendship relation database operations
//!
//! One row per unordered user pair, lower id first (`canonical_pair`). Every
//! query below orders its arguments the same way the writes do.

use crate::db::{push_user_list, user_chunks};
use crate::error::EngineResult;
use crate::types::FriendshipGraph;
use encore_common::{canonical_pair, Error, Result, UserId};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use std::fmt;

/// Relation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Pending,
    Accepted,
    Declined,
}

impl RelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationStatus::Pending => "pending",
            RelationStatus::Accepted => "accepted",
            RelationStatus::Declined => "declined",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(RelationStatus::Pending),
            "accepted" => Ok(RelationStatus::Accepted),
            "declined" => Ok(RelationStatus::Declined),
            other => Err(Error::Internal(format!("Unknown relation status '{}'", other))),
        }
    }
}

impl fmt::Display for RelationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored relation row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: RelationStatus,
    pub initiated_by: Option<UserId>,
    pub user1_blocked_user2: bool,
    pub user2_blocked_user1: bool,
}

impl Relation {
    pub fn is_blocked(&self) -> bool {
        self.user1_blocked_user2 || self.user2_blocked_user1
    }

    /// Counts as a clustering edge
    pub fn is_connected(&self) -> bool {
        self.status == RelationStatus::Accepted && !self.is_blocked()
    }
}

fn require_distinct(a: &UserId, b: &UserId) -> Result<()> {
    if a.as_str().is_empty() || b.as_str().is_empty() || a == b {
        return Err(Error::InvalidInput(
            "Relation requires two distinct, non-empty user ids".to_string(),
        ));
    }
    Ok(())
}

async fn require_user(pool: &SqlitePool, user: &UserId) -> Result<()> {
    let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(user.as_str())
        .fetch_one(pool)
        .await?;
    if !found {
        return Err(Error::NotFound(format!("user {}", user)));
    }
    Ok(())
}

/// Load the relation between two users, in either argument order
pub async fn load_relation(pool: &SqlitePool, a: &UserId, b: &UserId) -> Result<Option<Relation>> {
    let (lower, higher) = canonical_pair(a, b);

    let row = sqlx::query(
        r#"
        SELECT user1_id, user2_id, status, initiated_by, user1_blocked_user2, user2_blocked_user1
        FROM user_relations
        WHERE user1_id = ? AND user2_id = ?
        "#,
    )
    .bind(lower.as_str())
    .bind(higher.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let status: String = row.get("status");
            let initiated_by: Option<String> = row.get("initiated_by");
            Ok(Some(Relation {
                user1_id: UserId::from(row.get::<String, _>("user1_id")),
                user2_id: UserId::from(row.get::<String, _>("user2_id")),
                status: RelationStatus::parse(&status)?,
                initiated_by: initiated_by.map(UserId::from),
                user1_blocked_user2: row.get("user1_blocked_user2"),
                user2_blocked_user1: row.get("user2_blocked_user1"),
            }))
        }
        None => Ok(None),
    }
}

/// Open a pending request from `sender` to `receiver`
///
/// A previously declined, unblocked pair may be re-requested.
pub async fn send_friend_request(pool: &SqlitePool, sender: &UserId, receiver: &UserId) -> Result<()> {
    require_distinct(sender, receiver)?;
    require_user(pool, receiver).await?;

    if let Some(existing) = load_relation(pool, sender, receiver).await? {
        if existing.is_blocked() {
            return Err(Error::InvalidInput("One user has blocked the other".to_string()));
        }
        if existing.status != RelationStatus::Declined {
            return Err(Error::InvalidInput(
                "Friend request already exists or was already accepted".to_string(),
            ));
        }
    }

    let (lower, higher) = canonical_pair(sender, receiver);
    sqlx::query(
        r#"
        INSERT INTO user_relations (user1_id, user2_id, status, initiated_by)
        VALUES (?, ?, 'pending', ?)
        ON CONFLICT(user1_id, user2_id) DO UPDATE SET
            status = 'pending',
            initiated_by = excluded.initiated_by,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(lower.as_str())
    .bind(higher.as_str())
    .bind(sender.as_str())
    .execute(pool)
    .await?;

    tracing::debug!(sender = %sender, receiver = %receiver, "Friend request sent");

    Ok(())
}

/// Accept or decline a pending request
pub async fn respond_to_request(
    pool: &SqlitePool,
    responder: &UserId,
    requester: &UserId,
    status: RelationStatus,
) -> Result<()> {
    require_distinct(responder, requester)?;
    if status == RelationStatus::Pending {
        return Err(Error::InvalidInput("A response must accept or decline".to_string()));
    }

    match load_relation(pool, responder, requester).await? {
        Some(rel) if rel.status == RelationStatus::Pending => {}
        _ => {
            return Err(Error::NotFound(
                "Friend request not found or is invalid for alteration".to_string(),
            ))
        }
    }

    let (lower, higher) = canonical_pair(responder, requester);
    sqlx::query(
        "UPDATE user_relations SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE user1_id = ? AND user2_id = ?",
    )
    .bind(status.as_str())
    .bind(lower.as_str())
    .bind(higher.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Block `blockee` on behalf of `blocker`; the relation becomes declined
pub async fn block_user(pool: &SqlitePool, blocker: &UserId, blockee: &UserId) -> Result<()> {
    require_distinct(blocker, blockee)?;
    require_user(pool, blockee).await?;

    let (lower, higher) = canonical_pair(blocker, blockee);
    let blocker_is_user1 = blocker == lower;

    sqlx::query(
        r#"
        INSERT INTO user_relations
            (user1_id, user2_id, status, initiated_by, user1_blocked_user2, user2_blocked_user1)
        VALUES (?, ?, 'declined', ?, ?, ?)
        ON CONFLICT(user1_id, user2_id) DO UPDATE SET
            status = 'declined',
            user1_blocked_user2 = MAX(user1_blocked_user2, excluded.user1_blocked_user2),
            user2_blocked_user1 = MAX(user2_blocked_user1, excluded.user2_blocked_user1),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(lower.as_str())
    .bind(higher.as_str())
    .bind(blocker.as_str())
    .bind(blocker_is_user1)
    .bind(!blocker_is_user1)
    .execute(pool)
    .await?;

    Ok(())
}

/// SQLite-backed [`FriendshipGraph`]
#[derive(Clone)]
pub struct SqliteFriendshipGraph {
    pool: SqlitePool,
}

impl SqliteFriendshipGraph {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const CONNECTED: &str =
    "status = 'accepted' AND user1_blocked_user2 = 0 AND user2_blocked_user1 = 0";

#[async_trait::async_trait]
impl FriendshipGraph for SqliteFriendshipGraph {
    async fn accepted_edges_among(&self, users: &BTreeSet<UserId>) -> EngineResult<Vec<(UserId, UserId)>> {
        if users.len() < 2 {
            return Ok(Vec::new());
        }

        // Only the lower endpoint is bound; the upper one is filtered here.
        // Chunks ascend, so the result stays in (user1_id, user2_id) order.
        let mut edges = Vec::new();
        for chunk in user_chunks(users) {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT user1_id, user2_id FROM user_relations WHERE ");
            builder.push(CONNECTED);
            builder.push(" AND user1_id IN ");
            push_user_list(&mut builder, chunk);
            builder.push(" ORDER BY user1_id, user2_id");

            let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
            edges.extend(
                rows.into_iter()
                    .map(|(a, b)| (UserId::from(a), UserId::from(b)))
                    .filter(|(_, b)| users.contains(b)),
            );
        }

        Ok(edges)
    }
}
