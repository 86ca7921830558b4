//! Database access for encore-gf
//!
//! SQLite-backed collaborators over the shared Encore database. Schema
//! creation lives in `encore_common::db`.

pub mod groups;
pub mod listening;
pub mod relations;
pub mod runs;
pub mod settings;
pub mod users;

pub use groups::SqliteGroupStore;
pub use listening::SqliteListeningHistory;
pub use relations::SqliteFriendshipGraph;
pub use users::SqliteUserDirectory;

use encore_common::UserId;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;

/// Most user ids bound into one `IN (...)` list
///
/// SQLite rejects statements with more than 32766 parameters, so id sets are
/// queried in chunks of this size.
pub(crate) const MAX_IDS_PER_QUERY: usize = 500;

/// `users` split into ascending chunks of at most [`MAX_IDS_PER_QUERY`] ids
pub(crate) fn user_chunks(users: &BTreeSet<UserId>) -> Vec<Vec<&UserId>> {
    let ids: Vec<&UserId> = users.iter().collect();
    ids.chunks(MAX_IDS_PER_QUERY).map(|chunk| chunk.to_vec()).collect()
}

/// Append `(?, ?, ...)` binding every user id
pub(crate) fn push_user_list<'a, I>(builder: &mut QueryBuilder<'a, Sqlite>, users: I)
where
    I: IntoIterator<Item = &'a UserId>,
{
    builder.push("(");
    {
        let mut separated = builder.separated(", ");
        for user in users {
            separated.push_bind(user.as_str());
        }
    }
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_chunks_bounded_and_ordered() {
        let users: BTreeSet<UserId> = (0..1201).map(|n| UserId::from(format!("u{:05}", n))).collect();

        let chunks = user_chunks(&users);

        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![500, 500, 201]);
        assert_eq!(chunks[1][0].as_str(), "u00500");
        assert!(user_chunks(&BTreeSet::new()).is_empty());
    }
}
