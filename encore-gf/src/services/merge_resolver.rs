//! Merge resolver
//!
//! Reconciles a freshly computed friendship cluster with the persisted group
//! for the same (artist, venue, date):
//! - no group yet: create one with the whole cluster
//! - group exists: admit cluster members connected to the group through
//!   accepted friendships, directly or via other admitted candidates
//!
//! Membership only ever grows. A create that loses a race on the business key
//! falls back to merging into the winner.

use crate::error::{EngineError, EngineResult};
use crate::types::{Concert, FriendshipGraph, GroupStore, UserDirectory};
use encore_common::{ArtistId, GroupId, UserId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Create attempts that may lose a uniqueness race before giving up
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// Result of resolving one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New group persisted with these members
    Created {
        group_id: GroupId,
        members: BTreeSet<UserId>,
    },
    /// Existing group grew by exactly these users
    Extended {
        group_id: GroupId,
        added: BTreeSet<UserId>,
    },
    /// Existing group already covers everyone reachable
    Unchanged { group_id: GroupId },
    /// Nothing persisted (cluster fell below two known users)
    Skipped { reason: String },
}

impl MergeOutcome {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            MergeOutcome::Created { group_id, .. }
            | MergeOutcome::Extended { group_id, .. }
            | MergeOutcome::Unchanged { group_id } => Some(*group_id),
            MergeOutcome::Skipped { .. } => None,
        }
    }
}

/// Candidates reachable from `members` over `edges`, through candidates only
///
/// Worklist form of "add any candidate who is friends with a current member,
/// repeat until nothing changes". Edges may reference anyone; only those with
/// at least one endpoint in `candidates` matter.
pub fn expand_transitively(
    members: &BTreeSet<UserId>,
    candidates: &BTreeSet<UserId>,
    edges: &[(UserId, UserId)],
) -> BTreeSet<UserId> {
    let mut adjacency: HashMap<&UserId, Vec<&UserId>> = HashMap::new();
    for (a, b) in edges {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    let mut admitted: BTreeSet<UserId> = BTreeSet::new();
    let mut queued: BTreeSet<&UserId> = BTreeSet::new();
    let mut worklist: VecDeque<&UserId> = VecDeque::new();

    for candidate in candidates {
        if members.contains(candidate) {
            continue;
        }
        let touches_member = adjacency
            .get(candidate)
            .map(|friends| friends.iter().any(|f| members.contains(*f)))
            .unwrap_or(false);
        if touches_member {
            queued.insert(candidate);
            worklist.push_back(candidate);
        }
    }

    while let Some(user) = worklist.pop_front() {
        admitted.insert(user.clone());

        if let Some(friends) = adjacency.get(user) {
            for friend in friends {
                if candidates.contains(*friend) && !members.contains(*friend) && queued.insert(*friend) {
                    worklist.push_back(*friend);
                }
            }
        }
    }

    admitted
}

/// Create-or-merge for concert groups
pub struct MergeResolver {
    store: Arc<dyn GroupStore>,
    graph: Arc<dyn FriendshipGraph>,
    directory: Arc<dyn UserDirectory>,
}

impl MergeResolver {
    pub fn new(
        store: Arc<dyn GroupStore>,
        graph: Arc<dyn FriendshipGraph>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            graph,
            directory,
        }
    }

    /// Persist `cluster` for `concert`, creating or growing its group
    ///
    /// Fails with `Contract` if handed fewer than two users.
    pub async fn resolve(
        &self,
        artist: &ArtistId,
        concert: &Concert,
        cluster: &BTreeSet<UserId>,
    ) -> EngineResult<MergeOutcome> {
        if cluster.len() < 2 {
            return Err(EngineError::Contract(format!(
                "Cluster for artist {} at venue {} on {} has {} member(s); at least two required",
                artist,
                concert.venue_id,
                concert.date,
                cluster.len()
            )));
        }

        let known = self.directory.known_users(cluster).await?;
        if known.len() < cluster.len() {
            let unknown: Vec<&str> = cluster.difference(&known).map(|u| u.as_str()).collect();
            warn!(
                artist_id = %artist,
                venue_id = %concert.venue_id,
                unknown = ?unknown,
                "Dropping cluster members missing from the user directory"
            );
        }

        if known.len() < 2 {
            return Ok(MergeOutcome::Skipped {
                reason: format!(
                    "only {} known user(s) remain after dropping unknown ids",
                    known.len()
                ),
            });
        }

        let mut conflicts = 0;
        loop {
            if let Some(group) = self
                .store
                .find_group(artist, &concert.venue_id, concert.date)
                .await?
            {
                return self.merge_into(group.id, &known).await;
            }

            match self.store.create_group(artist, concert, &known).await {
                Ok(group_id) => {
                    return Ok(MergeOutcome::Created {
                        group_id,
                        members: known,
                    })
                }
                Err(EngineError::DuplicateGroup { .. }) if conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    debug!(
                        artist_id = %artist,
                        venue_id = %concert.venue_id,
                        date = %concert.date,
                        attempt = conflicts,
                        "Group created concurrently, merging into it"
                    );
                }
                Err(EngineError::DuplicateGroup { .. }) => {
                    return Err(encore_common::Error::Internal(format!(
                        "Group for artist {} at venue {} on {} reported as duplicate but never found",
                        artist, concert.venue_id, concert.date
                    ))
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn merge_into(&self, group_id: GroupId, cluster: &BTreeSet<UserId>) -> EngineResult<MergeOutcome> {
        let members = self.store.get_members(group_id).await?;
        let candidates: BTreeSet<UserId> = cluster.difference(&members).cloned().collect();

        if candidates.is_empty() {
            return Ok(MergeOutcome::Unchanged { group_id });
        }

        let universe: BTreeSet<UserId> = members.union(&candidates).cloned().collect();
        let edges = self.graph.accepted_edges_among(&universe).await?;
        let admitted = expand_transitively(&members, &candidates, &edges);

        if admitted.len() < candidates.len() {
            debug!(
                group_id = %group_id,
                candidates = candidates.len(),
                admitted = admitted.len(),
                "Some candidates are not connected to the group"
            );
        }

        if admitted.is_empty() {
            return Ok(MergeOutcome::Unchanged { group_id });
        }

        // A concurrent run may have added some of them already
        let added = self.store.add_members(group_id, &admitted).await?;
        if added.is_empty() {
            return Ok(MergeOutcome::Unchanged { group_id });
        }

        info!(group_id = %group_id, added = added.len(), "Concert group extended");

        Ok(MergeOutcome::Extended { group_id, added })
    }
}
