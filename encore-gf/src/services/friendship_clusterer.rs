//! Friendship clustering
//!
//! Partitions a candidate pool into connected components of the accepted
//! friendship graph. Components of a single user are discarded.

use encore_common::UserId;
use std::collections::{BTreeSet, HashMap};

/// Disjoint-set forest over user ids, stored as an index arena
///
/// Slots are allocated on first touch; `parent[i] == i` marks a root.
#[derive(Debug, Default)]
pub struct DisjointSet {
    slots: HashMap<UserId, usize>,
    users: Vec<UserId>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            users: Vec::with_capacity(capacity),
            parent: Vec::with_capacity(capacity),
            rank: Vec::with_capacity(capacity),
        }
    }

    /// Slot for `user`, creating a singleton set if unseen
    pub fn make_set(&mut self, user: &UserId) -> usize {
        if let Some(&slot) = self.slots.get(user) {
            return slot;
        }
        let slot = self.users.len();
        self.slots.insert(user.clone(), slot);
        self.users.push(user.clone());
        self.parent.push(slot);
        self.rank.push(0);
        slot
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.slots.contains_key(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Root slot of `slot`, compressing the path behind it
    fn find_root(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut current = slot;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        root
    }

    /// Representative of the set containing `user`
    pub fn find(&mut self, user: &UserId) -> UserId {
        let slot = self.make_set(user);
        let root = self.find_root(slot);
        self.users[root].clone()
    }

    /// Merge the sets of `a` and `b`; on equal rank `a`'s root stays root
    pub fn union(&mut self, a: &UserId, b: &UserId) {
        let slot_a = self.make_set(a);
        let slot_b = self.make_set(b);
        let root_a = self.find_root(slot_a);
        let root_b = self.find_root(slot_b);

        if root_a == root_b {
            return;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }

    /// All sets with at least `min_size` members, in root-slot order
    pub fn components(&mut self, min_size: usize) -> Vec<BTreeSet<UserId>> {
        let mut by_root: Vec<Option<BTreeSet<UserId>>> = vec![None; self.users.len()];

        for slot in 0..self.users.len() {
            let root = self.find_root(slot);
            by_root[root]
                .get_or_insert_with(BTreeSet::new)
                .insert(self.users[slot].clone());
        }

        by_root
            .into_iter()
            .flatten()
            .filter(|members| members.len() >= min_size)
            .collect()
    }
}

/// Connected components (size ≥ 2) of `users` under `edges`
///
/// Edges touching a user outside `users` are ignored.
pub fn cluster(users: &BTreeSet<UserId>, edges: &[(UserId, UserId)]) -> Vec<BTreeSet<UserId>> {
    if users.len() < 2 || edges.is_empty() {
        return Vec::new();
    }

    let mut sets = DisjointSet::with_capacity(users.len());
    for user in users {
        sets.make_set(user);
    }

    for (a, b) in edges {
        if a == b || !users.contains(a) || !users.contains(b) {
            continue;
        }
        sets.union(a, b);
    }

    sets.components(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<UserId> {
        ids.iter().map(|id| UserId::from(*id)).collect()
    }

    fn edge(a: &str, b: &str) -> (UserId, UserId) {
        (UserId::from(a), UserId::from(b))
    }

    #[test]
    fn test_two_pairs_and_a_loner() {
        let users = set(&["A", "B", "C", "D", "E"]);
        let edges = vec![edge("A", "B"), edge("C", "D")];

        let clusters = cluster(&users, &edges);

        assert_eq!(clusters.len(), 2);
        assert!(clusters.contains(&set(&["A", "B"])));
        assert!(clusters.contains(&set(&["C", "D"])));
    }

    #[test]
    fn test_chain_forms_one_component() {
        let users = set(&["a", "b", "c", "d"]);
        let edges = vec![edge("a", "b"), edge("c", "d"), edge("b", "c")];

        assert_eq!(cluster(&users, &edges), vec![set(&["a", "b", "c", "d"])]);
    }

    #[test]
    fn test_edges_outside_pool_ignored() {
        // b and c are only connected through x, who is not a candidate
        let users = set(&["b", "c"]);
        let edges = vec![edge("b", "x"), edge("x", "c")];

        assert!(cluster(&users, &edges).is_empty());
    }

    #[test]
    fn test_no_edges() {
        assert!(cluster(&set(&["a", "b"]), &[]).is_empty());
    }

    #[test]
    fn test_tie_keeps_first_root() {
        let mut sets = DisjointSet::new();
        sets.union(&UserId::from("x"), &UserId::from("y"));
        assert_eq!(sets.find(&UserId::from("y")), UserId::from("x"));
    }

    #[test]
    fn test_union_by_rank_attaches_smaller_tree() {
        let mut sets = DisjointSet::new();
        sets.union(&UserId::from("a"), &UserId::from("b"));
        // {c} has rank 0, {a, b} rank 1; c joins under a
        sets.union(&UserId::from("c"), &UserId::from("a"));

        assert_eq!(sets.find(&UserId::from("c")), UserId::from("a"));
        assert_eq!(sets.len(), 3);
    }

    #[test]
    fn test_components_cover_each_user_once() {
        let users: BTreeSet<UserId> = (0..50).map(|i| UserId::new(format!("u{:02}", i))).collect();
        let edges: Vec<(UserId, UserId)> = (0..49)
            .filter(|i| i % 5 != 4)
            .map(|i| (UserId::new(format!("u{:02}", i)), UserId::new(format!("u{:02}", i + 1))))
            .collect();

        let clusters = cluster(&users, &edges);

        assert_eq!(clusters.len(), 10);
        let total: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, 50);
    }
}
