//! Group registry: which local connections belong to which group.
//!
//! A group exists exactly while it has at least one member. Every mutation
//! rewrites the connection's own group list under the registry's write lock,
//! so a fanout snapshot never sees a connection filed under a group its list
//! does not mention.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_protocol::ConnectionId;
use tracing::debug;

use crate::connection::Connection;

type Members = HashMap<ConnectionId, Arc<Connection>>;

/// Sort and deduplicate a list of group IDs.
#[must_use]
pub fn normalize_groups(mut groups: Vec<String>) -> Vec<String> {
    groups.sort_unstable();
    groups.dedup();
    groups
}

fn contains(sorted: &[String], group_id: &str) -> bool {
    sorted
        .binary_search_by(|g| g.as_str().cmp(group_id))
        .is_ok()
}

/// Thread-safe mapping of group ID to member connections.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Members>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to each of `group_ids`, creating groups as needed.
    ///
    /// Returns `true` if at least one group was created.
    pub fn add_member(&self, group_ids: &[String], connection: &Arc<Connection>) -> bool {
        let mut groups = self.groups.write();
        let mut created = false;

        for group_id in group_ids {
            let members = groups.entry(group_id.clone()).or_insert_with(|| {
                debug!(group = %group_id, "Creating group");
                created = true;
                HashMap::new()
            });
            members.insert(connection.id().clone(), Arc::clone(connection));
        }

        let mut current = connection.groups();
        current.extend(group_ids.iter().cloned());
        connection.replace_groups(normalize_groups(current));

        created
    }

    /// Replace a connection's membership with exactly `group_ids`.
    ///
    /// Returns `true` if the set of groups changed (one was created or
    /// deleted).
    pub fn update_member(&self, group_ids: &[String], connection: &Arc<Connection>) -> bool {
        let next = normalize_groups(group_ids.to_vec());
        let mut groups = self.groups.write();
        let previous = connection.groups();
        let mut changed = false;

        for group_id in previous.iter().filter(|g| !contains(&next, g)) {
            changed |= Self::leave(&mut groups, group_id, connection.id());
        }

        for group_id in next.iter().filter(|g| !contains(&previous, g)) {
            let members = groups.entry(group_id.clone()).or_insert_with(|| {
                debug!(group = %group_id, "Creating group");
                changed = true;
                HashMap::new()
            });
            members.insert(connection.id().clone(), Arc::clone(connection));
        }

        connection.replace_groups(next);
        changed
    }

    /// Remove a connection from every group it belongs to.
    ///
    /// Returns `true` if at least one group was deleted. Removing a
    /// connection that is in no group is a no-op.
    pub fn remove_member(&self, connection: &Connection) -> bool {
        let mut groups = self.groups.write();
        let previous = connection.replace_groups(Vec::new());
        let mut changed = false;

        for group_id in &previous {
            changed |= Self::leave(&mut groups, group_id, connection.id());
        }

        changed
    }

    /// Drop one membership, deleting the group if it is now empty.
    fn leave(groups: &mut HashMap<String, Members>, group_id: &str, id: &ConnectionId) -> bool {
        let Some(members) = groups.get_mut(group_id) else {
            return false;
        };
        members.remove(id);

        if members.is_empty() {
            groups.remove(group_id);
            debug!(group = %group_id, "Deleted empty group");
            true
        } else {
            false
        }
    }

    /// Snapshot of a group's members. Empty if the group does not exist.
    #[must_use]
    pub fn members_of(&self, group_id: &str) -> Vec<Arc<Connection>> {
        self.groups
            .read()
            .get(group_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all group IDs, each with `prefix` prepended.
    #[must_use]
    pub fn topic_ids(&self, prefix: &str) -> Vec<String> {
        self.groups
            .read()
            .keys()
            .map(|group_id| format!("{prefix}{group_id}"))
            .collect()
    }

    /// Check if a group exists.
    #[must_use]
    pub fn contains_group(&self, group_id: &str) -> bool {
        self.groups.read().contains_key(group_id)
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Check if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(groups: &[&str]) -> Vec<String> {
        groups.iter().map(|g| g.to_string()).collect()
    }

    fn member_ids(registry: &GroupRegistry, group_id: &str) -> Vec<ConnectionId> {
        let mut members: Vec<_> = registry
            .members_of(group_id)
            .iter()
            .map(|c| c.id().clone())
            .collect();
        members.sort();
        members
    }

    #[test]
    fn test_add_member_reports_new_groups() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        let (b, _) = Connection::new("bob", 8);

        assert!(registry.add_member(&ids(&["g2", "g1"]), &a));
        assert_eq!(a.groups(), ids(&["g1", "g2"]));

        // g1 already exists
        assert!(!registry.add_member(&ids(&["g1"]), &b));
        assert_eq!(registry.members_of("g1").len(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_member_deletes_empty_groups() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        let (b, _) = Connection::new("bob", 8);
        registry.add_member(&ids(&["g1", "g2"]), &a);
        registry.add_member(&ids(&["g1"]), &b);

        // g2 goes away, g1 survives with b
        assert!(registry.remove_member(&a));
        assert!(!registry.contains_group("g2"));
        assert_eq!(member_ids(&registry, "g1"), vec![b.id().clone()]);
        assert!(a.groups().is_empty());

        // b still holds g1 open
        let (c, _) = Connection::new("carol", 8);
        registry.add_member(&ids(&["g1"]), &c);
        assert!(!registry.remove_member(&c));
        assert!(registry.contains_group("g1"));
    }

    #[test]
    fn test_remove_member_is_idempotent() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);

        // Never added
        assert!(!registry.remove_member(&a));

        registry.add_member(&ids(&["g1"]), &a);
        assert!(registry.remove_member(&a));
        assert!(!registry.remove_member(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_member_grows_and_shrinks() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        let (b, _) = Connection::new("bob", 8);
        registry.add_member(&ids(&["g1"]), &a);
        registry.add_member(&ids(&["g1"]), &b);

        // g2 is new
        assert!(registry.update_member(&ids(&["g1", "g2"]), &a));
        assert_eq!(member_ids(&registry, "g2"), vec![a.id().clone()]);
        assert_eq!(a.groups(), ids(&["g1", "g2"]));

        // Leaving g1 does not delete it (b remains), g2 stays
        assert!(!registry.update_member(&ids(&["g2"]), &a));
        assert_eq!(member_ids(&registry, "g1"), vec![b.id().clone()]);

        // Swapping g2 for g1 deletes g2
        assert!(registry.update_member(&ids(&["g1"]), &a));
        assert!(!registry.contains_group("g2"));

        // Same set again is a no-op
        assert!(!registry.update_member(&ids(&["g1"]), &a));
    }

    #[test]
    fn test_update_member_to_empty() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        registry.add_member(&ids(&["g1"]), &a);

        assert!(registry.update_member(&[], &a));
        assert!(registry.is_empty());
        assert!(a.groups().is_empty());
    }

    #[test]
    fn test_membership_matches_connection_groups() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        registry.add_member(&ids(&["g1", "g3"]), &a);
        registry.update_member(&ids(&["g3", "g4", "g4"]), &a);

        for group_id in ["g1", "g2", "g3", "g4"] {
            let filed = registry
                .members_of(group_id)
                .iter()
                .any(|c| c.id() == a.id());
            assert_eq!(filed, a.is_member(group_id), "group {group_id}");
        }
    }

    #[test]
    fn test_topic_ids() {
        let registry = GroupRegistry::new();
        let (a, _) = Connection::new("alice", 8);
        registry.add_member(&ids(&["g1", "g2"]), &a);

        let mut topics = registry.topic_ids("group-");
        topics.sort();
        assert_eq!(topics, ids(&["group-g1", "group-g2"]));
        assert!(registry.members_of("missing").is_empty());
    }
}
