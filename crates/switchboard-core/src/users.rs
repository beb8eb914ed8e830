//! User registry: which local connections each user holds open.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use switchboard_protocol::ConnectionId;
use tracing::debug;

/// Thread-safe mapping of user ID to that user's connection IDs.
///
/// A user is present exactly while it has at least one connection.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: DashMap<String, Vec<ConnectionId>>,
}

impl UserRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection for a user.
    ///
    /// Returns `true` if the user was not tracked before.
    pub fn add_connection(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        match self.users.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let connections = entry.get_mut();
                if !connections.contains(connection_id) {
                    connections.push(connection_id.clone());
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![connection_id.clone()]);
                debug!(user = %user_id, "Tracking user");
                true
            }
        }
    }

    /// Forget a connection, dropping the user once it has none left.
    ///
    /// Returns `true` if the user was removed.
    pub fn remove_connection(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        if let Some(mut connections) = self.users.get_mut(user_id) {
            connections.retain(|c| c != connection_id);
        } else {
            return false;
        }

        let removed = self
            .users
            .remove_if(user_id, |_, connections| connections.is_empty())
            .is_some();
        if removed {
            debug!(user = %user_id, "No connections left, forgetting user");
        }
        removed
    }

    /// Snapshot of a user's connection IDs. Empty if the user is unknown.
    #[must_use]
    pub fn connections_of(&self, user_id: &str) -> Vec<ConnectionId> {
        self.users
            .get(user_id)
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all user IDs, each with `prefix` prepended.
    #[must_use]
    pub fn user_ids(&self, prefix: &str) -> Vec<String> {
        self.users
            .iter()
            .map(|entry| format!("{prefix}{}", entry.key()))
            .collect()
    }

    /// Check if a user is tracked.
    #[must_use]
    pub fn contains_user(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Number of tracked users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if no users are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
