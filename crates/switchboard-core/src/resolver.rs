//! Membership resolution: which groups a user belongs to.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Resolver errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The membership service does not know the user.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The membership service could not be reached.
    #[error("Membership service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a user to the groups it belongs to.
///
/// Called once per connection at registration. A failure aborts that
/// connection and is not retried.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// Look up the user's current groups.
    async fn resolve(&self, user_id: &str) -> Result<Vec<String>, ResolveError>;
}

/// A resolver backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    groups: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    /// Create a resolver from a user → groups table.
    #[must_use]
    pub fn new(groups: HashMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    /// Add or replace one user's groups.
    #[must_use]
    pub fn with_user<I, S>(mut self, user_id: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(user_id.into(), groups.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl MembershipResolver for StaticResolver {
    async fn resolve(&self, user_id: &str) -> Result<Vec<String>, ResolveError> {
        self.groups
            .get(user_id)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownUser(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::default()
            .with_user("alice", ["g1", "g2"])
            .with_user("bob", Vec::<String>::new());

        assert_eq!(resolver.resolve("alice").await.unwrap(), vec!["g1", "g2"]);
        assert!(resolver.resolve("bob").await.unwrap().is_empty());
        assert!(matches!(
            resolver.resolve("mallory").await,
            Err(ResolveError::UnknownUser(_))
        ));
    }
}
