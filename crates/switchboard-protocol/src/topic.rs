//! Backplane topic naming.

/// Prefix of every group topic.
pub const GROUP_TOPIC_PREFIX: &str = "group-";

/// Prefix of every user topic.
pub const USER_TOPIC_PREFIX: &str = "user-";

/// Topic that carries chat messages for a group.
#[must_use]
pub fn group_topic(group_id: &str) -> String {
    format!("{GROUP_TOPIC_PREFIX}{group_id}")
}

/// Topic that carries membership notices for a user.
#[must_use]
pub fn user_topic(user_id: &str) -> String {
    format!("{USER_TOPIC_PREFIX}{user_id}")
}

/// Recover the user ID from a user topic.
#[must_use]
pub fn user_from_topic(topic: &str) -> Option<&str> {
    topic.strip_prefix(USER_TOPIC_PREFIX)
}
