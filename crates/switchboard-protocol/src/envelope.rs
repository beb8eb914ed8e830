//! Tagged envelopes.
//!
//! Both envelopes serialize as `{"type": <u8>, "body": {...}}`. The numeric
//! tag picks the body shape, so the body is modelled as an enum variant
//! rather than an open JSON value.

use crate::message::{GroupMessage, GroupsBody};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Client-bound envelope type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum EnvelopeType {
    GroupChange = 0,
    Message = 1,
}

impl From<EnvelopeType> for u8 {
    fn from(et: EnvelopeType) -> u8 {
        et as u8
    }
}

impl TryFrom<u8> for EnvelopeType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EnvelopeType::GroupChange),
            1 => Ok(EnvelopeType::Message),
            _ => Err("Invalid envelope type"),
        }
    }
}

/// Backplane notice type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum NoticeType {
    GroupsChanged = 0,
}

impl From<NoticeType> for u8 {
    fn from(nt: NoticeType) -> u8 {
        nt as u8
    }
}

impl TryFrom<u8> for NoticeType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NoticeType::GroupsChanged),
            _ => Err("Invalid notice type"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Tagged<T, B> {
    #[serde(rename = "type")]
    kind: T,
    body: B,
}

/// An envelope written to a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEnvelope {
    /// The connection's group membership changed.
    GroupChange(GroupsBody),
    /// A chat message from another connection in one of this connection's groups.
    Message(GroupMessage),
}

impl ClientEnvelope {
    /// Get the envelope type.
    #[must_use]
    pub fn envelope_type(&self) -> EnvelopeType {
        match self {
            ClientEnvelope::GroupChange(_) => EnvelopeType::GroupChange,
            ClientEnvelope::Message(_) => EnvelopeType::Message,
        }
    }
}

impl Serialize for ClientEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClientEnvelope::GroupChange(body) => Tagged {
                kind: EnvelopeType::GroupChange,
                body,
            }
            .serialize(serializer),
            ClientEnvelope::Message(body) => Tagged {
                kind: EnvelopeType::Message,
                body,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClientEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Tagged::<EnvelopeType, serde_json::Value>::deserialize(deserializer)?;
        match raw.kind {
            EnvelopeType::GroupChange => {
                serde_json::from_value(raw.body).map(ClientEnvelope::GroupChange)
            }
            EnvelopeType::Message => serde_json::from_value(raw.body).map(ClientEnvelope::Message),
        }
        .map_err(D::Error::custom)
    }
}

/// A notice published on a user's backplane topic by the membership service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackplaneNotice {
    /// The user's complete group set is now `body.groups`.
    GroupsChanged(GroupsBody),
}

impl BackplaneNotice {
    /// Create a groups-changed notice.
    #[must_use]
    pub fn groups_changed(groups: Vec<String>) -> Self {
        BackplaneNotice::GroupsChanged(GroupsBody::new(groups))
    }

    /// Get the notice type.
    #[must_use]
    pub fn notice_type(&self) -> NoticeType {
        match self {
            BackplaneNotice::GroupsChanged(_) => NoticeType::GroupsChanged,
        }
    }
}

impl Serialize for BackplaneNotice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BackplaneNotice::GroupsChanged(body) => Tagged {
                kind: NoticeType::GroupsChanged,
                body,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for BackplaneNotice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Tagged::<NoticeType, serde_json::Value>::deserialize(deserializer)?;
        match raw.kind {
            NoticeType::GroupsChanged => {
                serde_json::from_value(raw.body).map(BackplaneNotice::GroupsChanged)
            }
        }
        .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_type_conversion() {
        assert_eq!(EnvelopeType::try_from(0), Ok(EnvelopeType::GroupChange));
        assert_eq!(EnvelopeType::try_from(1), Ok(EnvelopeType::Message));
        assert!(EnvelopeType::try_from(2).is_err());
    }

    #[test]
    fn test_message_envelope_shape() {
        let envelope = ClientEnvelope::Message(GroupMessage {
            message: "hi".into(),
            group_id: "g1".into(),
            client_id: "conn-a".into(),
            user_id: "alice".into(),
        });

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "type": 1,
                "body": {
                    "message": "hi",
                    "group_id": "g1",
                    "client_id": "conn-a",
                    "user_id": "alice"
                }
            })
        );
    }

    #[test]
    fn test_group_change_envelope_shape() {
        let envelope = ClientEnvelope::GroupChange(GroupsBody::new(vec!["g1".into(), "g2".into()]));
        assert_eq!(envelope.envelope_type(), EnvelopeType::GroupChange);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({"type": 0, "body": {"groups": ["g1", "g2"]}}));
    }

    #[test]
    fn test_decode_notice() {
        let raw = r#"{"type":0,"body":{"groups":["g1","g2"]}}"#;
        let notice: BackplaneNotice = serde_json::from_str(raw).unwrap();
        assert_eq!(
            notice,
            BackplaneNotice::groups_changed(vec!["g1".into(), "g2".into()])
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(serde_json::from_str::<BackplaneNotice>(r#"{"type":7,"body":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientEnvelope>(r#"{"type":9,"body":{}}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_mismatched_body() {
        // A Message tag with a groups body must not decode.
        let raw = r#"{"type":1,"body":{"groups":["g1"]}}"#;
        assert!(serde_json::from_str::<ClientEnvelope>(raw).is_err());
    }
}
