//! # switchboard-protocol
//!
//! Wire formats for the Switchboard chat fanout server.
//!
//! Everything on the wire is JSON. Three audiences read it:
//!
//! - **Clients** send an [`InboundMessage`] and receive a [`ClientEnvelope`]
//! - **Servers** exchange [`GroupMessage`]s over the backplane, one topic per group
//! - **The membership service** pushes a [`BackplaneNotice`] onto a user's topic
//!   when that user's groups change
//!
//! ## Example
//!
//! ```rust
//! use switchboard_protocol::{codec, ClientEnvelope, ConnectionId, GroupMessage};
//!
//! let message = GroupMessage {
//!     message: "hi".into(),
//!     group_id: "g1".into(),
//!     client_id: ConnectionId::new("conn-a"),
//!     user_id: "alice".into(),
//! };
//!
//! let encoded = codec::encode(&ClientEnvelope::Message(message)).unwrap();
//! let decoded: ClientEnvelope = codec::decode(&encoded).unwrap();
//! assert!(matches!(decoded, ClientEnvelope::Message(_)));
//! ```

pub mod codec;
pub mod envelope;
pub mod message;
pub mod topic;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{BackplaneNotice, ClientEnvelope, EnvelopeType, NoticeType};
pub use message::{ConnectionId, GroupMessage, GroupsBody, InboundMessage};
pub use topic::{group_topic, user_from_topic, user_topic, GROUP_TOPIC_PREFIX, USER_TOPIC_PREFIX};
