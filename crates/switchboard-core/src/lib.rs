//! # switchboard-core
//!
//! Group fanout for the Switchboard chat relay.
//!
//! This crate provides the moving parts behind one server process:
//!
//! - **Hub** - Owns connections and serializes every membership change
//! - **Registries** - Group and user indexes over the live connections
//! - **Bridges** - Keep backplane subscriptions in step with the registries
//! - **Backplane** - Shared pub/sub bus between processes
//! - **Resolver** - Looks up a user's groups when they connect
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  publish   ┌─────────────┐  group-*   ┌─────────────┐
//! │  Connection │───────────▶│  Backplane  │───────────▶│   Bridge    │
//! └─────────────┘            └─────────────┘  user-*    └─────────────┘
//!        ▲                                                     │
//!        │ outbound queue                                      ▼
//!        │                   ┌─────────────┐            ┌─────────────┐
//!        └───────────────────│  Registries │◀───────────│     Hub     │
//!                            └─────────────┘            └─────────────┘
//! ```
//!
//! A client message is never delivered locally straight away: it goes out on
//! the backplane and comes back through the group bridge, so every process
//! follows the same path.

pub mod backplane;
mod bridge;
pub mod connection;
pub mod groups;
pub mod hub;
pub mod metrics;
mod pump;
pub mod resolver;
pub mod users;

pub use backplane::{Backplane, BackplaneError, BackplaneMessage, MemoryBackplane, Subscription};
#[cfg(feature = "redis")]
pub use backplane::RedisBackplane;
pub use connection::{Connection, Delivery, Outbox};
pub use groups::{normalize_groups, GroupRegistry};
pub use hub::{Hub, HubConfig};
pub use resolver::{MembershipResolver, ResolveError, StaticResolver};
pub use users::UserRegistry;
