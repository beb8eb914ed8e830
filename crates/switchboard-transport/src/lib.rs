//! # switchboard-transport
//!
//! Transport abstraction layer for Switchboard.
//!
//! A transport is a duplex channel of discrete frames. The server splits each
//! client connection into a [`FrameReader`] and a [`FrameWriter`] so the read
//! and write pumps can run as independent tasks:
//!
//! - **WebSocket** - axum WebSocket halves (feature `websocket`)
//! - **Memory** - an in-process duplex used by tests and benchmarks
//!
//! ```rust,ignore
//! use switchboard_transport::FrameReader;
//!
//! async fn drain(mut reader: Box<dyn FrameReader>) {
//!     while let Ok(Some(frame)) = reader.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{FrameReader, FrameWriter, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketReader, WebSocketWriter};
