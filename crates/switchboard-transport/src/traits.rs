//! Frame-level halves of a client connection.
//!
//! The hub never sees sockets, only a reader and a writer of whole frames.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// No frame arrived or left within the allowed time.
    #[error("Timed out")]
    TimedOut,

    /// Peer sent a frame above the configured limit.
    #[error("Frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
}

/// The receiving half of a client connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame from the connection.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// The sending half of a client connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one frame to the connection.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    ///
    /// Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}
