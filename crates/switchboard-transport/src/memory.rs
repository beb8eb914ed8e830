//! In-memory transport.
//!
//! [`duplex`] returns the server's two halves plus a [`MemoryClient`] that
//! plays the remote peer.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Create a connected server/client pair.
#[must_use]
pub fn duplex() -> (MemoryReader, MemoryWriter, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();

    (
        MemoryReader { rx: from_client },
        MemoryWriter {
            tx: Some(to_client),
        },
        MemoryClient {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server-side read half.
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Server-side write half.
pub struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryClient {
    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if either side has closed the connection.
    pub fn send(&self, frame: impl Into<Bytes>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame.into())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` once the server has closed its write half.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Hang up. The server's reader sees a clean close.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut reader, mut writer, mut client) = duplex();

        client.send(&b"ping"[..]).unwrap();
        assert_eq!(reader.recv().await.unwrap().unwrap(), "ping");

        writer.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_client_close_ends_reader() {
        let (mut reader, _writer, mut client) = duplex();

        client.close();
        assert!(reader.recv().await.unwrap().is_none());
        assert!(client.send(&b"late"[..]).is_err());
    }

    #[tokio::test]
    async fn test_writer_close_is_idempotent() {
        let (_reader, mut writer, mut client) = duplex();

        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert!(client.recv().await.is_none());
        assert!(matches!(
            writer.send(Bytes::from_static(b"x")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
