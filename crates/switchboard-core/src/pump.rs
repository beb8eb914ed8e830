//! Per-connection read and write pumps.
//!
//! Either pump ending closes the connection, which ends the other. Only the
//! read pump asks the hub to unregister, so that happens exactly once.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use switchboard_protocol::{codec, GroupMessage, InboundMessage};
use switchboard_transport::{FrameReader, FrameWriter, TransportError};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::connection::{Connection, Outbox};
use crate::hub::Hub;
use crate::metrics;

pub(crate) fn spawn(
    hub: Arc<Hub>,
    connection: Arc<Connection>,
    outbox: Outbox,
    reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
) {
    let write_timeout = hub.config().write_timeout;
    tokio::spawn(write_loop(Arc::clone(&connection), outbox, writer, write_timeout));
    tokio::spawn(read_loop(hub, connection, reader));
}

async fn read_loop(hub: Arc<Hub>, connection: Arc<Connection>, mut reader: Box<dyn FrameReader>) {
    let read_timeout = hub.config().read_timeout;

    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.closed() => break,
            frame = recv(reader.as_mut(), read_timeout) => frame,
        };

        match frame {
            Ok(Some(data)) => handle_frame(&hub, &connection, &data).await,
            Ok(None) => {
                debug!(connection = %connection.id(), "Connection closed by peer");
                break;
            }
            Err(e) => {
                debug!(connection = %connection.id(), error = %e, "Read failed");
                break;
            }
        }
    }

    connection.close();
    hub.unregister(connection);
}

async fn recv(
    reader: &mut dyn FrameReader,
    read_timeout: Option<Duration>,
) -> Result<Option<Bytes>, TransportError> {
    match read_timeout {
        Some(limit) => timeout(limit, reader.recv())
            .await
            .unwrap_or(Err(TransportError::TimedOut)),
        None => reader.recv().await,
    }
}

async fn write_loop(
    connection: Arc<Connection>,
    mut outbox: Outbox,
    mut writer: Box<dyn FrameWriter>,
    write_timeout: Duration,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.closed() => break,
            frame = outbox.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        let result = timeout(write_timeout, writer.send(frame))
            .await
            .unwrap_or(Err(TransportError::TimedOut));
        if let Err(e) = result {
            debug!(connection = %connection.id(), error = %e, "Write failed");
            break;
        }
    }

    connection.close();
    close_writer(connection, writer, write_timeout).await;
}

/// Close the transport, giving up after `limit`. The writer is dropped
/// either way.
pub(crate) async fn close_writer(
    connection: Arc<Connection>,
    mut writer: Box<dyn FrameWriter>,
    limit: Duration,
) {
    match timeout(limit, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(connection = %connection.id(), error = %e, "Close failed"),
        Err(_) => trace!(connection = %connection.id(), "Close timed out"),
    }
}

/// Validate one client frame and publish it.
///
/// Malformed frames and frames for groups the sender is not in are dropped
/// without telling the client.
async fn handle_frame(hub: &Hub, connection: &Connection, data: &[u8]) {
    let inbound: InboundMessage = match codec::decode(data) {
        Ok(inbound) => inbound,
        Err(e) => {
            trace!(connection = %connection.id(), error = %e, "Discarding malformed frame");
            metrics::record_dropped("malformed");
            return;
        }
    };

    if !connection.is_member(&inbound.group_id) {
        trace!(
            connection = %connection.id(),
            group = %inbound.group_id,
            "Discarding message for a group the sender is not in"
        );
        metrics::record_dropped("not_member");
        return;
    }

    let message = GroupMessage::from_inbound(inbound, connection.id().clone(), connection.user_id());
    hub.send_message(message).await;
}
