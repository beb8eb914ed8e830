//! Fixtures shared by the Switchboard benchmarks.

use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Connection, Hub, HubConfig, MemoryBackplane, Outbox, StaticResolver};
use switchboard_transport::memory::duplex;

/// `count` group IDs: `g0`, `g1`, ...
#[must_use]
pub fn group_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("g{i}")).collect()
}

/// `count` unregistered connections, each for its own user.
#[must_use]
pub fn connections(count: usize, capacity: usize) -> Vec<(Arc<Connection>, Outbox)> {
    (0..count)
        .map(|i| Connection::new(format!("user-{i}"), capacity))
        .collect()
}

/// Start a hub on the in-memory backplane with `members` connections, one
/// per user, all in `group_id`.
///
/// Every client is drained by a background task so outbound queues never
/// fill. Must run inside a multi-threaded Tokio runtime.
pub async fn populated_hub(members: usize, group_id: &str) -> Arc<Hub> {
    let resolver = (0..members).fold(StaticResolver::default(), |resolver, i| {
        resolver.with_user(format!("user-{i}"), [group_id])
    });
    let hub = Hub::spawn(
        HubConfig::default(),
        Arc::new(resolver),
        Arc::new(MemoryBackplane::new()),
    );

    for i in 0..members {
        let (reader, writer, mut client) = duplex();
        hub.connect(format!("user-{i}"), reader, writer);
        tokio::spawn(async move { while client.recv().await.is_some() {} });
    }

    while hub.connection_count() < members {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    hub
}
