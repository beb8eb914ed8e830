//! Backplane bridges.
//!
//! Two instances run per hub: one for group topics, one for user topics.
//! Each subscribes to the registry's current topic set and swaps the whole
//! subscription whenever the hub bumps that registry's generation counter.
//! Messages published on a topic while its subscription is being swapped can
//! be missed; delivery is best-effort.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use switchboard_protocol::{codec, group_topic, user_from_topic, BackplaneNotice, GroupMessage};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backplane::{BackplaneMessage, Subscription};
use crate::hub::Hub;
use crate::metrics;

/// Which registry a bridge follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BridgeKind {
    Groups,
    Users,
}

impl BridgeKind {
    fn name(self) -> &'static str {
        match self {
            BridgeKind::Groups => "groups",
            BridgeKind::Users => "users",
        }
    }
}

/// Exponential retry delay.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Reset after a subscription that stayed up for at least the longest
    /// delay. Shorter-lived ones keep the delay growing.
    fn settle(&mut self, uptime: Duration) {
        if uptime >= self.max {
            self.reset();
        }
    }
}

/// How a retry wait ended.
enum Wait {
    Elapsed,
    TopicsChanged,
    Stop,
}

/// Sleep for `delay`, waking early on shutdown or a topic change.
async fn wait_retry(
    delay: Duration,
    shutdown: &CancellationToken,
    topics_changed: &mut watch::Receiver<u64>,
) -> Wait {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Wait::Stop,
        changed = topics_changed.changed() => match changed {
            Ok(()) => Wait::TopicsChanged,
            Err(_) => Wait::Stop,
        },
        _ = tokio::time::sleep(delay) => Wait::Elapsed,
    }
}

pub(crate) async fn run(hub: Arc<Hub>, kind: BridgeKind) {
    let mut topics_changed = hub.topics_changed(kind);
    let shutdown = hub.shutdown_token().clone();
    let mut backoff = Backoff::new(hub.config().retry_initial, hub.config().retry_max);

    loop {
        // Snapshot after marking the generation seen, so a change that lands
        // mid-snapshot still wakes us below.
        let generation = *topics_changed.borrow_and_update();
        let topics = hub.topics(kind);

        let mut subscription = if topics.is_empty() {
            debug!(bridge = kind.name(), generation, "No topics to follow");
            None
        } else {
            match hub.backplane().subscribe(&topics).await {
                Ok(subscription) => {
                    info!(
                        bridge = kind.name(),
                        generation,
                        topics = topics.len(),
                        "Opened backplane subscription"
                    );
                    Some(subscription)
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        bridge = kind.name(),
                        error = %e,
                        retry_in = ?delay,
                        "Backplane subscribe failed"
                    );
                    metrics::record_backplane_error("subscribe");
                    match wait_retry(delay, &shutdown, &mut topics_changed).await {
                        Wait::Stop => return,
                        Wait::Elapsed | Wait::TopicsChanged => continue,
                    }
                }
            }
        };
        let opened_at = Instant::now();
        let mut delivered = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                changed = topics_changed.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!(bridge = kind.name(), "Topic set changed, resubscribing");
                    metrics::record_resubscription(kind.name());
                    break;
                }
                message = next_message(&mut subscription) => match message {
                    Some(message) => {
                        if !delivered {
                            delivered = true;
                            backoff.reset();
                        }
                        dispatch(&hub, kind, message);
                    }
                    None => {
                        backoff.settle(opened_at.elapsed());
                        let delay = backoff.next_delay();
                        warn!(bridge = kind.name(), retry_in = ?delay, "Backplane subscription ended");
                        metrics::record_backplane_error("subscription_ended");
                        let wait = wait_retry(delay, &shutdown, &mut topics_changed).await;
                        if let Wait::Stop = wait {
                            return;
                        }
                        break;
                    }
                },
            }
        }
    }
}

async fn next_message(subscription: &mut Option<Subscription>) -> Option<BackplaneMessage> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn dispatch(hub: &Hub, kind: BridgeKind, message: BackplaneMessage) {
    match kind {
        BridgeKind::Groups => match codec::decode::<GroupMessage>(&message.payload) {
            Ok(group_message) if group_topic(&group_message.group_id) == message.topic => {
                hub.distribute(group_message);
            }
            Ok(group_message) => {
                warn!(
                    topic = %message.topic,
                    group = %group_message.group_id,
                    "Dropping message published on another group's topic"
                );
                metrics::record_dropped("wrong_topic");
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping malformed group message");
                metrics::record_dropped("malformed_backplane");
            }
        },
        BridgeKind::Users => {
            let Some(user_id) = user_from_topic(&message.topic) else {
                warn!(topic = %message.topic, "Dropping notice on a non-user topic");
                return;
            };

            match codec::decode::<BackplaneNotice>(&message.payload) {
                Ok(BackplaneNotice::GroupsChanged(body)) => {
                    debug!(user = %user_id, groups = body.groups.len(), "Groups changed");
                    hub.notify_groups_changed(user_id, body.groups);
                }
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "Dropping malformed notice");
                    metrics::record_dropped("malformed_backplane");
                }
            }
        }
    }
}
