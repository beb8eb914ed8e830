//! In-process backplane for single-node deployments and tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{Backplane, BackplaneError, BackplaneMessage, Subscription};

/// Default broadcast capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// A backplane that lives inside one process.
///
/// Every subscription sees every publish and keeps the ones on its topics.
/// Clones share the same bus.
#[derive(Debug, Clone)]
pub struct MemoryBackplane {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sender: broadcast::Sender<BackplaneMessage>,
    /// Topic sets of the subscriptions currently open.
    active: Mutex<HashMap<u64, HashSet<String>>>,
    next_id: AtomicU64,
    available: AtomicBool,
}

/// Forgets a subscription's topic set when the stream is dropped.
struct ActiveGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.inner.active.lock().remove(&self.id);
    }
}

struct SubscriptionState {
    rx: broadcast::Receiver<BackplaneMessage>,
    topics: HashSet<String>,
    _guard: ActiveGuard,
}

impl MemoryBackplane {
    /// Create a backplane with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a backplane buffering up to `capacity` messages per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                sender,
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Check whether any open subscription covers `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .active
            .lock()
            .values()
            .any(|topics| topics.contains(topic))
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Simulate an outage: while unavailable, publish and subscribe fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), BackplaneError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackplaneError::Connection("memory backplane unavailable".into()))
        }
    }
}

impl Default for MemoryBackplane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backplane for MemoryBackplane {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BackplaneError> {
        self.check_available()?;
        // No subscribers is not an error
        let _ = self.inner.sender.send(BackplaneMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<Subscription, BackplaneError> {
        self.check_available()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let topics: HashSet<String> = topics.iter().cloned().collect();
        self.inner.active.lock().insert(id, topics.clone());

        let state = SubscriptionState {
            rx: self.inner.sender.subscribe(),
            topics,
            _guard: ActiveGuard {
                inner: Arc::clone(&self.inner),
                id,
            },
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                match state.rx.recv().await {
                    Ok(message) if state.topics.contains(&message.topic) => {
                        return Some((message, state));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Memory backplane subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
