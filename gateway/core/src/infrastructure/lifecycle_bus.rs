// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lifecycle Bus Implementation - Pub/Sub for Host Lifecycle Events
//
// In-memory broadcast of host lifecycle notifications (started, stopping)
// using tokio broadcast channels. Long-lived components such as the cache
// registry subscribe to release their resources when the host stops.

use crate::domain::lifecycle::LifecycleEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcast channel for host lifecycle events
#[derive(Clone)]
pub struct LifecycleBus {
    sender: Arc<broadcast::Sender<LifecycleEvent>>,
}

impl LifecycleBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create bus with default capacity (16); lifecycle traffic is sparse
    pub fn with_default_capacity() -> Self {
        Self::new(16)
    }

    /// Publish a lifecycle event to all subscribers
    pub fn publish(&self, event: LifecycleEvent) {
        debug!("Publishing lifecycle event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to lifecycle event");
        }
    }

    /// Publish `Stopping`
    pub fn publish_stopping(&self) {
        self.publish(LifecycleEvent::stopping());
    }

    pub fn subscribe(&self) -> LifecycleReceiver {
        LifecycleReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct LifecycleReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
}

impl LifecycleReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<LifecycleEvent, LifecycleBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => LifecycleBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Lifecycle receiver lagged by {} events", n);
                LifecycleBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<LifecycleEvent, LifecycleBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => LifecycleBusError::Empty,
            broadcast::error::TryRecvError::Closed => LifecycleBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Lifecycle receiver lagged by {} events", n);
                LifecycleBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleBusError {
    #[error("Lifecycle bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
