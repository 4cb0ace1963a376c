// ABOUTME: Event fan-out hub delivering each conversation event to every subscriber
// ABOUTME: A failing or panicking subscriber is logged and skipped without affecting the others

use crate::events::ConversationEvent;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub type SubscriptionId = Uuid;

/// Subscriber callback; an `Err` is logged and otherwise ignored
pub type EventCallback = Arc<dyn Fn(&ConversationEvent) -> anyhow::Result<()> + Send + Sync>;

/// Registry of subscriber callbacks for one conversation.
///
/// `publish` runs every callback on the caller's thread, in publish order.
/// Callbacks may subscribe or unsubscribe while being invoked, but must not
/// publish to the same hub. Async callers publish from the blocking pool.
#[derive(Default)]
pub struct EventHub {
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    // Serializes deliveries so each subscriber sees events in publish order
    delivery: Mutex<()>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, returning the id used to unsubscribe it
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ConversationEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback))
    }

    pub fn subscribe_callback(&self, callback: EventCallback) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.write().insert(id, callback);
        debug!("Subscribed callback with ID: {}", id);
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if self.write().remove(&id).is_some() {
            debug!("Unsubscribed callback with ID: {}", id);
            true
        } else {
            warn!("Attempted to unsubscribe unknown callback ID: {}", id);
            false
        }
    }

    pub fn publish(&self, event: &ConversationEvent) {
        let _delivery = self.delivery();

        // Snapshot so callbacks can (un)subscribe without deadlocking
        let callbacks: Vec<(SubscriptionId, EventCallback)> = self
            .read()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in callback {}: {:#}", id, e),
                Err(payload) => error!(
                    "Callback {} panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Remove every callback
    pub fn clear(&self) {
        let mut callbacks = self.write();
        let count = callbacks.len();
        callbacks.clear();
        debug!("Cleared {} callbacks", count);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, EventCallback>> {
        self.callbacks.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, EventCallback>> {
        self.callbacks.write().unwrap_or_else(|p| p.into_inner())
    }

    fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
