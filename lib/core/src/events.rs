//! Typed record lifecycle events.
//!
//! The primary store publishes [`RecordEvent`]s on an [`EventBus`]; consumers
//! such as the shadow index synchronizer subscribe one handler per
//! [`EventKind`] at startup. Handlers run in subscription order and their
//! results are returned to the publisher, which logs failures but never lets
//! them abort the mutation that triggered them.

use crate::{Record, Result};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// After a create has committed; the row id is assigned.
    AfterCreate,
    /// After an update has committed.
    AfterUpdate,
    /// Before a delete commits; the row id is still resolvable.
    BeforeDelete,
}

#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub kind: EventKind,
    pub record: Arc<Record>,
}

pub type HookFuture = BoxFuture<'static, Result<()>>;

type Handler = Arc<dyn Fn(RecordEvent) -> HookFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    // Dispatches hold the read side; shutdown takes the write side so it
    // waits for in-flight dispatches to finish.
    open: tokio::sync::RwLock<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            open: tokio::sync::RwLock::new(true),
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(RecordEvent) -> HookFuture + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Run every handler subscribed to `kind` and collect their results.
    /// Returns nothing once the bus has been shut down.
    pub async fn dispatch(&self, kind: EventKind, record: Arc<Record>) -> Vec<Result<()>> {
        let open = self.open.read().await;
        if !*open {
            return Vec::new();
        }

        let handlers: Vec<Handler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.handler.clone())
            .collect();

        let event = RecordEvent { kind, record };
        let mut results = Vec::with_capacity(handlers.len());
        for handler in handlers {
            results.push(handler(event.clone()).await);
        }
        results
    }

    /// Wait for in-flight dispatches, then drop every subscription.
    pub async fn shutdown(&self) {
        let mut open = self.open.write().await;
        *open = false;
        self.subscriptions.write().clear();
        tracing::info!("event bus drained");
    }

    pub async fn is_open(&self) -> bool {
        *self.open.read().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectionDescriptor, Error, RecordId};
    use chrono::Utc;
    use futures_util::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn record() -> Arc<Record> {
        let collection = Arc::new(CollectionDescriptor::builder("docs").build().unwrap());
        let now = Utc::now();
        Arc::new(Record::new(
            RecordId::new("r1"),
            collection,
            Default::default(),
            now,
            now,
        ))
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        bus.subscribe(EventKind::AfterCreate, move |event| {
            let counter = counter.clone();
            async move {
                assert_eq!(event.kind, EventKind::AfterCreate);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        });
        bus.subscribe(EventKind::BeforeDelete, |_| {
            async { Err(Error::Storage("boom".into())) }.boxed()
        });

        let results = bus.dispatch(EventKind::AfterCreate, record()).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let results = bus.dispatch(EventKind::BeforeDelete, record()).await;
        assert!(matches!(results[0], Err(Error::Storage(_))));

        assert!(bus.dispatch(EventKind::AfterUpdate, record()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_shutdown() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::AfterUpdate, |_| async { Ok(()) }.boxed());
        assert_eq!(bus.subscriber_count(EventKind::AfterUpdate), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.subscribe(EventKind::AfterUpdate, |_| async { Ok(()) }.boxed());
        bus.shutdown().await;
        assert!(!bus.is_open().await);
        assert_eq!(bus.subscriber_count(EventKind::AfterUpdate), 0);
        assert!(bus.dispatch(EventKind::AfterUpdate, record()).await.is_empty());
    }
}
