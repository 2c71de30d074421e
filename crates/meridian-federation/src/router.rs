//! Event router — maps each event kind to the domain handler that applies it.
//!
//! The router is built once at startup with [`EventRouter::builder`] and must
//! bind a handler to every [`EventKind`]; an incomplete table is a startup
//! error, never a dispatch-time surprise.
//!
//! Dispatch never retries. A handler failure is returned to the caller as
//! `HandlerFailed` so the sending peer can decide whether to redeliver.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    error::{FederationError, HandlerError},
    events::{EventKind, FederationEvent, RawEvent},
};

/// Applies one federation event to local state.
///
/// Handlers must be idempotent: a peer may deliver the same event more than
/// once, and two peers may deliver related events concurrently.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &FederationEvent) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, event: &FederationEvent) -> Result<(), HandlerError> {
        (**self).handle(event).await
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub struct EventRouter {
    handlers: BTreeMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventRouter {
    pub fn builder() -> EventRouterBuilder {
        EventRouterBuilder::default()
    }

    /// Resolve the type code, decode the body and invoke the bound handler.
    ///
    /// Unknown codes fail with `UnsupportedEventType` before any handler runs.
    pub async fn dispatch(&self, raw: RawEvent) -> Result<EventKind, FederationError> {
        let event = raw.decode()?;
        self.dispatch_event(&event).await?;
        Ok(event.kind())
    }

    /// Invoke the handler bound to an already-decoded event.
    pub async fn dispatch_event(&self, event: &FederationEvent) -> Result<(), FederationError> {
        let kind = event.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| FederationError::IncompleteRouter(kind.code().to_owned()))?;

        debug!("Dispatching event {} ({}) from {}", event.id, kind, event.origin);
        handler.handle(event).await.map_err(|source| FederationError::HandlerFailed {
            event_type: kind.code().to_owned(),
            source,
        })?;

        info!("Applied event {} ({}) from {}", event.id, kind, event.origin);
        Ok(())
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct EventRouterBuilder {
    handlers: BTreeMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventRouterBuilder {
    /// Bind `handler` to `kind`, replacing any earlier binding.
    pub fn on(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Bind `handler` to every kind that has no handler yet.
    pub fn on_all(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for kind in EventKind::ALL {
            self.handlers.entry(kind).or_insert_with(|| handler.clone());
        }
        self
    }

    /// Finish the router. Fails if any kind is left without a handler.
    pub fn build(self) -> Result<EventRouter, FederationError> {
        let missing: Vec<&str> = EventKind::ALL
            .iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .map(|kind| kind.code())
            .collect();
        if !missing.is_empty() {
            return Err(FederationError::IncompleteRouter(missing.join(", ")));
        }
        Ok(EventRouter { handlers: self.handlers })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every event it sees; optionally fails.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub seen: Mutex<Vec<FederationEvent>>,
        pub fail_with: Option<HandlerError>,
    }

    impl RecordingHandler {
        pub fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &FederationEvent) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.clone());
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }
}
