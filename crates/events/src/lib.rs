#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in osforge
//!
//! Library crates never print; they emit domain events through an
//! [`EventEmitter`] and the CLI decides how to render them (normally by
//! forwarding them to `tracing`).
//!
//! ## Architecture
//!
//! - **Domain-driven events**: grouped by subsystem (Build, Source, Store, Host)
//! - **Unified `EventEmitter` trait**: single API whether you hold a raw
//!   sender or a struct that contains one
//! - **Metadata**: every emission carries an [`EventMeta`] with id, timestamp,
//!   level and source

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, BuildEvent, FailureContext, HostEvent, SourceEvent, StoreEvent,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// An event together with its emission metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

impl EventMessage {
    #[must_use]
    pub fn new(meta: EventMeta, event: AppEvent) -> Self {
        Self { meta, event }
    }

    /// Wrap an event with metadata derived from its domain and level
    #[must_use]
    pub fn from_event(event: AppEvent) -> Self {
        let meta = EventMeta::new(EventLevel::from(event.log_level()), event.event_source());
        Self { meta, event }
    }
}

/// Sending half of the event channel
pub type EventSender = UnboundedSender<EventMessage>;

/// Receiving half of the event channel
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout osforge
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Hook for emitters that add context (correlation ids, labels) to
    /// every event they send.
    fn enrich_event_meta(&self, _event: &AppEvent, _meta: &mut EventMeta) {}

    /// Emit an event with explicit metadata
    fn emit_with_meta(&self, meta: EventMeta, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(EventMessage::new(meta, event));
        }
    }

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        let mut meta = EventMeta::new(EventLevel::from(event.log_level()), event.event_source());
        self.enrich_event_meta(&event, &mut meta);
        self.emit_with_meta(meta, event);
    }

    fn emit_build(&self, event: BuildEvent) {
        self.emit(AppEvent::Build(event));
    }

    fn emit_source(&self, event: SourceEvent) {
        self.emit(AppEvent::Source(event));
    }

    fn emit_store(&self, event: StoreEvent) {
        self.emit(AppEvent::Store(event));
    }

    fn emit_host(&self, event: HostEvent) {
        self.emit(AppEvent::Host(event));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

/// Implementation for an optional sender, so components can be built
/// without an event consumer.
impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}
