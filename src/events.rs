//! Typed lifecycle events.
//!
//! The engine reports what it did through an [`EventSink`] passed in at
//! construction. Emission is fire-and-forget: no return value is consumed and
//! a slow or broken sink must not affect engine behavior.

use crate::memory::types::Layer;

/// Payloads for every event the engine emits.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    /// A memory passed the admissibility filter and entered the store.
    Added { id: String, layer: Layer },
    /// A memory was promoted one tier forward.
    Migrated { id: String, from: Layer, to: Layer },
    /// A conflict between two memories was resolved. `outdated` is true when
    /// the loser was flagged rather than deleted (negation conflicts).
    ConflictResolved {
        kept: String,
        dropped: String,
        outdated: bool,
    },
    /// A component degraded internally; `context` names the operation.
    Error { context: String, message: String },
}

/// Observer interface for [`MemoryEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MemoryEvent);
}

impl<S: EventSink> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: MemoryEvent) {
        (**self).emit(event);
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MemoryEvent) {}
}

/// Sink that records events in order. Intended for tests and debugging.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<MemoryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn drain(&self) -> Vec<MemoryEvent> {
        std::mem::take(&mut *self.events.lock().expect("sink lock"))
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("sink lock").len()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MemoryEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(MemoryEvent::Added {
            id: "a".into(),
            layer: Layer::Sensory,
        });
        sink.emit(MemoryEvent::Migrated {
            id: "a".into(),
            from: Layer::Sensory,
            to: Layer::ShortTerm,
        });
        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MemoryEvent::Added { .. }));
        assert!(matches!(events[1], MemoryEvent::Migrated { .. }));
        assert_eq!(sink.count(), 0);
    }
}
