//! Reference-counted object base shared by nodes and data objects.
//!
//! [`ObjectBase`] bundles the three things every pipeline object needs:
//! an explicit reference count, a modification time drawn from the shared
//! [`Clock`], and a [`Subject`] for observers.
//!
//! Objects live in the pipeline's arenas; the count decides when an arena
//! slot is freed. Ownership edges never form cycles: a node owns its outputs,
//! and an output only keeps a non-owning back-reference to its producer.

pub mod clock;
pub mod observer;

pub use clock::{Clock, TimeStamp};
pub use observer::{Event, EventKind, EventPayload, ObserverTag, Subject};

use crate::pipeline::id::ObjectId;
use std::fmt;
use std::sync::Arc;

/// Result of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other owners remain.
    Retained(u32),
    /// The count reached zero; the `Delete` event has fired and the caller
    /// must deallocate the object.
    Destroyed,
}

/// Reference count, modification time and observers of one object.
pub struct ObjectBase {
    class_name: &'static str,
    clock: Arc<Clock>,
    mtime: TimeStamp,
    reference_count: u32,
    debug: bool,
    subject: Subject,
}

impl ObjectBase {
    /// A new object with one reference (held by its creator) and an mtime
    /// newer than anything stamped before it.
    pub fn new(class_name: &'static str, clock: Arc<Clock>) -> Self {
        let mut mtime = TimeStamp::NEVER;
        mtime.modified(&clock);
        Self {
            class_name,
            clock,
            mtime,
            reference_count: 1,
            debug: false,
            subject: Subject::new(),
        }
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Add one reference. `owner` is only used for diagnostics; `None`
    /// stands for local or external ownership.
    pub fn register(&mut self, owner: Option<ObjectId>) {
        self.reference_count += 1;
        self.log_reference("Registered", owner);
    }

    /// Drop one reference.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero: that is an ownership-contract
    /// violation, not a recoverable condition.
    pub fn unregister(&mut self, owner: Option<ObjectId>) -> Release {
        assert!(
            self.reference_count > 0,
            "{} unregistered with a zero reference count (double release)",
            self.class_name
        );
        self.reference_count -= 1;
        self.log_reference("UnRegistered", owner);

        if self.reference_count == 0 {
            self.subject
                .invoke_event(EventKind::Delete, &EventPayload::None);
            Release::Destroyed
        } else {
            Release::Retained(self.reference_count)
        }
    }

    fn log_reference(&self, action: &str, owner: Option<ObjectId>) {
        let owner = owner.map_or_else(|| "NULL".to_string(), |o| o.to_string());
        if self.debug {
            tracing::debug!(
                "{} {} by {}, ReferenceCount = {}",
                self.class_name,
                action,
                owner,
                self.reference_count
            );
        } else {
            tracing::trace!(
                "{} {} by {}, ReferenceCount = {}",
                self.class_name,
                action,
                owner,
                self.reference_count
            );
        }
    }

    pub fn mtime(&self) -> TimeStamp {
        self.mtime
    }

    /// Advance the modification time and notify `Modified` observers.
    pub fn modified(&mut self) {
        self.mtime.modified(&self.clock);
        self.subject
            .invoke_event(EventKind::Modified, &EventPayload::None);
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn add_observer<F>(&self, kind: EventKind, priority: f32, callback: F) -> ObserverTag
    where
        F: FnMut(&Event<'_>) + 'static,
    {
        self.subject.add_observer(kind, priority, callback)
    }

    pub fn remove_observer(&self, tag: ObserverTag) -> bool {
        self.subject.remove_observer(tag)
    }

    pub fn remove_observers(&self, kind: EventKind) {
        self.subject.remove_observers(kind)
    }

    pub fn has_observer(&self, kind: EventKind) -> bool {
        self.subject.has_observer(kind)
    }

    pub fn invoke_event(&self, kind: EventKind, payload: &EventPayload) -> bool {
        self.subject.invoke_event(kind, payload)
    }
}

impl fmt::Debug for ObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBase")
            .field("class_name", &self.class_name)
            .field("mtime", &self.mtime)
            .field("reference_count", &self.reference_count)
            .field("observers", &self.subject)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::NodeId;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_new_object_is_fresh() {
        let clock = Clock::shared();
        let before = clock.tick();
        let obj = ObjectBase::new("Test", clock.clone());
        assert_eq!(obj.reference_count(), 1);
        assert!(obj.mtime().get() > before);
    }

    #[test]
    fn test_register_unregister_pairs() {
        let mut obj = ObjectBase::new("Test", Clock::shared());
        obj.register(Some(ObjectId::Node(NodeId(3))));
        assert_eq!(obj.reference_count(), 2);
        assert_eq!(obj.unregister(Some(ObjectId::Node(NodeId(3)))), Release::Retained(1));
        assert_eq!(obj.unregister(None), Release::Destroyed);
    }

    #[test]
    fn test_delete_event_fires_on_last_release() {
        let mut obj = ObjectBase::new("Test", Clock::shared());
        let fired = Rc::new(Cell::new(0));
        let fired2 = fired.clone();
        obj.add_observer(EventKind::Delete, 0.0, move |_| fired2.set(fired2.get() + 1));

        obj.register(None);
        obj.unregister(None);
        assert_eq!(fired.get(), 0);
        obj.unregister(None);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn test_underflow_panics() {
        let mut obj = ObjectBase::new("Test", Clock::shared());
        obj.unregister(None);
        obj.unregister(None);
    }

    #[test]
    fn test_modified_is_global_and_notifies() {
        let clock = Clock::shared();
        let mut a = ObjectBase::new("A", clock.clone());
        let mut b = ObjectBase::new("B", clock.clone());
        let hits = Rc::new(Cell::new(0));
        let hits2 = hits.clone();
        a.add_observer(EventKind::Modified, 0.0, move |_| hits2.set(hits2.get() + 1));

        a.modified();
        b.modified();
        assert!(b.mtime() > a.mtime());
        a.modified();
        assert!(a.mtime() > b.mtime());
        assert_eq!(hits.get(), 2);
    }
}
