//! Prioritized observer lists.
//!
//! A [`Subject`] keeps observers ordered by descending priority. Dispatch is
//! robust against callbacks that add or remove observers on the same subject
//! while an event is being delivered: every observer is called at most once
//! per invocation, and a change to the list restarts the walk from the head.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Kinds of events a subject can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// Wildcard: an observer registered for `Any` receives every event.
    Any,
    Modified,
    /// Fired right before an object is deallocated.
    Delete,
    /// A node is about to execute.
    Start,
    /// A node finished executing (successfully or not).
    End,
    Progress,
    /// A node is about to recompute its output metadata.
    ExecuteInformation,
    /// A node's output list changed.
    SetOutput,
    Error,
    User(u32),
}

impl EventKind {
    /// Whether an observer registered for `self` should receive `event`.
    #[inline]
    pub fn accepts(self, event: EventKind) -> bool {
        self == EventKind::Any || self == event
    }
}

/// Data attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventPayload {
    None,
    Progress(f64),
    Output { index: usize },
    Message(String),
}

/// Opaque handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObserverTag(pub u64);

impl fmt::Display for ObserverTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// View handed to an observer callback.
pub struct Event<'a> {
    kind: EventKind,
    payload: &'a EventPayload,
    subject: &'a Subject,
    abort: &'a Cell<bool>,
}

impl<'a> Event<'a> {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        self.payload
    }

    /// The subject delivering this event. Observers may add or remove
    /// observers through it while the event is in flight.
    pub fn subject(&self) -> &Subject {
        self.subject
    }

    /// Stop delivering this event to the remaining observers.
    pub fn abort(&self) {
        self.abort.set(true);
    }
}

type Callback = Rc<RefCell<dyn FnMut(&Event<'_>)>>;

struct Observer {
    tag: ObserverTag,
    kind: EventKind,
    priority: f32,
    callback: Callback,
}

/// An ordered list of observers plus the dispatch algorithm.
pub struct Subject {
    observers: RefCell<Vec<Observer>>,
    next_tag: Cell<u64>,
    /// Bumped on every list change. Each dispatch compares against its own
    /// snapshot so nested dispatches cannot hide a change from outer ones.
    generation: Cell<u64>,
}

impl Subject {
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            next_tag: Cell::new(1),
            generation: Cell::new(0),
        }
    }

    /// Register `callback` for events of `kind`. Higher priorities run first;
    /// equal priorities run in registration order.
    pub fn add_observer<F>(&self, kind: EventKind, priority: f32, callback: F) -> ObserverTag
    where
        F: FnMut(&Event<'_>) + 'static,
    {
        let tag = ObserverTag(self.next_tag.get());
        self.next_tag.set(tag.0 + 1);

        let mut list = self.observers.borrow_mut();
        let pos = list
            .iter()
            .position(|o| o.priority < priority)
            .unwrap_or(list.len());
        list.insert(
            pos,
            Observer {
                tag,
                kind,
                priority,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        self.bump_generation();
        tag
    }

    /// Remove the observer with `tag`. Returns false if it was not present.
    pub fn remove_observer(&self, tag: ObserverTag) -> bool {
        let mut list = self.observers.borrow_mut();
        let before = list.len();
        list.retain(|o| o.tag != tag);
        let removed = list.len() != before;
        self.bump_generation();
        removed
    }

    /// Remove every observer registered for exactly `kind`.
    pub fn remove_observers(&self, kind: EventKind) {
        self.observers.borrow_mut().retain(|o| o.kind != kind);
        self.bump_generation();
    }

    fn bump_generation(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub fn has_observer(&self, kind: EventKind) -> bool {
        self.observers
            .borrow()
            .iter()
            .any(|o| o.kind.accepts(kind))
    }

    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    /// Deliver an event. Returns true if an observer aborted the dispatch.
    pub fn invoke_event(&self, kind: EventKind, payload: &EventPayload) -> bool {
        let mut seen = self.generation.get();
        let mut visited: HashSet<ObserverTag> = HashSet::new();
        let mut index = 0;

        loop {
            let (tag, accepts, callback) = {
                let list = self.observers.borrow();
                match list.get(index) {
                    Some(o) => (o.tag, o.kind.accepts(kind), o.callback.clone()),
                    None => break,
                }
            };

            if accepts && visited.insert(tag) {
                let abort = Cell::new(false);
                let event = Event {
                    kind,
                    payload,
                    subject: self,
                    abort: &abort,
                };
                match callback.try_borrow_mut() {
                    Ok(mut f) => (*f)(&event),
                    // The same callback is already running further up the stack.
                    Err(_) => tracing::trace!("{} re-entered, skipped", tag),
                }
                if abort.get() {
                    return true;
                }
            }

            let current = self.generation.get();
            if current != seen {
                seen = current;
                index = 0;
            } else {
                index += 1;
            }
        }
        false
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self.observers.borrow();
        f.debug_list()
            .entries(list.iter().map(|o| (o.tag, o.kind, o.priority)))
            .finish()
    }
}
