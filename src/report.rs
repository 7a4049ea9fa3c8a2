//! What happened during a pass.
//!
//! Snapshot and restore passes keep going when a single object can't be
//! handled. Everything that was skipped, cut short or didn't come back the
//! same is collected in a `PassReport` for the caller.

use std::fmt;

use gleam::gl::GLuint;

use crate::namespace::Namespace;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The object was left out of the pass entirely.
    Excluded,
    /// The object was restored, but the live context couldn't hold all of
    /// its state.
    Downgraded,
    /// Restoring the object failed; anything created for it was rolled back.
    Failed,
    /// The restored object doesn't match its record.
    Mismatch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// `None` for context-wide state such as the current vertex attributes.
    pub namespace: Option<Namespace>,
    pub handle: GLuint,
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let what = match self.kind {
            EventKind::Excluded => "excluded",
            EventKind::Downgraded => "downgraded",
            EventKind::Failed => "failed",
            EventKind::Mismatch => "mismatch",
        };
        match self.namespace {
            Some(ns) => write!(fmt, "{}: {} {}: {}", what, ns, self.handle, self.message),
            None => write!(fmt, "{}: context state: {}", what, self.message),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PassReport {
    events: Vec<Event>,
    /// The number of records the pass handled successfully.
    pub succeeded: usize,
}

impl PassReport {
    pub fn new() -> PassReport {
        PassReport::default()
    }

    pub fn push<S: Into<String>>(
        &mut self,
        kind: EventKind,
        namespace: Option<Namespace>,
        handle: GLuint,
        message: S,
    ) {
        self.events.push(Event {
            kind,
            namespace,
            handle,
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// True if `(namespace, handle)` has an event of `kind`.
    pub fn has(&self, kind: EventKind, namespace: Option<Namespace>, handle: GLuint) -> bool {
        self.of_kind(kind)
            .any(|e| e.namespace == namespace && e.handle == handle)
    }

    pub fn is_clean(&self) -> bool {
        self.events.is_empty()
    }

    pub fn merge(&mut self, other: PassReport) {
        self.events.extend(other.events);
        self.succeeded += other.succeeded;
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(fmt, "{} objects ok, {} events", self.succeeded, self.events.len())?;
        for event in &self.events {
            writeln!(fmt, "  {}", event)?;
        }
        Ok(())
    }
}
