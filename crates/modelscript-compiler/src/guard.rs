//! Circular-reference guards.
//!
//! A [`RefGuard`] is an ordered set used as a push/pop stack: compilation
//! enters an identifier before descending into its body and leaves it on
//! the way out, error path included. Finding the identifier already present
//! on enter is a circular reference.
//!
//! Two independent guards exist per compile context, one for grouping
//! expansion and one for typedef base-type chains, because a module may
//! legally have a grouping and a typedef share a name.

use indexmap::IndexSet;

use modelscript_core::error::{CompileError, RefKind};

use crate::path::PathTracker;

/// Ordered guard set detecting circular references.
#[derive(Debug)]
pub struct RefGuard {
    kind: RefKind,
    active: IndexSet<String>,
}

impl RefGuard {
    /// Create a guard for the given reference kind.
    pub fn new(kind: RefKind) -> Self {
        Self {
            kind,
            active: IndexSet::new(),
        }
    }

    /// Enter an identifier before compiling its body.
    ///
    /// Fails with [`CompileError::CircularReference`] if the identifier is
    /// already being compiled; every successful enter must be matched by
    /// exactly one [`leave`](Self::leave).
    pub fn enter(&mut self, id: &str, path: &PathTracker) -> Result<(), CompileError> {
        if !self.active.insert(id.to_string()) {
            return Err(CompileError::CircularReference {
                kind: self.kind,
                name: id.to_string(),
                path: path.render(),
            });
        }
        Ok(())
    }

    /// Leave an identifier, unconditionally.
    pub fn leave(&mut self, id: &str) {
        self.active.shift_remove(id);
    }

    /// Whether the identifier is currently being compiled.
    pub fn contains(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Number of identifiers currently entered.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether the guard is fully unwound.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
