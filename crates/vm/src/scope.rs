//! The scope stack shared by every frame of a run.
//!
//! Scope 0 is the global scope and is never popped. Each frame owns the
//! scopes from its `base` upward; lookups search those first, innermost
//! first.

use quill_common::{ClosureRecord, Object};
use rustc_hash::FxHashMap;

/// Name to object bindings of one block or call.
pub type Scope = FxHashMap<String, Object>;

#[derive(Debug)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// A stack holding only the global scope.
    pub fn new() -> Self {
        Self {
            stack: vec![Scope::default()],
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push(&mut self) {
        self.stack.push(Scope::default());
    }

    /// Pop the innermost scope. The global scope stays.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Drop every scope at index `len` and above, keeping the global scope.
    pub fn truncate(&mut self, len: usize) {
        self.stack.truncate(len.max(1));
    }

    /// Remove every binding of the innermost scope.
    pub fn clear_innermost(&mut self) {
        if let Some(scope) = self.stack.last_mut() {
            scope.clear();
        }
    }

    /// Bind `name` in the innermost scope, replacing any binding there.
    pub fn declare(&mut self, name: impl Into<String>, object: Object) {
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(name.into(), object);
        }
    }

    /// Bind `name` in the scope at `index`, replacing any binding there.
    pub fn declare_at(&mut self, index: usize, name: impl Into<String>, object: Object) {
        if let Some(scope) = self.stack.get_mut(index) {
            scope.insert(name.into(), object);
        }
    }

    /// The binding of `name` in the innermost scope only.
    pub fn innermost(&self, name: &str) -> Option<&Object> {
        self.stack.last().and_then(|scope| scope.get(name))
    }

    /// Search scopes `base..`, innermost first.
    pub fn find_from(&self, base: usize, name: &str) -> Option<&Object> {
        self.stack
            .get(base..)
            .and_then(|scopes| scopes.iter().rev().find_map(|s| s.get(name)))
    }

    /// Search scopes `..base`, innermost first.
    pub fn find_below(&self, base: usize, name: &str) -> Option<&Object> {
        let end = base.min(self.stack.len());
        self.stack[..end].iter().rev().find_map(|s| s.get(name))
    }

    /// Deep copies of every binding in scopes `base..`, inner bindings
    /// shadowing outer ones, layered over `inherited`.
    pub fn snapshot(&self, base: usize, inherited: Option<&ClosureRecord>) -> ClosureRecord {
        let mut record: ClosureRecord = inherited
            .map(|r| {
                r.iter()
                    .map(|(name, object)| (name.clone(), object.deep_copy()))
                    .collect()
            })
            .unwrap_or_default();
        for scope in self.stack.get(base..).unwrap_or(&[]) {
            for (name, object) in scope {
                record.insert(name.clone(), object.deep_copy());
            }
        }
        record
    }
}
