//! Process-wide table of callables.
//!
//! Entries are keyed by name, then by receiver type domain, then selected
//! by arity. A lookup with a type domain that has no matching entry falls
//! back to the domain-less (free function) entry of the same name, with
//! the receiver passed as the first argument.
//!
//! The registry is populated once at startup and shared read-only after
//! that, typically behind an `Arc`.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::interface::{ArgumentMode, Interface, NativeFn};

type DomainTable = FxHashMap<Option<String>, Vec<Arc<Interface>>>;

#[derive(Debug, Default)]
pub struct Registry {
    entries: FxHashMap<String, DomainTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native operation and return its shared descriptor.
    pub fn register_native(
        &mut self,
        id: &str,
        mode: ArgumentMode,
        domain: Option<&str>,
        params: &[&str],
        function: NativeFn,
    ) -> Arc<Interface> {
        self.register(Interface::native(id, mode, domain, params, function))
    }

    /// Register any interface. Later registrations with an overlapping
    /// arity range are only reached when earlier ones do not accept.
    pub fn register(&mut self, interface: Interface) -> Arc<Interface> {
        let interface = Arc::new(interface);
        self.entries
            .entry(interface.id.clone())
            .or_default()
            .entry(interface.domain.clone())
            .or_default()
            .push(Arc::clone(&interface));
        interface
    }

    /// Find the interface for `name` in `domain` accepting `arity` arguments.
    pub fn lookup(&self, name: &str, domain: Option<&str>, arity: usize) -> Option<Arc<Interface>> {
        let table = self.entries.get(name)?;
        let find = |key: Option<&str>| {
            table
                .get(&key.map(str::to_string))
                .and_then(|list| list.iter().find(|i| i.accepts(arity)))
                .cloned()
        };
        match domain {
            Some(_) => find(domain).or_else(|| find(None)),
            None => find(None),
        }
    }

    /// Every interface registered under `name` in `domain`, in
    /// registration order. Used to report arity mismatches.
    pub fn candidates(&self, name: &str, domain: Option<&str>) -> &[Arc<Interface>] {
        self.entries
            .get(name)
            .and_then(|table| table.get(&domain.map(str::to_string)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if `name` has a free (domain-less) entry.
    pub fn has_free(&self, name: &str) -> bool {
        !self.candidates(name, None).is_empty()
    }

    /// True if `name` is registered in any domain.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::interface::{Bindings, Reply};
    use crate::value::Value;

    fn one(_: &mut Bindings<'_>) -> Result<Reply, NativeError> {
        Reply::value(Value::Int(1))
    }

    fn two(_: &mut Bindings<'_>) -> Result<Reply, NativeError> {
        Reply::value(Value::Int(2))
    }

    #[test]
    fn lookup_by_arity() {
        let mut reg = Registry::new();
        reg.register_native("f", ArgumentMode::Fixed, None, &["a"], one);
        reg.register_native("f", ArgumentMode::Fixed, None, &["a", "b"], two);
        assert_eq!(reg.lookup("f", None, 1).map(|i| i.params.len()), Some(1));
        assert_eq!(reg.lookup("f", None, 2).map(|i| i.params.len()), Some(2));
        assert!(reg.lookup("f", None, 3).is_none());
        assert_eq!(reg.candidates("f", None).len(), 2);
    }

    #[test]
    fn domain_takes_priority() {
        let mut reg = Registry::new();
        reg.register_native("size", ArgumentMode::Fixed, None, &["x"], one);
        reg.register_native("size", ArgumentMode::Fixed, Some("array"), &["self"], two);
        let method = reg.lookup("size", Some("array"), 1).unwrap();
        assert_eq!(method.domain.as_deref(), Some("array"));
    }

    #[test]
    fn missing_domain_falls_back_to_free_entry() {
        let mut reg = Registry::new();
        reg.register_native("show", ArgumentMode::Fixed, None, &["x"], one);
        let found = reg.lookup("show", Some("int"), 1).unwrap();
        assert!(found.domain.is_none());
    }

    #[test]
    fn unknown_name() {
        let reg = Registry::new();
        assert!(reg.lookup("nope", None, 0).is_none());
        assert!(!reg.contains("nope"));
        assert!(reg.candidates("nope", Some("int")).is_empty());
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
