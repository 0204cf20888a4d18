//! Shared, reference-counted value cells.
//!
//! An [`Object`] either owns a [`Value`], aliases another object, or is an
//! unresolved placeholder. Aliases always point at an owning cell: creating
//! an alias of an alias resolves the chain first, so reads and writes
//! through any handle reach the same storage in one step.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::NativeError;
use crate::value::Value;

#[derive(Debug)]
enum Payload {
    Owned(Value),
    Aliased(Object),
    Placeholder,
}

#[derive(Debug)]
struct Cell {
    payload: Payload,
    read_only: bool,
}

impl Drop for Cell {
    /// Nested arrays are torn down with a work list instead of one native
    /// stack frame per level.
    fn drop(&mut self) {
        let Payload::Owned(Value::Array(items)) = &mut self.payload else {
            return;
        };
        let mut pending = std::mem::take(items);
        while let Some(object) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(object.0) {
                let mut cell = cell.into_inner();
                if let Payload::Owned(Value::Array(children)) = &mut cell.payload {
                    pending.append(children);
                }
            }
        }
    }
}

/// Handle to a value cell. Cloning the handle shares the cell.
#[derive(Clone)]
pub struct Object(Rc<RefCell<Cell>>);

impl Object {
    fn from_payload(payload: Payload) -> Self {
        Object(Rc::new(RefCell::new(Cell {
            payload,
            read_only: false,
        })))
    }

    /// A fresh object owning `value`.
    pub fn new(value: Value) -> Self {
        Self::from_payload(Payload::Owned(value))
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    /// An object with no value yet. Reads see `null`; the first write
    /// turns it into an owning object.
    pub fn placeholder() -> Self {
        Self::from_payload(Payload::Placeholder)
    }

    /// A new handle that borrows `target`'s storage.
    pub fn alias_of(target: &Object) -> Self {
        Self::from_payload(Payload::Aliased(target.resolve()))
    }

    /// The cell that actually stores the value behind this handle.
    pub fn resolve(&self) -> Object {
        let next = match &self.0.borrow().payload {
            Payload::Aliased(target) => target.clone(),
            _ => return self.clone(),
        };
        next.resolve()
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.0.borrow().payload, Payload::Aliased(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.resolve().0.borrow().payload, Payload::Placeholder)
    }

    /// True if both handles reach the same storage.
    pub fn same_storage(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.resolve().0, &other.resolve().0)
    }

    pub fn is_read_only(&self) -> bool {
        self.resolve().0.borrow().read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.resolve().0.borrow_mut().read_only = read_only;
    }

    /// A shallow clone of the stored value. Array elements stay shared.
    pub fn value(&self) -> Value {
        self.with_value(Value::clone)
    }

    /// Run `f` against the stored value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        let owner = self.resolve();
        let cell = owner.0.borrow();
        match &cell.payload {
            Payload::Owned(value) => f(value),
            _ => f(&Value::Null),
        }
    }

    /// Mutate the stored value in place. A placeholder becomes `null` first.
    pub fn with_value_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Result<R, NativeError> {
        let owner = self.resolve();
        let mut cell = owner.0.borrow_mut();
        if cell.read_only {
            return Err(NativeError::ReadOnly);
        }
        if !matches!(cell.payload, Payload::Owned(_)) {
            cell.payload = Payload::Owned(Value::Null);
        }
        match &mut cell.payload {
            Payload::Owned(value) => Ok(f(value)),
            _ => Err(NativeError::ReadOnly),
        }
    }

    /// Replace the stored value. Writes go through aliases to the owner.
    pub fn set(&self, value: Value) -> Result<(), NativeError> {
        self.with_value_mut(|slot| *slot = value)
    }

    /// A fresh owning object whose payload shares nothing with `self`.
    pub fn deep_copy(&self) -> Object {
        Object::new(self.with_value(Value::deep_copy))
    }

    /// Store `value` in a freshly made object, ignoring `read_only`.
    pub(crate) fn fill(&self, value: Value) {
        self.0.borrow_mut().payload = Payload::Owned(value);
    }

    pub fn type_id(&self) -> &'static str {
        self.with_value(Value::type_id)
    }

    pub fn is_truthy(&self) -> bool {
        self.with_value(Value::is_truthy)
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::null()
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Object::new(value)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.borrow().payload {
            Payload::Owned(_) => "owned",
            Payload::Aliased(_) => "alias",
            Payload::Placeholder => return f.write_str("Object(placeholder)"),
        };
        write!(f, "Object({kind} {:?})", self.value())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_value(|v| write!(f, "{v}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_through_alias_is_visible_in_original() {
        let original = Object::new(Value::Int(1));
        let alias = Object::alias_of(&original);
        alias.set(Value::Int(2)).unwrap();
        assert_eq!(original.value(), Value::Int(2));
        assert!(alias.is_alias());
        assert!(alias.same_storage(&original));
    }

    #[test]
    fn write_to_original_is_visible_in_alias() {
        let original = Object::new(Value::from("a"));
        let alias = Object::alias_of(&original);
        original.set(Value::from("b")).unwrap();
        assert_eq!(alias.value(), Value::from("b"));
    }

    #[test]
    fn alias_of_alias_points_at_owner() {
        let owner = Object::new(Value::Int(1));
        let first = Object::alias_of(&owner);
        let second = Object::alias_of(&first);
        second.set(Value::Int(5)).unwrap();
        assert_eq!(owner.value(), Value::Int(5));
        assert_eq!(first.value(), Value::Int(5));
    }

    #[test]
    fn deep_copy_is_independent() {
        let inner = Object::new(Value::Int(1));
        let original = Object::new(Value::Array(vec![inner.clone()]));
        let copy = original.deep_copy();
        assert!(!copy.same_storage(&original));
        inner.set(Value::Int(7)).unwrap();
        match copy.value() {
            Value::Array(items) => assert_eq!(items[0].value(), Value::Int(1)),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn dropping_deeply_nested_array_does_not_recurse() {
        let mut object = Object::new(Value::Int(0));
        for _ in 0..200_000 {
            object = Object::new(Value::Array(vec![object]));
        }
        drop(object);
    }

    #[test]
    fn shared_element_survives_parent_drop() {
        let shared = Object::new(Value::Array(vec![Object::new(Value::Int(4))]));
        let parent = Object::new(Value::Array(vec![shared.clone()]));
        drop(parent);
        assert_eq!(shared.value(), Value::Array(vec![Object::new(Value::Int(4))]));
    }

    #[test]
    fn placeholder_reads_null_and_becomes_owned() {
        let p = Object::placeholder();
        assert!(p.is_placeholder());
        assert_eq!(p.value(), Value::Null);
        p.set(Value::Int(3)).unwrap();
        assert!(!p.is_placeholder());
        assert_eq!(p.value(), Value::Int(3));
    }

    #[test]
    fn read_only_rejects_writes_through_alias() {
        let owner = Object::new(Value::from("__main__"));
        owner.set_read_only(true);
        let alias = Object::alias_of(&owner);
        assert_eq!(alias.set(Value::Null), Err(NativeError::ReadOnly));
        assert_eq!(owner.value(), Value::from("__main__"));
    }
}
