//! Runtime value representation.
//!
//! A [`Value`] is the payload an owning [`Object`] holds. Arrays store their
//! elements as objects so a subscript can hand out an alias to one element.

use std::fmt;
use std::sync::Arc;

use crate::interface::FunctionValue;
use crate::object::Object;
use crate::token::TokenKind;

/// Type identifiers used for dispatch. Method lookups key on these strings.
pub mod type_ids {
    pub const NULL: &str = "null";
    pub const BOOL: &str = "bool";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const STRING: &str = "string";
    pub const ARRAY: &str = "array";
    pub const FUNCTION: &str = "function";
}

/// Dynamically typed payload.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The empty value. Unbound optional parameters and bare `var`
    /// declarations start out as this.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Object>),
    Function(FunctionValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => arrays_equal(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.interface, &b.interface),
            _ => false,
        }
    }
}

/// Element-wise equality, walking nested arrays with a work list.
fn arrays_equal(a: &[Object], b: &[Object]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut pending: Vec<(Object, Object)> = a.iter().cloned().zip(b.iter().cloned()).collect();
    while let Some((x, y)) = pending.pop() {
        match (x.value(), y.value()) {
            (Value::Array(xs), Value::Array(ys)) => {
                if xs.len() != ys.len() {
                    return false;
                }
                pending.extend(xs.into_iter().zip(ys));
            }
            (x, y) => {
                if x != y {
                    return false;
                }
            }
        }
    }
    true
}

impl Value {
    /// The runtime type identifier used for method dispatch.
    pub fn type_id(&self) -> &'static str {
        match self {
            Value::Null => type_ids::NULL,
            Value::Bool(_) => type_ids::BOOL,
            Value::Int(_) => type_ids::INT,
            Value::Float(_) => type_ids::FLOAT,
            Value::Str(_) => type_ids::STRING,
            Value::Array(_) => type_ids::ARRAY,
            Value::Function(_) => type_ids::FUNCTION,
        }
    }

    /// Truthiness as seen by `if`, `elif` and `while`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Function(_) => true,
        }
    }

    /// Copy that shares no storage with `self`. Array elements are copied
    /// into fresh objects; function values share their immutable interface.
    ///
    /// Nested arrays are copied level by level from a work list, so the
    /// nesting depth does not grow the native stack.
    pub fn deep_copy(&self) -> Value {
        let Value::Array(items) = self else {
            return self.clone();
        };
        fn fresh_for(source: &Object, pending: &mut Vec<(Object, Object)>) -> Object {
            let target = Object::null();
            pending.push((source.clone(), target.clone()));
            target
        }

        let mut pending: Vec<(Object, Object)> = Vec::new();
        let copy = items.iter().map(|item| fresh_for(item, &mut pending)).collect();
        while let Some((source, target)) = pending.pop() {
            let value = match source.value() {
                Value::Array(children) => Value::Array(
                    children
                        .iter()
                        .map(|child| fresh_for(child, &mut pending))
                        .collect(),
                ),
                other => other,
            };
            target.fill(value);
        }
        Value::Array(copy)
    }

    /// Materialize a literal token. Returns `None` when a number literal
    /// does not fit any numeric type or an identifier is not a literal name.
    pub fn from_literal(text: &str, kind: TokenKind) -> Option<Value> {
        match kind {
            TokenKind::StringLiteral => Some(Value::Str(text.to_string())),
            TokenKind::NumberLiteral => {
                if text.contains('.') {
                    text.parse().ok().map(Value::Float)
                } else {
                    text.parse().ok().map(Value::Int)
                }
            }
            TokenKind::Identifier => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                "null" => Some(Value::Null),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render an array. Nested arrays are walked with an explicit stack;
    /// strings inside arrays are quoted.
    fn fmt_array(items: &[Object], f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack: Vec<(Vec<Object>, usize)> = vec![(items.to_vec(), 0)];
        f.write_str("[")?;
        while let Some((items, next)) = stack.last_mut() {
            let Some(item) = items.get(*next).cloned() else {
                f.write_str("]")?;
                stack.pop();
                continue;
            };
            if *next > 0 {
                f.write_str(", ")?;
            }
            *next += 1;
            match item.value() {
                Value::Array(inner) => {
                    f.write_str("[")?;
                    stack.push((inner, 0));
                }
                Value::Str(s) => write!(f, "'{s}'")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => Value::fmt_array(items, f),
            Value::Function(func) => write!(f, "<function {}>", func.interface.id),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
