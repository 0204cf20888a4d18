//! Callable descriptors and the native call boundary.

use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::NativeError;
use crate::instruction::{Code, Signature};
use crate::object::Object;

/// How call-site arguments map onto declared parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentMode {
    /// Exactly one argument per parameter.
    Fixed,
    /// At least `min` arguments; missing trailing parameters bind `null`.
    Optional { min: usize },
    /// At least one argument per parameter; the last parameter collects
    /// every remaining argument into an array.
    Variadic,
}

/// Signature of a native operation.
pub type NativeFn = fn(&mut Bindings<'_>) -> Result<Reply, NativeError>;

/// What runs when an interface is called.
#[derive(Clone)]
pub enum Body {
    Native(NativeFn),
    User(Arc<Code>),
}

/// A callable descriptor. Immutable once registered.
#[derive(Clone)]
pub struct Interface {
    pub id: String,
    /// Receiver type for methods, `None` for free functions.
    pub domain: Option<String>,
    pub params: Vec<String>,
    pub mode: ArgumentMode,
    pub body: Body,
}

impl Interface {
    pub fn native(
        id: &str,
        mode: ArgumentMode,
        domain: Option<&str>,
        params: &[&str],
        function: NativeFn,
    ) -> Self {
        Self {
            id: id.to_string(),
            domain: domain.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            mode,
            body: Body::Native(function),
        }
    }

    /// A user-defined function compiled from a `def` block.
    pub fn user(signature: &Signature, body: Arc<Code>) -> Self {
        Self {
            id: signature.name.clone(),
            domain: None,
            params: signature.params.clone(),
            mode: signature.mode,
            body: Body::User(body),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, Body::Native(_))
    }

    pub fn min_arity(&self) -> usize {
        match self.mode {
            ArgumentMode::Fixed | ArgumentMode::Variadic => self.params.len(),
            ArgumentMode::Optional { min } => min,
        }
    }

    /// `None` when the interface takes any number of trailing arguments.
    pub fn max_arity(&self) -> Option<usize> {
        match self.mode {
            ArgumentMode::Fixed | ArgumentMode::Optional { .. } => Some(self.params.len()),
            ArgumentMode::Variadic => None,
        }
    }

    pub fn accepts(&self, provided: usize) -> bool {
        provided >= self.min_arity() && self.max_arity().map_or(true, |max| provided <= max)
    }

    /// Human-readable argument count requirement.
    pub fn expected_arity(&self) -> String {
        match (self.min_arity(), self.max_arity()) {
            (min, Some(max)) if min == max => min.to_string(),
            (min, Some(max)) => format!("{min} to {max}"),
            (min, None) => format!("at least {min}"),
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("params", &self.params)
            .field("mode", &self.mode)
            .field("native", &self.is_native())
            .finish()
    }
}

/// Bindings captured when a nested `def` runs, looked up before the
/// caller's scopes.
pub type ClosureRecord = FxHashMap<String, Object>;

/// A function as a first-class value.
#[derive(Clone)]
pub struct FunctionValue {
    pub interface: Arc<Interface>,
    pub closure: Option<Rc<ClosureRecord>>,
}

impl FunctionValue {
    pub fn new(interface: Arc<Interface>) -> Self {
        Self {
            interface,
            closure: None,
        }
    }

    pub fn with_closure(interface: Arc<Interface>, record: ClosureRecord) -> Self {
        Self {
            interface,
            closure: Some(Rc::new(record)),
        }
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("id", &self.interface.id)
            .field("closure", &self.closure.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// Result of a native call.
#[derive(Debug)]
pub enum Reply {
    Value(Object),
    /// Non-fatal: the machine logs `detail` and continues with `object`.
    Warning { object: Object, detail: String },
    /// Redirect: the machine calls `function` with `args` in place of the
    /// native, as if the instruction had named it directly.
    Invoke {
        function: FunctionValue,
        args: Vec<Object>,
    },
}

impl Reply {
    pub fn value(value: impl Into<crate::value::Value>) -> Result<Reply, NativeError> {
        Ok(Reply::Value(Object::new(value.into())))
    }
}

/// Arguments handed to a native, addressable by position or parameter name.
pub struct Bindings<'a> {
    interface: &'a Interface,
    args: Vec<Object>,
    out: &'a mut dyn Write,
}

impl<'a> Bindings<'a> {
    pub fn new(interface: &'a Interface, args: Vec<Object>, out: &'a mut dyn Write) -> Self {
        Self {
            interface,
            args,
            out,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Object] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Result<&Object, NativeError> {
        self.args.get(index).ok_or_else(|| {
            NativeError::Fatal(format!(
                "{}: missing argument {}",
                self.interface.id,
                index + 1
            ))
        })
    }

    /// Look an argument up by its declared parameter name.
    pub fn get(&self, name: &str) -> Option<&Object> {
        let index = self.interface.params.iter().position(|p| p == name)?;
        self.args.get(index)
    }

    pub fn int(&self, index: usize) -> Result<i64, NativeError> {
        self.arg(index)?.with_value(|v| match v {
            crate::value::Value::Int(n) => Ok(*n),
            other => Err(NativeError::Type {
                expected: crate::value::type_ids::INT,
                found: other.type_id(),
            }),
        })
    }

    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    pub fn into_args(self) -> Vec<Object> {
        self.args
    }
}
