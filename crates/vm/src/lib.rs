//! Quill machine: runs compiled scripts.
//!
//! The machine is a loop over statements with no host recursion:
//! - Each call gets a [`Frame`] with its own cursor, result stack and
//!   [`ControlState`](control::ControlState); calling pushes a frame,
//!   returning pops it
//! - Bindings live on one scope stack shared by all frames
//! - A self-call in tail position reuses the running frame
//!
//! # Usage
//!
//! ```
//! use quill_common::Value;
//! use quill_vm::run_source;
//!
//! let result = run_source("def add(a, b)\n  return a + b\nend\nadd(2, 3)\n").unwrap();
//! assert_eq!(result, Value::Int(5));
//! ```

pub mod builtins;
pub mod call;
pub mod control;
pub mod error;
pub mod execute;
pub mod machine;
pub mod scope;

pub use call::is_tail_call;
pub use control::{ControlFault, ControlState, Mode, Sequence};
pub use error::{RuntimeError, ScriptError};
pub use machine::{Frame, Machine, MachineConfig};

use std::sync::Arc;

use quill_common::{Registry, Value};
use quill_compiler::compile_source;

/// A registry holding the full native library.
pub fn default_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    builtins::install(&mut registry);
    Arc::new(registry)
}

/// Compile and run `source` with the default registry and limits.
///
/// # Errors
///
/// [`ScriptError::Compile`] with every compile error when the source does
/// not compile, or [`ScriptError::Runtime`] with the first runtime error.
pub fn run_source(source: &str) -> Result<Value, ScriptError> {
    let registry = default_registry();
    let script = compile_source(source, &registry).map_err(ScriptError::Compile)?;
    let mut machine = Machine::new(registry);
    machine.load(&script);
    Ok(machine.run()?)
}
