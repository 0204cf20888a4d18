//! Runtime errors for the Quill machine.
//!
//! Every variant carries the 1-based source line of the statement that was
//! running. The first error aborts the script: the machine logs it once,
//! unwinds every frame and scope, and hands it back to the caller.

use quill_common::NativeError;
use quill_compiler::ParseError;
use thiserror::Error;

use crate::control::ControlFault;

/// Errors that occur while a compiled script runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A name that is neither bound nor a registered function.
    #[error("line {line}: unknown identifier '{name}'")]
    UnknownName { line: usize, name: String },

    /// A call to a name with no function behind it.
    #[error("line {line}: unknown function '{name}'")]
    UnknownFunction { line: usize, name: String },

    /// No method of that name for the receiver's type and argument count.
    #[error("line {line}: no method '{name}' for type {type_id} taking {arity} argument(s)")]
    UnknownMethod {
        line: usize,
        name: String,
        type_id: &'static str,
        arity: usize,
    },

    /// The name is bound, but not to a function.
    #[error("line {line}: '{name}' is a {type_id}, not a function")]
    NotCallable {
        line: usize,
        name: String,
        type_id: &'static str,
    },

    /// Argument count outside what the callee accepts.
    #[error("line {line}: '{name}' expects {expected} argument(s), {provided} provided")]
    Arity {
        line: usize,
        name: String,
        expected: String,
        provided: usize,
    },

    /// A native operation failed.
    #[error("line {line}: {name}: {source}")]
    Native {
        line: usize,
        name: String,
        #[source]
        source: NativeError,
    },

    /// Misplaced `else`, `end`, `break` and the like.
    #[error("line {line}: {fault}")]
    Control { line: usize, fault: ControlFault },

    /// A block was still open when its body ran out.
    #[error("line {line}: '{keyword}' is missing its 'end'")]
    MissingEnd { line: usize, keyword: &'static str },

    /// Too many nested calls or scopes.
    #[error("line {line}: recursion limit of {limit} exceeded")]
    RecursionLimit { line: usize, limit: usize },

    /// A value of the wrong type where the machine itself needs one.
    #[error("line {line}: {context} needs {expected}, found {found}")]
    TypeMismatch {
        line: usize,
        context: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// A literal that does not fit any value type.
    #[error("line {line}: invalid literal '{text}'")]
    BadLiteral { line: usize, text: String },

    /// An instruction consumed more results than were produced.
    #[error("line {line}: missing operand")]
    MissingOperand { line: usize },
}

impl RuntimeError {
    /// The source line the error was raised on.
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::UnknownName { line, .. }
            | RuntimeError::UnknownFunction { line, .. }
            | RuntimeError::UnknownMethod { line, .. }
            | RuntimeError::NotCallable { line, .. }
            | RuntimeError::Arity { line, .. }
            | RuntimeError::Native { line, .. }
            | RuntimeError::Control { line, .. }
            | RuntimeError::MissingEnd { line, .. }
            | RuntimeError::RecursionLimit { line, .. }
            | RuntimeError::TypeMismatch { line, .. }
            | RuntimeError::BadLiteral { line, .. }
            | RuntimeError::MissingOperand { line } => *line,
        }
    }
}

/// Failure of a whole compile-and-run pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("{} compile error(s), first: {}", .0.len(), first_message(.0))]
    Compile(Vec<ParseError>),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn first_message(errors: &[ParseError]) -> String {
    errors.first().map(ToString::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = RuntimeError::Arity {
            line: 4,
            name: "add".into(),
            expected: "2".into(),
            provided: 1,
        };
        assert_eq!(e.to_string(), "line 4: 'add' expects 2 argument(s), 1 provided");
        assert_eq!(e.line(), 4);

        let e = RuntimeError::Native {
            line: 2,
            name: "/".into(),
            source: NativeError::DivisionByZero,
        };
        assert_eq!(e.to_string(), "line 2: /: division by zero");

        let e = RuntimeError::Control {
            line: 7,
            fault: ControlFault::OutsideLoop("break"),
        };
        assert_eq!(e.to_string(), "line 7: 'break' outside of a loop");
    }

    #[test]
    fn native_error_is_the_source() {
        use std::error::Error as _;
        let e = RuntimeError::Native {
            line: 1,
            name: "at".into(),
            source: NativeError::IndexOutOfRange { index: 3, size: 2 },
        };
        assert!(e.source().is_some());
    }

    #[test]
    fn script_error_wraps_both_phases() {
        let compile = ScriptError::Compile(vec![ParseError::EmptyExpression { line: 3 }]);
        assert!(compile.to_string().starts_with("1 compile error(s)"));

        let runtime: ScriptError = RuntimeError::MissingOperand { line: 1 }.into();
        assert_eq!(runtime.to_string(), "line 1: missing operand");
    }
}
