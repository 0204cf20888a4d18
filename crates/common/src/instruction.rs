//! Compiled statement form.
//!
//! Each logical source line compiles to one [`Statement`]: an ordered list
//! of [`Instruction`]s evaluated left to right. An instruction names its
//! callee and lists where each argument comes from. Results of earlier
//! instructions are consumed through [`Argument::StackTop`].

use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::interface::{ArgumentMode, Interface};
use crate::token::TokenKind;

/// Where an instruction argument comes from at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Argument {
    /// Raw literal text, materialized into a fresh object on each execution.
    Literal { text: String, kind: TokenKind },
    /// A binding looked up by name in the active scope chain.
    ObjectRef(String),
    /// The most recent result on the frame's return stack.
    StackTop,
}

impl Argument {
    pub fn literal(text: impl Into<String>, kind: TokenKind) -> Self {
        Argument::Literal {
            text: text.into(),
            kind,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Argument::ObjectRef(name.into())
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Literal {
                text,
                kind: TokenKind::StringLiteral,
            } => write!(f, "'{}'", text.replace('\\', "\\\\").replace('\'', "\\'")),
            Argument::Literal { text, .. } => f.write_str(text),
            Argument::ObjectRef(name) => write!(f, "%{name}"),
            Argument::StackTop => f.write_str("$"),
        }
    }
}

/// Lookup key for a callee resolved at first execution.
///
/// `arity` counts every argument, the receiver included. When `receiver`
/// is set the first argument's runtime type selects the registry domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub name: String,
    pub receiver: bool,
    pub arity: usize,
}

/// What an instruction calls.
#[derive(Debug, Clone)]
pub enum Callee {
    Command(Command),
    /// Registry entry found at compile time.
    Resolved(Arc<Interface>),
    /// Method or user function looked up when the instruction runs.
    Deferred(LookupKey),
}

impl PartialEq for Callee {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callee::Command(a), Callee::Command(b)) => a == b,
            (Callee::Resolved(a), Callee::Resolved(b)) => Arc::ptr_eq(a, b),
            (Callee::Deferred(a), Callee::Deferred(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Callee {}

/// One callable reference plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub callee: Callee,
    pub args: Vec<Argument>,
}

impl Instruction {
    pub fn command(command: Command, args: Vec<Argument>) -> Self {
        Self {
            callee: Callee::Command(command),
            args,
        }
    }

    /// The command this instruction runs, if it is one.
    pub fn as_command(&self) -> Option<Command> {
        match self.callee {
            Callee::Command(c) => Some(c),
            _ => None,
        }
    }

    /// The name used to look the callee up, for messages and tail-call checks.
    pub fn callee_name(&self) -> &str {
        match &self.callee {
            Callee::Command(c) => c.keyword(),
            Callee::Resolved(interface) => &interface.id,
            Callee::Deferred(key) => &key.name,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.callee {
            Callee::Command(c) => f.write_str(c.keyword())?,
            Callee::Resolved(interface) => write!(f, "call {}", interface.id)?,
            Callee::Deferred(key) if key.receiver => {
                write!(f, "method {}/{}", key.name, key.arity)?
            }
            Callee::Deferred(key) => write!(f, "lookup {}/{}", key.name, key.arity)?,
        }
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

/// Header of a `def` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<String>,
    pub mode: ArgumentMode,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        let optional_from = match self.mode {
            ArgumentMode::Optional { min } => min,
            _ => usize::MAX,
        };
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if i >= optional_from {
                f.write_str("optional ")?;
            }
            if self.mode == ArgumentMode::Variadic && i + 1 == self.params.len() {
                f.write_str("variable ")?;
            }
            f.write_str(param)?;
        }
        f.write_str(")")
    }
}

/// One compiled logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based source line the statement starts on.
    pub line: usize,
    /// The keyword command heading this statement, if any.
    pub head: Option<Command>,
    pub instructions: Vec<Instruction>,
    /// Present on `def` statements.
    pub signature: Option<Signature>,
}

impl Statement {
    pub fn new(line: usize, head: Option<Command>, instructions: Vec<Instruction>) -> Self {
        Self {
            line,
            head,
            instructions,
            signature: None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sig) = &self.signature {
            return writeln!(f, "{:>4}  {sig}", self.line);
        }
        for (i, instr) in self.instructions.iter().enumerate() {
            if i == 0 {
                write!(f, "{:>4}", self.line)?;
            } else {
                f.write_str("    ")?;
            }
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}

/// A compiled body: the top-level script or one function.
pub type Code = Vec<Statement>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_command_with_args() {
        let instr = Instruction::command(
            Command::Set,
            vec![
                Argument::name("a"),
                Argument::literal("1", TokenKind::NumberLiteral),
            ],
        );
        assert_eq!(instr.to_string(), "set %a, 1");
    }

    #[test]
    fn display_deferred_method() {
        let instr = Instruction {
            callee: Callee::Deferred(LookupKey {
                name: "size".into(),
                receiver: true,
                arity: 1,
            }),
            args: vec![Argument::StackTop],
        };
        assert_eq!(instr.to_string(), "method size/1 $");
    }

    #[test]
    fn display_escapes_string_literals() {
        let arg = Argument::literal("it's", TokenKind::StringLiteral);
        assert_eq!(arg.to_string(), "'it\\'s'");
    }

    #[test]
    fn display_signature() {
        let sig = Signature {
            name: "f".into(),
            params: vec!["a".into(), "b".into()],
            mode: ArgumentMode::Optional { min: 1 },
        };
        assert_eq!(sig.to_string(), "def f(a, optional b)");

        let sig = Signature {
            name: "g".into(),
            params: vec!["a".into(), "rest".into()],
            mode: ArgumentMode::Variadic,
        };
        assert_eq!(sig.to_string(), "def g(a, variable rest)");
    }

    #[test]
    fn callee_name() {
        let instr = Instruction::command(Command::End, vec![]);
        assert_eq!(instr.callee_name(), "end");
        assert_eq!(instr.as_command(), Some(Command::End));
    }
}
