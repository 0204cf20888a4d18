//! Quill compiler: source text to compiled statements.
//!
//! Each logical line compiles independently into a [`Statement`]. Errors
//! are collected per statement; a script with any error is rejected as a
//! whole. Top-level `def ... end` blocks are lifted out of the statement
//! list into [`FunctionDef`]s so the machine can bind them before the
//! script starts. A `def` nested inside a function body stays in place and
//! becomes a closure when the body runs.
//!
//! # Usage
//!
//! ```
//! use quill_common::Registry;
//! use quill_compiler::compile_source;
//!
//! let registry = Registry::new();
//! let script = compile_source("def twice(x)\n  return x\nend\ntwice(3)\n", &registry).unwrap();
//! assert_eq!(script.functions.len(), 1);
//! assert_eq!(script.main.len(), 1);
//! ```

pub mod error;
pub mod lexer;
pub mod parser;
pub mod processor;

pub use error::ParseError;
pub use lexer::{logical_lines, tokenize, SourceLine};
pub use parser::compile;

use std::fmt;
use std::sync::Arc;

use quill_common::{Code, Command, Registry, Signature, Statement};
use tracing::{debug, trace};

/// A function lifted out of the top-level script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub line: usize,
    pub signature: Signature,
    pub body: Arc<Code>,
}

/// A compiled script: hoisted functions plus the remaining top-level code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub functions: Vec<FunctionDef>,
    pub main: Arc<Code>,
}

/// Tokenize and compile one logical line.
pub fn compile_line(text: &str, line: usize, registry: &Registry) -> Result<Statement, ParseError> {
    compile(&tokenize(text), line, registry)
}

/// Compile a whole source file.
///
/// Every statement is compiled even after an error so all problems are
/// reported at once.
pub fn compile_source(source: &str, registry: &Registry) -> Result<Script, Vec<ParseError>> {
    let mut statements = Vec::new();
    let mut errors = Vec::new();

    for src in logical_lines(source) {
        match compile_line(&src.text, src.line, registry) {
            Ok(statement) => {
                trace!(line = src.line, instructions = statement.instructions.len(), "compiled");
                statements.push(statement);
            }
            Err(e) => {
                debug!(line = src.line, error = %e, "statement rejected");
                errors.push(e);
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    hoist_definitions(statements).map_err(|e| vec![e])
}

/// Lift every `def ... end` block that is not itself inside a `def` body.
fn hoist_definitions(statements: Vec<Statement>) -> Result<Script, ParseError> {
    let mut main = Vec::new();
    let mut functions = Vec::new();
    let mut iter = statements.into_iter();

    while let Some(statement) = iter.next() {
        let Some(signature) = statement.signature.clone() else {
            main.push(statement);
            continue;
        };

        let mut depth = 0usize;
        let mut body = Vec::new();
        let mut closed = false;
        for inner in iter.by_ref() {
            match inner.head {
                Some(cmd) if cmd.opens_block() => depth += 1,
                Some(Command::End) if depth == 0 => {
                    closed = true;
                    break;
                }
                Some(Command::End) => depth -= 1,
                _ => {}
            }
            body.push(inner);
        }

        if !closed {
            return Err(ParseError::UnclosedBlock {
                line: statement.line,
                keyword: "def",
            });
        }

        debug!(name = %signature.name, line = statement.line, "function hoisted");
        functions.push(FunctionDef {
            line: statement.line,
            signature,
            body: Arc::new(body),
        });
    }

    Ok(Script {
        functions,
        main: Arc::new(main),
    })
}

impl fmt::Display for Script {
    /// Canonical listing: each function header and body, then the main code.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            writeln!(f, "{:>4}  {}", func.line, func.signature)?;
            for statement in func.body.iter() {
                write!(f, "{statement}")?;
            }
            writeln!(f)?;
        }
        for statement in self.main.iter() {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_empty_source() {
        let script = compile_source("", &Registry::new()).unwrap();
        assert!(script.functions.is_empty());
        assert!(script.main.is_empty());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let script = compile_source("# header\n\nx = 1 # trailing\n", &Registry::new()).unwrap();
        assert_eq!(script.main.len(), 1);
        assert_eq!(script.main[0].line, 3);
    }

    #[test]
    fn def_is_hoisted() {
        let src = "x = 1\ndef f(a)\n  return a\nend\ny = f(x)\n";
        let script = compile_source(src, &Registry::new()).unwrap();
        assert_eq!(script.functions.len(), 1);
        assert_eq!(script.functions[0].signature.name, "f");
        assert_eq!(script.functions[0].body.len(), 1);
        assert_eq!(script.main.len(), 2);
    }

    #[test]
    fn nested_blocks_stay_in_function_body() {
        let src = "def f(a)\n  if a\n    return 1\n  end\n  return 2\nend\n";
        let script = compile_source(src, &Registry::new()).unwrap();
        assert_eq!(script.functions[0].body.len(), 4);
        assert!(script.main.is_empty());
    }

    #[test]
    fn inner_def_is_not_hoisted() {
        let src = "def outer()\n  def inner()\n    return 1\n  end\n  return inner\nend\n";
        let script = compile_source(src, &Registry::new()).unwrap();
        assert_eq!(script.functions.len(), 1);
        let body = &script.functions[0].body;
        assert_eq!(body[0].head, Some(Command::Def));
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn def_inside_if_is_hoisted() {
        let src = "if true\n  def f()\n    return 1\n  end\nend\n";
        let script = compile_source(src, &Registry::new()).unwrap();
        assert_eq!(script.functions.len(), 1);
        assert_eq!(script.main.len(), 2);
    }

    #[test]
    fn unclosed_def_is_reported() {
        let errors = compile_source("def f()\n  return 1\n", &Registry::new()).unwrap_err();
        assert_eq!(
            errors,
            vec![ParseError::UnclosedBlock {
                line: 1,
                keyword: "def"
            }]
        );
    }

    #[test]
    fn all_statement_errors_are_collected() {
        let errors = compile_source("a = (1\nb = 2\nc = 'x\n", &Registry::new()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), 1);
        assert_eq!(errors[1].line(), 3);
    }

    #[test]
    fn script_listing_mentions_functions() {
        let script = compile_source("def f(a)\nreturn a\nend\nf(1)\n", &Registry::new()).unwrap();
        let listing = script.to_string();
        assert!(listing.contains("def f(a)"));
        assert!(listing.contains("return %a"));
        assert!(listing.contains("lookup f/1 1"));
    }
}
