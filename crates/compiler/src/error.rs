//! Error types for the Quill compiler.

use thiserror::Error;

/// Errors produced while compiling a statement.
///
/// Each error is fatal for the statement it occurs in. Other statements
/// still compile, but a script with any error does not run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A bracket without its partner.
    #[error("line {line}: unmatched '{bracket}'")]
    UnmatchedBracket { line: usize, bracket: char },

    /// A single-quoted literal runs to the end of the line.
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    /// A character the lexer could not classify.
    #[error("line {line}: invalid token '{token}'")]
    InvalidToken { line: usize, token: String },

    /// A keyword used where only a name or value may appear.
    #[error("line {line}: '{keyword}' cannot be used here")]
    IllegalPlacement { line: usize, keyword: String },

    /// A call to a known native with an argument count it does not accept.
    #[error("line {line}: '{name}' requires {expected} argument(s), but {provided} provided")]
    Arity {
        line: usize,
        name: String,
        expected: String,
        provided: usize,
    },

    /// A method name or definition not followed by `(`.
    #[error("line {line}: expected '(' after '{name}'")]
    MissingCallBracket { line: usize, name: String },

    /// A malformed `def` header.
    #[error("line {line}: bad definition: {reason}")]
    BadDefinition { line: usize, reason: String },

    /// A token appeared where it was not expected.
    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    /// An operator is missing its right-hand operand.
    #[error("line {line}: incomplete expression")]
    IncompleteExpression { line: usize },

    /// Nothing to evaluate where a value is required.
    #[error("line {line}: empty expression")]
    EmptyExpression { line: usize },

    /// A block opener with no matching `end`.
    #[error("line {line}: '{keyword}' block is never closed")]
    UnclosedBlock { line: usize, keyword: &'static str },
}

impl ParseError {
    /// The 1-based source line the error was raised on.
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnmatchedBracket { line, .. }
            | ParseError::UnterminatedString { line }
            | ParseError::InvalidToken { line, .. }
            | ParseError::IllegalPlacement { line, .. }
            | ParseError::Arity { line, .. }
            | ParseError::MissingCallBracket { line, .. }
            | ParseError::BadDefinition { line, .. }
            | ParseError::UnexpectedToken { line, .. }
            | ParseError::IncompleteExpression { line }
            | ParseError::EmptyExpression { line }
            | ParseError::UnclosedBlock { line, .. } => *line,
        }
    }
}
