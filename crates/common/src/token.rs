//! Classified lexical tokens.

use std::fmt;

/// The lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Operators and punctuation: `+`, `==`, `(`, `,`, `.` and friends.
    Symbol,
    /// Names and keywords.
    Identifier,
    /// Contents of a single-quoted literal, escapes already resolved.
    StringLiteral,
    /// Integer or decimal literal.
    NumberLiteral,
    /// A run of whitespace between two other tokens.
    Blank,
    /// Anything the lexer could not classify, including unterminated strings.
    Invalid,
}

/// A single token produced by the lexer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(text: impl Into<String>, kind: TokenKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn symbol(text: impl Into<String>) -> Self {
        Self::new(text, TokenKind::Symbol)
    }

    pub fn identifier(text: impl Into<String>) -> Self {
        Self::new(text, TokenKind::Identifier)
    }

    /// True if this is the symbol `text`.
    pub fn is_symbol(&self, text: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == text
    }

    /// True if this is the identifier `text`.
    pub fn is_identifier(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == text
    }

    pub fn is_blank(&self) -> bool {
        self.kind == TokenKind::Blank
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::StringLiteral => write!(f, "'{}'", self.text),
            _ => f.write_str(&self.text),
        }
    }
}
