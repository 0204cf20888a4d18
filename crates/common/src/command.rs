//! Built-in statement commands.
//!
//! Keyword statements compile to a single instruction whose callee is one
//! of these commands. The machine interprets them itself instead of going
//! through the registry.

/// A fixed command handled directly by the execution machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    If,
    Elif,
    Else,
    End,
    While,
    For,
    Case,
    When,
    Break,
    Continue,
    Return,
    Def,
    /// Declare a binding in the innermost scope.
    Var,
    /// Declare a binding that aliases an existing object.
    Ref,
    /// Assign to a binding or to an aliased element.
    Set,
    /// Push a named object or literal as the statement result.
    Load,
}

/// All commands, in declaration order.
pub const ALL_COMMANDS: [Command; 16] = [
    Command::If,
    Command::Elif,
    Command::Else,
    Command::End,
    Command::While,
    Command::For,
    Command::Case,
    Command::When,
    Command::Break,
    Command::Continue,
    Command::Return,
    Command::Def,
    Command::Var,
    Command::Ref,
    Command::Set,
    Command::Load,
];

/// Words that can never be used as names.
pub const RESERVED_WORDS: [&str; 15] = [
    "if", "elif", "else", "end", "while", "for", "in", "case", "when", "break", "continue",
    "return", "def", "var", "ref",
];

impl Command {
    /// The keyword or mnemonic for this command.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::If => "if",
            Command::Elif => "elif",
            Command::Else => "else",
            Command::End => "end",
            Command::While => "while",
            Command::For => "for",
            Command::Case => "case",
            Command::When => "when",
            Command::Break => "break",
            Command::Continue => "continue",
            Command::Return => "return",
            Command::Def => "def",
            Command::Var => "var",
            Command::Ref => "ref",
            Command::Set => "set",
            Command::Load => "load",
        }
    }

    /// Look up a statement keyword. `set` and `load` have no surface keyword.
    pub fn from_keyword(word: &str) -> Option<Command> {
        ALL_COMMANDS
            .iter()
            .copied()
            .filter(|c| !matches!(c, Command::Set | Command::Load))
            .find(|c| c.keyword() == word)
    }

    /// Commands that open a block closed by `end`.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Command::If | Command::While | Command::For | Command::Case | Command::Def
        )
    }
}

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}
