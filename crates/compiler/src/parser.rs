//! Statement compiler: keyword dispatch on top of the expression processor.
//!
//! Keyword statements compile to their expression instructions followed by
//! one command instruction that consumes the computed values. Plain
//! expressions compile to their instructions alone; a bare name or literal
//! gets a `load` so every expression statement leaves one result.

use quill_common::command::is_reserved;
use quill_common::{
    Argument, ArgumentMode, Command, Instruction, Registry, Signature, Statement, Token, TokenKind,
};

use crate::error::ParseError;
use crate::processor::Processor;

const OPTIONAL: &str = "optional";
const VARIABLE: &str = "variable";

/// Compile the tokens of one logical line.
pub fn compile(tokens: &[Token], line: usize, registry: &Registry) -> Result<Statement, ParseError> {
    let tokens: Vec<Token> = tokens.iter().filter(|t| !t.is_blank()).cloned().collect();
    let first = tokens
        .first()
        .ok_or(ParseError::EmptyExpression { line })?;
    if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Invalid) {
        return Err(if bad.text.starts_with('\'') {
            ParseError::UnterminatedString { line }
        } else {
            ParseError::InvalidToken {
                line,
                token: bad.text.clone(),
            }
        });
    }

    let head = match first.kind {
        TokenKind::Identifier => Command::from_keyword(&first.text),
        _ => None,
    };
    let rest = &tokens[1..];
    let mut p = Processor::new(registry, line);

    match head {
        Some(cmd @ (Command::If | Command::Elif | Command::While | Command::Case)) => {
            let condition = p.single(rest)?;
            p.push_command(cmd, vec![condition]);
        }
        Some(Command::When) => {
            let guards = p.expression(rest)?;
            if guards.is_empty() {
                return Err(ParseError::EmptyExpression { line });
            }
            p.push_command(Command::When, guards);
        }
        Some(Command::Return) => {
            let values = p.expression(rest)?;
            p.push_command(Command::Return, values);
        }
        Some(cmd @ (Command::Else | Command::End | Command::Break | Command::Continue)) => {
            if let Some(extra) = rest.first() {
                return Err(unexpected(line, extra));
            }
            p.push_command(cmd, Vec::new());
        }
        Some(Command::For) => for_head(&mut p, rest)?,
        Some(Command::Var) => declarations(&mut p, rest)?,
        Some(Command::Ref) => reference(&mut p, rest)?,
        Some(Command::Def) => {
            let signature = definition(line, rest)?;
            return Ok(Statement {
                line,
                head,
                instructions: vec![Instruction::command(Command::Def, Vec::new())],
                signature: Some(signature),
            });
        }
        Some(Command::Set | Command::Load) | None => {
            let value = p.single(&tokens)?;
            if value != Argument::StackTop {
                p.push_command(Command::Load, vec![value]);
            }
        }
    }

    Ok(Statement::new(line, head, p.finish()))
}

/// `for NAME in EXPR`
fn for_head(p: &mut Processor<'_>, rest: &[Token]) -> Result<(), ParseError> {
    let line = p.line();
    let var = binding_name(line, rest.first())?;
    match rest.get(1) {
        Some(t) if t.is_identifier("in") => {}
        Some(t) => return Err(unexpected(line, t)),
        None => return Err(ParseError::IncompleteExpression { line }),
    }
    let sequence = p.single(&rest[2..])?;
    p.push_command(Command::For, vec![Argument::name(var), sequence]);
    Ok(())
}

/// `var a = 1, b, c = a + 1`
///
/// The list is split on commas outside brackets; each piece declares one
/// binding in the innermost scope.
fn declarations(p: &mut Processor<'_>, rest: &[Token]) -> Result<(), ParseError> {
    let line = p.line();
    for piece in split_top_level(rest) {
        let name = binding_name(line, piece.first())?;
        match piece.get(1) {
            None => p.push_command(Command::Var, vec![Argument::name(name)]),
            Some(t) if t.is_symbol("=") => {
                let value = p.single(&piece[2..])?;
                p.push_command(Command::Var, vec![Argument::name(name), value]);
            }
            Some(t) => return Err(unexpected(line, t)),
        }
    }
    Ok(())
}

/// `ref NAME = EXPR`: bind NAME as an alias of the evaluated object.
fn reference(p: &mut Processor<'_>, rest: &[Token]) -> Result<(), ParseError> {
    let line = p.line();
    let name = binding_name(line, rest.first())?;
    match rest.get(1) {
        Some(t) if t.is_symbol("=") => {}
        Some(t) => return Err(unexpected(line, t)),
        None => return Err(ParseError::IncompleteExpression { line }),
    }
    let target = p.single(&rest[2..])?;
    p.push_command(Command::Ref, vec![Argument::name(name), target]);
    Ok(())
}

/// `def NAME(p1, p2, optional p3)` or `def NAME(p1, variable rest)`
fn definition(line: usize, rest: &[Token]) -> Result<Signature, ParseError> {
    let name = binding_name(line, rest.first())?;
    if !rest.get(1).is_some_and(|t| t.is_symbol("(")) {
        return Err(ParseError::MissingCallBracket { line, name });
    }
    let close = rest
        .iter()
        .position(|t| t.is_symbol(")"))
        .ok_or(ParseError::UnmatchedBracket { line, bracket: '(' })?;
    if let Some(extra) = rest.get(close + 1) {
        return Err(unexpected(line, extra));
    }

    let bad = |reason: &str| ParseError::BadDefinition {
        line,
        reason: reason.to_string(),
    };

    let mut params: Vec<String> = Vec::new();
    let mut optional_count = 0;
    let mut variadic = false;
    let inner = &rest[2..close];

    if !inner.is_empty() {
        for piece in inner.split(|t| t.is_symbol(",")) {
            if variadic {
                return Err(bad("variable parameter must be the last one"));
            }
            let (marker, name_token) = match piece {
                [single] => (None, single),
                [marker, param] if marker.kind == TokenKind::Identifier => {
                    (Some(marker.text.as_str()), param)
                }
                [] => return Err(bad("empty parameter")),
                [_, extra, ..] => return Err(unexpected(line, extra)),
            };
            let param = binding_name(line, Some(name_token))?;
            if params.contains(&param) {
                return Err(bad(&format!("duplicate parameter '{param}'")));
            }
            match marker {
                None if optional_count > 0 => {
                    return Err(bad("optional parameters must come after required ones"))
                }
                None => {}
                Some(OPTIONAL) => optional_count += 1,
                Some(VARIABLE) => variadic = true,
                Some(other) => return Err(bad(&format!("unknown parameter marker '{other}'"))),
            }
            params.push(param);
        }
    }

    if variadic && optional_count > 0 {
        return Err(bad("variable and optional parameters cannot be mixed"));
    }

    let mode = if variadic {
        ArgumentMode::Variadic
    } else if optional_count > 0 {
        ArgumentMode::Optional {
            min: params.len() - optional_count,
        }
    } else {
        ArgumentMode::Fixed
    };

    Ok(Signature { name, params, mode })
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind != TokenKind::Symbol {
            continue;
        }
        match t.text.as_str() {
            "(" | "[" => depth += 1,
            ")" | "]" => depth = depth.saturating_sub(1),
            "," if depth == 0 => {
                pieces.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&tokens[start..]);
    pieces
}

fn binding_name(line: usize, token: Option<&Token>) -> Result<String, ParseError> {
    match token {
        Some(t) if t.kind == TokenKind::Identifier && is_reserved(&t.text) => {
            Err(ParseError::IllegalPlacement {
                line,
                keyword: t.text.clone(),
            })
        }
        Some(t) if t.kind == TokenKind::Identifier => Ok(t.text.clone()),
        Some(t) => Err(unexpected(line, t)),
        None => Err(ParseError::IncompleteExpression { line }),
    }
}

fn unexpected(line: usize, token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        line,
        token: token.text.clone(),
    }
}
