//! Operator-precedence expression compiler.
//!
//! A shunting-yard pass over one expression. Operands wait on one stack,
//! pending operators and open brackets on another. Each reduction pops an
//! operator with its operands and emits one [`Instruction`]; the result
//! goes back on the operand stack as [`Argument::StackTop`], so emitted
//! instructions always consume results in the order they were produced.
//!
//! Precedence, lowest to highest: assignment 0, comparisons 1, additive 2,
//! multiplicative 3, prefix operators 4. Calls, methods and subscripts
//! reduce as soon as their closing bracket is seen.

use quill_common::command::is_reserved;
use quill_common::{
    Argument, Callee, Command, Instruction, LookupKey, Registry, Token, TokenKind,
};

use crate::error::ParseError;

/// Names the operators compile to. The native library registers these.
pub mod ops {
    pub const NEG: &str = "neg";
    pub const NOT: &str = "not";
    pub const PRE_INC: &str = "preinc";
    pub const PRE_DEC: &str = "predec";
    pub const POST_INC: &str = "postinc";
    pub const POST_DEC: &str = "postdec";
    pub const AT: &str = "at";
}

const PREFIX: u8 = 4;

fn binary_precedence(symbol: &str) -> Option<u8> {
    match symbol {
        "==" | "!=" | "<" | ">" | "<=" | ">=" => Some(1),
        "+" | "-" => Some(2),
        "*" | "/" | "\\" => Some(3),
        _ => None,
    }
}

#[derive(Debug)]
enum Operand {
    Value(Argument),
    /// Bottom of a bracketed argument list.
    Boundary,
}

#[derive(Debug)]
enum Pending {
    Operator {
        name: String,
        precedence: u8,
        arity: usize,
    },
    /// `=`; right-associative, so it never reduces another `=`.
    Assign,
    /// `name(` or `.name(`; reduced by the matching `)`.
    Call { name: String, receiver: bool },
    /// `(` with no call in front. Its `)` emits nothing.
    Group,
    /// `[` after a receiver.
    Subscript,
}

impl Pending {
    fn precedence(&self) -> Option<u8> {
        match self {
            Pending::Operator { precedence, .. } => Some(*precedence),
            Pending::Assign => Some(0),
            _ => None,
        }
    }
}

/// Compiles expressions into an instruction list, resolving free calls
/// against the registry where possible.
pub struct Processor<'r> {
    registry: &'r Registry,
    line: usize,
    instructions: Vec<Instruction>,
}

impl<'r> Processor<'r> {
    pub fn new(registry: &'r Registry, line: usize) -> Self {
        Self {
            registry,
            line,
            instructions: Vec::new(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn push_command(&mut self, command: Command, args: Vec<Argument>) {
        self.instructions.push(Instruction::command(command, args));
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Compile an expression that must produce exactly one value.
    pub fn single(&mut self, tokens: &[Token]) -> Result<Argument, ParseError> {
        let mut values = self.expression(tokens)?;
        match values.len() {
            0 => Err(ParseError::EmptyExpression { line: self.line }),
            1 => Ok(values.remove(0)),
            _ => Err(self.unexpected(",")),
        }
    }

    /// Compile a comma-separated expression list. Returns one argument per
    /// top-level value, in source order.
    pub fn expression(&mut self, tokens: &[Token]) -> Result<Vec<Argument>, ParseError> {
        let mut operands: Vec<Operand> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();
        let mut expect_operand = true;
        let mut pos = 0;

        while pos < tokens.len() {
            let token = &tokens[pos];
            match token.kind {
                TokenKind::Blank => {}
                TokenKind::Invalid => return Err(self.invalid(token)),
                TokenKind::StringLiteral | TokenKind::NumberLiteral => {
                    self.require_operand(expect_operand, token)?;
                    operands.push(Operand::Value(Argument::literal(&token.text, token.kind)));
                    expect_operand = false;
                }
                TokenKind::Identifier => {
                    self.require_operand(expect_operand, token)?;
                    if is_reserved(&token.text) {
                        return Err(ParseError::IllegalPlacement {
                            line: self.line,
                            keyword: token.text.clone(),
                        });
                    }
                    if tokens.get(pos + 1).is_some_and(|t| t.is_symbol("(")) {
                        pending.push(Pending::Call {
                            name: token.text.clone(),
                            receiver: false,
                        });
                        operands.push(Operand::Boundary);
                        pos += 2;
                        continue;
                    }
                    let arg = match token.text.as_str() {
                        "true" | "false" | "null" => {
                            Argument::literal(&token.text, TokenKind::Identifier)
                        }
                        name => Argument::name(name),
                    };
                    operands.push(Operand::Value(arg));
                    expect_operand = false;
                }
                TokenKind::Symbol => match token.text.as_str() {
                    "(" => {
                        self.require_operand(expect_operand, token)?;
                        pending.push(Pending::Group);
                        operands.push(Operand::Boundary);
                    }
                    ")" => {
                        self.close_paren(&mut operands, &mut pending, expect_operand)?;
                        expect_operand = false;
                    }
                    "[" => {
                        if expect_operand {
                            return Err(self.unexpected("["));
                        }
                        pending.push(Pending::Subscript);
                        operands.push(Operand::Boundary);
                        expect_operand = true;
                    }
                    "]" => {
                        self.close_subscript(&mut operands, &mut pending, expect_operand)?;
                        expect_operand = false;
                    }
                    "," => {
                        if expect_operand {
                            return Err(self.unexpected(","));
                        }
                        self.reduce_to_bracket(&mut operands, &mut pending)?;
                        expect_operand = true;
                    }
                    "." => {
                        if expect_operand {
                            return Err(self.unexpected("."));
                        }
                        let name = match tokens.get(pos + 1) {
                            Some(t) if t.kind == TokenKind::Identifier && !is_reserved(&t.text) => {
                                t.text.clone()
                            }
                            Some(t) => return Err(self.unexpected(&t.text)),
                            None => {
                                return Err(ParseError::IncompleteExpression { line: self.line })
                            }
                        };
                        if !tokens.get(pos + 2).is_some_and(|t| t.is_symbol("(")) {
                            return Err(ParseError::MissingCallBracket {
                                line: self.line,
                                name,
                            });
                        }
                        pending.push(Pending::Call {
                            name,
                            receiver: true,
                        });
                        operands.push(Operand::Boundary);
                        pos += 3;
                        expect_operand = true;
                        continue;
                    }
                    "++" | "--" => {
                        let increment = token.text == "++";
                        if expect_operand {
                            let name = if increment { ops::PRE_INC } else { ops::PRE_DEC };
                            pending.push(Pending::Operator {
                                name: name.to_string(),
                                precedence: PREFIX,
                                arity: 1,
                            });
                        } else {
                            let name = if increment { ops::POST_INC } else { ops::POST_DEC };
                            let target = self.pop_value(&mut operands)?;
                            self.emit_call(name, false, vec![target])?;
                            operands.push(Operand::Value(Argument::StackTop));
                        }
                    }
                    "!" => {
                        self.require_operand(expect_operand, token)?;
                        pending.push(Pending::Operator {
                            name: ops::NOT.to_string(),
                            precedence: PREFIX,
                            arity: 1,
                        });
                    }
                    "-" if expect_operand => {
                        pending.push(Pending::Operator {
                            name: ops::NEG.to_string(),
                            precedence: PREFIX,
                            arity: 1,
                        });
                    }
                    "=" => {
                        if expect_operand {
                            return Err(self.unexpected("="));
                        }
                        self.reduce_while(&mut operands, &mut pending, |p| p > 0)?;
                        pending.push(Pending::Assign);
                        expect_operand = true;
                    }
                    symbol => {
                        let precedence =
                            binary_precedence(symbol).ok_or_else(|| self.unexpected(symbol))?;
                        if expect_operand {
                            return Err(self.unexpected(symbol));
                        }
                        self.reduce_while(&mut operands, &mut pending, |p| p >= precedence)?;
                        pending.push(Pending::Operator {
                            name: symbol.to_string(),
                            precedence,
                            arity: 2,
                        });
                        expect_operand = true;
                    }
                },
            }
            pos += 1;
        }

        if operands.is_empty() && pending.is_empty() {
            return Ok(Vec::new());
        }
        if expect_operand {
            return Err(ParseError::IncompleteExpression { line: self.line });
        }

        while let Some(top) = pending.pop() {
            match top {
                Pending::Call { .. } | Pending::Group => {
                    return Err(ParseError::UnmatchedBracket {
                        line: self.line,
                        bracket: '(',
                    })
                }
                Pending::Subscript => {
                    return Err(ParseError::UnmatchedBracket {
                        line: self.line,
                        bracket: '[',
                    })
                }
                operator => self.assemble(operator, &mut operands)?,
            }
        }

        operands
            .into_iter()
            .map(|operand| match operand {
                Operand::Value(arg) => Ok(arg),
                Operand::Boundary => Err(ParseError::UnmatchedBracket {
                    line: self.line,
                    bracket: '(',
                }),
            })
            .collect()
    }

    /// Reduce pending operators while their precedence satisfies `keep_going`.
    /// Stops at any bracket.
    fn reduce_while(
        &mut self,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
        keep_going: impl Fn(u8) -> bool,
    ) -> Result<(), ParseError> {
        while let Some(precedence) = pending.last().and_then(Pending::precedence) {
            if !keep_going(precedence) {
                break;
            }
            if let Some(top) = pending.pop() {
                self.assemble(top, operands)?;
            }
        }
        Ok(())
    }

    /// Reduce every operator down to the innermost open bracket (or the
    /// bottom of the stack), leaving the bracket in place.
    fn reduce_to_bracket(
        &mut self,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
    ) -> Result<(), ParseError> {
        self.reduce_while(operands, pending, |_| true)
    }

    fn close_paren(
        &mut self,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
        expect_operand: bool,
    ) -> Result<(), ParseError> {
        let empty_call = expect_operand
            && matches!(operands.last(), Some(Operand::Boundary))
            && matches!(pending.last(), Some(Pending::Call { .. }));
        if expect_operand && !empty_call {
            return Err(match operands.last() {
                Some(Operand::Boundary) => ParseError::EmptyExpression { line: self.line },
                _ => ParseError::IncompleteExpression { line: self.line },
            });
        }

        self.reduce_to_bracket(operands, pending)?;
        let args = self.pop_group(operands)?;

        match pending.pop() {
            Some(Pending::Group) => match <[Argument; 1]>::try_from(args) {
                Ok([inner]) => operands.push(Operand::Value(inner)),
                Err(args) if args.is_empty() => {
                    return Err(ParseError::EmptyExpression { line: self.line })
                }
                Err(_) => return Err(self.unexpected(",")),
            },
            Some(Pending::Call { name, receiver }) => {
                let mut all = Vec::with_capacity(args.len() + 1);
                if receiver {
                    all.push(self.pop_value(operands)?);
                }
                all.extend(args);
                self.emit_call(&name, receiver, all)?;
                operands.push(Operand::Value(Argument::StackTop));
            }
            Some(Pending::Subscript) => {
                return Err(ParseError::UnmatchedBracket {
                    line: self.line,
                    bracket: '[',
                })
            }
            _ => {
                return Err(ParseError::UnmatchedBracket {
                    line: self.line,
                    bracket: ')',
                })
            }
        }
        Ok(())
    }

    fn close_subscript(
        &mut self,
        operands: &mut Vec<Operand>,
        pending: &mut Vec<Pending>,
        expect_operand: bool,
    ) -> Result<(), ParseError> {
        if expect_operand {
            return Err(match operands.last() {
                Some(Operand::Boundary) => ParseError::EmptyExpression { line: self.line },
                _ => ParseError::IncompleteExpression { line: self.line },
            });
        }
        self.reduce_to_bracket(operands, pending)?;
        let args = self.pop_group(operands)?;

        match pending.pop() {
            Some(Pending::Subscript) => {}
            Some(Pending::Call { .. }) | Some(Pending::Group) => {
                return Err(ParseError::UnmatchedBracket {
                    line: self.line,
                    bracket: '(',
                })
            }
            _ => {
                return Err(ParseError::UnmatchedBracket {
                    line: self.line,
                    bracket: ']',
                })
            }
        }

        if args.len() > 2 {
            return Err(ParseError::Arity {
                line: self.line,
                name: "[]".to_string(),
                expected: "1 to 2".to_string(),
                provided: args.len(),
            });
        }
        let mut all = vec![self.pop_value(operands)?];
        all.extend(args);
        self.emit_call(ops::AT, true, all)?;
        operands.push(Operand::Value(Argument::StackTop));
        Ok(())
    }

    /// Pop operands down to and including the innermost boundary,
    /// returned in source order.
    fn pop_group(&self, operands: &mut Vec<Operand>) -> Result<Vec<Argument>, ParseError> {
        let mut args = Vec::new();
        loop {
            match operands.pop() {
                Some(Operand::Value(arg)) => args.push(arg),
                Some(Operand::Boundary) => break,
                None => {
                    return Err(ParseError::UnmatchedBracket {
                        line: self.line,
                        bracket: ')',
                    })
                }
            }
        }
        args.reverse();
        Ok(args)
    }

    fn pop_value(&self, operands: &mut Vec<Operand>) -> Result<Argument, ParseError> {
        match operands.pop() {
            Some(Operand::Value(arg)) => Ok(arg),
            _ => Err(ParseError::IncompleteExpression { line: self.line }),
        }
    }

    /// Reduction step: pop one operator and its operands, emit one instruction.
    fn assemble(&mut self, operator: Pending, operands: &mut Vec<Operand>) -> Result<(), ParseError> {
        match operator {
            Pending::Operator { name, arity, .. } => {
                let mut args = Vec::with_capacity(arity);
                for _ in 0..arity {
                    args.push(self.pop_value(operands)?);
                }
                args.reverse();
                self.emit_call(&name, false, args)?;
            }
            Pending::Assign => {
                let value = self.pop_value(operands)?;
                let target = self.pop_value(operands)?;
                if let Argument::Literal { text, .. } = &target {
                    return Err(self.unexpected(text));
                }
                self.push_command(Command::Set, vec![target, value]);
            }
            _ => return Err(ParseError::IncompleteExpression { line: self.line }),
        }
        operands.push(Operand::Value(Argument::StackTop));
        Ok(())
    }

    /// Emit a call. Free calls to registered natives are resolved now and
    /// arity-checked; methods and unknown names are looked up at run time.
    fn emit_call(&mut self, name: &str, receiver: bool, args: Vec<Argument>) -> Result<(), ParseError> {
        let arity = args.len();
        let callee = if !receiver && self.registry.has_free(name) {
            match self.registry.lookup(name, None, arity) {
                Some(interface) => Callee::Resolved(interface),
                None => {
                    let expected = self
                        .registry
                        .candidates(name, None)
                        .iter()
                        .map(|i| i.expected_arity())
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(ParseError::Arity {
                        line: self.line,
                        name: name.to_string(),
                        expected,
                        provided: arity,
                    });
                }
            }
        } else {
            Callee::Deferred(LookupKey {
                name: name.to_string(),
                receiver,
                arity,
            })
        };
        self.instructions.push(Instruction { callee, args });
        Ok(())
    }

    fn require_operand(&self, expect_operand: bool, token: &Token) -> Result<(), ParseError> {
        if expect_operand {
            Ok(())
        } else {
            Err(self.unexpected(&token.text))
        }
    }

    fn unexpected(&self, token: &str) -> ParseError {
        ParseError::UnexpectedToken {
            line: self.line,
            token: token.to_string(),
        }
    }

    fn invalid(&self, token: &Token) -> ParseError {
        if token.text.starts_with('\'') {
            ParseError::UnterminatedString { line: self.line }
        } else {
            ParseError::InvalidToken {
                line: self.line,
                token: token.text.clone(),
            }
        }
    }
}
