//! Main execution loop and command dispatch.

use std::sync::Arc;

use quill_common::{
    Argument, Callee, Command, FunctionValue, Instruction, Interface, NativeError, Object,
    Statement, Value,
};
use tracing::{debug, trace};

use crate::control::{Begin, ControlFault, Event, Sequence, Transition};
use crate::error::RuntimeError;
use crate::machine::Machine;

impl Machine {
    /// Run frames until the script's own body finishes.
    pub(crate) fn execute(&mut self) -> Result<Object, RuntimeError> {
        loop {
            let code = Arc::clone(&self.frame.code);
            let at = self.frame.statement;

            let Some(statement) = code.get(at) else {
                if let Some(result) = self.finish_body()? {
                    return Ok(result);
                }
                continue;
            };

            if !self.frame.entered {
                self.frame.entered = true;
                self.frame.results.clear();
                match self.frame.control.begin(statement.head, at) {
                    Begin::Execute => {}
                    Begin::Skip => {
                        self.frame.goto(at + 1);
                        continue;
                    }
                    Begin::ForStep => {
                        self.control(Event::ForStep, statement)?;
                        continue;
                    }
                }
            }

            let Some(instr) = statement.instructions.get(self.frame.instruction) else {
                if statement.head.is_none() {
                    self.frame.last_value = self.frame.results.last().cloned();
                }
                self.frame.goto(at + 1);
                continue;
            };

            let finished = match &instr.callee {
                Callee::Command(command) => self.exec_command(*command, instr, statement)?,
                _ => {
                    self.exec_call(instr, statement.line)?;
                    None
                }
            };
            if let Some(result) = finished {
                return Ok(result);
            }
        }
    }

    /// The running body ran out of statements: implicit return.
    fn finish_body(&mut self) -> Result<Option<Object>, RuntimeError> {
        if let Some((at, keyword)) = self.frame.control.unclosed() {
            let line = self.frame.code.get(at).map_or(0, |s| s.line);
            return Err(RuntimeError::MissingEnd { line, keyword });
        }
        let result = self
            .frame
            .last_value
            .take()
            .map(|o| o.deep_copy())
            .unwrap_or_default();
        Ok(self.leave_frame(result))
    }

    /// Pop the running frame and hand `result` to its caller. Returns the
    /// result when the script's own frame is the one leaving.
    pub(crate) fn leave_frame(&mut self, result: Object) -> Option<Object> {
        let Some(caller) = self.callers.pop() else {
            return Some(result);
        };
        self.scopes.truncate(self.frame.scope_base);
        let callee = std::mem::replace(&mut self.frame, caller);
        trace!(
            function = callee.function.as_ref().map_or("", |f| f.id.as_str()),
            depth = self.depth(),
            "return"
        );
        self.frame.results.push(result);
        None
    }

    fn exec_command(
        &mut self,
        command: Command,
        instr: &Instruction,
        statement: &Statement,
    ) -> Result<Option<Object>, RuntimeError> {
        let line = statement.line;
        match command {
            Command::Load => {
                let objects = self.fetch_args(&instr.args, line)?;
                self.frame.results.extend(objects);
                self.frame.instruction += 1;
            }
            Command::Set => {
                self.exec_set(&instr.args, line)?;
                self.frame.instruction += 1;
            }
            Command::Var => {
                self.exec_var(&instr.args, line)?;
                self.frame.instruction += 1;
            }
            Command::Ref => {
                let name = target_name(&instr.args, line)?;
                let target = self.operand(&instr.args, 1, line)?;
                self.scopes.declare(name, Object::alias_of(&target));
                self.frame.instruction += 1;
            }
            Command::If | Command::Elif | Command::While => {
                let condition = self.operand(&instr.args, 0, line)?.is_truthy();
                let event = match command {
                    Command::If => Event::If(condition),
                    Command::Elif => Event::Elif(condition),
                    _ => Event::While(condition),
                };
                self.control(event, statement)?;
            }
            Command::Case => {
                let subject = self.operand(&instr.args, 0, line)?.value().deep_copy();
                self.control(Event::Case(subject), statement)?;
            }
            Command::When => {
                let guards = self
                    .fetch_args(&instr.args, line)?
                    .iter()
                    .map(Object::value)
                    .collect();
                self.control(Event::When(guards), statement)?;
            }
            Command::For => {
                let var = target_name(&instr.args, line)?;
                let sequence = self.operand(&instr.args, 1, line)?;
                let items = iteration_items(&sequence, line)?;
                self.control(Event::For { var, items }, statement)?;
            }
            Command::Else => self.control(Event::Else, statement)?,
            Command::End => self.control(Event::End, statement)?,
            Command::Break => self.control(Event::Break, statement)?,
            Command::Continue => self.control(Event::Continue, statement)?,
            Command::Def => self.control(Event::Def, statement)?,
            Command::Return => {
                let values = self.fetch_args(&instr.args, line)?;
                let result = match values.len() {
                    0 => Object::null(),
                    1 => values[0].deep_copy(),
                    _ => Object::new(Value::Array(values.iter().map(Object::deep_copy).collect())),
                };
                return Ok(self.leave_frame(result));
            }
        }
        Ok(None)
    }

    /// The single object argument `index` of a command.
    fn operand(&mut self, args: &[Argument], index: usize, line: usize) -> Result<Object, RuntimeError> {
        let arg = args.get(index).ok_or(RuntimeError::MissingOperand { line })?;
        self.fetch(arg, line)
    }

    /// `set target, value`: copy the value into the target, creating the
    /// target in the innermost scope if the name is unbound.
    fn exec_set(&mut self, args: &[Argument], line: usize) -> Result<(), RuntimeError> {
        let value = self.operand(args, 1, line)?;
        let target = match args.first() {
            Some(Argument::ObjectRef(name)) => match self.lookup_local(name) {
                Some(existing) => existing,
                None => {
                    let fresh = Object::placeholder();
                    self.scopes.declare(name.clone(), fresh.clone());
                    fresh
                }
            },
            Some(other) => self.fetch(other, line)?,
            None => return Err(RuntimeError::MissingOperand { line }),
        };
        target
            .set(value.value().deep_copy())
            .map_err(Machine::native_error("=", line))?;
        self.frame.results.push(Object::alias_of(&target));
        Ok(())
    }

    /// `var name[, value]`: a fresh binding in the innermost scope.
    fn exec_var(&mut self, args: &[Argument], line: usize) -> Result<(), RuntimeError> {
        let name = target_name(args, line)?;
        if self.scopes.innermost(&name).is_some_and(Object::is_read_only) {
            return Err(RuntimeError::Native {
                line,
                name,
                source: NativeError::ReadOnly,
            });
        }
        let object = match args.get(1) {
            Some(arg) => self.fetch(arg, line)?.deep_copy(),
            None => Object::null(),
        };
        self.scopes.declare(name, object);
        Ok(())
    }

    /// Report a keyword's outcome to the frame's control state and carry
    /// out the resulting transition.
    fn control(&mut self, event: Event, statement: &Statement) -> Result<(), RuntimeError> {
        let at = self.frame.statement;
        let line = statement.line;
        let transition = self
            .frame
            .control
            .apply(event, at)
            .map_err(|fault| RuntimeError::Control { line, fault })?;
        self.apply_transition(transition, at, line)
    }

    fn apply_transition(&mut self, t: Transition, at: usize, line: usize) -> Result<(), RuntimeError> {
        for _ in 0..t.pop_scopes {
            self.scopes.pop();
        }
        if t.clear_scope {
            self.scopes.clear_innermost();
        }
        if t.push_scope {
            self.push_scope(line)?;
        }
        if let Some((name, item)) = t.bind {
            self.scopes.declare(name, item);
        }
        if let Some(start) = t.capture {
            self.capture(start, at, line)?;
        }
        self.frame.goto(t.jump.unwrap_or(at + 1));
        Ok(())
    }

    /// A nested `def` at `start` closed at `end`: bind it as a function
    /// that carries a snapshot of what the running frame can see.
    fn capture(&mut self, start: usize, end: usize, line: usize) -> Result<(), RuntimeError> {
        let code = Arc::clone(&self.frame.code);
        let signature = code
            .get(start)
            .and_then(|s| s.signature.as_ref())
            .ok_or(RuntimeError::Control {
                line,
                fault: ControlFault::Unmatched("end"),
            })?;
        let body: Vec<Statement> = code.get(start + 1..end).unwrap_or(&[]).to_vec();
        let interface = Arc::new(Interface::user(signature, Arc::new(body)));
        let record = self
            .scopes
            .snapshot(self.frame.scope_base, self.frame.closure.as_deref());
        debug!(name = %signature.name, captured = record.len(), "closure created");
        let function = FunctionValue::with_closure(interface, record);
        self.scopes
            .declare(signature.name.clone(), Object::new(Value::Function(function)));
        Ok(())
    }
}

/// The binding name in the first argument of `var`, `ref` and `for`.
fn target_name(args: &[Argument], line: usize) -> Result<String, RuntimeError> {
    match args.first() {
        Some(Argument::ObjectRef(name)) => Ok(name.clone()),
        _ => Err(RuntimeError::MissingOperand { line }),
    }
}

/// What a `for` loop walks: array elements as copies, string characters,
/// or `0..n` for an int, produced lazily.
fn iteration_items(sequence: &Object, line: usize) -> Result<Sequence, RuntimeError> {
    sequence.with_value(|value| match value {
        Value::Array(items) => Ok(Sequence::items(items.iter().map(Object::deep_copy).collect())),
        Value::Str(s) => Ok(Sequence::items(
            s.chars()
                .map(|c| Object::new(Value::Str(c.to_string())))
                .collect(),
        )),
        Value::Int(n) => Ok(Sequence::range(*n)),
        other => Err(RuntimeError::TypeMismatch {
            line,
            context: "for",
            expected: "array, string or int",
            found: other.type_id(),
        }),
    })
}
