//! Callee resolution, argument binding, and frame entry.

use std::iter;
use std::rc::Rc;
use std::sync::Arc;

use quill_common::value::type_ids;
use quill_common::{
    Argument, ArgumentMode, Bindings, Body, Callee, Code, Command, FunctionValue, Instruction,
    Interface, LookupKey, Object, Reply, Value,
};
use tracing::{trace, warn};

use crate::error::RuntimeError;
use crate::machine::{Frame, Machine};

/// True when calling `callee` from the instruction under `frame`'s cursor
/// can reuse the frame instead of pushing a new one.
///
/// The callee must be the very function the frame is running, with the
/// same closure, and its result must leave the frame untouched: either the
/// statement is `return <call>`, or the call ends the body's last
/// statement, whose value is the implicit return.
pub fn is_tail_call(frame: &Frame, callee: &FunctionValue) -> bool {
    let Some(current) = &frame.function else {
        return false;
    };
    if !Arc::ptr_eq(current, &callee.interface) {
        return false;
    }
    let same_closure = match (&frame.closure, &callee.closure) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    };
    if !same_closure {
        return false;
    }

    let Some(statement) = frame.code.get(frame.statement) else {
        return false;
    };
    let next = frame.instruction + 1;
    match statement.instructions.get(next) {
        Some(instr) => {
            next + 1 == statement.instructions.len()
                && instr.as_command() == Some(Command::Return)
                && instr.args == [Argument::StackTop]
        }
        None => {
            statement.head.is_none()
                && frame.statement + 1 == frame.code.len()
                && frame.control.depth() == 0
        }
    }
}

/// Map call-site arguments onto `interface`'s parameters. Every argument
/// is copied; the callee never shares storage with its caller.
pub fn bind_parameters(interface: &Interface, args: Vec<Object>) -> Vec<(String, Object)> {
    let mut args: Vec<Object> = args.iter().map(Object::deep_copy).collect();
    let params = &interface.params;
    match interface.mode {
        ArgumentMode::Fixed => params.iter().cloned().zip(args).collect(),
        ArgumentMode::Optional { .. } => params
            .iter()
            .cloned()
            .zip(args.into_iter().chain(iter::repeat_with(Object::null)))
            .collect(),
        ArgumentMode::Variadic => {
            let Some((last, fixed)) = params.split_last() else {
                return Vec::new();
            };
            let rest = args.split_off(fixed.len().min(args.len()));
            let mut bound: Vec<(String, Object)> = fixed.iter().cloned().zip(args).collect();
            bound.push((last.clone(), Object::new(Value::Array(rest))));
            bound
        }
    }
}

impl Machine {
    /// Run a non-command instruction: fetch its arguments, find its
    /// callee, and call it.
    pub(crate) fn exec_call(&mut self, instr: &Instruction, line: usize) -> Result<(), RuntimeError> {
        let args = self.fetch_args(&instr.args, line)?;
        let function = self.resolve_callee(&instr.callee, &args, line)?;
        let tail = is_tail_call(&self.frame, &function);
        self.frame.instruction += 1;
        self.invoke(function, args, line, tail)
    }

    fn resolve_callee(
        &mut self,
        callee: &Callee,
        args: &[Object],
        line: usize,
    ) -> Result<FunctionValue, RuntimeError> {
        match callee {
            Callee::Resolved(interface) => Ok(FunctionValue::new(Arc::clone(interface))),
            Callee::Deferred(key) if key.receiver => self.resolve_method(key, args, line),
            Callee::Deferred(key) => self.resolve_function(&key.name, args.len(), line),
            Callee::Command(command) => Err(RuntimeError::UnknownFunction {
                line,
                name: command.keyword().to_string(),
            }),
        }
    }

    /// Method dispatch on the receiver's runtime type, cached per
    /// name, type and argument count.
    fn resolve_method(
        &mut self,
        key: &LookupKey,
        args: &[Object],
        line: usize,
    ) -> Result<FunctionValue, RuntimeError> {
        let type_id = args.first().map_or(type_ids::NULL, Object::type_id);
        let arity = args.len();
        let cache_key = (key.name.clone(), type_id, arity);

        if let Some(interface) = self.dispatch.get(&cache_key) {
            return Ok(FunctionValue::new(Arc::clone(interface)));
        }

        match self.registry.lookup(&key.name, Some(type_id), arity) {
            Some(interface) => {
                trace!(method = %key.name, type_id, arity, "dispatch cached");
                self.dispatch.insert(cache_key, Arc::clone(&interface));
                Ok(FunctionValue::new(interface))
            }
            None => {
                let candidates = self.registry.candidates(&key.name, Some(type_id));
                match candidates.first() {
                    Some(interface) => Err(RuntimeError::Arity {
                        line,
                        name: key.name.clone(),
                        expected: interface.expected_arity(),
                        provided: arity,
                    }),
                    None => Err(RuntimeError::UnknownMethod {
                        line,
                        name: key.name.clone(),
                        type_id,
                        arity,
                    }),
                }
            }
        }
    }

    /// A free call by name: a bound function value first, then the
    /// registry.
    fn resolve_function(
        &self,
        name: &str,
        arity: usize,
        line: usize,
    ) -> Result<FunctionValue, RuntimeError> {
        if let Some(object) = self.lookup(name) {
            return object.with_value(|value| match value {
                Value::Function(function) => Ok(function.clone()),
                other => Err(RuntimeError::NotCallable {
                    line,
                    name: name.to_string(),
                    type_id: other.type_id(),
                }),
            });
        }
        if let Some(interface) = self.registry.lookup(name, None, arity) {
            return Ok(FunctionValue::new(interface));
        }
        match self.registry.candidates(name, None).first() {
            Some(interface) => Err(RuntimeError::Arity {
                line,
                name: name.to_string(),
                expected: interface.expected_arity(),
                provided: arity,
            }),
            None => Err(RuntimeError::UnknownFunction {
                line,
                name: name.to_string(),
            }),
        }
    }

    /// Call `function`. A native's result lands on the running frame's
    /// results; a user function gets a frame of its own, or takes over the
    /// running one when `tail` is set.
    pub(crate) fn invoke(
        &mut self,
        mut function: FunctionValue,
        mut args: Vec<Object>,
        line: usize,
        mut tail: bool,
    ) -> Result<(), RuntimeError> {
        loop {
            let interface = Arc::clone(&function.interface);
            if !interface.accepts(args.len()) {
                return Err(RuntimeError::Arity {
                    line,
                    name: interface.id.clone(),
                    expected: interface.expected_arity(),
                    provided: args.len(),
                });
            }

            let native = match &interface.body {
                Body::Native(native) => *native,
                Body::User(code) => {
                    let code = Arc::clone(code);
                    return self.enter(function, code, args, line, tail);
                }
            };

            let reply = {
                let mut bindings = Bindings::new(&interface, args, &mut *self.out);
                native(&mut bindings).map_err(Machine::native_error(&interface.id, line))?
            };
            match reply {
                Reply::Value(object) => {
                    self.frame.results.push(object);
                    return Ok(());
                }
                Reply::Warning { object, detail } => {
                    warn!(line, function = %interface.id, "{detail}");
                    self.frame.results.push(object);
                    return Ok(());
                }
                Reply::Invoke {
                    function: next,
                    args: next_args,
                } => {
                    function = next;
                    args = next_args;
                    tail = false;
                }
            }
        }
    }

    /// Start running a user function.
    fn enter(
        &mut self,
        function: FunctionValue,
        code: Arc<Code>,
        args: Vec<Object>,
        line: usize,
        tail: bool,
    ) -> Result<(), RuntimeError> {
        let bound = bind_parameters(&function.interface, args);

        if tail {
            trace!(function = %function.interface.id, "tail call");
            self.scopes.truncate(self.frame.scope_base);
            self.push_scope(line)?;
            for (name, object) in bound {
                self.scopes.declare(name, object);
            }
            self.frame.restart();
            return Ok(());
        }

        if self.depth() >= self.config.max_frames {
            return Err(RuntimeError::RecursionLimit {
                line,
                limit: self.config.max_frames,
            });
        }

        let scope_base = self.scopes.len();
        self.push_scope(line)?;
        for (name, object) in bound {
            self.scopes.declare(name, object);
        }
        trace!(function = %function.interface.id, depth = self.depth() + 1, "call");
        let frame = Frame::new(code, scope_base, Some(function.interface), function.closure);
        let caller = std::mem::replace(&mut self.frame, frame);
        self.callers.push(caller);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::{Signature, Statement};

    fn user(params: &[&str], mode: ArgumentMode) -> Interface {
        let signature = Signature {
            name: "f".into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            mode,
        };
        Interface::user(&signature, Arc::new(Vec::new()))
    }

    fn ints(values: &[i64]) -> Vec<Object> {
        values.iter().map(|&n| Object::new(Value::Int(n))).collect()
    }

    #[test]
    fn fixed_binding_copies_arguments() {
        let original = Object::new(Value::Int(1));
        let bound = bind_parameters(&user(&["a"], ArgumentMode::Fixed), vec![original.clone()]);
        assert_eq!(bound[0].0, "a");
        assert!(!bound[0].1.same_storage(&original));
    }

    #[test]
    fn optional_binding_fills_null() {
        let bound = bind_parameters(
            &user(&["a", "b", "c"], ArgumentMode::Optional { min: 1 }),
            ints(&[7]),
        );
        assert_eq!(bound.len(), 3);
        assert_eq!(bound[0].1.value(), Value::Int(7));
        assert_eq!(bound[1].1.value(), Value::Null);
        assert_eq!(bound[2].1.value(), Value::Null);
    }

    #[test]
    fn variadic_binding_collects_rest() {
        let bound = bind_parameters(&user(&["a", "rest"], ArgumentMode::Variadic), ints(&[1, 2, 3]));
        assert_eq!(bound[0].1.value(), Value::Int(1));
        assert_eq!(bound[1].0, "rest");
        assert_eq!(bound[1].1.value(), Value::Array(ints(&[2, 3])));
    }

    #[test]
    fn variadic_binding_with_only_required() {
        let bound = bind_parameters(&user(&["a", "rest"], ArgumentMode::Variadic), ints(&[1, 2]));
        assert_eq!(bound[1].1.value(), Value::Array(ints(&[2])));
    }

    fn call_then_return(name: &Arc<Interface>) -> Statement {
        Statement::new(
            1,
            Some(Command::Return),
            vec![
                Instruction {
                    callee: Callee::Deferred(LookupKey {
                        name: name.id.clone(),
                        receiver: false,
                        arity: 0,
                    }),
                    args: vec![],
                },
                Instruction::command(Command::Return, vec![Argument::StackTop]),
            ],
        )
    }

    #[test]
    fn self_call_before_return_is_tail() {
        let f = Arc::new(user(&[], ArgumentMode::Fixed));
        let code = Arc::new(vec![call_then_return(&f)]);
        let frame = Frame::new(code, 1, Some(Arc::clone(&f)), None);
        assert!(is_tail_call(&frame, &FunctionValue::new(Arc::clone(&f))));

        let g = Arc::new(user(&[], ArgumentMode::Fixed));
        assert!(!is_tail_call(&frame, &FunctionValue::new(g)));
    }

    #[test]
    fn call_in_script_body_is_never_tail() {
        let f = Arc::new(user(&[], ArgumentMode::Fixed));
        let code = Arc::new(vec![call_then_return(&f)]);
        let frame = Frame::new(code, 0, None, None);
        assert!(!is_tail_call(&frame, &FunctionValue::new(f)));
    }

    #[test]
    fn return_of_several_values_is_not_tail() {
        let f = Arc::new(user(&[], ArgumentMode::Fixed));
        let mut statement = call_then_return(&f);
        statement.instructions[1].args.push(Argument::StackTop);
        let frame = Frame::new(Arc::new(vec![statement]), 1, Some(Arc::clone(&f)), None);
        assert!(!is_tail_call(&frame, &FunctionValue::new(f)));
    }
}
