//! The native library: operators, conversions, container methods, and
//! function-value methods.
//!
//! Methods are registered under their receiver's type id and take the
//! receiver as their first argument, named `self`.

use std::cmp::Ordering;

use quill_common::value::type_ids;
use quill_common::{
    ArgumentMode, Bindings, FunctionValue, NativeError, Object, Registry, Reply, Value,
};
use quill_compiler::processor::ops;

use ArgumentMode::{Fixed, Optional, Variadic};

/// Largest array `array` and `push` will build.
pub const MAX_ARRAY_SIZE: usize = 1 << 24;

/// Register every native into `registry`.
pub fn install(registry: &mut Registry) {
    const BINARY: &[&str] = &["lhs", "rhs"];

    registry.register_native("+", Fixed, None, BINARY, add);
    registry.register_native("-", Fixed, None, BINARY, sub);
    registry.register_native("*", Fixed, None, BINARY, mul);
    registry.register_native("/", Fixed, None, BINARY, div);
    registry.register_native("\\", Fixed, None, BINARY, int_div);
    registry.register_native("==", Fixed, None, BINARY, eq);
    registry.register_native("!=", Fixed, None, BINARY, ne);
    registry.register_native("<", Fixed, None, BINARY, lt);
    registry.register_native(">", Fixed, None, BINARY, gt);
    registry.register_native("<=", Fixed, None, BINARY, le);
    registry.register_native(">=", Fixed, None, BINARY, ge);

    registry.register_native(ops::NEG, Fixed, None, &["operand"], neg);
    registry.register_native(ops::NOT, Fixed, None, &["operand"], not);
    registry.register_native(ops::PRE_INC, Fixed, None, &["target"], pre_inc);
    registry.register_native(ops::PRE_DEC, Fixed, None, &["target"], pre_dec);
    registry.register_native(ops::POST_INC, Fixed, None, &["target"], post_inc);
    registry.register_native(ops::POST_DEC, Fixed, None, &["target"], post_dec);

    registry.register_native("print", Variadic, None, &[], print);
    registry.register_native("typeid", Fixed, None, &["value"], typeid);
    registry.register_native("int", Fixed, None, &["value"], to_int);
    registry.register_native("float", Fixed, None, &["value"], to_float);
    registry.register_native("string", Fixed, None, &["value"], to_string);
    registry.register_native("array", Optional { min: 1 }, None, &["size", "init"], array);

    let array_domain = Some(type_ids::ARRAY);
    registry.register_native(
        ops::AT,
        Optional { min: 2 },
        array_domain,
        &["self", "index", "value"],
        array_at,
    );
    registry.register_native("size", Fixed, array_domain, &["self"], array_size);
    registry.register_native("push", Fixed, array_domain, &["self", "value"], array_push);

    let string_domain = Some(type_ids::STRING);
    registry.register_native(ops::AT, Fixed, string_domain, &["self", "index"], string_at);
    registry.register_native("size", Fixed, string_domain, &["self"], string_size);
    registry.register_native(
        "substr",
        Optional { min: 2 },
        string_domain,
        &["self", "start", "length"],
        substr,
    );

    let function_domain = Some(type_ids::FUNCTION);
    registry.register_native("id", Fixed, function_domain, &["self"], function_id);
    registry.register_native("params", Fixed, function_domain, &["self"], function_params);
    registry.register_native("call", Variadic, function_domain, &["self"], function_call);
}

fn type_error(expected: &'static str, found: &Value) -> NativeError {
    NativeError::Type {
        expected,
        found: found.type_id(),
    }
}

fn overflow() -> NativeError {
    NativeError::Fatal("integer overflow".to_string())
}

fn operands(b: &Bindings<'_>) -> Result<(Value, Value), NativeError> {
    Ok((b.arg(0)?.value(), b.arg(1)?.value()))
}

// ---- arithmetic ----

fn arithmetic(
    b: &Bindings<'_>,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Reply, NativeError> {
    match operands(b)? {
        (Value::Int(x), Value::Int(y)) => Reply::value(int_op(x, y).ok_or_else(overflow)?),
        (Value::Int(x), Value::Float(y)) => Reply::value(Value::Float(float_op(x as f64, y))),
        (Value::Float(x), Value::Int(y)) => Reply::value(Value::Float(float_op(x, y as f64))),
        (Value::Float(x), Value::Float(y)) => Reply::value(Value::Float(float_op(x, y))),
        (Value::Int(_) | Value::Float(_), other) | (other, _) => {
            Err(type_error("int or float", &other))
        }
    }
}

fn add(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    match operands(b)? {
        (Value::Str(x), y) => Reply::value(format!("{x}{y}")),
        (x, Value::Str(y)) => Reply::value(format!("{x}{y}")),
        (Value::Array(x), Value::Array(y)) => Reply::value(Value::Array(
            x.iter().chain(&y).map(Object::deep_copy).collect(),
        )),
        _ => arithmetic(b, i64::checked_add, |x, y| x + y),
    }
}

fn sub(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    arithmetic(b, i64::checked_sub, |x, y| x - y)
}

fn mul(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    arithmetic(b, i64::checked_mul, |x, y| x * y)
}

fn as_float(value: &Value) -> Result<f64, NativeError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(x) => Ok(*x),
        other => Err(type_error("int or float", other)),
    }
}

/// `/` always divides as floats.
fn div(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let (x, y) = operands(b)?;
    let (x, y) = (as_float(&x)?, as_float(&y)?);
    if y == 0.0 {
        return Err(NativeError::DivisionByZero);
    }
    Reply::value(Value::Float(x / y))
}

/// `\` divides integers, rounding toward zero.
fn int_div(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let (x, y) = (b.int(0)?, b.int(1)?);
    if y == 0 {
        return Err(NativeError::DivisionByZero);
    }
    Reply::value(x.checked_div(y).ok_or_else(overflow)?)
}

// ---- comparison ----

fn compare(b: &Bindings<'_>) -> Result<Ordering, NativeError> {
    match operands(b)? {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(&y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(&y)),
        (x, y) => {
            let (x, y) = (as_float(&x)?, as_float(&y)?);
            x.partial_cmp(&y)
                .ok_or_else(|| NativeError::Fatal("comparison with NaN".to_string()))
        }
    }
}

fn eq(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let (x, y) = operands(b)?;
    Reply::value(x == y)
}

fn ne(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let (x, y) = operands(b)?;
    Reply::value(x != y)
}

fn lt(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(compare(b)? == Ordering::Less)
}

fn gt(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(compare(b)? == Ordering::Greater)
}

fn le(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(compare(b)? != Ordering::Greater)
}

fn ge(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(compare(b)? != Ordering::Less)
}

// ---- unary ----

fn neg(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    match b.arg(0)?.value() {
        Value::Int(n) => Reply::value(n.checked_neg().ok_or_else(overflow)?),
        Value::Float(x) => Reply::value(Value::Float(-x)),
        other => Err(type_error("int or float", &other)),
    }
}

fn not(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(!b.arg(0)?.is_truthy())
}

/// Add `delta` to the target in place; returns the old and new values.
fn step(b: &Bindings<'_>, delta: i64) -> Result<(Value, Value), NativeError> {
    b.arg(0)?.with_value_mut(|slot| {
        let old = slot.clone();
        *slot = match &old {
            Value::Int(n) => Value::Int(n.checked_add(delta).ok_or_else(overflow)?),
            Value::Float(x) => Value::Float(x + delta as f64),
            other => return Err(type_error("int or float", other)),
        };
        Ok((old, slot.clone()))
    })?
}

fn pre_inc(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(step(b, 1)?.1)
}

fn pre_dec(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(step(b, -1)?.1)
}

fn post_inc(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(step(b, 1)?.0)
}

fn post_dec(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(step(b, -1)?.0)
}

// ---- free functions ----

fn print(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let text = b
        .args()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(b.out(), "{text}").map_err(|e| NativeError::Fatal(e.to_string()))?;
    Reply::value(Value::Null)
}

fn typeid(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(b.arg(0)?.type_id())
}

fn not_convertible(value: &Value, target: &str) -> Result<Reply, NativeError> {
    Ok(Reply::Warning {
        object: Object::null(),
        detail: format!("cannot convert {} '{value}' to {target}", value.type_id()),
    })
}

fn to_int(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let value = b.arg(0)?.value();
    let converted = match &value {
        Value::Int(n) => Some(*n),
        Value::Bool(v) => Some(i64::from(*v)),
        Value::Float(x) if x.is_finite() => Some(x.trunc() as i64),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|x| x.is_finite()).map(|x| x.trunc() as i64))
        }
        _ => None,
    };
    match converted {
        Some(n) => Reply::value(n),
        None => not_convertible(&value, type_ids::INT),
    }
}

fn to_float(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let value = b.arg(0)?.value();
    let converted = match &value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match converted {
        Some(x) => Reply::value(Value::Float(x)),
        None => not_convertible(&value, type_ids::FLOAT),
    }
}

fn to_string(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(b.arg(0)?.to_string())
}

fn array(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let requested = b.int(0)?;
    let size = usize::try_from(requested)
        .map_err(|_| NativeError::Fatal(format!("array size {requested} is negative")))?;
    if size > MAX_ARRAY_SIZE {
        return Err(NativeError::SizeLimit {
            requested,
            limit: MAX_ARRAY_SIZE,
        });
    }
    let init = b.get("init").map(Object::value).unwrap_or_default();
    let items = (0..size).map(|_| Object::new(init.deep_copy())).collect();
    Reply::value(Value::Array(items))
}

// ---- array methods ----

fn index_in(index: i64, size: usize) -> Result<usize, NativeError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < size)
        .ok_or(NativeError::IndexOutOfRange { index, size })
}

/// `a[i]` reads the element by reference; `a[i, v]` stores a copy of `v`
/// first.
fn array_at(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let index = b.int(1)?;
    let element = b.arg(0)?.with_value(|v| match v {
        Value::Array(items) => index_in(index, items.len()).map(|i| items[i].clone()),
        other => Err(type_error(type_ids::ARRAY, other)),
    })?;
    if let Some(value) = b.get("value") {
        element.set(value.value().deep_copy())?;
    }
    Ok(Reply::Value(Object::alias_of(&element)))
}

fn array_size(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let size = b.arg(0)?.with_value(|v| match v {
        Value::Array(items) => Ok(items.len()),
        other => Err(type_error(type_ids::ARRAY, other)),
    })?;
    Reply::value(size as i64)
}

fn array_push(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let item = b.arg(1)?.deep_copy();
    let size = b.arg(0)?.with_value_mut(|v| match v {
        Value::Array(items) if items.len() >= MAX_ARRAY_SIZE => Err(NativeError::SizeLimit {
            requested: items.len() as i64 + 1,
            limit: MAX_ARRAY_SIZE,
        }),
        Value::Array(items) => {
            items.push(item);
            Ok(items.len())
        }
        other => Err(type_error(type_ids::ARRAY, other)),
    })??;
    Reply::value(size as i64)
}

// ---- string methods ----

fn string_arg(b: &Bindings<'_>) -> Result<String, NativeError> {
    match b.arg(0)?.value() {
        Value::Str(s) => Ok(s),
        other => Err(type_error(type_ids::STRING, &other)),
    }
}

fn string_at(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let s = string_arg(b)?;
    let size = s.chars().count();
    let index = index_in(b.int(1)?, size)?;
    Reply::value(s.chars().nth(index).map(String::from).unwrap_or_default())
}

fn string_size(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(string_arg(b)?.chars().count() as i64)
}

/// `s.substr(start[, length])`, counted in characters. The length is
/// clamped to the end of the string.
fn substr(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let s = string_arg(b)?;
    let size = s.chars().count();
    let start = b.int(1)?;
    let start = usize::try_from(start)
        .ok()
        .filter(|&i| i <= size)
        .ok_or(NativeError::IndexOutOfRange { index: start, size })?;
    let length = match b.get("length").map(Object::value) {
        None | Some(Value::Null) => size - start,
        Some(Value::Int(n)) => usize::try_from(n).map_err(|_| NativeError::Fatal(format!("negative length {n}")))?,
        Some(other) => return Err(type_error(type_ids::INT, &other)),
    };
    Reply::value(s.chars().skip(start).take(length).collect::<String>())
}

// ---- function methods ----

fn function_arg(b: &Bindings<'_>) -> Result<FunctionValue, NativeError> {
    match b.arg(0)?.value() {
        Value::Function(function) => Ok(function),
        other => Err(type_error(type_ids::FUNCTION, &other)),
    }
}

fn function_id(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    Reply::value(function_arg(b)?.interface.id.clone())
}

fn function_params(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let params = function_arg(b)?
        .interface
        .params
        .iter()
        .map(|p| Object::new(Value::from(p.as_str())))
        .collect();
    Reply::value(Value::Array(params))
}

/// `f.call(args...)`: the machine calls `f` with the remaining arguments.
fn function_call(b: &mut Bindings<'_>) -> Result<Reply, NativeError> {
    let function = function_arg(b)?;
    let args = b.args()[1..].to_vec();
    Ok(Reply::Invoke { function, args })
}
