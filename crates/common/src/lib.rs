//! Quill common types.
//!
//! This crate provides the data structures shared by the compiler and the
//! execution machine:
//!
//! - [`Token`] / [`TokenKind`]: classified lexer output
//! - [`Value`] / [`Object`]: dynamically typed, reference-counted cells
//!   with owned, aliased and placeholder payloads
//! - [`Instruction`] / [`Statement`]: the compiled form of one logical line
//! - [`Interface`] / [`Registry`]: callable descriptors and their lookup table
//! - [`NativeError`]: the fatal signal natives return

pub mod command;
pub mod error;
pub mod instruction;
pub mod interface;
pub mod object;
pub mod registry;
pub mod token;
pub mod value;

// Re-export commonly used types at the crate root.
pub use command::Command;
pub use error::NativeError;
pub use instruction::{Argument, Callee, Code, Instruction, LookupKey, Signature, Statement};
pub use interface::{
    ArgumentMode, Bindings, Body, ClosureRecord, FunctionValue, Interface, NativeFn, Reply,
};
pub use object::Object;
pub use registry::Registry;
pub use token::{Token, TokenKind};
pub use value::Value;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_array() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(any::<i64>(), 0..16)
    }

    proptest! {
        /// Mutating a deep copy never changes the source.
        #[test]
        fn deep_copy_shares_nothing(items in arb_array(), replacement in any::<i64>()) {
            let source = Object::new(Value::Array(
                items.iter().map(|&n| Object::new(Value::Int(n))).collect(),
            ));
            let copy = source.deep_copy();
            if let Value::Array(elements) = copy.value() {
                for e in &elements {
                    e.set(Value::Int(replacement)).unwrap();
                }
            }
            let expected = Value::Array(items.iter().map(|&n| Object::new(Value::Int(n))).collect());
            prop_assert_eq!(source.value(), expected);
        }

        /// Every handle in an alias chain observes the last write.
        #[test]
        fn alias_chain_sees_writes(depth in 1usize..8, value in any::<i64>()) {
            let owner = Object::new(Value::Null);
            let mut handles = vec![owner.clone()];
            for _ in 0..depth {
                let next = Object::alias_of(handles.last().unwrap());
                handles.push(next);
            }
            handles.last().unwrap().set(Value::Int(value)).unwrap();
            for h in &handles {
                prop_assert_eq!(h.value(), Value::Int(value));
            }
        }
    }
}
