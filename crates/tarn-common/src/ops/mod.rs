pub use tac::{Argument, Arith, Arithmetic, CopyOp, Literal, Load, Relation, Retval, Store, TacConditional, Width};

mod tac;

use std::any::Any;
use std::fmt;

use crate::cfg::{Operand, Subst, Value};

/// The destination and source of a register-to-register copy, as
/// reported by [`Operation::as_copy`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CopyPair {
    pub destination: Value,
    pub source: Value,
}

/// An instruction inside a basic block. The graph code never inspects
/// concrete instruction types; everything it needs is expressed through
/// this interface, so instruction sets can be swapped out under the
/// same analyses.
pub trait Operation: fmt::Debug {
    fn inputs(&self) -> Vec<Operand> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<Operand> {
        Vec::new()
    }

    /// Operations with side effects survive dead code elimination and
    /// pin their ordering.
    fn has_side_effect(&self) -> bool {
        false
    }

    /// Attempts constant folding. `env` resolves an input value to its
    /// known constant, if any.
    fn const_value(&self, _env: &dyn Fn(Value) -> Option<i64>) -> Option<i64> {
        None
    }

    /// Recreates this operation with `subs` applied to every operand.
    fn copy(&self, subs: &Subst) -> Box<dyn Operation>;

    /// Structural equality across trait objects.
    fn is_identical(&self, other: &dyn Operation) -> bool;

    /// Reports this operation as a plain copy, which makes its operands
    /// coalescing candidates for the register allocator.
    fn as_copy(&self) -> Option<CopyPair> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        let _ = namer;
        format!("{:?}", self)
    }
}

/// The test deciding a two-way branch. Conditionals read values but
/// never define any.
pub trait Conditional: fmt::Debug {
    fn inputs(&self) -> Vec<Operand>;

    fn copy(&self, subs: &Subst) -> Box<dyn Conditional>;

    /// The conditional testing the opposite outcome, used when a
    /// branch's arms are swapped.
    fn inverted(&self) -> Box<dyn Conditional>;

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String;
}
