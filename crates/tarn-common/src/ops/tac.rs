//! A generic three-address instruction set. This is the target-neutral
//! code the middle end runs on; a target backend supplies its own
//! [`Operation`] implementations with the same interface.

use std::any::Any;
use std::fmt;

use super::{Conditional, CopyPair, Operation};
use crate::cfg::{substitute, Operand, Subst, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

impl Arith {
    pub fn evaluate(&self, left: i64, right: i64) -> i64 {
        match self {
            Arith::Add => left.wrapping_add(right),
            Arith::Sub => left.wrapping_sub(right),
            Arith::Mul => left.wrapping_mul(right),
            Arith::Shl => left.wrapping_shl(right as u32),
            Arith::Shr => left.wrapping_shr(right as u32),
            Arith::BitAnd => left & right,
            Arith::BitOr => left | right,
            Arith::BitXor => left ^ right,
        }
    }
}

impl fmt::Display for Arith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Shl => "<<",
            Arith::Shr => ">>",
            Arith::BitAnd => "&",
            Arith::BitOr => "|",
            Arith::BitXor => "^",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relation {
    Equal,
    Less,
}

impl Relation {
    pub fn evaluate(&self, left: i64, right: i64) -> bool {
        match self {
            Relation::Equal => left == right,
            Relation::Less => left < right,
        }
    }
}

/// The access width of a memory operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

/// `result <- value`
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    pub result: Value,
    pub value: i64,
}

impl Operation for Literal {
    fn outputs(&self) -> Vec<Operand> {
        vec![Operand::output(self.result)]
    }

    fn const_value(&self, _env: &dyn Fn(Value) -> Option<i64>) -> Option<i64> {
        Some(self.value)
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Literal {
            result: substitute(subs, self.result),
            value: self.value,
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("{} = {}", namer(self.result), self.value)
    }
}

/// `destination <- source`
#[derive(Clone, Debug, PartialEq)]
pub struct CopyOp {
    pub destination: Value,
    pub source: Value,
}

impl Operation for CopyOp {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.source)]
    }

    fn outputs(&self) -> Vec<Operand> {
        vec![Operand::output(self.destination)]
    }

    fn const_value(&self, env: &dyn Fn(Value) -> Option<i64>) -> Option<i64> {
        env(self.source)
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(CopyOp {
            destination: substitute(subs, self.destination),
            source: substitute(subs, self.source),
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_copy(&self) -> Option<CopyPair> {
        Some(CopyPair {
            destination: self.destination,
            source: self.source,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("{} = {}", namer(self.destination), namer(self.source))
    }
}

/// `result <- left op right`
#[derive(Clone, Debug, PartialEq)]
pub struct Arithmetic {
    pub result: Value,
    pub left: Value,
    pub right: Value,
    pub op: Arith,
}

impl Operation for Arithmetic {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.left), Operand::input(self.right)]
    }

    fn outputs(&self) -> Vec<Operand> {
        vec![Operand::output(self.result)]
    }

    fn const_value(&self, env: &dyn Fn(Value) -> Option<i64>) -> Option<i64> {
        let left = env(self.left)?;
        let right = env(self.right)?;
        Some(self.op.evaluate(left, right))
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Arithmetic {
            result: substitute(subs, self.result),
            left: substitute(subs, self.left),
            right: substitute(subs, self.right),
            op: self.op,
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!(
            "{} = {} {} {}",
            namer(self.result),
            namer(self.left),
            self.op,
            namer(self.right)
        )
    }
}

/// Marks `value` as the procedure's `index`th incoming argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub index: usize,
    pub value: Value,
}

impl Operation for Argument {
    fn outputs(&self) -> Vec<Operand> {
        vec![Operand::output(self.value)]
    }

    fn has_side_effect(&self) -> bool {
        true
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Argument {
            index: self.index,
            value: substitute(subs, self.value),
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("{} = arg {}", namer(self.value), self.index)
    }
}

/// Marks `value` as the procedure's `index`th return value.
#[derive(Clone, Debug, PartialEq)]
pub struct Retval {
    pub index: usize,
    pub value: Value,
}

impl Operation for Retval {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.value)]
    }

    fn has_side_effect(&self) -> bool {
        true
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Retval {
            index: self.index,
            value: substitute(subs, self.value),
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("ret {} = {}", self.index, namer(self.value))
    }
}

/// `value <- memory[address]`
#[derive(Clone, Debug, PartialEq)]
pub struct Load {
    pub value: Value,
    pub address: Value,
    pub width: Width,
}

impl Operation for Load {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.address)]
    }

    fn outputs(&self) -> Vec<Operand> {
        vec![Operand::output(self.value)]
    }

    fn has_side_effect(&self) -> bool {
        true
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Load {
            value: substitute(subs, self.value),
            address: substitute(subs, self.address),
            width: self.width,
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("{} = load {:?} [{}]", namer(self.value), self.width, namer(self.address))
    }
}

/// `memory[address] <- value`
#[derive(Clone, Debug, PartialEq)]
pub struct Store {
    pub value: Value,
    pub address: Value,
    pub width: Width,
}

impl Operation for Store {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.value), Operand::input(self.address)]
    }

    fn has_side_effect(&self) -> bool {
        true
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Operation> {
        Box::new(Store {
            value: substitute(subs, self.value),
            address: substitute(subs, self.address),
            width: self.width,
        })
    }

    fn is_identical(&self, other: &dyn Operation) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        format!("store {:?} [{}] = {}", self.width, namer(self.address), namer(self.value))
    }
}

/// A two-operand relational test.
#[derive(Clone, Debug, PartialEq)]
pub struct TacConditional {
    pub left: Value,
    pub right: Value,
    pub relation: Relation,
    pub negated: bool,
}

impl TacConditional {
    pub fn new(left: Value, right: Value, relation: Relation) -> Self {
        Self {
            left,
            right,
            relation,
            negated: false,
        }
    }

    pub fn evaluate(&self, left: i64, right: i64) -> bool {
        self.relation.evaluate(left, right) != self.negated
    }
}

impl Conditional for TacConditional {
    fn inputs(&self) -> Vec<Operand> {
        vec![Operand::input(self.left), Operand::input(self.right)]
    }

    fn copy(&self, subs: &Subst) -> Box<dyn Conditional> {
        Box::new(TacConditional {
            left: substitute(subs, self.left),
            right: substitute(subs, self.right),
            relation: self.relation,
            negated: self.negated,
        })
    }

    fn inverted(&self) -> Box<dyn Conditional> {
        Box::new(TacConditional {
            left: self.left,
            right: self.right,
            relation: self.relation,
            negated: !self.negated,
        })
    }

    fn render(&self, namer: &dyn Fn(Value) -> String) -> String {
        let symbol = match (self.relation, self.negated) {
            (Relation::Equal, false) => "==",
            (Relation::Equal, true) => "!=",
            (Relation::Less, false) => "<",
            (Relation::Less, true) => ">=",
        };
        format!("{} {} {}", namer(self.left), symbol, namer(self.right))
    }
}
