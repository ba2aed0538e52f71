use std::collections::HashMap;

/// A single static value in a control flow graph. Values carry no
/// payload themselves; what a value means is determined by the
/// operation defining it and the block it lives in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Value(usize);

impl Value {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Produces fresh [`Value`]s. Values from the same table are ordered by
/// creation, which keeps every downstream tie-break deterministic.
#[derive(Debug, Default)]
pub struct ValueTable {
    next: usize,
}

impl ValueTable {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn fresh(&mut self) -> Value {
        let value = Value(self.next);
        self.next += 1;
        value
    }
}

/// A source-level variable, used to name values across block
/// boundaries before registers are assigned.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Variable(usize);

impl Variable {
    pub fn new(index: usize) -> Self {
        Self(index)
    }
}

/// A value-to-value substitution, applied when blocks are recreated.
pub type Subst = HashMap<Value, Value>;

/// Looks `value` up in `subs`, defaulting to the value itself.
pub fn substitute(subs: &Subst, value: Value) -> Value {
    subs.get(&value).copied().unwrap_or(value)
}

/// How an operation touches one of its operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Use,
    Def,
    UseDef,
}

/// A value as an operation sees it: the value itself, its role, and
/// allocation constraints.
#[derive(Clone, Debug)]
pub struct Operand {
    pub value: Value,
    pub role: Role,

    /// Exempt from register allocation (e.g. an immediate encoded as a
    /// value, or a stack slot address).
    pub no_alloc: bool,

    /// Values this operand destroys when the operation executes, even
    /// though they are not inputs or outputs of it.
    pub clobbers: Vec<Value>,
}

impl Operand {
    pub fn input(value: Value) -> Self {
        Self {
            value,
            role: Role::Use,
            no_alloc: false,
            clobbers: Vec::new(),
        }
    }

    pub fn output(value: Value) -> Self {
        Self {
            value,
            role: Role::Def,
            no_alloc: false,
            clobbers: Vec::new(),
        }
    }

    pub fn in_out(value: Value) -> Self {
        Self {
            value,
            role: Role::UseDef,
            no_alloc: false,
            clobbers: Vec::new(),
        }
    }

    pub fn no_alloc(mut self) -> Self {
        self.no_alloc = true;
        self
    }

    pub fn clobbering(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.clobbers.extend(values);
        self
    }
}
