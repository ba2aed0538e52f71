use std::collections::{BTreeMap, HashMap};

use super::{Operand, Value, Variable};
use crate::ops::{Conditional, Operation};

/// Identifies a block within one [`Cfg`]. Ids are assigned in
/// depth-first discovery order, so the entry block is always id 0.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a value is defined within its block.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DefSite {
    /// Bound on entry to the block as the value of a variable.
    Import(Variable),

    /// Defined by the `output`th output of the `op`th operation.
    Op { op: usize, output: usize },
}

/// One place a value is used within its block. Use sites are recorded
/// in program order, so the last element of a value's use list is its
/// last use.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UseSite {
    /// Read by the `input`th input of the `op`th operation.
    Op { op: usize, input: usize },

    /// Passed out of the block as the value of a variable.
    Export(Variable),

    /// Read by the terminating conditional.
    Termination { input: usize },
}

/// How control leaves a block.
#[derive(Debug)]
pub enum Termination {
    Straight {
        next: BlockId,
    },

    Branch {
        then: BlockId,
        owise: BlockId,
        conditional: Box<dyn Conditional>,
    },

    Exit,
}

impl Termination {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Termination::Straight { next } => vec![*next],
            Termination::Branch { then, owise, .. } => vec![*then, *owise],
            Termination::Exit => Vec::new(),
        }
    }

    pub fn inputs(&self) -> Vec<Operand> {
        match self {
            Termination::Branch { conditional, .. } => conditional.inputs(),
            _ => Vec::new(),
        }
    }

    /// The same branch with its arms swapped and its conditional
    /// inverted. Panics on non-branches.
    pub fn twisted(&self) -> Termination {
        match self {
            Termination::Branch {
                then,
                owise,
                conditional,
            } => Termination::Branch {
                then: *owise,
                owise: *then,
                conditional: conditional.inverted(),
            },
            _ => panic!("only branches can be twisted"),
        }
    }
}

/// A straight-line run of operations, the variables flowing in and out
/// of it, and its termination. Blocks are immutable once built; every
/// change goes through recreation, except for conditional twisting.
#[derive(Debug)]
pub struct BasicBlock {
    pub(crate) ops: Vec<Box<dyn Operation>>,
    pub(crate) used: BTreeMap<Variable, Value>,
    pub(crate) defd: BTreeMap<Variable, Value>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) termination: Termination,

    pub(crate) defs: HashMap<Value, DefSite>,
    pub(crate) uses: HashMap<Value, Vec<UseSite>>,
}

impl BasicBlock {
    pub fn ops(&self) -> &[Box<dyn Operation>] {
        &self.ops
    }

    /// Variables this block imports, and the values they enter as.
    pub fn used(&self) -> &BTreeMap<Variable, Value> {
        &self.used
    }

    /// Variables this block exports, and the values they leave as.
    pub fn defd(&self) -> &BTreeMap<Variable, Value> {
        &self.defd
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.termination.successors()
    }

    /// Whether several edges converge on this block.
    pub fn joins(&self) -> bool {
        self.predecessors.len() > 1
    }

    /// Whether several edges leave this block.
    pub fn splits(&self) -> bool {
        self.successors().len() > 1
    }

    pub fn has_ops(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Every value that must be live when this block ends: its exports
    /// and the inputs of its terminating conditional.
    pub fn outputs(&self) -> Vec<Operand> {
        let mut outputs: Vec<Operand> = self.defd.values().map(|value| Operand::input(*value)).collect();
        outputs.extend(self.termination.inputs());
        outputs
    }

    pub fn def_site(&self, value: Value) -> Option<DefSite> {
        self.defs.get(&value).copied()
    }

    pub fn uses_of(&self, value: Value) -> &[UseSite] {
        self.uses.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_last_use(&self, value: Value, site: UseSite) -> bool {
        self.uses.get(&value).and_then(|sites| sites.last()) == Some(&site)
    }

    /// The constant this value is known to hold within this block, if
    /// its defining operation (and, recursively, that operation's
    /// inputs) fold.
    pub fn const_value(&self, value: Value) -> Option<i64> {
        match self.defs.get(&value)? {
            DefSite::Import(_) => None,
            DefSite::Op { op, .. } => {
                let env = |input: Value| self.const_value(input);
                self.ops[*op].const_value(&env)
            }
        }
    }
}

/// An immutable control flow graph: an arena of blocks and a
/// distinguished entry.
#[derive(Debug)]
pub struct Cfg {
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) entry: BlockId,
}

impl Cfg {
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn get(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Swaps the arms of `id`'s branch and inverts its conditional.
    /// This is the one in-place edit the graph supports; it changes no
    /// value, no edge set, and no block content.
    pub fn twist_conditional(&mut self, id: BlockId) {
        let twisted = self.blocks[id.0].termination.twisted();
        self.blocks[id.0].termination = twisted;
    }
}
