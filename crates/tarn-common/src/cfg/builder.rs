use std::collections::{BTreeMap, HashMap};

use log::trace;

use super::{substitute, BasicBlock, BlockId, Cfg, DefSite, Subst, Termination, UseSite, Value, ValueTable, Variable};
use crate::ops::{Conditional, Operation};

/// Identifies a block under construction within one [`CfgBuilder`].
/// Unlike [`BlockId`]s, builder ids exist before the graph is wired up,
/// so cycles need no special treatment.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BuilderId(usize);

#[derive(Debug)]
enum TermSpec {
    Straight {
        next: BuilderId,
    },

    Branch {
        then: BuilderId,
        owise: BuilderId,
        conditional: Box<dyn Conditional>,
    },

    Exit,
}

/// Accumulates the content of a single block: operations in order,
/// variable imports and exports, and finally a termination. Every use
/// is checked against the definitions visible at that point, so a
/// malformed block is rejected while it is being built rather than
/// when it misbehaves later.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    ops: Vec<Box<dyn Operation>>,
    imports: BTreeMap<Variable, Value>,
    exports: BTreeMap<Variable, Value>,

    available: HashMap<Value, DefSite>,
    uses: HashMap<Value, Vec<UseSite>>,

    termination: Option<TermSpec>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind_input(&mut self, value: Value, site: UseSite) {
        assert!(
            self.available.contains_key(&value),
            "value {:?} used before definition",
            value
        );
        self.uses.entry(value).or_default().push(site);
    }

    /// Appends an operation. Its inputs must already be defined in this
    /// block; its outputs become visible to everything added after it,
    /// shadowing any earlier definition of the same value.
    pub fn add(&mut self, op: Box<dyn Operation>) {
        let index = self.ops.len();

        for (input, operand) in op.inputs().iter().enumerate() {
            self.bind_input(operand.value, UseSite::Op { op: index, input });
        }

        for (output, operand) in op.outputs().iter().enumerate() {
            self.available
                .insert(operand.value, DefSite::Op { op: index, output });
        }

        self.ops.push(op);
    }

    /// The value `variable` holds in this block, importing it if no
    /// local definition or import has bound it yet.
    pub fn import_variable_value(&mut self, values: &mut ValueTable, variable: Variable) -> Value {
        if let Some(value) = self.exports.get(&variable) {
            return *value;
        }

        if let Some(value) = self.imports.get(&variable) {
            return *value;
        }

        let value = values.fresh();
        self.imports.insert(variable, value);
        self.available.insert(value, DefSite::Import(variable));
        value
    }

    /// Imports `variable` as a specific, pre-chosen value.
    pub fn set_import(&mut self, variable: Variable, value: Value) {
        assert!(
            !self.imports.contains_key(&variable) && !self.exports.contains_key(&variable),
            "variable {:?} already bound",
            variable
        );
        self.imports.insert(variable, value);
        self.available.insert(value, DefSite::Import(variable));
    }

    /// Exports `value` as the outgoing binding of `variable`.
    pub fn export_variable_value(&mut self, variable: Variable, value: Value) {
        self.bind_input(value, UseSite::Export(variable));
        self.exports.insert(variable, value);
    }

    pub fn get_import(&self, variable: Variable) -> Option<Value> {
        self.imports.get(&variable).copied()
    }

    pub fn get_export(&self, variable: Variable) -> Option<Value> {
        self.exports.get(&variable).copied()
    }

    pub fn terminate_straight(&mut self, next: BuilderId) {
        assert!(self.termination.is_none(), "block already terminated");
        self.termination = Some(TermSpec::Straight { next });
    }

    pub fn terminate_branch(
        &mut self,
        then: BuilderId,
        owise: BuilderId,
        conditional: Box<dyn Conditional>,
    ) {
        assert!(self.termination.is_none(), "block already terminated");

        for (input, operand) in conditional.inputs().iter().enumerate() {
            self.bind_input(operand.value, UseSite::Termination { input });
        }

        self.termination = Some(TermSpec::Branch {
            then,
            owise,
            conditional,
        });
    }

    pub fn terminate_exit(&mut self) {
        assert!(self.termination.is_none(), "block already terminated");
        self.termination = Some(TermSpec::Exit);
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    fn successors(&self) -> Vec<BuilderId> {
        match self.termination.as_ref() {
            Some(TermSpec::Straight { next }) => vec![*next],
            Some(TermSpec::Branch { then, owise, .. }) => vec![*then, *owise],
            Some(TermSpec::Exit) => Vec::new(),
            None => panic!("block left unterminated"),
        }
    }

    /// Copies `block`'s imports into this builder, with `mapper`
    /// applied to each imported value.
    pub fn recreate_imports(&mut self, block: &BasicBlock, mut mapper: impl FnMut(Value) -> Value) {
        for (variable, value) in block.used() {
            self.set_import(*variable, mapper(*value));
        }
    }

    /// Copies `block`'s operations into this builder. `mapper` turns
    /// each original operation into its replacements, which may be
    /// none, one, or several.
    pub fn recreate_ops(
        &mut self,
        block: &BasicBlock,
        mut mapper: impl FnMut(&dyn Operation) -> Vec<Box<dyn Operation>>,
    ) {
        for op in block.ops() {
            for replacement in mapper(op.as_ref()) {
                self.add(replacement);
            }
        }
    }

    /// Copies `block`'s exports into this builder, with `mapper`
    /// applied to each exported value.
    pub fn recreate_exports(&mut self, block: &BasicBlock, mut mapper: impl FnMut(Value) -> Value) {
        for (variable, value) in block.defd() {
            self.export_variable_value(*variable, mapper(*value));
        }
    }

    /// An unterminated copy of `block`'s content.
    pub fn recreate(block: &BasicBlock) -> CodeBuilder {
        Self::recreate_with(
            block,
            |value| value,
            |op| vec![op.copy(&Subst::new())],
            |value| value,
        )
    }

    /// An unterminated copy of `block`'s content, transformed by the
    /// three mappers.
    pub fn recreate_with(
        block: &BasicBlock,
        import_mapper: impl FnMut(Value) -> Value,
        op_mapper: impl FnMut(&dyn Operation) -> Vec<Box<dyn Operation>>,
        export_mapper: impl FnMut(Value) -> Value,
    ) -> CodeBuilder {
        let mut builder = CodeBuilder::new();
        builder.recreate_imports(block, import_mapper);
        builder.recreate_ops(block, op_mapper);
        builder.recreate_exports(block, export_mapper);
        builder
    }

    /// Fuses a straight-line chain of blocks into one unterminated
    /// builder. Later blocks' imports are resolved against earlier
    /// blocks' exports, and the substitution that resolution induced is
    /// returned alongside the builder so callers can rewrite whatever
    /// referred to the merged blocks.
    pub fn merge(cfg: &Cfg, ids: &[BlockId]) -> (CodeBuilder, Subst) {
        let mut builder = CodeBuilder::new();
        let mut subs = Subst::new();

        // variable bindings visible at the current end of the chain
        let mut bindings: BTreeMap<Variable, Value> = BTreeMap::new();
        let mut exports: BTreeMap<Variable, Value> = BTreeMap::new();

        for (index, id) in ids.iter().enumerate() {
            let block = cfg.get(*id);

            for (variable, value) in block.used() {
                if index == 0 {
                    builder.set_import(*variable, *value);
                    bindings.insert(*variable, *value);
                } else {
                    let bound = *bindings
                        .get(variable)
                        .unwrap_or_else(|| panic!("variable {:?} not bound along merged chain", variable));
                    subs.insert(*value, bound);
                }
            }

            for op in block.ops() {
                builder.add(op.copy(&subs));
            }

            for (variable, value) in block.defd() {
                let mapped = substitute(&subs, *value);
                bindings.insert(*variable, mapped);
                exports.insert(*variable, mapped);
            }
        }

        for (variable, value) in &exports {
            builder.export_variable_value(*variable, *value);
        }

        (builder, subs)
    }

    fn freeze(self, predecessors: Vec<BlockId>, ids: &HashMap<BuilderId, BlockId>) -> BasicBlock {
        let termination = match self.termination {
            Some(TermSpec::Straight { next }) => Termination::Straight { next: ids[&next] },
            Some(TermSpec::Branch {
                then,
                owise,
                conditional,
            }) => Termination::Branch {
                then: ids[&then],
                owise: ids[&owise],
                conditional,
            },
            Some(TermSpec::Exit) => Termination::Exit,
            None => panic!("block left unterminated"),
        };

        BasicBlock {
            ops: self.ops,
            used: self.imports,
            defd: self.exports,
            predecessors,
            termination,
            defs: self.available,
            uses: self.uses,
        }
    }
}

/// Accumulates blocks under construction and freezes them into a
/// [`Cfg`]. Blocks are discovered depth-first from the entry, so only
/// reachable blocks make it into the frozen graph, and the entry is
/// always block 0.
#[derive(Debug, Default)]
pub struct CfgBuilder {
    builders: Vec<CodeBuilder>,
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, builder: CodeBuilder) -> BuilderId {
        let id = BuilderId(self.builders.len());
        self.builders.push(builder);
        id
    }

    /// Reserves an empty block, to be filled in through [`Self::get_mut`].
    pub fn block(&mut self) -> BuilderId {
        self.add(CodeBuilder::new())
    }

    pub fn get(&self, id: BuilderId) -> &CodeBuilder {
        &self.builders[id.0]
    }

    pub fn get_mut(&mut self, id: BuilderId) -> &mut CodeBuilder {
        &mut self.builders[id.0]
    }

    pub fn build(self, entry: BuilderId) -> Cfg {
        let mut order = Vec::new();
        let mut ids: HashMap<BuilderId, BlockId> = HashMap::new();

        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if ids.contains_key(&id) {
                continue;
            }

            ids.insert(id, BlockId(order.len()));
            order.push(id);

            for successor in self.builders[id.0].successors().into_iter().rev() {
                stack.push(successor);
            }
        }

        trace!("freezing graph of {} reachable blocks", order.len());

        let mut predecessors: Vec<Vec<BlockId>> = vec![Vec::new(); order.len()];
        for (index, id) in order.iter().enumerate() {
            for successor in self.builders[id.0].successors() {
                predecessors[ids[&successor].0].push(BlockId(index));
            }
        }

        let mut slots: Vec<Option<CodeBuilder>> = self.builders.into_iter().map(Some).collect();
        let mut blocks = Vec::with_capacity(order.len());

        for (id, preds) in order.iter().zip(predecessors) {
            let builder = match slots[id.0].take() {
                Some(builder) => builder,
                None => panic!("builder frozen twice"),
            };
            blocks.push(builder.freeze(preds, &ids));
        }

        Cfg {
            blocks,
            entry: BlockId(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{Operand, Role};
    use crate::ops::{Arith, Arithmetic, CopyOp, Literal, Relation, TacConditional};

    #[test]
    #[should_panic(expected = "used before definition")]
    fn uses_must_follow_definitions() {
        let mut values = ValueTable::new();
        let a = values.fresh();
        let b = values.fresh();

        let mut builder = CodeBuilder::new();
        builder.add(Box::new(CopyOp {
            destination: a,
            source: b,
        }));
    }

    #[test]
    fn imports_are_reused_per_variable() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut builder = CodeBuilder::new();
        let first = builder.import_variable_value(&mut values, x);
        let second = builder.import_variable_value(&mut values, x);

        assert_eq!(first, second);
        assert_eq!(builder.get_import(x), Some(first));
    }

    #[test]
    fn exports_shadow_imports_for_lookup() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut builder = CodeBuilder::new();
        let incoming = builder.import_variable_value(&mut values, x);

        let updated = values.fresh();
        builder.add(Box::new(Arithmetic {
            result: updated,
            left: incoming,
            right: incoming,
            op: Arith::Add,
        }));
        builder.export_variable_value(x, updated);

        assert_eq!(builder.import_variable_value(&mut values, x), updated);
    }

    #[test]
    fn entry_is_block_zero_and_unreachable_blocks_are_dropped() {
        let mut graph = CfgBuilder::new();

        let entry = graph.block();
        let tail = graph.block();
        let orphan = graph.block();

        graph.get_mut(entry).terminate_straight(tail);
        graph.get_mut(tail).terminate_exit();
        graph.get_mut(orphan).terminate_exit();

        let cfg = graph.build(entry);

        assert_eq!(cfg.len(), 2);
        assert_eq!(cfg.entry().index(), 0);
        assert_eq!(cfg.get(cfg.entry()).successors().len(), 1);
    }

    #[test]
    fn cycles_freeze_without_special_casing() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let entry = graph.block();
        let body = graph.block();
        let exit = graph.block();

        let init = values.fresh();
        graph.get_mut(entry).add(Box::new(Literal {
            result: init,
            value: 0,
        }));
        graph.get_mut(entry).export_variable_value(x, init);
        graph.get_mut(entry).terminate_straight(body);

        let current = graph.get_mut(body).import_variable_value(&mut values, x);
        let limit = values.fresh();
        graph.get_mut(body).add(Box::new(Literal {
            result: limit,
            value: 10,
        }));
        graph.get_mut(body).export_variable_value(x, current);
        graph.get_mut(body).terminate_branch(
            body,
            exit,
            Box::new(TacConditional::new(current, limit, Relation::Less)),
        );

        graph.get_mut(exit).terminate_exit();

        let cfg = graph.build(entry);
        assert_eq!(cfg.len(), 3);

        let body_id = cfg.get(cfg.entry()).successors()[0];
        let body_block = cfg.get(body_id);
        assert!(body_block.joins());
        assert!(body_block.splits());
        assert!(body_block.successors().contains(&body_id));
    }

    #[test]
    fn frozen_blocks_expose_def_and_use_sites() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let entry = graph.block();

        let a = values.fresh();
        let b = values.fresh();
        graph.get_mut(entry).add(Box::new(Literal { result: a, value: 1 }));
        graph.get_mut(entry).add(Box::new(CopyOp {
            destination: b,
            source: a,
        }));
        graph.get_mut(entry).export_variable_value(x, b);
        graph.get_mut(entry).terminate_exit();

        let cfg = graph.build(entry);
        let block = cfg.get(cfg.entry());

        assert_eq!(block.def_site(a), Some(DefSite::Op { op: 0, output: 0 }));
        assert_eq!(block.def_site(b), Some(DefSite::Op { op: 1, output: 0 }));
        assert!(block.is_last_use(a, UseSite::Op { op: 1, input: 0 }));
        assert!(block.is_last_use(b, UseSite::Export(x)));
        assert_eq!(block.const_value(b), Some(1));
    }

    #[test]
    fn merge_substitutes_chained_bindings() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let head = graph.block();
        let tail = graph.block();

        let defined = values.fresh();
        graph.get_mut(head).add(Box::new(Literal {
            result: defined,
            value: 3,
        }));
        graph.get_mut(head).export_variable_value(x, defined);
        graph.get_mut(head).terminate_straight(tail);

        let imported = graph.get_mut(tail).import_variable_value(&mut values, x);
        let doubled = values.fresh();
        graph.get_mut(tail).add(Box::new(Arithmetic {
            result: doubled,
            left: imported,
            right: imported,
            op: Arith::Add,
        }));
        graph.get_mut(tail).export_variable_value(x, doubled);
        graph.get_mut(tail).terminate_exit();

        let cfg = graph.build(head);
        let tail_id = cfg.get(cfg.entry()).successors()[0];

        let (merged, subs) = CodeBuilder::merge(&cfg, &[cfg.entry(), tail_id]);

        assert_eq!(substitute(&subs, imported), defined);
        assert_eq!(merged.get_export(x), Some(doubled));
        assert_eq!(merged.get_import(x), None);
    }

    #[test]
    fn operand_roles_round_trip() {
        let mut values = ValueTable::new();
        let a = values.fresh();

        let operand = Operand::in_out(a).no_alloc();
        assert_eq!(operand.role, Role::UseDef);
        assert!(operand.no_alloc);
        assert!(operand.clobbers.is_empty());
    }
}
