use std::collections::BTreeSet;

use log::trace;

use super::DominatorTree;
use crate::cfg::{edges, BlockId, Cfg};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LoopId(usize);

/// One natural loop: its body, and its position in the nesting forest.
#[derive(Debug)]
pub struct LoopEntry {
    blocks: BTreeSet<BlockId>,
    inners: Vec<LoopId>,
    outer: Option<LoopId>,
}

/// Every natural loop in a graph, arranged into a nesting forest, plus
/// the dominator tree the discovery was based on.
#[derive(Debug)]
pub struct LoopInfo {
    entries: Vec<LoopEntry>,
    roots: Vec<LoopId>,
    dtree: DominatorTree,
}

impl LoopInfo {
    pub fn dominators(&self) -> &DominatorTree {
        &self.dtree
    }

    pub fn roots(&self) -> &[LoopId] {
        &self.roots
    }

    pub fn blocks(&self, id: LoopId) -> &BTreeSet<BlockId> {
        &self.entries[id.0].blocks
    }

    pub fn inners(&self, id: LoopId) -> &[LoopId] {
        &self.entries[id.0].inners
    }

    /// Nesting depth; loops outside any other loop have depth 1.
    pub fn depth(&self, id: LoopId) -> usize {
        match self.entries[id.0].outer {
            Some(outer) => 1 + self.depth(outer),
            None => 1,
        }
    }

    /// The innermost loop containing `block`, if any.
    pub fn find(&self, block: BlockId) -> Option<LoopId> {
        fn descend(info: &LoopInfo, candidates: &[LoopId], block: BlockId) -> Option<LoopId> {
            for id in candidates {
                if info.blocks(*id).contains(&block) {
                    return Some(descend(info, info.inners(*id), block).unwrap_or(*id));
                }
            }
            None
        }

        descend(self, &self.roots, block)
    }

    /// How deeply nested `block` is; 0 outside any loop.
    pub fn loop_depth(&self, block: BlockId) -> usize {
        self.find(block).map(|id| self.depth(id)).unwrap_or(0)
    }
}

/// Discovers every natural loop: one body per back edge, merged when
/// bodies overlap without nesting, then arranged into a forest by
/// containment.
pub fn find_loops(cfg: &Cfg) -> LoopInfo {
    let dtree = DominatorTree::compute(cfg);

    let mut bodies: Vec<BTreeSet<BlockId>> = Vec::new();
    for edge in edges(cfg) {
        if dtree.dominates(edge.target, edge.source) {
            let mut blocks = BTreeSet::new();
            blocks.insert(edge.target);
            gather_predecessors(cfg, edge.source, edge.target, &mut blocks);
            bodies.push(blocks);
        }
    }

    trace!("{} back edges found", bodies.len());

    eliminate_overlapping(&mut bodies);

    let entries = build_forest(bodies);
    let roots = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.outer.is_none())
        .map(|(index, _)| LoopId(index))
        .collect();

    LoopInfo {
        entries,
        roots,
        dtree,
    }
}

/// Collects everything that reaches `from` without passing through the
/// loop header.
fn gather_predecessors(cfg: &Cfg, from: BlockId, header: BlockId, blocks: &mut BTreeSet<BlockId>) {
    if !blocks.insert(from) {
        return;
    }

    if from != header {
        for pred in cfg.get(from).predecessors() {
            gather_predecessors(cfg, *pred, header, blocks);
        }
    }
}

/// Two back edges into the same header produce bodies that overlap
/// without either containing the other; such bodies are one loop with
/// two latches and get merged.
fn eliminate_overlapping(bodies: &mut Vec<BTreeSet<BlockId>>) {
    let mut index = 0;
    while index < bodies.len() {
        let mut other = index + 1;
        while other < bodies.len() {
            let disjoint = bodies[index].is_disjoint(&bodies[other]);
            let nested = bodies[index] != bodies[other]
                && (bodies[index].is_subset(&bodies[other])
                    || bodies[other].is_subset(&bodies[index]));

            if !disjoint && !nested {
                let merged = bodies.remove(other);
                bodies[index].extend(merged);
            } else {
                other += 1;
            }
        }
        index += 1;
    }
}

/// Arranges loop bodies into a forest: each body's parent is its
/// smallest strict superset.
fn build_forest(bodies: Vec<BTreeSet<BlockId>>) -> Vec<LoopEntry> {
    let mut entries: Vec<LoopEntry> = bodies
        .into_iter()
        .map(|blocks| LoopEntry {
            blocks,
            inners: Vec::new(),
            outer: None,
        })
        .collect();

    for index in 0..entries.len() {
        let mut parent: Option<usize> = None;

        for candidate in 0..entries.len() {
            if candidate == index {
                continue;
            }

            if entries[index].blocks.is_subset(&entries[candidate].blocks)
                && entries[index].blocks.len() < entries[candidate].blocks.len()
            {
                let smaller = match parent {
                    Some(parent) => entries[candidate].blocks.len() < entries[parent].blocks.len(),
                    None => true,
                };

                if smaller {
                    parent = Some(candidate);
                }
            } else {
                assert!(
                    entries[index].blocks.is_disjoint(&entries[candidate].blocks)
                        || entries[candidate].blocks.is_subset(&entries[index].blocks),
                    "loop bodies must nest or stay apart"
                );
            }
        }

        if let Some(parent) = parent {
            entries[index].outer = Some(LoopId(parent));
            entries[parent].inners.push(LoopId(index));
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{CfgBuilder, ValueTable, Variable};
    use crate::ops::{Literal, Relation, TacConditional};

    /// entry -> outer_head -> inner_head -> inner_head (self loop)
    ///                         -> outer_head (outer back edge) -> exit
    fn nested_loops() -> Cfg {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let entry = graph.block();
        let outer_head = graph.block();
        let inner_head = graph.block();
        let latch = graph.block();
        let exit = graph.block();

        let init = values.fresh();
        graph.get_mut(entry).add(Box::new(Literal {
            result: init,
            value: 0,
        }));
        graph.get_mut(entry).export_variable_value(x, init);
        graph.get_mut(entry).terminate_straight(outer_head);

        let v = graph.get_mut(outer_head).import_variable_value(&mut values, x);
        graph.get_mut(outer_head).export_variable_value(x, v);
        graph.get_mut(outer_head).terminate_straight(inner_head);

        let v = graph.get_mut(inner_head).import_variable_value(&mut values, x);
        graph.get_mut(inner_head).export_variable_value(x, v);
        graph.get_mut(inner_head).terminate_branch(
            inner_head,
            latch,
            Box::new(TacConditional::new(v, v, Relation::Equal)),
        );

        let v = graph.get_mut(latch).import_variable_value(&mut values, x);
        graph.get_mut(latch).export_variable_value(x, v);
        graph.get_mut(latch).terminate_branch(
            outer_head,
            exit,
            Box::new(TacConditional::new(v, v, Relation::Equal)),
        );

        graph.get_mut(exit).terminate_exit();

        graph.build(entry)
    }

    #[test]
    fn nested_loops_form_a_two_level_forest() {
        let cfg = nested_loops();
        let info = find_loops(&cfg);

        assert_eq!(info.roots().len(), 1);
        let outer = info.roots()[0];
        assert_eq!(info.inners(outer).len(), 1);
        let inner = info.inners(outer)[0];

        assert_eq!(info.depth(outer), 1);
        assert_eq!(info.depth(inner), 2);
        assert!(info.blocks(inner).is_subset(info.blocks(outer)));
        assert_eq!(info.blocks(inner).len(), 1);
    }

    #[test]
    fn find_reports_the_innermost_containing_loop() {
        let cfg = nested_loops();
        let info = find_loops(&cfg);

        let outer = info.roots()[0];
        let inner = info.inners(outer)[0];
        let inner_head = *info.blocks(inner).iter().next().unwrap();

        assert_eq!(info.find(inner_head), Some(inner));
        assert_eq!(info.loop_depth(inner_head), 2);
        assert_eq!(info.loop_depth(cfg.entry()), 0);
    }

    /// Two back edges into one header: one body, not two.
    #[test]
    fn overlapping_bodies_merge_into_one_loop() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let entry = graph.block();
        let head = graph.block();
        let left = graph.block();
        let right = graph.block();
        let exit = graph.block();

        let init = values.fresh();
        graph.get_mut(entry).add(Box::new(Literal {
            result: init,
            value: 0,
        }));
        graph.get_mut(entry).export_variable_value(x, init);
        graph.get_mut(entry).terminate_straight(head);

        let v = graph.get_mut(head).import_variable_value(&mut values, x);
        graph.get_mut(head).export_variable_value(x, v);
        graph.get_mut(head).terminate_branch(
            left,
            right,
            Box::new(TacConditional::new(v, v, Relation::Equal)),
        );

        let v = graph.get_mut(left).import_variable_value(&mut values, x);
        graph.get_mut(left).export_variable_value(x, v);
        graph.get_mut(left).terminate_branch(
            head,
            exit,
            Box::new(TacConditional::new(v, v, Relation::Equal)),
        );

        let v = graph.get_mut(right).import_variable_value(&mut values, x);
        graph.get_mut(right).export_variable_value(x, v);
        graph.get_mut(right).terminate_straight(head);

        graph.get_mut(exit).terminate_exit();

        let cfg = graph.build(entry);
        let info = find_loops(&cfg);

        assert_eq!(info.roots().len(), 1);
        let only = info.roots()[0];
        assert_eq!(info.blocks(only).len(), 3);
        assert!(info.inners(only).is_empty());
    }

    #[test]
    fn acyclic_graphs_have_no_loops() {
        let mut values = ValueTable::new();

        let mut graph = CfgBuilder::new();
        let entry = graph.block();
        let exit = graph.block();

        let v = values.fresh();
        graph.get_mut(entry).add(Box::new(Literal { result: v, value: 0 }));
        graph.get_mut(entry).terminate_straight(exit);
        graph.get_mut(exit).terminate_exit();

        let cfg = graph.build(entry);
        let info = find_loops(&cfg);

        assert!(info.roots().is_empty());
        assert_eq!(info.loop_depth(cfg.entry()), 0);
    }
}
