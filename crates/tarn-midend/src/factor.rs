use std::collections::HashMap;

use log::debug;

use tarn_common::cfg::{
    edges, reverse_post_order, BlockId, Cfg, CfgRewriter, CodeBuilder, Termination,
};

/// Splits every edge that leaves a splitting block and enters a joining
/// one. After this pass, copies can be placed on any edge by placing
/// them in the edge's own block.
pub fn break_critical_edges(cfg: Cfg) -> Cfg {
    let mut rewriter = CfgRewriter::new();
    let mut count = 0;

    for edge in edges(&cfg) {
        if cfg.get(edge.source).splits() && cfg.get(edge.target).joins() {
            rewriter.split_edge(edge.source, edge.target);
            count += 1;
        }
    }

    if count == 0 {
        return cfg;
    }

    debug!("splitting {} critical edges", count);
    rewriter.rewrite(&cfg)
}

/// Fuses every straight-line chain into a single block. A block joins
/// the chain of its predecessor when that predecessor links straight to
/// it and nothing else reaches it.
pub fn merge_blocks(cfg: Cfg) -> Cfg {
    let mut cfg = cfg;

    loop {
        let groups = chains(&cfg);
        if groups.is_empty() {
            return cfg;
        }

        debug!("merging {} chains", groups.len());

        let mut rewriter = CfgRewriter::new();
        let mut merged: HashMap<BlockId, Option<CodeBuilder>> = HashMap::new();

        for group in &groups {
            let (builder, subs) = CodeBuilder::merge(&cfg, group);

            let last = group[group.len() - 1];
            let termination = match cfg.get(last).termination() {
                Termination::Straight { next } => Termination::Straight { next: *next },
                Termination::Branch {
                    then,
                    owise,
                    conditional,
                } => Termination::Branch {
                    then: *then,
                    owise: *owise,
                    conditional: conditional.copy(&subs),
                },
                Termination::Exit => Termination::Exit,
            };

            rewriter.reterminate(group[0], termination);
            merged.insert(group[0], Some(builder));
        }

        cfg = rewriter.rewrite_with(&cfg, |cfg, block| match merged.get_mut(&block) {
            Some(slot) => slot.take().unwrap(),
            None => CodeBuilder::recreate(cfg.get(block)),
        });
    }
}

/// Groups blocks into mergeable chains. Heads come first; a chain only
/// grows into a block with exactly one predecessor, so interior blocks
/// are unreachable once the head takes over their content.
fn chains(cfg: &Cfg) -> Vec<Vec<BlockId>> {
    let mut groups: Vec<Vec<BlockId>> = Vec::new();
    let mut index: HashMap<BlockId, usize> = HashMap::new();

    for block in reverse_post_order(cfg) {
        let group = match index.get(&block) {
            Some(group) => *group,
            None => {
                groups.push(vec![block]);
                index.insert(block, groups.len() - 1);
                groups.len() - 1
            }
        };

        if let Termination::Straight { next } = cfg.get(block).termination() {
            if cfg.get(*next).predecessors().len() == 1
                && *next != block
                && !index.contains_key(next)
            {
                index.insert(*next, group);
                groups[group].push(*next);
            }
        }
    }

    groups.into_iter().filter(|group| group.len() > 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_common::cfg::{CfgBuilder, ValueTable, Variable};
    use tarn_common::ops::{Arith, Arithmetic, Literal, Relation, TacConditional};

    fn diamond() -> Cfg {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let top = graph.block();
        let left = graph.block();
        let right = graph.block();
        let bottom = graph.block();

        let a = values.fresh();
        graph.get_mut(top).add(Box::new(Literal { result: a, value: 0 }));
        graph.get_mut(top).export_variable_value(x, a);
        graph.get_mut(top).terminate_branch(
            left,
            right,
            Box::new(TacConditional::new(a, a, Relation::Equal)),
        );

        for side in [left, right] {
            let v = graph.get_mut(side).import_variable_value(&mut values, x);
            graph.get_mut(side).export_variable_value(x, v);
            graph.get_mut(side).terminate_straight(bottom);
        }

        graph.get_mut(bottom).import_variable_value(&mut values, x);
        graph.get_mut(bottom).terminate_exit();

        graph.build(top)
    }

    #[test]
    fn critical_edges_get_their_own_blocks() {
        // A split jumping straight into a join: that edge is critical.
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let top = graph.block();
        let side = graph.block();
        let bottom = graph.block();

        let a = values.fresh();
        graph.get_mut(top).add(Box::new(Literal { result: a, value: 0 }));
        graph.get_mut(top).export_variable_value(x, a);
        graph.get_mut(top).terminate_branch(
            side,
            bottom,
            Box::new(TacConditional::new(a, a, Relation::Equal)),
        );

        let v = graph.get_mut(side).import_variable_value(&mut values, x);
        graph.get_mut(side).export_variable_value(x, v);
        graph.get_mut(side).terminate_straight(bottom);

        graph.get_mut(bottom).import_variable_value(&mut values, x);
        graph.get_mut(bottom).terminate_exit();

        let before = graph.build(top);
        assert_eq!(before.len(), 3);

        let after = break_critical_edges(before);

        // top -> bottom was critical (top splits, bottom joins)
        assert_eq!(after.len(), 4);
        for id in after.ids() {
            let block = after.get(id);
            if block.splits() {
                for successor in block.successors() {
                    assert!(!after.get(successor).joins());
                }
            }
        }
    }

    #[test]
    fn untouched_graphs_pass_through() {
        let cfg = diamond();
        let len = cfg.len();

        let after = break_critical_edges(cfg);
        assert_eq!(after.len(), len);
    }

    #[test]
    fn chains_collapse_to_single_blocks() {
        let mut values = ValueTable::new();
        let x = Variable::new(0);

        let mut graph = CfgBuilder::new();
        let first = graph.block();
        let second = graph.block();
        let third = graph.block();

        let a = values.fresh();
        graph.get_mut(first).add(Box::new(Literal { result: a, value: 1 }));
        graph.get_mut(first).export_variable_value(x, a);
        graph.get_mut(first).terminate_straight(second);

        let v = graph.get_mut(second).import_variable_value(&mut values, x);
        let b = values.fresh();
        graph.get_mut(second).add(Box::new(Arithmetic {
            result: b,
            left: v,
            right: v,
            op: Arith::Add,
        }));
        graph.get_mut(second).export_variable_value(x, b);
        graph.get_mut(second).terminate_straight(third);

        let w = graph.get_mut(third).import_variable_value(&mut values, x);
        let c = values.fresh();
        graph.get_mut(third).add(Box::new(Arithmetic {
            result: c,
            left: w,
            right: w,
            op: Arith::Mul,
        }));
        graph.get_mut(third).terminate_exit();

        let cfg = graph.build(first);
        assert_eq!(cfg.len(), 3);

        let after = merge_blocks(cfg);
        assert_eq!(after.len(), 1);

        let only = after.get(after.entry());
        assert_eq!(only.ops().len(), 3);
        assert!(only.used().is_empty());
        assert_eq!(only.const_value(only.ops()[2].outputs()[0].value), Some(4));
    }

    #[test]
    fn join_blocks_stay_separate() {
        let cfg = diamond();
        let len = cfg.len();

        let after = merge_blocks(cfg);

        // Both arms feed the bottom block, so nothing merges.
        assert_eq!(after.len(), len);
    }
}
