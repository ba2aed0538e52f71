use std::collections::BTreeSet;

use log::trace;

use tarn_common::analysis::find_loops;
use tarn_common::cfg::{Cfg, UseSite, Value};

use crate::coloring::InterferenceGraph;

/// Builds the interference graph for a graph whose cross-block traffic
/// has already been lowered to copies: two values clash when they are
/// ever live at the same point, and copy ends whose source dies at the
/// copy become move partners. Node priorities are loop depths, so the
/// reduction spills cold values first.
pub fn interference(cfg: &Cfg, precolored: &[Value]) -> InterferenceGraph {
    let mut graph = InterferenceGraph::new();

    let registers: Vec<_> = precolored
        .iter()
        .map(|register| graph.ensure(*register, 0))
        .collect();
    for (index, a) in registers.iter().enumerate() {
        for b in &registers[index + 1..] {
            graph.add_interference(*a, *b);
        }
    }

    let info = find_loops(cfg);

    for id in cfg.ids() {
        let block = cfg.get(id);
        let priority = info.loop_depth(id);

        let mut live: BTreeSet<Value> = BTreeSet::new();

        for operand in block.outputs() {
            if !operand.no_alloc {
                add_live(&mut graph, &mut live, operand.value, priority);
            }
        }

        for (index, op) in block.ops().iter().enumerate().rev() {
            let mut defined = Vec::new();
            for operand in op.outputs() {
                if operand.no_alloc {
                    continue;
                }

                let node = graph.ensure(operand.value, priority);
                if !live.remove(&operand.value) {
                    // a dead definition still claims its register here
                    for other in &live {
                        let other = graph.ensure(*other, priority);
                        graph.add_interference(node, other);
                    }
                }
                defined.push(operand.value);
            }

            for operand in op.inputs().iter().chain(op.outputs().iter()) {
                for clobbered in &operand.clobbers {
                    let node = graph.ensure(*clobbered, priority);
                    for other in live.iter().chain(defined.iter()) {
                        if *other != *clobbered {
                            let other = graph.ensure(*other, priority);
                            graph.add_interference(node, other);
                        }
                    }
                }
            }

            if let Some(pair) = op.as_copy() {
                let site = UseSite::Op { op: index, input: 0 };
                if pair.destination != pair.source && block.is_last_use(pair.source, site) {
                    let destination = graph.ensure(pair.destination, priority);
                    let source = graph.ensure(pair.source, priority);
                    graph.add_move_partner(destination, source);
                }
            }

            for operand in op.inputs() {
                if !operand.no_alloc {
                    add_live(&mut graph, &mut live, operand.value, priority);
                }
            }
        }

        for value in block.used().values() {
            live.remove(value);
        }

        assert!(
            live.is_empty(),
            "values live into a block must be its imports"
        );

        trace!("block {:?} scanned at loop depth {}", id, priority);
    }

    graph
}

/// Marks `value` live; a value joining the live set overlaps everything
/// already in it.
fn add_live(
    graph: &mut InterferenceGraph,
    live: &mut BTreeSet<Value>,
    value: Value,
    priority: usize,
) {
    if !live.insert(value) {
        return;
    }

    let node = graph.ensure(value, priority);
    for other in live.iter() {
        if *other != value {
            let other = graph.ensure(*other, priority);
            graph.add_interference(node, other);
        }
    }
}
