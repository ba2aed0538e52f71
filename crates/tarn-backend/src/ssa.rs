use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use tarn_common::cfg::{
    edges, BlockId, Cfg, CfgRewriter, CodeBuilder, Subst, Value, ValueTable, Variable,
};
use tarn_common::ops::{CopyOp, Operation};

/// Lowers the variable bindings between blocks into explicit copies, so
/// that after this pass a value means the same thing on both sides of
/// every edge. Each join's imports become values its predecessors
/// define; everywhere else the copies sit at whichever end of the edge
/// has room for them.
///
/// Critical edges must already be broken: a predecessor of a join must
/// not split, or there is no block its copies can go in.
pub fn bind_phis(cfg: Cfg, values: &mut ValueTable) -> Cfg {
    let mut pull_up: BTreeSet<BlockId> = BTreeSet::new();
    let mut pull_down: BTreeSet<BlockId> = BTreeSet::new();

    for edge in edges(&cfg) {
        let source = cfg.get(edge.source);
        let target = cfg.get(edge.target);

        if target.joins() {
            assert!(!source.splits(), "copies cannot be placed on a critical edge");
            pull_up.insert(edge.source);
        } else if source.splits() {
            pull_down.insert(edge.target);
        } else if target.successors().is_empty() {
            pull_up.insert(edge.source);
        } else {
            pull_down.insert(edge.target);
        }
    }

    debug!(
        "binding copies: {} blocks pull up, {} pull down",
        pull_up.len(),
        pull_down.len()
    );

    CfgRewriter::new().rewrite_with(&cfg, |cfg, block| {
        let original = cfg.get(block);
        let mut builder = CodeBuilder::new();

        if pull_down.contains(&block) {
            let pred = cfg.get(original.predecessors()[0]);
            let (movs, pairs) = copies(values, pred.defd(), original.used());

            // import the predecessor's values, then copy them into the
            // values the rest of the block already reads
            for (variable, (_, source)) in &pairs {
                builder.set_import(*variable, *source);
            }
            for op in movs {
                builder.add(op);
            }
        } else {
            builder.recreate_imports(original, |value| value);
        }

        builder.recreate_ops(original, |op| vec![op.copy(&Subst::new())]);

        if pull_up.contains(&block) {
            let successor = cfg.get(original.successors()[0]);
            let (movs, pairs) = copies(values, original.defd(), successor.used());

            // define the successor's import values right here
            for op in movs {
                builder.add(op);
            }
            for (variable, (destination, _)) in &pairs {
                builder.export_variable_value(*variable, *destination);
            }
        } else {
            builder.recreate_exports(original, |value| value);
        }

        builder
    })
}

/// Copies carrying each of `to`'s bindings out of `from`'s, routed
/// through fresh auxiliaries so that no destination is clobbered before
/// it is read. Returns the copies and, per variable, the final
/// destination and the original source.
fn copies(
    values: &mut ValueTable,
    from: &BTreeMap<Variable, Value>,
    to: &BTreeMap<Variable, Value>,
) -> (Vec<Box<dyn Operation>>, BTreeMap<Variable, (Value, Value)>) {
    let mut firsts: Vec<Box<dyn Operation>> = Vec::new();
    let mut seconds: Vec<Box<dyn Operation>> = Vec::new();
    let mut pairs = BTreeMap::new();

    for (variable, destination) in to {
        let source = match from.get(variable) {
            Some(source) => *source,
            None => panic!("variable {:?} is not bound across the edge", variable),
        };

        let aux = values.fresh();
        firsts.push(Box::new(CopyOp {
            destination: aux,
            source,
        }));
        seconds.push(Box::new(CopyOp {
            destination: *destination,
            source: aux,
        }));

        pairs.insert(*variable, (*destination, source));
    }

    firsts.extend(seconds);
    (firsts, pairs)
}
