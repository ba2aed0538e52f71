use std::collections::HashMap;

use im::OrdSet;
use log::debug;

use tarn_common::cfg::{
    post_order, run_worklist, BlockId, Cfg, CfgRewriter, CodeBuilder, Subst, ValueTable, Variable,
};

/// Makes every block's variable traffic explicit: a variable live
/// across a block gets imported and re-exported by it, and exports
/// nothing downstream reads are dropped. Afterwards, a block's exports
/// are exactly the variables live when it ends, which is what the
/// register allocator's liveness scan assumes.
pub fn add_transit_bindings(cfg: Cfg, values: &mut ValueTable) -> Cfg {
    let live_in = analyze(&cfg);

    let live_out = |block: BlockId| -> OrdSet<Variable> {
        let mut live = OrdSet::new();
        for successor in cfg.get(block).successors() {
            if let Some(successor) = live_in.get(&successor) {
                live = live.union(successor.clone());
            }
        }
        live
    };

    let rewriter = CfgRewriter::new();
    rewriter.rewrite_with(&cfg, |cfg, block| {
        let original = cfg.get(block);

        let mut builder = CodeBuilder::new();
        builder.recreate_imports(original, |value| value);
        builder.recreate_ops(original, |op| vec![op.copy(&Subst::new())]);

        for variable in live_out(block) {
            let value = match original.defd().get(&variable) {
                Some(value) => *value,
                None => builder.import_variable_value(values, variable),
            };
            builder.export_variable_value(variable, value);
        }

        builder
    })
}

/// Variable-level liveness to a fixpoint: a variable is live into a
/// block if the block imports it, or if it is live out and the block
/// does not rebind it.
fn analyze(cfg: &Cfg) -> HashMap<BlockId, OrdSet<Variable>> {
    let mut live_in: HashMap<BlockId, OrdSet<Variable>> = HashMap::new();
    let mut rounds = 0;

    run_worklist(post_order(cfg), |block| {
        rounds += 1;
        let original = cfg.get(block);

        let mut live = OrdSet::new();
        for successor in original.successors() {
            if let Some(successor) = live_in.get(&successor) {
                live = live.union(successor.clone());
            }
        }

        for variable in original.defd().keys() {
            live.remove(variable);
        }

        for variable in original.used().keys() {
            live.insert(*variable);
        }

        if live_in.get(&block) == Some(&live) {
            return Vec::new();
        }

        live_in.insert(block, live);
        original.predecessors().to_vec()
    });

    debug!("variable liveness settled after {} visits", rounds);
    live_in
}
