use log::debug;

use tarn_common::analysis::find_loops;
use tarn_common::cfg::{Cfg, Termination};

/// Twists in-loop branches so that a later linear layout keeps loop
/// bodies contiguous: back edges end up on the taken side, and arms
/// that stay inside the loop end up on the fall-through side.
pub fn straighten_loops(cfg: Cfg) -> Cfg {
    let mut cfg = cfg;
    let info = find_loops(&cfg);
    let dtree = info.dominators();

    let mut twists = Vec::new();

    for id in cfg.ids() {
        let found = match info.find(id) {
            Some(found) => found,
            None => continue,
        };
        let body = info.blocks(found);

        if let Termination::Branch { then, owise, .. } = cfg.get(id).termination() {
            let then_back = body.contains(then) && dtree.dominates(*then, id);
            let owise_back = body.contains(owise) && dtree.dominates(*owise, id);

            if then_back || owise_back {
                // a latch: jump backwards, fall out of the loop
                if owise_back && !then_back {
                    twists.push(id);
                }
                continue;
            }

            if body.contains(then) && !body.contains(owise) {
                twists.push(id);
            }
        }
    }

    if !twists.is_empty() {
        debug!("twisting {} loop branches", twists.len());
    }

    for id in twists {
        cfg.twist_conditional(id);
    }

    cfg
}
