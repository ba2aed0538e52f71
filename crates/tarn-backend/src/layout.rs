use log::debug;

use tarn_common::cfg::{reverse_post_order, BlockId, Cfg, Termination};

/// Commits the graph to a linear block order. Reverse postorder puts
/// every block after the blocks that feed it, back edges aside, which
/// keeps most branches pointing forward.
pub fn linearize(cfg: &Cfg) -> Vec<BlockId> {
    reverse_post_order(cfg)
}

/// Twists branches whose taken arm is the next block in the committed
/// order, so the taken arm always jumps and the fall-through never has
/// to.
pub fn straighten_conditionals(cfg: &mut Cfg, order: &[BlockId]) {
    let mut twisted = 0;

    for window in order.windows(2) {
        let (block, next) = (window[0], window[1]);

        if let Termination::Branch { then, owise, .. } = cfg.get(block).termination() {
            if *then == next && *owise != next {
                cfg.twist_conditional(block);
                twisted += 1;
            }
        }
    }

    if twisted > 0 {
        debug!("twisted {} branches into fall-throughs", twisted);
    }
}
