use std::collections::HashMap;

use log::trace;

use crate::cfg::{reverse_post_order, run_worklist, BlockId, Cfg};

/// The immediate dominator of every reachable block. The entry is its
/// own immediate dominator, which doubles as the fixpoint's anchor.
#[derive(Debug)]
pub struct DominatorTree {
    entry: BlockId,
    idoms: HashMap<BlockId, BlockId>,
}

impl DominatorTree {
    /// Computes dominators by iterating the two-finger intersection to
    /// a fixpoint over reverse postorder.
    pub fn compute(cfg: &Cfg) -> Self {
        let order = reverse_post_order(cfg);
        let indices: HashMap<BlockId, usize> = order
            .iter()
            .enumerate()
            .map(|(index, block)| (*block, index))
            .collect();

        let mut idoms = HashMap::new();
        idoms.insert(cfg.entry(), cfg.entry());

        let blocks: Vec<BlockId> = order
            .iter()
            .copied()
            .filter(|block| *block != cfg.entry())
            .collect();

        run_worklist(blocks, |block| {
            let processed: Vec<BlockId> = cfg
                .get(block)
                .predecessors()
                .iter()
                .copied()
                .filter(|pred| idoms.contains_key(pred))
                .collect();

            let (first, rest) = match processed.split_first() {
                Some(split) => split,
                None => return Vec::new(),
            };

            let idom = rest
                .iter()
                .fold(*first, |a, b| intersect(a, *b, &idoms, &indices));

            if idoms.get(&block) != Some(&idom) {
                idoms.insert(block, idom);
                cfg.get(block).successors()
            } else {
                Vec::new()
            }
        });

        trace!("dominator fixpoint over {} blocks", idoms.len());

        Self {
            entry: cfg.entry(),
            idoms,
        }
    }

    pub fn idom(&self, block: BlockId) -> BlockId {
        self.idoms[&block]
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }

            if current == self.entry {
                return false;
            }

            current = self.idoms[&current];
        }
    }
}

fn intersect(
    a: BlockId,
    b: BlockId,
    idoms: &HashMap<BlockId, BlockId>,
    indices: &HashMap<BlockId, usize>,
) -> BlockId {
    let mut a = a;
    let mut b = b;

    while a != b {
        while indices[&a] > indices[&b] {
            a = idoms[&a];
        }

        while indices[&b] > indices[&a] {
            b = idoms[&b];
        }
    }

    a
}
