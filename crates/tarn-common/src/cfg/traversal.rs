use std::collections::{HashSet, VecDeque};

use super::{BlockId, Cfg};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WalkOrder {
    Pre,
    Post,
}

/// Every block reachable from the entry, in depth-first order.
pub fn traverse_dfs(cfg: &Cfg, order: WalkOrder) -> Vec<BlockId> {
    fn walk(cfg: &Cfg, block: BlockId, order: WalkOrder, seen: &mut HashSet<BlockId>, out: &mut Vec<BlockId>) {
        if !seen.insert(block) {
            return;
        }

        if let WalkOrder::Pre = order {
            out.push(block);
        }

        for successor in cfg.get(block).successors() {
            walk(cfg, successor, order, seen, out);
        }

        if let WalkOrder::Post = order {
            out.push(block);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(cfg.len());
    walk(cfg, cfg.entry(), order, &mut seen, &mut out);
    out
}

pub fn post_order(cfg: &Cfg) -> Vec<BlockId> {
    traverse_dfs(cfg, WalkOrder::Post)
}

pub fn reverse_post_order(cfg: &Cfg) -> Vec<BlockId> {
    let mut order = post_order(cfg);
    order.reverse();
    order
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
}

/// Every edge in the graph, grouped by source block in id order.
pub fn edges(cfg: &Cfg) -> Vec<Edge> {
    let mut edges = Vec::new();
    for source in cfg.ids() {
        for target in cfg.get(source).successors() {
            edges.push(Edge { source, target });
        }
    }
    edges
}

/// Runs `op` on every queued block until the queue drains. `op` returns
/// the blocks to requeue; blocks already waiting are not queued twice.
pub fn run_worklist(blocks: Vec<BlockId>, mut op: impl FnMut(BlockId) -> Vec<BlockId>) {
    let mut queued: HashSet<BlockId> = blocks.iter().copied().collect();
    let mut queue: VecDeque<BlockId> = blocks.into();

    while let Some(block) = queue.pop_front() {
        queued.remove(&block);

        for requeued in op(block) {
            if queued.insert(requeued) {
                queue.push_back(requeued);
            }
        }
    }
}
