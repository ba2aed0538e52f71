use std::collections::{HashMap, HashSet};

use log::trace;

use super::{BlockId, Cfg, CfgBuilder, CodeBuilder, Subst, Termination};
use crate::ops::Conditional;

/// Stages edits against an immutable [`Cfg`] and applies them all at
/// once by rebuilding the graph. Edits are recorded as an overlay, so
/// any number of terminations can be replaced and any number of edges
/// split before a single `rewrite` produces the new graph.
#[derive(Debug, Default)]
pub struct CfgRewriter {
    reterminations: HashMap<BlockId, Termination>,
    splits: HashSet<(BlockId, BlockId)>,
}

impl CfgRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The termination `block` will have after the rewrite.
    pub fn termination_of<'a>(&'a self, cfg: &'a Cfg, block: BlockId) -> &'a Termination {
        self.reterminations
            .get(&block)
            .unwrap_or_else(|| cfg.get(block).termination())
    }

    pub fn reterminate(&mut self, block: BlockId, termination: Termination) {
        self.reterminations.insert(block, termination);
    }

    /// Replaces the conditional of `block`'s branch, keeping its arms.
    pub fn recondition(&mut self, cfg: &Cfg, block: BlockId, conditional: Box<dyn Conditional>) {
        let (then, owise) = match self.termination_of(cfg, block) {
            Termination::Branch { then, owise, .. } => (*then, *owise),
            _ => panic!("only branches can be reconditioned"),
        };

        self.reterminate(block, Termination::Branch { then, owise, conditional });
    }

    /// Redirects the edge from `block` to `old` so it points at `new`.
    pub fn relink(&mut self, cfg: &Cfg, block: BlockId, old: BlockId, new: BlockId) {
        let replacement = match self.termination_of(cfg, block) {
            Termination::Straight { next } => {
                assert!(*next == old, "block does not link to the relinked target");
                Termination::Straight { next: new }
            }
            Termination::Branch {
                then,
                owise,
                conditional,
            } => {
                let conditional = conditional.copy(&Subst::new());
                if *then == old {
                    Termination::Branch {
                        then: new,
                        owise: *owise,
                        conditional,
                    }
                } else {
                    assert!(*owise == old, "block does not link to the relinked target");
                    Termination::Branch {
                        then: *then,
                        owise: new,
                        conditional,
                    }
                }
            }
            Termination::Exit => panic!("exits cannot be relinked"),
        };

        self.reterminate(block, replacement);
    }

    /// Interposes a fresh, empty block on the edge from `source` to
    /// `target`. The block only exists once the rewrite runs.
    pub fn split_edge(&mut self, source: BlockId, target: BlockId) {
        self.splits.insert((source, target));
    }

    /// Rebuilds the graph with the staged edits applied, copying every
    /// block's content unchanged.
    pub fn rewrite(self, cfg: &Cfg) -> Cfg {
        self.rewrite_with(cfg, |cfg, id| CodeBuilder::recreate(cfg.get(id)))
    }

    /// Rebuilds the graph with the staged edits applied. `local`
    /// produces the unterminated replacement content for each block;
    /// terminations come from the overlay and are wired up here.
    pub fn rewrite_with(
        self,
        cfg: &Cfg,
        mut local: impl FnMut(&Cfg, BlockId) -> CodeBuilder,
    ) -> Cfg {
        // Reachability under the staged terminations, not the old ones.
        let mut reachable = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![cfg.entry()];
        while let Some(block) = stack.pop() {
            if !seen.insert(block) {
                continue;
            }
            reachable.push(block);
            for successor in self.termination_of(cfg, block).successors().into_iter().rev() {
                stack.push(successor);
            }
        }

        trace!(
            "rewriting {} blocks ({} reterminated, {} edges split)",
            reachable.len(),
            self.reterminations.len(),
            self.splits.len()
        );

        let mut staging = CfgBuilder::new();
        let mut ids = HashMap::new();
        for block in &reachable {
            ids.insert(*block, staging.add(local(cfg, *block)));
        }

        for block in &reachable {
            let mut wire = |staging: &mut CfgBuilder, target: BlockId| {
                if self.splits.contains(&(*block, target)) {
                    let interposed = staging.block();
                    staging.get_mut(interposed).terminate_straight(ids[&target]);
                    interposed
                } else {
                    ids[&target]
                }
            };

            match self.termination_of(cfg, *block) {
                Termination::Straight { next } => {
                    let next = wire(&mut staging, *next);
                    staging.get_mut(ids[block]).terminate_straight(next);
                }
                Termination::Branch {
                    then,
                    owise,
                    conditional,
                } => {
                    let then = wire(&mut staging, *then);
                    let owise = wire(&mut staging, *owise);
                    let conditional = conditional.copy(&Subst::new());
                    staging.get_mut(ids[block]).terminate_branch(then, owise, conditional);
                }
                Termination::Exit => staging.get_mut(ids[block]).terminate_exit(),
            }
        }

        staging.build(ids[&cfg.entry()])
    }
}
