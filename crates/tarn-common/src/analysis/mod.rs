pub use dominator::DominatorTree;
pub use loops::{find_loops, LoopEntry, LoopId, LoopInfo};

mod dominator;
mod loops;
