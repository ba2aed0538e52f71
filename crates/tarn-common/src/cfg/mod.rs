pub use block::{BasicBlock, BlockId, Cfg, DefSite, Termination, UseSite};
pub use builder::{BuilderId, CfgBuilder, CodeBuilder};
pub use rewrite::CfgRewriter;
pub use traversal::{
    edges, post_order, reverse_post_order, run_worklist, traverse_dfs, Edge, WalkOrder,
};
pub use value::{substitute, Operand, Role, Subst, Value, ValueTable, Variable};

mod block;
mod builder;
mod rewrite;
mod traversal;
mod value;
