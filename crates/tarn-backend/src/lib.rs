pub use alloc::allocate_registers;
pub use coloring::{color, AllocError, InterferenceGraph, NodeId};
pub use interference::interference;
pub use layout::{linearize, straighten_conditionals};
pub use ssa::bind_phis;

mod alloc;
mod coloring;
mod interference;
mod layout;
mod ssa;
