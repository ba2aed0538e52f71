pub use factor::{break_critical_edges, merge_blocks};
pub use straighten::straighten_loops;
pub use transit::add_transit_bindings;

mod factor;
mod straighten;
mod transit;
