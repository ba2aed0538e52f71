pub mod analysis;
pub mod cfg;
pub mod ops;
pub mod pretty;
