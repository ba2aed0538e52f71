pub use compile::{compile, Compiled};

mod compile;
