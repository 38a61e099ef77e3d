//! File persistence primitives.

pub mod managed;

pub use managed::*;
