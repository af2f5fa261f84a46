pub mod resolver;

pub use resolver::{resolve, resolve_block, resolve_sequential, EquivalenceClass, Resolution};
