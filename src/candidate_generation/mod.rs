pub mod blocking;

pub use blocking::{Block, BlockIndex, CATCH_ALL_SIGNATURE};
