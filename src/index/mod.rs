//! The fast, always-available public-metadata index.

pub mod fast_index;

pub use fast_index::{FastIndex, ScoredBlock};
