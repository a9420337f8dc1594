//! Mathematical utilities: angle normalization and the bounded solver.

pub mod angle;
pub mod lm;

pub use angle::*;
pub use lm::*;
