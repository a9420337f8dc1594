//! Trace fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit a single trace to the cosine model (bounded solver, explicit outcome)
//! - fit a whole collection in parallel, marking failures instead of dropping keys
//! - reduce ON/OFF fit pairs to amplitude ratio / phase difference / offset difference

pub mod batch;
pub mod difference;
pub mod fitter;

pub use batch::*;
pub use difference::*;
pub use fitter::*;
