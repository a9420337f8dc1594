//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measurement containers (`Trace`, `TraceCollection`, `SweepAxis`)
//! - index keys (`TraceKey`, `PairKey`)
//! - fit outputs (`CosineParams`, `TraceFit`, `FitDelta`)
//! - run configuration (`FitConfig`, `SignalKind`)

pub mod types;

pub use types::*;
