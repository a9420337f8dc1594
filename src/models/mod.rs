//! Model evaluation for the conditional-phase cosine.

pub mod cosine;

pub use cosine::*;
