//! Core abstractions
//!
//! The component contract, its option binding and the per-run metadata model
//! that the runtime builds on.

pub mod component;
pub mod options;
pub mod record;
