//! Configuration-driven pipeline orchestration
//!
//! A host application declares a fixed ordered set of named stages (blocks),
//! registers interchangeable components for each stage, applies a JSON-shaped
//! configuration selecting what runs where and with which options, validates
//! the resulting plan and executes it, collecting per-component timing,
//! errors and warnings.

pub mod core;
pub mod runtime;
mod tests;

// Re-export commonly used types
pub use crate::core::component::{Component, FnComponent};
pub use crate::core::options::{
    OptionDescriptor, OptionError, OptionKind, OptionSet, OptionSpec, OptionValue,
};
pub use crate::core::record::{BlockReport, ComponentRun};
pub use crate::runtime::block::{
    Block, BlockDescriptor, BlockError, BlockSettings, ComponentDescriptor,
};
pub use crate::runtime::engine::{
    Engine, EngineConfig, EngineError, PlayResult, SelectionRequest, SelectionRequests,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
