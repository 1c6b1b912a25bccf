//! Run metadata
//!
//! Every `Block::play` rebuilds a [`BlockReport`] from per-component
//! [`ComponentRun`] entries. Reports are observability output, serializable
//! for logging or a service front end; they never drive control flow.

use serde::Serialize;
use serde_json::{Map, Value};

/// Record of one component invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentRun {
    /// Component name
    pub component: String,
    /// Debug representation of the component
    pub detail: String,
    /// Option values the component ran with
    pub options: Map<String, Value>,
    /// Wall time between this invocation and the previous one, milliseconds
    pub elapsed_ms: f64,
    /// Errors raised by the invocation
    pub errors: Vec<String>,
    /// Warnings raised by the invocation
    pub warnings: Vec<String>,
}

impl ComponentRun {
    pub fn new(
        component: impl Into<String>,
        detail: impl Into<String>,
        options: Map<String, Value>,
    ) -> Self {
        Self {
            component: component.into(),
            detail: detail.into(),
            options,
            elapsed_ms: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Aggregate record of one block run.
#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    /// Block name
    pub block: String,
    /// Per-component records, in execution order
    pub components: Vec<ComponentRun>,
    /// Sum of per-component times, milliseconds
    pub total_ms: f64,
    /// Every component error, in order
    pub errors: Vec<String>,
    /// Every component warning, in order
    pub warnings: Vec<String>,
    /// Whether any component failed
    pub failed: bool,
}

impl BlockReport {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            components: Vec::new(),
            total_ms: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            failed: false,
        }
    }

    /// Append a component record, folding it into the aggregates.
    pub fn push(&mut self, run: ComponentRun) {
        self.total_ms += run.elapsed_ms;
        self.errors.extend(run.errors.iter().cloned());
        self.warnings.extend(run.warnings.iter().cloned());
        self.failed |= run.failed();
        self.components.push(run);
    }
}
