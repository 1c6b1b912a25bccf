//! Engine
//!
//! Owns the ordered set of blocks, translates an external JSON-shaped
//! configuration into per-block selections, validates the plan (required
//! stages, data flow) and executes all blocks in declared order, threading
//! named data between them and collecting per-block run reports.

use std::collections::HashMap;
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::component::Component;
use crate::core::record::BlockReport;

use super::block::{Block, BlockDescriptor, BlockError, BlockSettings};
use super::validation;

/// One selection request: a component name plus raw option values.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionRequest {
    pub name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl SelectionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }
}

/// The requests for one stage; a bare object normalizes to a one-element
/// list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SelectionRequests {
    One(SelectionRequest),
    Many(Vec<SelectionRequest>),
}

impl SelectionRequests {
    pub fn as_slice(&self) -> &[SelectionRequest] {
        match self {
            SelectionRequests::One(request) => std::slice::from_ref(request),
            SelectionRequests::Many(requests) => requests,
        }
    }
}

/// Configuration payload: stage name to selection requests. Stages may be
/// omitted; their defaults then apply.
pub type EngineConfig = HashMap<String, SelectionRequests>;

/// Result of one full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PlayResult {
    /// Identifier of this run
    pub run_id: Uuid,
    /// Every produced value, keyed by output name, in production order
    pub outputs: IndexMap<String, Value>,
    /// Per-block run reports, keyed by block name
    pub reports: IndexMap<String, BlockReport>,
    /// Total wall time of the run, milliseconds
    pub total_ms: f64,
}

impl PlayResult {
    /// Whether any block recorded a component failure.
    pub fn failed(&self) -> bool {
        self.reports.values().any(|r| r.failed)
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}

/// The pipeline engine.
#[derive(Default)]
pub struct Engine {
    blocks: IndexMap<String, Block>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the stages of the pipeline, in execution order. May be called
    /// exactly once, before any component registration.
    pub fn declare_stages<I, S>(&mut self, names: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.blocks.is_empty() {
            return Err(EngineError::Lifecycle(
                "stages may be declared only once, before any component registration".to_string(),
            ));
        }
        let mut blocks = IndexMap::new();
        for name in names {
            let name = name.into();
            let block = Block::new(name.clone())?;
            if blocks.insert(name.clone(), block).is_some() {
                return Err(EngineError::DuplicateStage(name));
            }
        }
        if blocks.is_empty() {
            return Err(EngineError::Lifecycle(
                "at least one stage name is required".to_string(),
            ));
        }
        debug!(stages = ?blocks.keys().collect::<Vec<_>>(), "stages declared");
        self.blocks = blocks;
        Ok(())
    }

    /// Number of declared stages.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.blocks.contains_key(stage)
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.blocks.keys().map(String::as_str).collect()
    }

    pub fn block(&self, stage: &str) -> Result<&Block, EngineError> {
        self.blocks
            .get(stage)
            .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))
    }

    pub fn block_mut(&mut self, stage: &str) -> Result<&mut Block, EngineError> {
        self.blocks
            .get_mut(stage)
            .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))
    }

    /// Replace a stage's component registry and apply `settings` to it.
    pub fn set_block_components(
        &mut self,
        stage: &str,
        components: Vec<Box<dyn Component>>,
        settings: BlockSettings,
    ) -> Result<(), EngineError> {
        if !self.blocks.contains_key(stage) {
            return Err(EngineError::UnknownStage(stage.to_string()));
        }
        let mut block = Block::new(stage)?;
        for component in components {
            block.register(component, false)?;
        }
        block.configure(settings)?;
        if let Some(slot) = self.blocks.get_mut(stage) {
            *slot = block;
        }
        Ok(())
    }

    /// Apply an external configuration.
    ///
    /// The whole payload is validated before anything is mutated, so a bad
    /// configuration leaves every selection untouched. On success every
    /// block starts from cleared selections and the requests are applied in
    /// order.
    pub fn configure(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        for (stage, requests) in config {
            let block = self.block(stage)?;
            let requests = requests.as_slice();
            if requests.is_empty() {
                if !block.hidden() && block.required() {
                    return Err(EngineError::MissingSelection(stage.clone()));
                }
                continue;
            }
            if block.hidden() {
                return Err(EngineError::ForbiddenConfig(stage.clone()));
            }
            if !block.multiple() && requests.len() > 1 {
                return Err(EngineError::TooManySelections {
                    stage: stage.clone(),
                    given: requests.len(),
                });
            }
            for request in requests {
                block.check_request(&request.name, &request.options)?;
            }
        }
        for (stage, block) in self.blocks.iter_mut() {
            block.clear_selections();
            if let Some(requests) = config.get(stage) {
                for request in requests.as_slice() {
                    block.select(&request.name, &request.options)?;
                }
            }
        }
        info!(stages = config.len(), "engine configured");
        Ok(())
    }

    /// Deserialize and apply a JSON configuration payload.
    pub fn configure_json(&mut self, payload: Value) -> Result<(), EngineError> {
        let config: EngineConfig = serde_json::from_value(payload)?;
        self.configure(&config)
    }

    /// Check that the whole plan can run: at least one stage, every block
    /// valid, and every declared input guaranteed by the data flow.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.blocks.is_empty() {
            return Err(EngineError::NoStages);
        }
        for block in self.blocks.values() {
            block.validate()?;
        }
        validation::check_data_flow(self.blocks.values())
    }

    /// Run the whole pipeline on `input`.
    ///
    /// The input is bound to the first block's first declared input name
    /// (`"input"` when it declares none); each block then reads its declared
    /// inputs from the result map — or, lacking declarations, the previous
    /// block's output — and publishes its own output under its output name.
    /// Selections are not mutated; per-block reports are rebuilt.
    pub fn play(&mut self, input: Value) -> Result<PlayResult, EngineError> {
        self.validate()?;
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        info!(%run_id, stages = self.blocks.len(), "playing pipeline");

        let seed = self
            .blocks
            .values()
            .next()
            .and_then(|b| b.in_names().first().cloned())
            .unwrap_or_else(|| "input".to_string());
        let mut outputs: IndexMap<String, Value> = IndexMap::new();
        outputs.insert(seed.clone(), input);
        let mut previous = seed;

        let mut reports: IndexMap<String, BlockReport> = IndexMap::new();
        for block in self.blocks.values_mut() {
            let args: Vec<Value> = if block.in_names().is_empty() {
                vec![outputs.get(&previous).cloned().unwrap_or(Value::Null)]
            } else {
                let mut resolved = Vec::with_capacity(block.in_names().len());
                for input_name in block.in_names() {
                    match outputs.get(input_name) {
                        Some(value) => resolved.push(value.clone()),
                        None => {
                            return Err(EngineError::MissingInput {
                                stage: block.name().to_string(),
                                input: input_name.clone(),
                            })
                        }
                    }
                }
                resolved
            };
            let value = block.play(&args)?;
            if let Some(report) = block.report() {
                reports.insert(block.name().to_string(), report.clone());
            }
            let out_name = block.out_name().to_string();
            outputs.insert(out_name.clone(), value);
            previous = out_name;
        }

        Ok(PlayResult {
            run_id,
            outputs,
            reports,
            total_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Run a single named block directly.
    pub fn play_block(&mut self, stage: &str, args: &[Value]) -> Result<Value, EngineError> {
        info!(stage, "playing single block");
        let block = self.block_mut(stage)?;
        Ok(block.play(args)?)
    }

    /// Discovery view: the non-hidden blocks, in execution order.
    pub fn describe(&self) -> Vec<BlockDescriptor> {
        self.blocks
            .values()
            .filter(|b| !b.hidden())
            .map(Block::describe)
            .collect()
    }
}

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// API misuse, e.g. re-declaring stages
    #[error("{0}")]
    Lifecycle(String),

    /// A stage name appeared twice in a declaration
    #[error("duplicate stage name '{0}'")]
    DuplicateStage(String),

    /// No stage of that name was declared
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// The engine has no stages
    #[error("there is no stage in this engine")]
    NoStages,

    /// A hidden stage received selection requests
    #[error("stage '{0}' is hidden and cannot be configured")]
    ForbiddenConfig(String),

    /// A required stage received an explicitly empty request list
    #[error("stage '{0}' is required but the configuration selects nothing for it")]
    MissingSelection(String),

    /// A single-selection stage received more than one request
    #[error("stage '{stage}' accepts a single component but the configuration gives {given}")]
    TooManySelections { stage: String, given: usize },

    /// A declared input is produced by no earlier stage
    #[error("stage '{stage}' consumes '{input}' which no earlier stage produces")]
    MissingInput { stage: String, input: String },

    /// A declared input is produced only by non-required stages
    #[error("stage '{stage}' consumes '{input}' which may be missing at run time (it is produced only by non-required stages)")]
    UnreliableInput { stage: String, input: String },

    /// The configuration payload did not match the expected shape
    #[error("malformed configuration: {0}")]
    MalformedConfig(#[from] serde_json::Error),

    /// A block-level failure
    #[error(transparent)]
    Block(#[from] BlockError),
}
