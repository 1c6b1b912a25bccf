//! Block: one named pipeline stage
//!
//! A block owns an insertion-ordered registry of interchangeable components,
//! resolves which of them run (explicit selection, declared defaults, or the
//! first registered component as a required-stage fallback), and executes the
//! selection as a pipeline, recording timing and errors per component.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::component::{is_valid_name, Component};
use crate::core::options::{OptionDescriptor, OptionError};
use crate::core::record::{BlockReport, ComponentRun};

use super::timer::LapTimer;

struct Entry {
    component: Box<dyn Component>,
    /// Capability checked once at registration.
    configurable: bool,
}

/// Partial block configuration; only present fields are applied.
#[derive(Debug, Clone, Default)]
pub struct BlockSettings {
    pub required: Option<bool>,
    pub hidden: Option<bool>,
    pub multiple: Option<bool>,
    pub defaults: Option<Vec<String>>,
    pub in_names: Option<Vec<String>>,
    pub out_name: Option<String>,
}

impl BlockSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = Some(multiple);
        self
    }

    pub fn defaults<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn in_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn out_name(mut self, name: impl Into<String>) -> Self {
        self.out_name = Some(name.into());
        self
    }
}

/// One pipeline stage.
pub struct Block {
    name: String,
    components: IndexMap<String, Entry>,
    selected: Vec<String>,
    defaults: Vec<String>,
    required: bool,
    hidden: bool,
    multiple: bool,
    in_names: Vec<String>,
    out_name: Option<String>,
    last_report: Option<BlockReport>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field(
                "components",
                &self
                    .components
                    .iter()
                    .map(|(k, e)| (k.as_str(), e.component.describe()))
                    .collect::<Vec<_>>(),
            )
            .field("selected", &self.selected)
            .field("defaults", &self.defaults)
            .field("required", &self.required)
            .field("hidden", &self.hidden)
            .field("multiple", &self.multiple)
            .field("in_names", &self.in_names)
            .field("out_name", &self.out_name)
            .field("last_report", &self.last_report)
            .finish()
    }
}

impl Block {
    /// Create an empty block. Names must not be empty or contain whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, BlockError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(BlockError::InvalidName(name));
        }
        Ok(Self {
            name,
            components: IndexMap::new(),
            selected: Vec::new(),
            defaults: Vec::new(),
            required: true,
            hidden: false,
            multiple: false,
            in_names: Vec::new(),
            out_name: None,
            last_report: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn multiple(&self) -> bool {
        self.multiple
    }

    /// Declared input channel names; empty means "previous block's output".
    pub fn in_names(&self) -> &[String] {
        &self.in_names
    }

    /// Output channel name; defaults to the block name.
    pub fn out_name(&self) -> &str {
        self.out_name.as_deref().unwrap_or(&self.name)
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Component names in registration order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    pub fn component(&self, name: &str) -> Option<&dyn Component> {
        self.components.get(name).map(|e| e.component.as_ref())
    }

    /// Explicitly selected component names, in selection order.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Declared default component names.
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Report of the most recent `play`, until the next play or reset.
    pub fn report(&self) -> Option<&BlockReport> {
        self.last_report.as_ref()
    }

    /// Register a component. With `is_default` the component joins the
    /// defaults (replacing the previous one unless the block is `multiple`).
    pub fn register(
        &mut self,
        component: Box<dyn Component>,
        is_default: bool,
    ) -> Result<(), BlockError> {
        let name = component.name().to_string();
        if !is_valid_name(&name) {
            return Err(BlockError::InvalidComponent(name));
        }
        if self.components.contains_key(&name) {
            return Err(BlockError::DuplicateComponent {
                block: self.name.clone(),
                name,
            });
        }
        let configurable = component.options().is_some();
        debug!(block = %self.name, component = %name, configurable, "component registered");
        self.components.insert(
            name.clone(),
            Entry {
                component,
                configurable,
            },
        );
        if is_default {
            if !self.multiple {
                self.defaults.clear();
            }
            if !self.defaults.contains(&name) {
                self.defaults.push(name);
            }
        }
        Ok(())
    }

    /// Apply the present fields of `settings`, leaving the rest unchanged.
    pub fn configure(&mut self, settings: BlockSettings) -> Result<(), BlockError> {
        if let Some(defaults) = settings.defaults {
            for name in &defaults {
                if !self.components.contains_key(name) {
                    return Err(self.unknown_component(name));
                }
            }
            self.defaults = defaults;
        }
        if let Some(required) = settings.required {
            self.required = required;
        }
        if let Some(hidden) = settings.hidden {
            self.hidden = hidden;
        }
        if let Some(multiple) = settings.multiple {
            self.multiple = multiple;
            if !multiple {
                // selection cardinality invariant
                self.selected.truncate(1);
                self.defaults.truncate(1);
            }
        }
        if let Some(in_names) = settings.in_names {
            self.in_names = in_names;
        }
        if let Some(out_name) = settings.out_name {
            self.out_name = Some(out_name);
        }
        Ok(())
    }

    /// Select a component, parsing and applying `options` when it is
    /// configurable. Under `multiple = false` a different prior selection is
    /// replaced; under `multiple = true` the name is appended once.
    /// Re-selecting is a bookkeeping no-op but options are still re-applied.
    pub fn select(&mut self, name: &str, options: &Map<String, Value>) -> Result<(), BlockError> {
        if !self.components.contains_key(name) {
            return Err(self.unknown_component(name));
        }
        if let Some(entry) = self.components.get_mut(name) {
            if entry.configurable {
                if let Some(opts) = entry.component.options_mut() {
                    let parsed = opts.parse(options).map_err(|source| BlockError::Option {
                        block: self.name.clone(),
                        component: name.to_string(),
                        source,
                    })?;
                    opts.apply(parsed);
                }
            } else if !options.is_empty() {
                warn!(block = %self.name, component = %name, "options given to a component that takes none; ignored");
            }
        }
        if !self.selected.iter().any(|s| s == name) {
            if !self.multiple && !self.selected.is_empty() {
                self.selected[0] = name.to_string();
            } else {
                self.selected.push(name.to_string());
            }
        }
        debug!(block = %self.name, component = %name, selected = ?self.selected, "component selected");
        Ok(())
    }

    /// Drop the current selection, reset every component's options to their
    /// defaults and discard the retained report. Idempotent.
    pub fn clear_selections(&mut self) {
        self.selected.clear();
        for entry in self.components.values_mut() {
            if let Some(opts) = entry.component.options_mut() {
                opts.reset_to_defaults();
            }
        }
        self.last_report = None;
    }

    /// Drop all components along with the selection state.
    pub fn reset(&mut self) {
        self.clear_selections();
        self.components.clear();
        self.defaults.clear();
    }

    /// The component names that would run: the explicit selection, else the
    /// defaults, else (required blocks only) the first registered component.
    pub fn effective_selection(&self) -> Vec<String> {
        if !self.selected.is_empty() {
            return self.selected.clone();
        }
        if !self.defaults.is_empty() {
            return self.defaults.clone();
        }
        if self.required {
            if let Some(first) = self.components.keys().next() {
                return vec![first.clone()];
            }
        }
        Vec::new()
    }

    /// Check that the block can run.
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.required && self.effective_selection().is_empty() {
            return Err(BlockError::NoSelection(self.name.clone()));
        }
        Ok(())
    }

    /// Run the effective selection in order as a pipeline: each component's
    /// output becomes the single argument of the next one.
    ///
    /// A component failure is recorded and stops the block; it is not
    /// propagated. The return value is the last successful output, the first
    /// input argument when nothing succeeded, or `Value::Null` when there
    /// were no arguments at all. The built [`BlockReport`] is retained and
    /// carries the failure state.
    pub fn play(&mut self, args: &[Value]) -> Result<Value, BlockError> {
        self.validate()?;
        let mut report = BlockReport::new(self.name.clone());
        let mut timer = LapTimer::start();
        let mut current: Vec<Value> = args.to_vec();
        let mut produced: Option<Value> = None;
        // TODO: "map" multiplicity mode collecting every component's output
        // instead of threading it through.
        for name in self.effective_selection() {
            // selection invariants keep every effective name registered
            let Some(entry) = self.components.get_mut(&name) else {
                continue;
            };
            let options = entry
                .component
                .options()
                .map(|o| o.values(true))
                .unwrap_or_default();
            let mut run = ComponentRun::new(name.clone(), entry.component.describe(), options);
            debug!(block = %self.name, component = %name, "invoking component");
            match entry.component.invoke(&current) {
                Ok(value) => {
                    run.elapsed_ms = timer.lap_ms();
                    report.push(run);
                    current = vec![value.clone()];
                    produced = Some(value);
                }
                Err(err) => {
                    run.elapsed_ms = timer.lap_ms();
                    run.errors
                        .push(format!("error in component '{name}': {err:#}"));
                    report.push(run);
                    break;
                }
            }
        }
        let value = match produced {
            Some(value) => value,
            None => args.first().cloned().unwrap_or(Value::Null),
        };
        self.last_report = Some(report);
        Ok(value)
    }

    /// Discovery view of the block.
    pub fn describe(&self) -> BlockDescriptor {
        BlockDescriptor {
            name: self.name.clone(),
            required: self.required,
            multiple: self.multiple,
            in_names: self.in_names.clone(),
            out_name: self.out_name().to_string(),
            components: self
                .components
                .iter()
                .map(|(name, entry)| ComponentDescriptor {
                    name: name.clone(),
                    is_default: self.defaults.contains(name),
                    options: entry.component.options().map(|o| o.descriptors()),
                })
                .collect(),
        }
    }

    /// Check a selection request without mutating anything: the component
    /// must exist and its options must parse.
    pub(crate) fn check_request(
        &self,
        name: &str,
        options: &Map<String, Value>,
    ) -> Result<(), BlockError> {
        let Some(entry) = self.components.get(name) else {
            return Err(self.unknown_component(name));
        };
        if entry.configurable {
            if let Some(opts) = entry.component.options() {
                opts.parse(options).map_err(|source| BlockError::Option {
                    block: self.name.clone(),
                    component: name.to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn unknown_component(&self, name: &str) -> BlockError {
        BlockError::UnknownComponent {
            block: self.name.clone(),
            name: name.to_string(),
            known: self.component_names().join(", "),
        }
    }
}

/// Discovery view of a block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDescriptor {
    pub name: String,
    pub required: bool,
    pub multiple: bool,
    pub in_names: Vec<String>,
    pub out_name: String,
    pub components: Vec<ComponentDescriptor>,
}

/// Discovery view of a registered component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescriptor {
    pub name: String,
    pub is_default: bool,
    /// Option descriptors, or `None` for a non-configurable component
    pub options: Option<Vec<OptionDescriptor>>,
}

/// Block errors
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// Block name is empty or contains whitespace
    #[error("block name '{0}' must not be empty or contain whitespace")]
    InvalidName(String),

    /// Component name is empty or contains whitespace
    #[error("component name '{0}' must not be empty or contain whitespace")]
    InvalidComponent(String),

    /// A component of that name is already registered
    #[error("block '{block}' already has a component named '{name}'")]
    DuplicateComponent { block: String, name: String },

    /// No component of that name is registered
    #[error("block '{block}' has no component '{name}' (components are: {known})")]
    UnknownComponent {
        block: String,
        name: String,
        known: String,
    },

    /// A required block ended up with nothing to run
    #[error("no component selected for required block '{0}'")]
    NoSelection(String),

    /// An option value failed parsing or validation
    #[error("component '{component}' in block '{block}': {source}")]
    Option {
        block: String,
        component: String,
        #[source]
        source: OptionError,
    },
}
