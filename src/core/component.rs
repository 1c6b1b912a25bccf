//! Component contract
//!
//! A component is a named unit of work run by a block. Payloads are JSON
//! values; the pipeline threads them between components and blocks without
//! interpreting them. A component that exposes an [`OptionSet`] through
//! [`Component::options`] is configurable: selection requests may carry raw
//! option values, which are parsed and applied before the component runs.

use serde_json::Value;

use super::options::OptionSet;

/// Core component trait.
pub trait Component: Send {
    /// Component name; unique within a block, no whitespace.
    fn name(&self) -> &str;

    /// Debug representation recorded in run reports.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Run the component on the given arguments.
    ///
    /// Failures are opaque to the pipeline: they are captured into the run
    /// report of the owning block, never interpreted.
    fn invoke(&mut self, args: &[Value]) -> anyhow::Result<Value>;

    /// The configurable facet, when the component has one.
    fn options(&self) -> Option<&OptionSet> {
        None
    }

    /// Mutable access to the configurable facet.
    fn options_mut(&mut self) -> Option<&mut OptionSet> {
        None
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

/// Adapter turning a closure into a non-configurable component.
pub struct FnComponent<F> {
    name: String,
    func: F,
}

impl<F> FnComponent<F>
where
    F: FnMut(&[Value]) -> anyhow::Result<Value> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Boxed form, ready for registration.
    pub fn boxed(name: impl Into<String>, func: F) -> Box<dyn Component>
    where
        F: 'static,
    {
        Box::new(Self::new(name, func))
    }
}

impl<F> Component for FnComponent<F>
where
    F: FnMut(&[Value]) -> anyhow::Result<Value> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&mut self, args: &[Value]) -> anyhow::Result<Value> {
        (self.func)(args)
    }
}
