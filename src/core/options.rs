//! Option binding for configurable components
//!
//! Components that take configuration own an [`OptionSet`]: an ordered set of
//! typed, defaulted option values. Raw values arrive from the configuration
//! boundary as strings or JSON scalars and are coerced against the declared
//! kind before they touch component state.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Option kinds, with range constraints for the numeric ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionKind {
    /// Free text
    Text,
    /// Integer, optionally bounded
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    /// Float, optionally bounded
    Float {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Boolean
    Boolean,
    /// One value out of a fixed set of choices
    Enum { choices: Vec<String> },
}

impl OptionKind {
    /// Coerce a raw boundary value (string or JSON scalar) to a typed value.
    pub fn coerce(&self, name: &str, raw: &Value) -> Result<OptionValue, OptionError> {
        match self {
            OptionKind::Text => match raw {
                Value::String(s) => Ok(OptionValue::Text(s.clone())),
                Value::Number(n) => Ok(OptionValue::Text(n.to_string())),
                Value::Bool(b) => Ok(OptionValue::Text(b.to_string())),
                _ => Err(invalid(name, "expected a text value")),
            },
            OptionKind::Integer { min, max } => {
                let value = match raw {
                    Value::Number(n) => n
                        .as_i64()
                        .ok_or_else(|| invalid(name, "expected an integer"))?,
                    Value::String(s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| invalid(name, &format!("'{s}' is not an integer")))?,
                    _ => return Err(invalid(name, "expected an integer")),
                };
                check_range(name, value as f64, min.map(|m| m as f64), max.map(|m| m as f64))?;
                Ok(OptionValue::Integer(value))
            }
            OptionKind::Float { min, max } => {
                let value = match raw {
                    Value::Number(n) => n
                        .as_f64()
                        .ok_or_else(|| invalid(name, "expected a number"))?,
                    Value::String(s) => s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| invalid(name, &format!("'{s}' is not a number")))?,
                    _ => return Err(invalid(name, "expected a number")),
                };
                check_range(name, value, *min, *max)?;
                Ok(OptionValue::Float(value))
            }
            OptionKind::Boolean => match raw {
                Value::Bool(b) => Ok(OptionValue::Boolean(*b)),
                Value::String(s) => parse_bool(s)
                    .map(OptionValue::Boolean)
                    .ok_or_else(|| invalid(name, &format!("'{s}' is not a boolean"))),
                _ => Err(invalid(name, "expected a boolean")),
            },
            OptionKind::Enum { choices } => {
                let value = raw
                    .as_str()
                    .ok_or_else(|| invalid(name, "expected a text choice"))?;
                if choices.iter().any(|c| c == value) {
                    Ok(OptionValue::Text(value.to_string()))
                } else {
                    Err(invalid(
                        name,
                        &format!("'{}' is not one of [{}]", value, choices.join(", ")),
                    ))
                }
            }
        }
    }

    /// Validate an already-typed value against this kind.
    pub fn check(&self, name: &str, value: &OptionValue) -> Result<(), OptionError> {
        match (self, value) {
            (OptionKind::Text, OptionValue::Text(_)) => Ok(()),
            (OptionKind::Integer { min, max }, OptionValue::Integer(v)) => {
                check_range(name, *v as f64, min.map(|m| m as f64), max.map(|m| m as f64))
            }
            (OptionKind::Float { min, max }, OptionValue::Float(v)) => {
                check_range(name, *v, *min, *max)
            }
            (OptionKind::Boolean, OptionValue::Boolean(_)) => Ok(()),
            (OptionKind::Enum { choices }, OptionValue::Text(v)) => {
                if choices.iter().any(|c| c == v) {
                    Ok(())
                } else {
                    Err(invalid(
                        name,
                        &format!("'{}' is not one of [{}]", v, choices.join(", ")),
                    ))
                }
            }
            _ => Err(invalid(name, "value type does not match the option type")),
        }
    }
}

fn check_range(
    name: &str,
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(), OptionError> {
    if let Some(min) = min {
        if value < min {
            return Err(invalid(name, &format!("{value} is below the minimum {min}")));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(invalid(name, &format!("{value} is above the maximum {max}")));
        }
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(name: &str, reason: &str) -> OptionError {
    OptionError::Validation {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Boolean(bool),
}

impl OptionValue {
    /// Try to view as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to view as an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to view as a float; integers widen
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Float(f) => Some(*f),
            OptionValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to view as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to a JSON value for the trace/introspection surfaces.
    pub fn to_json(&self) -> Value {
        match self {
            OptionValue::Text(s) => Value::String(s.clone()),
            OptionValue::Integer(i) => Value::Number((*i).into()),
            OptionValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            OptionValue::Boolean(b) => Value::Bool(*b),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Integer(i)
    }
}

impl From<f64> for OptionValue {
    fn from(f: f64) -> Self {
        OptionValue::Float(f)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Boolean(b)
    }
}

/// Declaration of a single option.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    /// Option name, unique within an option set, no whitespace
    pub name: String,
    /// Short description, surfaced by `descriptors()`
    pub description: String,
    /// Value kind and constraints
    pub kind: OptionKind,
    /// Default value; also the value after a reset
    pub default: OptionValue,
}

impl OptionSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: OptionKind,
        default: impl Into<OptionValue>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            default: default.into(),
        }
    }

    pub fn text(name: impl Into<String>, description: impl Into<String>, default: &str) -> Self {
        Self::new(name, description, OptionKind::Text, default)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>, default: i64) -> Self {
        Self::new(
            name,
            description,
            OptionKind::Integer { min: None, max: None },
            default,
        )
    }

    pub fn float(name: impl Into<String>, description: impl Into<String>, default: f64) -> Self {
        Self::new(
            name,
            description,
            OptionKind::Float { min: None, max: None },
            default,
        )
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>, default: bool) -> Self {
        Self::new(name, description, OptionKind::Boolean, default)
    }

    pub fn enumeration(
        name: impl Into<String>,
        description: impl Into<String>,
        choices: &[&str],
        default: &str,
    ) -> Self {
        Self::new(
            name,
            description,
            OptionKind::Enum {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
            default,
        )
    }
}

struct OptionEntry {
    spec: OptionSpec,
    value: OptionValue,
    pinned: bool,
}

/// Ordered set of option declarations plus their live values.
///
/// Owned by one component instance; there is no shared option storage.
#[derive(Default)]
pub struct OptionSet {
    entries: IndexMap<String, OptionEntry>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new option. The default becomes the initial value.
    pub fn declare(&mut self, spec: OptionSpec) -> Result<(), OptionError> {
        if spec.name.is_empty() || spec.name.chars().any(char::is_whitespace) {
            return Err(OptionError::InvalidName(spec.name));
        }
        spec.kind.check(&spec.name, &spec.default)?;
        if self.entries.contains_key(&spec.name) {
            return Err(OptionError::DuplicateOption(spec.name));
        }
        let value = spec.default.clone();
        self.entries
            .insert(spec.name.clone(), OptionEntry { spec, value, pinned: false });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Current value of an option.
    pub fn value(&self, name: &str) -> Option<&OptionValue> {
        self.entries.get(name).map(|e| &e.value)
    }

    /// Coerce a raw value map without mutating anything.
    ///
    /// Unknown and pinned names are rejected; the returned pairs are ready
    /// for [`OptionSet::apply`].
    pub fn parse(&self, raw: &Map<String, Value>) -> Result<Vec<(String, OptionValue)>, OptionError> {
        let mut parsed = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let entry = self
                .entries
                .get(name)
                .ok_or_else(|| OptionError::UnknownOption(name.clone()))?;
            if entry.pinned {
                return Err(OptionError::Pinned(name.clone()));
            }
            parsed.push((name.clone(), entry.spec.kind.coerce(name, value)?));
        }
        Ok(parsed)
    }

    /// Apply values previously produced by [`OptionSet::parse`].
    pub fn apply(&mut self, parsed: Vec<(String, OptionValue)>) {
        for (name, value) in parsed {
            if let Some(entry) = self.entries.get_mut(&name) {
                entry.value = value;
            }
        }
    }

    /// Set a single option to an already-typed value.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<(), OptionError> {
        let value = value.into();
        let Some(entry) = self.entries.get_mut(name) else {
            return Err(OptionError::UnknownOption(name.to_string()));
        };
        if entry.pinned {
            return Err(OptionError::Pinned(name.to_string()));
        }
        entry.spec.kind.check(name, &value)?;
        entry.value = value;
        Ok(())
    }

    /// Set values from a raw map. With `strict` unknown and pinned names
    /// error; otherwise they are skipped. Bad values error either way.
    pub fn set_values(&mut self, raw: &Map<String, Value>, strict: bool) -> Result<(), OptionError> {
        for (name, value) in raw {
            let Some(entry) = self.entries.get_mut(name) else {
                if strict {
                    return Err(OptionError::UnknownOption(name.clone()));
                }
                continue;
            };
            if entry.pinned {
                if strict {
                    return Err(OptionError::Pinned(name.clone()));
                }
                continue;
            }
            entry.value = entry.spec.kind.coerce(name, value)?;
        }
        Ok(())
    }

    /// Current values as a JSON map, for run records and hosts.
    pub fn values(&self, include_pinned: bool) -> Map<String, Value> {
        self.entries
            .iter()
            .filter(|(_, e)| include_pinned || !e.pinned)
            .map(|(name, e)| (name.clone(), e.value.to_json()))
            .collect()
    }

    /// Reset every option to its default value. Pinned options keep the
    /// pinned value (pinning rewrites the default).
    pub fn reset_to_defaults(&mut self) {
        for entry in self.entries.values_mut() {
            entry.value = entry.spec.default.clone();
        }
    }

    /// Force an option's value and hide it from discovery; further sets fail.
    pub fn pin(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<(), OptionError> {
        let value = value.into();
        let Some(entry) = self.entries.get_mut(name) else {
            return Err(OptionError::UnknownOption(name.to_string()));
        };
        entry.spec.kind.check(name, &value)?;
        entry.spec.default = value.clone();
        entry.value = value;
        entry.pinned = true;
        Ok(())
    }

    /// Change an option's default. The current value follows the default.
    pub fn set_default(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<(), OptionError> {
        let value = value.into();
        let Some(entry) = self.entries.get_mut(name) else {
            return Err(OptionError::UnknownOption(name.to_string()));
        };
        if entry.pinned {
            return Err(OptionError::Pinned(name.to_string()));
        }
        entry.spec.kind.check(name, &value)?;
        entry.spec.default = value.clone();
        entry.value = value;
        Ok(())
    }

    /// Ordered descriptors of the non-pinned options, for discovery UIs.
    pub fn descriptors(&self) -> Vec<OptionDescriptor> {
        self.entries
            .values()
            .filter(|e| !e.pinned)
            .map(|e| OptionDescriptor {
                name: e.spec.name.clone(),
                description: e.spec.description.clone(),
                kind: e.spec.kind.clone(),
                default: e.spec.default.to_json(),
                value: e.value.to_json(),
            })
            .collect()
    }
}

/// Discovery view of one option.
#[derive(Debug, Clone, Serialize)]
pub struct OptionDescriptor {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: OptionKind,
    pub default: Value,
    pub value: Value,
}

/// Option binding errors
#[derive(Debug, thiserror::Error)]
pub enum OptionError {
    /// Option name is empty or contains whitespace
    #[error("option name '{0}' must not be empty or contain whitespace")]
    InvalidName(String),

    /// An option of that name already exists
    #[error("duplicate option '{0}'")]
    DuplicateOption(String),

    /// No option of that name exists
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// The option was pinned and cannot be changed
    #[error("option '{0}' is pinned and cannot be changed")]
    Pinned(String),

    /// The value failed type validation
    #[error("invalid value for option '{name}': {reason}")]
    Validation { name: String, reason: String },
}
