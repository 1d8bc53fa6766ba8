//! Error Descriptor Model
//!
//! The normalized, serializable form of one captured exception. Descriptors
//! are built on the scripting side, serialized for the transport hop and
//! handed to the [`AggregationPipeline`](crate::aggregation::AggregationPipeline)
//! on the native side. Field names serialize in camelCase.
//!
//! A descriptor is immutable once built: the builder-style `with_*` methods
//! consume it, and the stack is only exposed as a slice.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Name given to errors whose kind cannot be determined.
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// Identifier assigned at capture time.
///
/// Strictly increasing within one sequence namespace (normally the process).
/// The delivery guard uses it both for ordering and for recognizing retried
/// handoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(u64);

impl SequenceId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One frame of a captured stack. Every field is optional because minified
/// or obfuscated bundles routinely omit some of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_location(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// A frame carrying no information at all.
    pub fn is_empty(&self) -> bool {
        self.function.is_none() && self.file.is_none() && self.line.is_none() && self.column.is_none()
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function.as_deref().unwrap_or("<anonymous>"))?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
                if let Some(column) = self.column {
                    write!(f, ":{}", column)?;
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Severity the report was filed at.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Log,
    Warning,
    #[default]
    Error,
    Critical,
}

impl ReportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "log" | "info" => Ok(Self::Log),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            other => Err(BridgeError::InvalidDescriptor(format!(
                "unknown report level: {}",
                other
            ))),
        }
    }
}

/// Attribute value accepted by the aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    /// Non-finite numbers have no JSON representation and are kept as text.
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::String(value.to_string())
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::String(value) => f.write_str(value),
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// App activity recorded ahead of an error to help explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    pub recorded_at_millis: i64,
}

impl Breadcrumb {
    pub fn new(name: impl Into<String>, recorded_at_millis: i64) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            recorded_at_millis,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Normalized representation of one captured exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    sequence_id: SequenceId,
    #[serde(default = "default_name", deserialize_with = "deserialize_name")]
    name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack_frames: Vec<StackFrame>,
    #[serde(default)]
    fatal: bool,
    captured_at_millis: i64,
    #[serde(default)]
    level: ReportLevel,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    breadcrumbs: Vec<Breadcrumb>,
}

impl ErrorDescriptor {
    /// Creates a non-fatal, error-level descriptor.
    ///
    /// A blank `name` is replaced by [`DEFAULT_ERROR_NAME`].
    pub fn new(
        sequence_id: SequenceId,
        name: impl Into<String>,
        message: impl Into<String>,
        stack_frames: Vec<StackFrame>,
        captured_at_millis: i64,
    ) -> Self {
        Self {
            sequence_id,
            name: normalize_name(name.into()),
            message: message.into(),
            stack_frames,
            fatal: false,
            captured_at_millis,
            level: ReportLevel::default(),
            attributes: Attributes::new(),
            user_id: None,
            breadcrumbs: Vec::new(),
        }
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_level(mut self, level: ReportLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_breadcrumbs(mut self, breadcrumbs: Vec<Breadcrumb>) -> Self {
        self.breadcrumbs = breadcrumbs;
        self
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Innermost frame first.
    pub fn stack_frames(&self) -> &[StackFrame] {
        &self.stack_frames
    }

    pub fn fatal(&self) -> bool {
        self.fatal
    }

    pub fn captured_at_millis(&self) -> i64 {
        self.captured_at_millis
    }

    pub fn level(&self) -> ReportLevel {
        self.level
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.breadcrumbs
    }

    /// Checks the invariants a pipeline may rely on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::InvalidDescriptor(format!(
                "descriptor {} has an empty name",
                self.sequence_id
            )));
        }

        if self.sequence_id.value() == 0 {
            return Err(BridgeError::InvalidDescriptor(
                "sequence id 0 is never assigned".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalize_name(name: String) -> String {
    if name.trim().is_empty() {
        DEFAULT_ERROR_NAME.to_string()
    } else {
        name
    }
}

fn default_name() -> String {
    DEFAULT_ERROR_NAME.to_string()
}

fn deserialize_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_name(name.unwrap_or_default()))
}
