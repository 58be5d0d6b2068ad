//! Group configuration surface.
//!
//! Values that cannot be interpreted fall back to defaults or the z-index
//! floor instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::host::ElementId;

pub const DEFAULT_BASE_Z_INDEX: i32 = 200;
pub const MIN_BASE_Z_INDEX: i32 = 20;

/// How a sticky member shares the pinned area with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickyMode {
    /// Overlay at the same cursor; the later member slides in under the earlier one.
    #[default]
    Replace,
    /// Reserve space; the next member pins below this one.
    Stack,
    /// Never sticks; stays in normal flow.
    None,
}

impl StickyMode {
    pub fn is_active(self) -> bool {
        !matches!(self, StickyMode::None)
    }

    /// Stacking value for the member at `index` in sort order.
    pub fn z_index(self, base: i32, index: usize) -> i32 {
        let index = i32::try_from(index).unwrap_or(i32::MAX);
        match self {
            StickyMode::Stack => base.saturating_add(index),
            _ => base.saturating_sub(index),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StickyMode::Replace => "replace",
            StickyMode::Stack => "stack",
            StickyMode::None => "none",
        }
    }
}

impl fmt::Display for StickyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StickyMode {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(StickyMode::Replace),
            "stack" => Ok(StickyMode::Stack),
            "none" => Ok(StickyMode::None),
            other => Err(ParseConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Whether stickiness is limited by the reference rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintPolicy {
    #[default]
    Bounded,
    #[serde(alias = "none")]
    Unbounded,
}

impl FromStr for ConstraintPolicy {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bounded" => Ok(ConstraintPolicy::Bounded),
            "unbounded" | "none" => Ok(ConstraintPolicy::Unbounded),
            other => Err(ParseConfigError::UnknownConstraint(other.to_string())),
        }
    }
}

/// Rectangle a bounded group is constrained by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReferenceContainer {
    /// The group's own container element.
    #[default]
    Group,
    /// The host viewport; behaves like CSS `position: sticky`.
    Viewport,
    /// Any other element known to the host.
    Element(ElementId),
}

impl From<&str> for ReferenceContainer {
    fn from(value: &str) -> Self {
        match value {
            "group" | "parent" => ReferenceContainer::Group,
            "window" | "viewport" => ReferenceContainer::Viewport,
            other => ReferenceContainer::Element(other.to_string()),
        }
    }
}

impl From<String> for ReferenceContainer {
    fn from(value: String) -> Self {
        ReferenceContainer::from(value.as_str())
    }
}

impl From<ReferenceContainer> for String {
    fn from(value: ReferenceContainer) -> Self {
        match value {
            ReferenceContainer::Group => "group".to_string(),
            ReferenceContainer::Viewport => "viewport".to_string(),
            ReferenceContainer::Element(id) => id,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseConfigError {
    #[error("unknown sticky mode `{0}`")]
    UnknownMode(String),
    #[error("unknown constraint policy `{0}`")]
    UnknownConstraint(String),
}

/// Clamp an arbitrary number to a usable base z-index.
pub fn coerce_base_z_index(value: f64) -> i32 {
    if !value.is_finite() {
        return MIN_BASE_Z_INDEX;
    }
    let truncated = value.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    truncated.max(MIN_BASE_Z_INDEX)
}

fn coerce_z_value(value: &Value) -> i32 {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map(coerce_base_z_index)
            .unwrap_or(MIN_BASE_Z_INDEX),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(coerce_base_z_index)
            .unwrap_or(MIN_BASE_Z_INDEX),
        _ => MIN_BASE_Z_INDEX,
    }
}

fn lenient_z_index<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_z_value(&value))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupConfig {
    #[serde(rename = "offsetTop")]
    pub fixed_offset_top: f32,
    #[serde(deserialize_with = "lenient_z_index")]
    pub base_z_index: i32,
    pub default_mode: StickyMode,
    pub constraint: ConstraintPolicy,
    #[serde(rename = "referenceContainer")]
    pub reference: ReferenceContainer,
    /// Element whose scroll notifications trigger passes, in addition to the viewport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_root: Option<ElementId>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            fixed_offset_top: 0.0,
            base_z_index: DEFAULT_BASE_Z_INDEX,
            default_mode: StickyMode::Replace,
            constraint: ConstraintPolicy::Bounded,
            reference: ReferenceContainer::Group,
            scroll_root: None,
        }
    }
}

impl GroupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset_top(mut self, offset: f32) -> Self {
        self.fixed_offset_top = sanitize_offset(offset);
        self
    }

    pub fn with_base_z_index(mut self, base: f64) -> Self {
        self.base_z_index = coerce_base_z_index(base);
        self
    }

    pub fn with_default_mode(mut self, mode: StickyMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintPolicy) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_reference(mut self, reference: ReferenceContainer) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_scroll_root(mut self, root: impl Into<ElementId>) -> Self {
        self.scroll_root = Some(root.into());
        self
    }

    /// Build a config from loosely typed props, ignoring anything unusable.
    pub fn from_json(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(props) = value.as_object() else {
            return config;
        };

        if let Some(offset) = props.get("offsetTop").and_then(Value::as_f64) {
            config.fixed_offset_top = sanitize_offset(offset as f32);
        }
        if let Some(base) = props.get("baseZIndex") {
            config.base_z_index = coerce_z_value(base);
        }
        if let Some(mode) = props
            .get("defaultMode")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
        {
            config.default_mode = mode;
        }
        if let Some(constraint) = props
            .get("constraint")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
        {
            config.constraint = constraint;
        }
        if let Some(reference) = props.get("referenceContainer").and_then(Value::as_str) {
            config.reference = ReferenceContainer::from(reference);
        }
        if let Some(root) = props.get("scrollRoot").and_then(Value::as_str) {
            config.scroll_root = Some(root.to_string());
        }
        config
    }

    /// Parse JSON text, then apply the same leniency as [`GroupConfig::from_json`].
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_json(&value))
    }

    /// Clamp fields that may have been set directly: non-finite offsets
    /// become 0 and the base z-index is raised to [`MIN_BASE_Z_INDEX`].
    pub fn normalized(mut self) -> Self {
        self.fixed_offset_top = sanitize_offset(self.fixed_offset_top);
        self.base_z_index = self.base_z_index.max(MIN_BASE_Z_INDEX);
        self
    }

    /// Whether `member_count` members can be z-ordered without reaching zero.
    pub fn has_z_headroom(&self, member_count: usize) -> bool {
        usize::try_from(self.base_z_index)
            .map(|base| base > member_count)
            .unwrap_or(false)
    }
}

fn sanitize_offset(offset: f32) -> f32 {
    if offset.is_finite() { offset } else { 0.0 }
}
