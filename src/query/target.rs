//! Target descriptions
//!
//! A target names the contexts a consumer wants to attach to: an optional
//! namespace and context type, property conditions, and an optional
//! enclosing target that some ancestor must satisfy.

use crate::tree::PropertyValue;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Condition on a single parsed property. Every operator present must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCondition {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub eq: Option<PropertyValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub not: Option<PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<String>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<PropertyValue>>,
    /// Marks the property for link indexing; ignored by matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
}

// A present `null` is a comparison against null, not an absent operator.
fn present<'de, D>(deserializer: D) -> Result<Option<PropertyValue>, D::Error>
where
    D: Deserializer<'de>,
{
    PropertyValue::deserialize(deserializer).map(Some)
}

impl TargetCondition {
    pub fn eq(value: impl Into<PropertyValue>) -> Self {
        Self {
            eq: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn not(value: impl Into<PropertyValue>) -> Self {
        Self {
            not: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            contains: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn ends_with(value: impl Into<String>) -> Self {
        Self {
            ends_with: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PropertyValue>,
    {
        Self {
            one_of: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Flag the property for link indexing
    pub fn indexed(mut self) -> Self {
        self.index = Some(true);
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index == Some(true)
    }

    /// Evaluate against the property's current value; absent is `Null`.
    pub fn evaluate(&self, value: &PropertyValue) -> bool {
        if let Some(expected) = &self.eq {
            if value != expected {
                return false;
            }
        }
        if let Some(rejected) = &self.not {
            if value == rejected {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !value.as_str().is_some_and(|s| s.contains(needle.as_str())) {
                return false;
            }
        }
        if let Some(suffix) = &self.ends_with {
            if !value.as_str().is_some_and(|s| s.ends_with(suffix.as_str())) {
                return false;
            }
        }
        if let Some(set) = &self.one_of {
            if !set.contains(value) {
                return false;
            }
        }
        true
    }
}

/// A context target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Omitted matches any namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Omitted matches any context type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,
    /// Property conditions, ANDed across keys
    #[serde(default, rename = "if", skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, TargetCondition>,
    /// Target some ancestor must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<Box<Target>>,
    /// Insertion point name; omitted attaches to the context itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_to: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inject_once: bool,
    #[serde(default, rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub is_static: bool,
}

impl Target {
    /// Target matching every context
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(namespace: impl Into<String>, context_type: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            context_type: Some(context_type.into()),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_context_type(mut self, context_type: impl Into<String>) -> Self {
        self.context_type = Some(context_type.into());
        self
    }

    pub fn with_condition(mut self, property: impl Into<String>, condition: TargetCondition) -> Self {
        self.conditions.insert(property.into(), condition);
        self
    }

    pub fn within(mut self, ancestor: Target) -> Self {
        self.ancestor = Some(Box::new(ancestor));
        self
    }

    pub fn inject_to(mut self, insertion_point: impl Into<String>) -> Self {
        self.inject_to = Some(insertion_point.into());
        self
    }

    pub fn inject_once(mut self) -> Self {
        self.inject_once = true;
        self
    }

    pub fn static_target(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}
