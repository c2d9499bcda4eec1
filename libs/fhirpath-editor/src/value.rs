//! Evaluated binding values
//!
//! A [`FhirValue`] is what the external evaluator produced for one binding:
//! the JSON result, the name of the binding that produced it, and the failure
//! message if evaluation failed. A value stored under binding `B` whose
//! `origin` is `A` is a failure `B` inherited from upstream binding `A`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhirValue {
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FhirValue {
    pub fn new(value: JsonValue) -> Self {
        Self {
            value,
            origin: None,
            error: None,
        }
    }

    /// The empty collection.
    pub fn empty() -> Self {
        Self::new(JsonValue::Array(Vec::new()))
    }

    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    /// A failed evaluation of binding `origin`.
    pub fn failed(message: impl Into<String>, origin: Option<&str>) -> Self {
        Self {
            value: JsonValue::Null,
            origin: origin.map(str::to_string),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this is a failure produced by some binding other than `holder`.
    pub fn is_inherited_by(&self, holder: Option<&str>) -> bool {
        self.is_error() && self.origin.as_deref() != holder
    }

    /// Element `index` of the value; a non-array value counts as a
    /// one-element collection.
    pub fn value_at(&self, index: usize) -> Result<FhirValue> {
        let element = match &self.value {
            JsonValue::Array(items) => items.get(index),
            JsonValue::Null => None,
            other => (index == 0).then_some(other),
        };
        element
            .cloned()
            .map(|value| FhirValue {
                value,
                origin: self.origin.clone(),
                error: None,
            })
            .ok_or(Error::IndexOutOfBounds(index))
    }
}

impl Default for FhirValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<JsonValue> for FhirValue {
    fn from(value: JsonValue) -> Self {
        Self::new(value)
    }
}
