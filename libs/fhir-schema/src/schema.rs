//! FHIR Schema data model.
//!
//! A flattened view of a StructureDefinition: every schema carries its own
//! elements keyed by name, plus a `base` url pointing to the schema it
//! specializes or constrains.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered element map; iteration order follows the source document.
pub type FhirElements = IndexMap<String, FhirElement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Derivation {
    Specialization,
    Constraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// A single schema entry (resource, datatype, primitive, or profile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirSchema {
    pub id: String,
    #[serde(default)]
    pub url: String,
    /// Name of the type this schema describes (`Patient`, `HumanName`, ...)
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaKind>,
    /// Canonical url (or id) of the parent schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<FhirElements>,
}

/// An element inside a schema. Elements with their own `elements` describe
/// inline backbone structures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    /// Name of the polymorphic element this one is an alternative of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_of: Option<String>,
    /// Names of the concrete alternatives of a polymorphic element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Path to another element whose shape this element reuses,
    /// e.g. `["Questionnaire", "elements", "item"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_reference: Option<Vec<String>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<FhirElements>,
}

impl FhirElement {
    /// Whether the element holds at most one value.
    ///
    /// An explicit `scalar` flag wins; otherwise the element is scalar unless
    /// it is flagged `array` or allows more than one occurrence.
    pub fn is_scalar(&self) -> bool {
        if let Some(scalar) = self.scalar {
            return scalar;
        }
        !self.array.unwrap_or(false) && self.max.map_or(true, |max| max <= 1)
    }

    /// Whether the element carries an inline structure of its own.
    pub fn has_nested_shape(&self) -> bool {
        self.elements.as_ref().is_some_and(|e| !e.is_empty()) || self.element_reference.is_some()
    }
}
