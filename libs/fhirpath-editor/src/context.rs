//! Evaluation context for edited programs
//!
//! The context is the ambient `$this` of a program: its static type and the
//! value the host evaluates against. External bindings are read-only named
//! values supplied by the host (`%resource`, `%questionnaire`, ...).

use serde::{Deserialize, Serialize};

use crate::token::BindingId;
use crate::types::Type;
use crate::value::FhirValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub value: FhirValue,
}

impl Context {
    pub fn new(ty: Type, value: FhirValue) -> Self {
        Self { ty, value }
    }

    /// A context whose type is known but whose value is not available.
    pub fn typed(ty: Type) -> Self {
        Self::new(ty, FhirValue::empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalBinding {
    pub id: BindingId,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub value: FhirValue,
}

impl ExternalBinding {
    pub fn new(name: impl Into<String>, ty: Type, value: FhirValue) -> Self {
        let name = name.into();
        Self {
            id: BindingId::new(format!("external-{}", name)),
            name,
            ty,
            value,
        }
    }
}
