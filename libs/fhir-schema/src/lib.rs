//! FHIR Schema registry
//!
//! Holds the flattened FHIR schemas an editor resolves field access against,
//! indexed by id and canonical url, and navigates elements through element
//! references, `base` inheritance and declared types.

pub mod error;
pub mod registry;
pub mod schema;

pub use error::{Error, Result};
pub use registry::{FhirNode, SchemaRegistry};
pub use schema::{Derivation, FhirElement, FhirElements, FhirSchema, SchemaKind};
