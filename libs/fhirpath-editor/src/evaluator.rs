//! Expression evaluator trait for computing binding values
//!
//! The editor never executes expressions itself. Programs are rendered to
//! FHIRPath text and handed to an [`ExpressionEvaluator`] supplied by the host,
//! typically a thin wrapper around a FHIRPath engine.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::Result;

/// Trait for evaluating FHIRPath text
///
/// Implement this to connect the store to a FHIRPath engine. The store calls
/// it once per binding whose value has to be recomputed, with the text of
/// that binding and the bindings it depends on.
///
/// # Example
///
/// ```rust,ignore
/// use std::collections::HashMap;
/// use ferrum_fhirpath_editor::{Error, ExpressionEvaluator, Result};
/// use serde_json::Value;
///
/// struct EngineEvaluator {
///     engine: fhirpath::Engine,
/// }
///
/// impl ExpressionEvaluator for EngineEvaluator {
///     fn evaluate(
///         &self,
///         context: &Value,
///         expression: &str,
///         variables: &HashMap<String, Value>,
///     ) -> Result<Value> {
///         self.engine
///             .evaluate_json(expression, context, variables)
///             .map_err(|e| Error::Evaluation(e.to_string()))
///     }
/// }
/// ```
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` against `context`
    ///
    /// # Arguments
    ///
    /// * `context` - Value of `$this` (the ambient context value)
    /// * `expression` - FHIRPath source text
    /// * `variables` - External binding values by name, readable as `%name`
    ///
    /// # Returns
    ///
    /// * `Ok(value)` - The result collection as JSON
    /// * `Err(Error::Evaluation(_))` - The expression could not be evaluated
    fn evaluate(
        &self,
        context: &JsonValue,
        expression: &str,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<JsonValue>;
}

/// Evaluator that returns the empty collection for everything.
///
/// Useful when only types are needed, for example in lambda editors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvaluator;

impl ExpressionEvaluator for NoopEvaluator {
    fn evaluate(
        &self,
        _context: &JsonValue,
        _expression: &str,
        _variables: &HashMap<String, JsonValue>,
    ) -> Result<JsonValue> {
        Ok(JsonValue::Array(Vec::new()))
    }
}
