#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use ferrum_fhirpath_editor::{
    Analyzer, Context, Error, ExpressionEvaluator, ExternalBinding, FhirValue, ProgramStore,
    Result, StoreOptions, Type,
};
use ferrum_schema::SchemaRegistry;
use serde_json::{json, Value as JsonValue};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

static SCHEMA: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

/// A trimmed-down slice of the R4 schemas, enough for field navigation.
pub fn schema() -> Arc<SchemaRegistry> {
    SCHEMA
        .get_or_init(|| {
            Arc::new(
                SchemaRegistry::from_json(json!([
                    {
                        "id": "Element",
                        "type": "Element",
                        "url": "http://hl7.org/fhir/StructureDefinition/Element",
                        "elements": {
                            "id": { "type": "http://hl7.org/fhirpath/System.String", "scalar": true }
                        }
                    },
                    {
                        "id": "Patient",
                        "type": "Patient",
                        "url": "http://hl7.org/fhir/StructureDefinition/Patient",
                        "elements": {
                            "name": { "type": "HumanName", "array": true },
                            "active": { "type": "boolean", "scalar": true },
                            "birthDate": { "type": "date", "scalar": true },
                            "deceased": { "choices": ["deceasedBoolean", "deceasedDateTime"], "scalar": true },
                            "deceasedBoolean": { "type": "boolean", "choiceOf": "deceased", "scalar": true },
                            "deceasedDateTime": { "type": "dateTime", "choiceOf": "deceased", "scalar": true },
                            "contact": {
                                "array": true,
                                "elements": {
                                    "name": { "type": "HumanName", "scalar": true },
                                    "relationship": { "type": "string", "array": true }
                                }
                            }
                        }
                    },
                    {
                        "id": "HumanName",
                        "type": "HumanName",
                        "url": "http://hl7.org/fhir/StructureDefinition/HumanName",
                        "base": "http://hl7.org/fhir/StructureDefinition/Element",
                        "elements": {
                            "family": { "type": "string", "scalar": true },
                            "given": { "type": "string", "array": true }
                        }
                    },
                    {
                        "id": "QuestionnaireResponse",
                        "type": "QuestionnaireResponse",
                        "url": "http://hl7.org/fhir/StructureDefinition/QuestionnaireResponse",
                        "elements": {
                            "status": { "type": "code", "scalar": true }
                        }
                    },
                    {
                        "id": "Questionnaire",
                        "type": "Questionnaire",
                        "url": "http://hl7.org/fhir/StructureDefinition/Questionnaire",
                        "elements": {
                            "title": { "type": "string", "scalar": true }
                        }
                    }
                ]))
                .unwrap_or_else(|e| panic!("failed to load test schemas: {}", e)),
            )
        })
        .clone()
}

pub fn analyzer() -> Arc<Analyzer> {
    Arc::new(Analyzer::new(schema()))
}

pub fn patient() -> JsonValue {
    json!({
        "resourceType": "Patient",
        "active": true,
        "birthDate": "1984-02-29",
        "name": [
            { "family": "Doe", "given": ["Jane", "Q"] },
            { "family": "Roe", "given": ["J"] }
        ]
    })
}

pub fn patient_context() -> Context {
    Context::new(
        Type::single(Type::schema_ref(["Patient"])),
        FhirValue::new(json!([patient()])),
    )
}

pub fn questionnaire() -> JsonValue {
    json!({
        "resourceType": "Questionnaire",
        "item": [
            { "linkId": "pain", "type": "choice", "text": "Pain score" },
            { "linkId": "weight", "type": "quantity" },
            {
                "linkId": "meds",
                "type": "group",
                "repeats": true,
                "item": [{ "linkId": "med-name", "type": "string" }]
            }
        ]
    })
}

/// `%patient`, `%questionnaire` and `%response`.
pub fn externals() -> Vec<ExternalBinding> {
    vec![
        ExternalBinding::new(
            "patient",
            Type::single(Type::schema_ref(["Patient"])),
            FhirValue::new(json!([patient()])),
        ),
        ExternalBinding::new(
            "questionnaire",
            Type::single(Type::schema_ref(["Questionnaire"])),
            FhirValue::new(json!([questionnaire()])),
        ),
        ExternalBinding::new(
            "response",
            Type::single(Type::schema_ref(["QuestionnaireResponse"])),
            FhirValue::new(json!([{ "resourceType": "QuestionnaireResponse" }])),
        ),
    ]
}

/// Evaluator that echoes the expression text it receives, and fails for any
/// text containing `'boom'`.
#[derive(Debug, Default)]
pub struct EchoEvaluator {
    calls: Mutex<Vec<String>>,
}

impl EchoEvaluator {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl ExpressionEvaluator for EchoEvaluator {
    fn evaluate(
        &self,
        _context: &JsonValue,
        expression: &str,
        _variables: &HashMap<String, JsonValue>,
    ) -> Result<JsonValue> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(expression.to_string());
        }
        if expression.contains("'boom'") {
            return Err(Error::Evaluation(format!("cannot evaluate {}", expression)));
        }
        Ok(json!([expression]))
    }
}

pub fn store_with(evaluator: Arc<EchoEvaluator>, options: StoreOptions) -> ProgramStore {
    init_tracing();
    ProgramStore::new(analyzer(), evaluator, patient_context(), externals(), options)
}

pub fn store() -> (ProgramStore, Arc<EchoEvaluator>) {
    let evaluator = Arc::new(EchoEvaluator::default());
    (store_with(evaluator.clone(), StoreOptions::default()), evaluator)
}
