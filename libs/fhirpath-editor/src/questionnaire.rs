//! Questionnaire item index
//!
//! Answer tokens refer to questionnaire items by `linkId`. The index is built
//! once from every external binding typed as a `Questionnaire` and maps each
//! answerable item to the type its answer evaluates to.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::context::ExternalBinding;
use crate::types::{Bindings, FhirPrimitive, Type, TypeRegistry};

const REFERENCE_RESOURCE_URL: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-referenceResource";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub link_id: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub repeats: bool,
    #[serde(default)]
    pub item: Vec<Item>,
    #[serde(default)]
    pub extension: Vec<ItemExtension>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemExtension {
    pub url: String,
    #[serde(default)]
    pub value_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Questionnaire {
    #[serde(default)]
    item: Vec<Item>,
}

/// An indexed answerable item.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireItem {
    pub text: Option<String>,
    pub ty: Type,
    pub item: Item,
}

impl QuestionnaireItem {
    pub fn link_id(&self) -> &str {
        &self.item.link_id
    }

    /// Whether the answer is read through `.ordinal()` rather than directly.
    pub fn is_choice(&self) -> bool {
        matches!(self.item.item_type.as_str(), "choice" | "open-choice")
    }

    pub fn is_quantity(&self) -> bool {
        self.item.item_type == "quantity"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionnaireItemRegistry {
    items: IndexMap<String, QuestionnaireItem>,
}

impl QuestionnaireItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the items of every external typed as a `Questionnaire`.
    pub fn from_external_bindings(types: &TypeRegistry, externals: &[ExternalBinding]) -> Self {
        let questionnaire = Type::schema_ref(["Questionnaire"]);
        let mut registry = Self::new();
        for binding in externals {
            if types
                .match_type_pattern(&questionnaire, &binding.ty, &Bindings::new())
                .is_none()
            {
                continue;
            }
            match Self::from_questionnaire(&binding.value.value) {
                Ok(items) => registry.extend(items),
                Err(e) => warn!("Ignoring unreadable questionnaire %{}: {}", binding.name, e),
            }
        }
        registry
    }

    /// Index a questionnaire resource (or a collection holding one).
    pub fn from_questionnaire(value: &JsonValue) -> serde_json::Result<Self> {
        let resource = match value {
            JsonValue::Array(values) => match values.first() {
                Some(first) => first,
                None => return Ok(Self::new()),
            },
            other => other,
        };
        let questionnaire = Questionnaire::deserialize(resource)?;
        let mut registry = Self::new();
        for item in &questionnaire.item {
            registry.walk(item, false);
        }
        Ok(registry)
    }

    fn walk(&mut self, item: &Item, repeating: bool) {
        if item.link_id.is_empty() || item.item_type.is_empty() {
            return;
        }
        let repeating = repeating || item.repeats;

        if !self.items.contains_key(&item.link_id) {
            if let Some(ty) = answer_type(item) {
                let ty = if repeating { ty } else { Type::single(ty) };
                self.items.insert(
                    item.link_id.clone(),
                    QuestionnaireItem {
                        text: item.text.clone(),
                        ty,
                        item: item.clone(),
                    },
                );
            }
        }

        for child in &item.item {
            self.walk(child, repeating);
        }
    }

    fn extend(&mut self, other: QuestionnaireItemRegistry) {
        for (link_id, item) in other.items {
            self.items.entry(link_id).or_insert(item);
        }
    }

    pub fn get(&self, link_id: &str) -> Option<&QuestionnaireItem> {
        self.items.get(link_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionnaireItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Answer type for an item; `None` for groups, display items and
/// unsupported item types.
fn answer_type(item: &Item) -> Option<Type> {
    let primitive = match item.item_type.as_str() {
        "boolean" => FhirPrimitive::Boolean,
        "decimal" | "choice" | "open-choice" | "quantity" => FhirPrimitive::Decimal,
        "integer" => FhirPrimitive::Integer,
        "date" => FhirPrimitive::Date,
        "dateTime" => FhirPrimitive::DateTime,
        "time" => FhirPrimitive::Time,
        "string" | "text" => FhirPrimitive::String,
        "url" => FhirPrimitive::Uri,
        "attachment" => return Some(Type::schema_ref(["Attachment"])),
        "reference" => {
            return item
                .extension
                .iter()
                .find(|ext| ext.url == REFERENCE_RESOURCE_URL)
                .and_then(|ext| ext.value_code.as_deref())
                .map(|resource| Type::schema_ref([resource]))
        }
        _ => return None,
    };
    Some(Type::Primitive(primitive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FhirValue;
    use serde_json::json;

    fn questionnaire() -> JsonValue {
        json!({
            "resourceType": "Questionnaire",
            "item": [
                { "linkId": "age", "type": "integer", "text": "Age" },
                {
                    "linkId": "meds",
                    "type": "group",
                    "repeats": true,
                    "item": [
                        { "linkId": "dose", "type": "quantity" },
                        { "linkId": "note", "type": "display" }
                    ]
                },
                {
                    "linkId": "gp",
                    "type": "reference",
                    "extension": [{ "url": REFERENCE_RESOURCE_URL, "valueCode": "Practitioner" }]
                },
                { "linkId": "unknown-ref", "type": "reference" },
                { "linkId": "age", "type": "string" }
            ]
        })
    }

    #[test]
    fn test_item_types() {
        let items = QuestionnaireItemRegistry::from_questionnaire(&questionnaire()).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items.get("age").unwrap().ty,
            Type::single(Type::Primitive(FhirPrimitive::Integer))
        );
        assert_eq!(items.get("age").unwrap().text.as_deref(), Some("Age"));
        assert_eq!(
            items.get("gp").unwrap().ty,
            Type::single(Type::schema_ref(["Practitioner"]))
        );
        assert!(items.get("meds").is_none());
        assert!(items.get("note").is_none());
        assert!(items.get("unknown-ref").is_none());
    }

    #[test]
    fn test_repeating_ancestor_drops_single() {
        let items = QuestionnaireItemRegistry::from_questionnaire(&questionnaire()).unwrap();
        let dose = items.get("dose").unwrap();
        assert_eq!(dose.ty, Type::Primitive(FhirPrimitive::Decimal));
        assert!(dose.is_quantity());
        assert!(!dose.is_choice());
    }

    #[test]
    fn test_from_externals() {
        let types = TypeRegistry::new();
        let externals = vec![
            ExternalBinding::new(
                "questionnaire",
                Type::single(Type::schema_ref(["Questionnaire"])),
                FhirValue::new(json!([questionnaire()])),
            ),
            ExternalBinding::new(
                "broken",
                Type::schema_ref(["Questionnaire"]),
                FhirValue::new(json!({ "item": "not a list" })),
            ),
            ExternalBinding::new("resource", Type::schema_ref(["Patient"]), FhirValue::empty()),
        ];
        let items = QuestionnaireItemRegistry::from_external_bindings(&types, &externals);
        assert_eq!(items.len(), 3);
        assert!(items.get("age").is_some());
    }
}
