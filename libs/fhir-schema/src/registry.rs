//! Schema registry and element navigation.
//!
//! The registry is built once from a flat schema list and indexed by both
//! `id` and canonical `url`. Navigation walks own elements first, then element
//! references, then the `base` chain, then the declared `type`.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::schema::{FhirElement, FhirElements, FhirSchema};

/// Upper bound on nested element-reference hops during one lookup.
const MAX_REFERENCE_DEPTH: usize = 16;

/// A position inside the schema graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FhirNode<'a> {
    Schema(&'a FhirSchema),
    Element(&'a FhirElement),
    /// The raw `elements` map of a schema or element, reached through a
    /// literal `elements` path segment.
    Elements(&'a FhirElements),
}

impl<'a> FhirNode<'a> {
    pub fn elements(&self) -> Option<&'a FhirElements> {
        match self {
            FhirNode::Schema(schema) => schema.elements.as_ref(),
            FhirNode::Element(element) => element.elements.as_ref(),
            FhirNode::Elements(elements) => Some(elements),
        }
    }

    pub fn as_element(&self) -> Option<&'a FhirElement> {
        match self {
            FhirNode::Element(element) => Some(element),
            _ => None,
        }
    }

    fn schema_id(&self) -> Option<&'a str> {
        match self {
            FhirNode::Schema(schema) => Some(schema.id.as_str()),
            _ => None,
        }
    }

    fn base(&self) -> Option<&'a str> {
        match self {
            FhirNode::Schema(schema) => schema.base.as_deref(),
            _ => None,
        }
    }

    fn type_name(&self) -> Option<&'a str> {
        match self {
            FhirNode::Schema(schema) => Some(schema.type_name.as_str()),
            FhirNode::Element(element) => element.type_name.as_deref(),
            FhirNode::Elements(_) => None,
        }
    }

    fn element_reference(&self) -> Option<&'a [String]> {
        match self {
            FhirNode::Element(element) => element.element_reference.as_deref(),
            _ => None,
        }
    }
}

/// Immutable schema lookup table.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<FhirSchema>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Index a flat schema list. A later schema with the same id or url
    /// replaces an earlier one.
    pub fn new(schemas: Vec<FhirSchema>) -> Self {
        let mut index = HashMap::with_capacity(schemas.len() * 2);
        for (position, schema) in schemas.iter().enumerate() {
            index.insert(schema.id.clone(), position);
            if !schema.url.is_empty() {
                index.insert(schema.url.clone(), position);
            }
        }
        debug!(schemas = schemas.len(), keys = index.len(), "indexed FHIR schemas");
        Self { schemas, index }
    }

    /// Build a registry from a JSON array of schemas.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let schemas: Vec<FhirSchema> = serde_json::from_value(value)?;
        Ok(Self::new(schemas))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Look up a schema by id or url.
    pub fn get(&self, key: &str) -> Option<&FhirSchema> {
        self.index.get(key).map(|&position| &self.schemas[position])
    }

    pub fn require(&self, key: &str) -> Result<&FhirSchema> {
        self.get(key)
            .ok_or_else(|| Error::SchemaNotFound(key.to_string()))
    }

    /// Every element visible on `node`, in lookup order: own elements, then
    /// the elements of the node's type (or element-reference target), then
    /// each schema up the `base` chain.
    ///
    /// Entries are appended, not deduplicated; a name may appear more than
    /// once when a derived schema redeclares an inherited element.
    pub fn resolve_elements<'a>(&'a self, node: FhirNode<'a>) -> Vec<(&'a str, &'a FhirElement)> {
        let mut result = Vec::new();
        push_elements(&mut result, node.elements());

        let type_definition = match node {
            FhirNode::Element(element) => match (&element.type_name, &element.element_reference) {
                (Some(type_name), _) => self.get(type_name).map(FhirNode::Schema),
                (None, Some(path)) => self.resolve_path(path),
                (None, None) => None,
            },
            _ => None,
        };
        if let Some(definition) = type_definition {
            push_elements(&mut result, definition.elements());
        }

        let mut visited = HashSet::new();
        let mut current = type_definition.unwrap_or(node);
        if let Some(id) = current.schema_id() {
            visited.insert(id);
        }
        while let Some(base) = current.base() {
            let Some(schema) = self.get(base) else {
                warn!(base, "base schema not found");
                break;
            };
            if !visited.insert(schema.id.as_str()) {
                break;
            }
            push_elements(&mut result, schema.elements.as_ref());
            current = FhirNode::Schema(schema);
        }

        result
    }

    /// Find the node reached by `field` from `node`.
    pub fn resolve_field<'a>(&'a self, field: &str, node: FhirNode<'a>) -> Option<FhirNode<'a>> {
        self.resolve_field_at(field, node, 0)
    }

    /// Navigate from the schema named by `path[0]` through the remaining
    /// segments.
    pub fn resolve_path<'a, S: AsRef<str>>(&'a self, path: &[S]) -> Option<FhirNode<'a>> {
        self.resolve_path_at(path, 0)
    }

    fn resolve_path_at<'a, S: AsRef<str>>(&'a self, path: &[S], depth: usize) -> Option<FhirNode<'a>> {
        let (root, rest) = path.split_first()?;
        let mut node = FhirNode::Schema(self.get(root.as_ref())?);
        for segment in rest {
            node = self.resolve_field_at(segment.as_ref(), node, depth)?;
        }
        Some(node)
    }

    fn resolve_field_at<'a>(
        &'a self,
        field: &str,
        node: FhirNode<'a>,
        depth: usize,
    ) -> Option<FhirNode<'a>> {
        if depth > MAX_REFERENCE_DEPTH {
            return None;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = node;
        loop {
            if let FhirNode::Elements(elements) = current {
                return elements.get(field).map(FhirNode::Element);
            }
            if let Some(elements) = current.elements() {
                if field == "elements" {
                    return Some(FhirNode::Elements(elements));
                }
                if let Some(element) = elements.get(field) {
                    return Some(FhirNode::Element(element));
                }
            }
            if let Some(id) = current.schema_id() {
                if !visited.insert(id) {
                    return None;
                }
            }

            current = if let Some(path) = current.element_reference() {
                self.resolve_path_at(path, depth + 1)?
            } else if let Some(base) = current.base() {
                FhirNode::Schema(self.get(base)?)
            } else if let Some(type_name) = current.type_name() {
                FhirNode::Schema(self.get(type_name)?)
            } else {
                return None;
            };
        }
    }
}

fn push_elements<'a>(out: &mut Vec<(&'a str, &'a FhirElement)>, elements: Option<&'a FhirElements>) {
    if let Some(elements) = elements {
        out.extend(elements.iter().map(|(name, element)| (name.as_str(), element)));
    }
}
