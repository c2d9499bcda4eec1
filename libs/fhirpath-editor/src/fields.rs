//! Schema-backed field typing
//!
//! Maps FHIR schema elements to editor types. Nested structures become lazy
//! `FhirSchemaRef` paths that are only resolved when a field is accessed on
//! them, so recursive structures never expand eagerly.

use ferrum_schema::{FhirElement, SchemaRegistry};
use indexmap::IndexMap;

use crate::types::{FhirPrimitive, Type};

const SYSTEM_TYPE_PREFIX: &str = "http://hl7.org/fhirpath/System.";

/// Every field accessible on `ty`, in lookup order. Own elements shadow
/// inherited ones with the same name.
pub fn fields(schema: &SchemaRegistry, ty: &Type) -> IndexMap<String, Type> {
    let Some(resolved) = resolve_receiver(schema, ty) else {
        return IndexMap::new();
    };
    resolved
        .elements
        .iter()
        .map(|(name, element)| {
            (
                name.to_string(),
                field_schema_to_type(name, element, &resolved.elements, &resolved.prefix, resolved.single),
            )
        })
        .collect()
}

/// Type of a single field on `ty`, if it exists.
pub fn field_type(schema: &SchemaRegistry, ty: &Type, name: &str) -> Option<Type> {
    let resolved = resolve_receiver(schema, ty)?;
    let element = resolved.elements.get(name)?;
    Some(field_schema_to_type(
        name,
        element,
        &resolved.elements,
        &resolved.prefix,
        resolved.single,
    ))
}

struct Receiver<'a> {
    elements: IndexMap<&'a str, &'a FhirElement>,
    prefix: Vec<String>,
    single: bool,
}

fn resolve_receiver<'a>(schema: &'a SchemaRegistry, ty: &Type) -> Option<Receiver<'a>> {
    let single = ty.is_single();
    let mut target = ty.element_type();
    if let Type::TypeOf(inner) = target {
        target = inner.element_type();
    }

    let prefix = match target {
        Type::Quantity => vec!["Quantity".to_string()],
        Type::FhirSchemaRef(path) => path.clone(),
        Type::Primitive(primitive) => vec![primitive.code().to_string()],
        _ => return None,
    };
    let node = schema.resolve_path(&prefix)?;

    let mut elements = IndexMap::new();
    for (name, element) in schema.resolve_elements(node) {
        elements.entry(name).or_insert(element);
    }
    Some(Receiver {
        elements,
        prefix,
        single,
    })
}

/// Type of element `name`. `siblings` supplies the alternatives of a choice
/// element; scalar elements stay `Single` when the receiver was `Single`.
pub fn field_schema_to_type(
    name: &str,
    element: &FhirElement,
    siblings: &IndexMap<&str, &FhirElement>,
    prefix: &[String],
    single: bool,
) -> Type {
    let ty = match &element.choices {
        Some(choices) => Type::Choice(
            choices
                .iter()
                .filter_map(|choice| {
                    siblings
                        .get(choice.as_str())
                        .map(|alternative| element_type(choice, alternative, prefix))
                })
                .collect(),
        ),
        None => element_type(name, element, prefix),
    };

    if single && element.is_scalar() {
        Type::single(ty)
    } else {
        ty
    }
}

fn element_type(name: &str, element: &FhirElement, prefix: &[String]) -> Type {
    if let Some(type_name) = element.type_name.as_deref() {
        if let Some(primitive) = FhirPrimitive::from_code(type_name) {
            return Type::Primitive(primitive);
        }
        if let Some(system) = type_name.strip_prefix(SYSTEM_TYPE_PREFIX) {
            if let Some(ty) = system_type(system) {
                return ty;
            }
        }
        if !element.has_nested_shape() {
            return Type::schema_ref([type_name]);
        }
    }

    let mut path = prefix.to_vec();
    path.push(name.to_string());
    Type::FhirSchemaRef(path)
}

fn system_type(name: &str) -> Option<Type> {
    Some(match name {
        "String" => Type::String,
        "Boolean" => Type::Boolean,
        "Integer" => Type::Integer,
        "Decimal" => Type::Decimal,
        "Date" => Type::Date,
        "DateTime" => Type::DateTime,
        "Time" => Type::Time,
        "Quantity" => Type::Quantity,
        _ => return None,
    })
}
