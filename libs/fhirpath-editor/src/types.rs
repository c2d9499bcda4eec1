//! Type lattice for the token editor
//!
//! Every expression prefix is assigned a [`Type`]. Besides the FHIRPath
//! literal types the lattice carries:
//! - `Single`: cardinality-one wrapper (`first()`, indexing, scalar fields)
//! - `Choice`: union of alternatives (polymorphic elements, `iif`, `|`)
//! - `Generic`: pattern variable, only inside registry signatures
//! - `Lambda`: the type of an argument evaluated per input element
//! - `TypeOf`: a type used as a value (`is`, `as`, `ofType`)
//! - `FhirSchemaRef`: lazy reference into the FHIR schema
//! - `Primitive`: FHIR primitive wrappers, subtypes of the literal types
//!
//! `Invalid` is absorbing: constructors return the first `Invalid` they touch.
//!
//! Subtyping and pattern unification live on [`TypeRegistry`], which holds the
//! extension table.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// FHIR primitive datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FhirPrimitive {
    Code,
    String,
    Uri,
    Url,
    Canonical,
    Oid,
    Id,
    Uuid,
    Markdown,
    Xhtml,
    Base64Binary,
    Boolean,
    Integer,
    PositiveInt,
    UnsignedInt,
    Decimal,
    Date,
    DateTime,
    Instant,
    Time,
}

impl FhirPrimitive {
    pub const ALL: [FhirPrimitive; 20] = [
        FhirPrimitive::Code,
        FhirPrimitive::String,
        FhirPrimitive::Uri,
        FhirPrimitive::Url,
        FhirPrimitive::Canonical,
        FhirPrimitive::Oid,
        FhirPrimitive::Id,
        FhirPrimitive::Uuid,
        FhirPrimitive::Markdown,
        FhirPrimitive::Xhtml,
        FhirPrimitive::Base64Binary,
        FhirPrimitive::Boolean,
        FhirPrimitive::Integer,
        FhirPrimitive::PositiveInt,
        FhirPrimitive::UnsignedInt,
        FhirPrimitive::Decimal,
        FhirPrimitive::Date,
        FhirPrimitive::DateTime,
        FhirPrimitive::Instant,
        FhirPrimitive::Time,
    ];

    /// The FHIR type code (`dateTime`, `positiveInt`, ...).
    pub fn code(self) -> &'static str {
        match self {
            FhirPrimitive::Code => "code",
            FhirPrimitive::String => "string",
            FhirPrimitive::Uri => "uri",
            FhirPrimitive::Url => "url",
            FhirPrimitive::Canonical => "canonical",
            FhirPrimitive::Oid => "oid",
            FhirPrimitive::Id => "id",
            FhirPrimitive::Uuid => "uuid",
            FhirPrimitive::Markdown => "markdown",
            FhirPrimitive::Xhtml => "xhtml",
            FhirPrimitive::Base64Binary => "base64Binary",
            FhirPrimitive::Boolean => "boolean",
            FhirPrimitive::Integer => "integer",
            FhirPrimitive::PositiveInt => "positiveInt",
            FhirPrimitive::UnsignedInt => "unsignedInt",
            FhirPrimitive::Decimal => "decimal",
            FhirPrimitive::Date => "date",
            FhirPrimitive::DateTime => "dateTime",
            FhirPrimitive::Instant => "instant",
            FhirPrimitive::Time => "time",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            // some schema exports spell these out
            "positiveInteger" => Some(FhirPrimitive::PositiveInt),
            "unsignedInteger" => Some(FhirPrimitive::UnsignedInt),
            _ => Self::ALL.into_iter().find(|p| p.code() == code),
        }
    }

    /// The literal type this primitive extends.
    pub fn supertype(self) -> Type {
        match self {
            FhirPrimitive::Code
            | FhirPrimitive::String
            | FhirPrimitive::Uri
            | FhirPrimitive::Url
            | FhirPrimitive::Canonical
            | FhirPrimitive::Oid
            | FhirPrimitive::Id
            | FhirPrimitive::Uuid
            | FhirPrimitive::Markdown
            | FhirPrimitive::Xhtml
            | FhirPrimitive::Base64Binary => Type::String,
            FhirPrimitive::Boolean => Type::Boolean,
            FhirPrimitive::Integer | FhirPrimitive::PositiveInt | FhirPrimitive::UnsignedInt => {
                Type::Integer
            }
            FhirPrimitive::Decimal => Type::Decimal,
            FhirPrimitive::Date => Type::Date,
            FhirPrimitive::DateTime | FhirPrimitive::Instant => Type::DateTime,
            FhirPrimitive::Time => Type::Time,
        }
    }
}

/// A static type in the editor's lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "of")]
pub enum Type {
    Integer,
    Decimal,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Quantity,
    Null,
    Invalid(String),
    Single(Box<Type>),
    Choice(Vec<Type>),
    Generic(char),
    Lambda {
        return_type: Box<Type>,
        context_type: Box<Type>,
    },
    TypeOf(Box<Type>),
    FhirSchemaRef(Vec<String>),
    Primitive(FhirPrimitive),
}

/// Top-level constructor of a [`Type`], used for subtype lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Decimal,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Quantity,
    Null,
    Invalid,
    Single,
    Choice,
    Generic,
    Lambda,
    TypeOf,
    FhirSchemaRef,
    Primitive(FhirPrimitive),
}

impl Type {
    pub fn invalid(message: impl Into<String>) -> Type {
        Type::Invalid(message.into())
    }

    /// Cardinality-one wrapper. Never nests and never wraps `Invalid`.
    pub fn single(inner: Type) -> Type {
        match inner {
            Type::Single(_) | Type::Invalid(_) => inner,
            other => Type::Single(Box::new(other)),
        }
    }

    pub fn choice(options: Vec<Type>) -> Type {
        if let Some(invalid) = options.iter().find_map(Type::first_invalid) {
            return invalid.clone();
        }
        Type::Choice(options)
    }

    pub fn lambda(return_type: Type, context_type: Type) -> Type {
        if let Some(invalid) = return_type
            .first_invalid()
            .or_else(|| context_type.first_invalid())
        {
            return invalid.clone();
        }
        Type::Lambda {
            return_type: Box::new(return_type),
            context_type: Box::new(context_type),
        }
    }

    pub fn type_of(inner: Type) -> Type {
        match inner {
            Type::Invalid(_) => inner,
            other => Type::TypeOf(Box::new(other)),
        }
    }

    pub fn schema_ref<I, S>(path: I) -> Type
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Type::FhirSchemaRef(path.into_iter().map(Into::into).collect())
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Type::Integer => TypeTag::Integer,
            Type::Decimal => TypeTag::Decimal,
            Type::String => TypeTag::String,
            Type::Boolean => TypeTag::Boolean,
            Type::Date => TypeTag::Date,
            Type::DateTime => TypeTag::DateTime,
            Type::Time => TypeTag::Time,
            Type::Quantity => TypeTag::Quantity,
            Type::Null => TypeTag::Null,
            Type::Invalid(_) => TypeTag::Invalid,
            Type::Single(_) => TypeTag::Single,
            Type::Choice(_) => TypeTag::Choice,
            Type::Generic(_) => TypeTag::Generic,
            Type::Lambda { .. } => TypeTag::Lambda,
            Type::TypeOf(_) => TypeTag::TypeOf,
            Type::FhirSchemaRef(_) => TypeTag::FhirSchemaRef,
            Type::Primitive(primitive) => TypeTag::Primitive(*primitive),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid(_))
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Type::Single(_))
    }

    /// The first `Invalid` reachable from this type, depth first.
    pub fn first_invalid(&self) -> Option<&Type> {
        match self {
            Type::Invalid(_) => Some(self),
            Type::Single(inner) | Type::TypeOf(inner) => inner.first_invalid(),
            Type::Choice(options) => options.iter().find_map(Type::first_invalid),
            Type::Lambda {
                return_type,
                context_type,
            } => return_type
                .first_invalid()
                .or_else(|| context_type.first_invalid()),
            _ => None,
        }
    }

    /// Drop one level of `Single`.
    pub fn unwrap_single(self) -> Type {
        match self {
            Type::Single(inner) => *inner,
            other => other,
        }
    }

    /// The element type, looking through `Single`.
    pub fn element_type(&self) -> &Type {
        match self {
            Type::Single(inner) => inner,
            other => other,
        }
    }

    /// Replace bound generic letters. Unbound letters are kept.
    pub fn substitute(&self, bindings: &Bindings) -> Type {
        match self {
            Type::Generic(letter) => bindings.get(*letter).cloned().unwrap_or_else(|| self.clone()),
            Type::Single(inner) => Type::single(inner.substitute(bindings)),
            Type::Choice(options) => {
                Type::choice(options.iter().map(|o| o.substitute(bindings)).collect())
            }
            Type::Lambda {
                return_type,
                context_type,
            } => Type::lambda(
                return_type.substitute(bindings),
                context_type.substitute(bindings),
            ),
            Type::TypeOf(inner) => Type::type_of(inner.substitute(bindings)),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => f.write_str("Integer"),
            Type::Decimal => f.write_str("Decimal"),
            Type::String => f.write_str("String"),
            Type::Boolean => f.write_str("Boolean"),
            Type::Date => f.write_str("Date"),
            Type::DateTime => f.write_str("DateTime"),
            Type::Time => f.write_str("Time"),
            Type::Quantity => f.write_str("Quantity"),
            Type::Null => f.write_str("Null"),
            Type::Invalid(message) => write!(f, "Invalid ({})", message),
            Type::Single(inner) => write!(f, "Single<{}>", inner),
            Type::Choice(options) => {
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}", option)?;
                }
                Ok(())
            }
            Type::Generic(letter) => write!(f, "{}", letter),
            Type::Lambda {
                return_type,
                context_type,
            } => write!(f, "Lambda<{} => {}>", context_type, return_type),
            Type::TypeOf(inner) => write!(f, "Type<{}>", inner),
            Type::FhirSchemaRef(path) => {
                let mut segments = path.iter();
                if let Some(root) = segments.next() {
                    f.write_str(root)?;
                }
                for segment in segments {
                    write!(f, "[\"{}\"]", segment)?;
                }
                Ok(())
            }
            Type::Primitive(primitive) => write!(f, "Primitive<{}>", primitive.code()),
        }
    }
}

/// Generic letter assignments collected while matching a signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(SmallVec<[(char, Type); 4]>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, letter: char) -> Option<&Type> {
        self.0.iter().find(|(l, _)| *l == letter).map(|(_, t)| t)
    }

    pub fn insert(&mut self, letter: char, ty: Type) {
        match self.0.iter_mut().find(|(l, _)| *l == letter) {
            Some(slot) => slot.1 = ty,
            None => self.0.push((letter, ty)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &Type)> {
        self.0.iter().map(|(l, t)| (*l, t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Numeric promotion used by arithmetic and union.
pub fn promote(a: &Type, b: &Type) -> Option<Type> {
    match (a.tag(), b.tag()) {
        (x, y) if x == y => Some(a.clone()),
        (TypeTag::Integer, TypeTag::Decimal) | (TypeTag::Decimal, TypeTag::Integer) => {
            Some(Type::Decimal)
        }
        (TypeTag::Integer | TypeTag::Decimal, TypeTag::Quantity)
        | (TypeTag::Quantity, TypeTag::Integer | TypeTag::Decimal) => Some(Type::Quantity),
        _ => None,
    }
}

/// Subtype table plus the unification rules that consult it.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    supertypes: HashMap<TypeTag, Vec<TypeTag>>,
}

impl TypeRegistry {
    /// Registry with the FHIR primitive hierarchy installed.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.init_primitive_hierarchy();
        registry
    }

    /// Registry with no subtype edges at all.
    pub fn empty() -> Self {
        Self {
            supertypes: HashMap::new(),
        }
    }

    fn init_primitive_hierarchy(&mut self) {
        for primitive in FhirPrimitive::ALL {
            self.extend_type(TypeTag::Primitive(primitive), &[primitive.supertype().tag()]);
        }
    }

    /// Declare `sub` a subtype of each of `supers`.
    pub fn extend_type(&mut self, sub: TypeTag, supers: &[TypeTag]) {
        let entry = self.supertypes.entry(sub).or_default();
        for tag in supers {
            if !entry.contains(tag) {
                entry.push(*tag);
            }
        }
    }

    /// Same tag, or `expected` reachable from `actual` through the extension
    /// table.
    pub fn is_subtype_of(&self, actual: &Type, expected: &Type) -> bool {
        self.is_subtag_of(actual.tag(), expected.tag())
    }

    fn is_subtag_of(&self, actual: TypeTag, expected: TypeTag) -> bool {
        if actual == expected {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([actual]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.supertypes.get(&current).into_iter().flatten() {
                if *parent == expected {
                    return true;
                }
                queue.push_back(*parent);
            }
        }
        false
    }

    /// Structural equality used for generic consistency.
    ///
    /// A `Generic` on either side matches anything, a `Choice` matches when
    /// any option does, and subtype-related tags compare equal.
    pub fn types_equal(&self, a: &Type, b: &Type) -> bool {
        if matches!(a, Type::Generic(_)) || matches!(b, Type::Generic(_)) {
            return true;
        }
        if let Type::Choice(options) = a {
            return options.iter().any(|option| self.types_equal(option, b));
        }
        if let Type::Choice(options) = b {
            return options.iter().any(|option| self.types_equal(a, option));
        }
        if !self.is_subtype_of(a, b) && !self.is_subtype_of(b, a) {
            return false;
        }
        match (a, b) {
            (Type::Single(x), Type::Single(y)) | (Type::TypeOf(x), Type::TypeOf(y)) => {
                self.types_equal(x, y)
            }
            (
                Type::Lambda {
                    return_type: ra,
                    context_type: ca,
                },
                Type::Lambda {
                    return_type: rb,
                    context_type: cb,
                },
            ) => self.types_equal(ra, rb) && self.types_equal(ca, cb),
            (Type::FhirSchemaRef(x), Type::FhirSchemaRef(y)) => x == y,
            (Type::Invalid(x), Type::Invalid(y)) => x == y,
            _ => true,
        }
    }

    /// Combine two binding sets; `None` if a letter is bound to unequal types.
    pub fn merge_bindings(&self, a: &Bindings, b: &Bindings) -> Option<Bindings> {
        let mut merged = a.clone();
        for (letter, ty) in b.iter() {
            match merged.get(letter) {
                Some(existing) if !self.types_equal(existing, ty) => return None,
                Some(_) => {}
                None => merged.insert(letter, ty.clone()),
            }
        }
        Some(merged)
    }

    /// Unify `pattern` against `actual`, extending `bindings`.
    pub fn match_type_pattern(
        &self,
        pattern: &Type,
        actual: &Type,
        bindings: &Bindings,
    ) -> Option<Bindings> {
        self.match_with_parent(pattern, actual, bindings, None)
    }

    fn match_with_parent(
        &self,
        pattern: &Type,
        actual: &Type,
        bindings: &Bindings,
        parent: Option<&Type>,
    ) -> Option<Bindings> {
        if let Type::Generic(letter) = pattern {
            return match bindings.get(*letter) {
                Some(bound) => {
                    let unwrapped_match = matches!(parent, Some(Type::Single(_)))
                        && matches!(bound, Type::Single(inner) if self.types_equal(inner, actual));
                    (self.types_equal(bound, actual) || unwrapped_match).then(|| bindings.clone())
                }
                None => {
                    let mut next = bindings.clone();
                    next.insert(*letter, actual.clone());
                    Some(next)
                }
            };
        }

        if let Type::Single(inner) = actual {
            if !pattern.is_single() {
                return self.match_with_parent(pattern, inner, bindings, None);
            }
        }

        if let Type::Choice(options) = pattern {
            return options
                .iter()
                .find_map(|option| self.match_with_parent(option, actual, bindings, Some(pattern)));
        }

        if !self.is_subtype_of(actual, pattern) {
            return None;
        }

        match (pattern, actual) {
            (Type::Single(p), Type::Single(a)) | (Type::TypeOf(p), Type::TypeOf(a)) => {
                self.match_nested(p, a, bindings, pattern)
            }
            (
                Type::Lambda {
                    return_type: pr,
                    context_type: pc,
                },
                Type::Lambda {
                    return_type: ar,
                    context_type: ac,
                },
            ) => {
                let bindings = self.match_nested(pr, ar, bindings, pattern)?;
                self.match_nested(pc, ac, &bindings, pattern)
            }
            (Type::FhirSchemaRef(p), Type::FhirSchemaRef(a)) => (p == a).then(|| bindings.clone()),
            (Type::Invalid(p), Type::Invalid(a)) => (p == a).then(|| bindings.clone()),
            _ => Some(bindings.clone()),
        }
    }

    fn match_nested(
        &self,
        pattern: &Type,
        actual: &Type,
        bindings: &Bindings,
        parent: &Type,
    ) -> Option<Bindings> {
        let nested = self.match_with_parent(pattern, actual, bindings, Some(parent))?;
        self.merge_bindings(bindings, &nested)
    }

    /// Flatten nested choices, drop duplicates, collapse a single option.
    pub fn normalize_choice(&self, options: Vec<Type>) -> Type {
        let mut queue: VecDeque<Type> = options.into();
        let mut flat: Vec<Type> = Vec::new();
        while let Some(option) = queue.pop_front() {
            match option {
                Type::Invalid(_) => return option,
                Type::Choice(nested) => queue.extend(nested),
                other => {
                    if !flat.iter().any(|seen| self.types_equal(seen, &other)) {
                        flat.push(other);
                    }
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Type::Choice(flat)
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
