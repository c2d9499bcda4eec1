//! Operator registry and overload resolution
//!
//! Operators resolve against a flat overload list scanned in declaration
//! order; the first overload whose left and right patterns both match (with
//! consistent generic bindings) decides the result type.
//!
//! Symbol lookup and precedence use compile-time perfect hash maps (phf).

use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::types::{promote, Bindings, Type, TypeRegistry};

/// Binary operators of the token editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorName {
    #[serde(rename = "&")]
    Concat,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "mod")]
    Mod,
    #[serde(rename = "div")]
    Div,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = "~")]
    Equivalent,
    #[serde(rename = "!~")]
    NotEquivalent,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
    #[serde(rename = "xor")]
    Xor,
    #[serde(rename = "implies")]
    Implies,
    #[serde(rename = "|")]
    Union,
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "as")]
    As,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    pub priority: u8,
    pub associativity: Associativity,
}

/// UI grouping of operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorGroup {
    Math,
    Comparison,
    Logical,
    Collection,
    Type,
}

static OPERATORS_BY_SYMBOL: phf::Map<&'static str, OperatorName> = phf_map! {
    "&" => OperatorName::Concat,
    "+" => OperatorName::Plus,
    "-" => OperatorName::Minus,
    "*" => OperatorName::Multiply,
    "/" => OperatorName::Divide,
    "mod" => OperatorName::Mod,
    "div" => OperatorName::Div,
    "=" => OperatorName::Equals,
    "!=" => OperatorName::NotEquals,
    "~" => OperatorName::Equivalent,
    "!~" => OperatorName::NotEquivalent,
    "<" => OperatorName::Less,
    "<=" => OperatorName::LessOrEqual,
    ">" => OperatorName::Greater,
    ">=" => OperatorName::GreaterOrEqual,
    "in" => OperatorName::In,
    "contains" => OperatorName::Contains,
    "and" => OperatorName::And,
    "or" => OperatorName::Or,
    "xor" => OperatorName::Xor,
    "implies" => OperatorName::Implies,
    "|" => OperatorName::Union,
    "is" => OperatorName::Is,
    "as" => OperatorName::As,
};

const fn left(priority: u8) -> Precedence {
    Precedence {
        priority,
        associativity: Associativity::Left,
    }
}

/// Operator precedence, shared by the tree builder and the suggestion scanner.
static PRECEDENCE: phf::Map<&'static str, Precedence> = phf_map! {
    "*" => left(10),
    "/" => left(10),
    "div" => left(10),
    "mod" => left(10),
    "+" => left(9),
    "-" => left(9),
    "&" => left(9),
    "is" => left(8),
    "as" => left(8),
    "|" => left(7),
    ">" => left(6),
    "<" => left(6),
    ">=" => left(6),
    "<=" => left(6),
    "=" => left(5),
    "!=" => left(5),
    "~" => left(5),
    "!~" => left(5),
    "in" => left(4),
    "contains" => left(4),
    "and" => left(3),
    "xor" => left(2),
    "or" => left(2),
    "implies" => Precedence { priority: 1, associativity: Associativity::Right },
};

impl OperatorName {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        OPERATORS_BY_SYMBOL.get(symbol).copied()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OperatorName::Concat => "&",
            OperatorName::Plus => "+",
            OperatorName::Minus => "-",
            OperatorName::Multiply => "*",
            OperatorName::Divide => "/",
            OperatorName::Mod => "mod",
            OperatorName::Div => "div",
            OperatorName::Equals => "=",
            OperatorName::NotEquals => "!=",
            OperatorName::Equivalent => "~",
            OperatorName::NotEquivalent => "!~",
            OperatorName::Less => "<",
            OperatorName::LessOrEqual => "<=",
            OperatorName::Greater => ">",
            OperatorName::GreaterOrEqual => ">=",
            OperatorName::In => "in",
            OperatorName::Contains => "contains",
            OperatorName::And => "and",
            OperatorName::Or => "or",
            OperatorName::Xor => "xor",
            OperatorName::Implies => "implies",
            OperatorName::Union => "|",
            OperatorName::Is => "is",
            OperatorName::As => "as",
        }
    }

    pub fn precedence(self) -> Precedence {
        // every symbol is in the map
        PRECEDENCE.get(self.symbol()).copied().unwrap_or(left(0))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            OperatorName::Concat => "Concatenate",
            OperatorName::Plus => "Plus",
            OperatorName::Minus => "Minus",
            OperatorName::Multiply => "Multiply",
            OperatorName::Divide => "Divide",
            OperatorName::Mod => "Modulo",
            OperatorName::Div => "Integer divide",
            OperatorName::Equals => "Equals",
            OperatorName::NotEquals => "Not equals",
            OperatorName::Equivalent => "Equivalent",
            OperatorName::NotEquivalent => "Not equivalent",
            OperatorName::Less => "Less than",
            OperatorName::LessOrEqual => "Less than or equal to",
            OperatorName::Greater => "Greater than",
            OperatorName::GreaterOrEqual => "Greater than or equal to",
            OperatorName::In => "In",
            OperatorName::Contains => "Contains",
            OperatorName::And => "And",
            OperatorName::Or => "Or",
            OperatorName::Xor => "Xor",
            OperatorName::Implies => "Implies",
            OperatorName::Union => "Union",
            OperatorName::Is => "Is type",
            OperatorName::As => "As type",
        }
    }

    pub fn group(self) -> OperatorGroup {
        match self {
            OperatorName::Plus
            | OperatorName::Minus
            | OperatorName::Multiply
            | OperatorName::Divide
            | OperatorName::Mod
            | OperatorName::Div => OperatorGroup::Math,
            OperatorName::Equals
            | OperatorName::NotEquals
            | OperatorName::Equivalent
            | OperatorName::NotEquivalent
            | OperatorName::Less
            | OperatorName::LessOrEqual
            | OperatorName::Greater
            | OperatorName::GreaterOrEqual => OperatorGroup::Comparison,
            OperatorName::And | OperatorName::Or | OperatorName::Xor | OperatorName::Implies => {
                OperatorGroup::Logical
            }
            OperatorName::In | OperatorName::Contains | OperatorName::Concat | OperatorName::Union => {
                OperatorGroup::Collection
            }
            OperatorName::Is | OperatorName::As => OperatorGroup::Type,
        }
    }
}

impl std::fmt::Display for OperatorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How an overload computes its result type.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorReturn {
    Fixed(Type),
    /// `Single(result)` when both operands are `Single`, else `result`
    PreserveSingle(Type),
    /// `|`: the common type of `A` and `B`
    Union,
    /// `as`: the type named by `X`
    TypeArgument,
}

impl OperatorReturn {
    fn apply(&self, types: &TypeRegistry, left: &Type, right: &Type, bindings: &Bindings) -> Type {
        match self {
            OperatorReturn::Fixed(ty) => ty.clone(),
            OperatorReturn::PreserveSingle(ty) => {
                if left.is_single() && right.is_single() {
                    Type::single(ty.clone())
                } else {
                    ty.clone()
                }
            }
            OperatorReturn::Union => match (bindings.get('A'), bindings.get('B')) {
                (Some(a), Some(b)) => {
                    if types.types_equal(a, b) {
                        a.clone()
                    } else if let Some(promoted) = promote(a, b) {
                        promoted
                    } else {
                        types.normalize_choice(vec![a.clone(), b.clone()])
                    }
                }
                _ => Type::invalid("Union operands are unbound"),
            },
            OperatorReturn::TypeArgument => match bindings.get('X') {
                Some(x) => types.normalize_choice(vec![x.clone()]),
                None => Type::invalid("Type argument is unbound"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorOverload {
    pub name: OperatorName,
    pub left: Type,
    pub right: Type,
    pub returns: OperatorReturn,
}

/// Every operator overload, in resolution order.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    overloads: Vec<OperatorOverload>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            overloads: Vec::new(),
        };
        registry.init_overloads();
        registry
    }

    fn add(&mut self, name: OperatorName, left: Type, right: Type, returns: OperatorReturn) {
        self.overloads.push(OperatorOverload {
            name,
            left,
            right,
            returns,
        });
    }

    fn arithmetic(&mut self, name: OperatorName, left: Type, right: Type, result: Type) {
        self.add(name, left, right, OperatorReturn::PreserveSingle(result));
    }

    fn init_overloads(&mut self) {
        use OperatorName::*;
        use Type::{Boolean, Date, DateTime, Decimal, Integer, Quantity, String, Time};

        self.arithmetic(Concat, String, String, String);

        for name in [Plus, Minus] {
            self.arithmetic(name, Integer, Integer, Integer);
            self.arithmetic(name, Integer, Decimal, Decimal);
            self.arithmetic(name, Integer, Quantity, Quantity);
            self.arithmetic(name, Decimal, Integer, Decimal);
            self.arithmetic(name, Decimal, Decimal, Decimal);
            self.arithmetic(name, Decimal, Quantity, Quantity);
            self.arithmetic(name, Quantity, Integer, Quantity);
            self.arithmetic(name, Quantity, Decimal, Quantity);
            self.arithmetic(name, Quantity, Quantity, Quantity);
            if name == Plus {
                self.arithmetic(name, String, String, String);
            }
            self.arithmetic(name, Date, Quantity, Date);
            self.arithmetic(name, DateTime, Quantity, DateTime);
            self.arithmetic(name, Time, Quantity, Time);
        }

        self.arithmetic(Multiply, Integer, Integer, Integer);
        self.arithmetic(Multiply, Integer, Decimal, Decimal);
        self.arithmetic(Multiply, Integer, Quantity, Quantity);
        self.arithmetic(Multiply, Decimal, Integer, Decimal);
        self.arithmetic(Multiply, Decimal, Decimal, Decimal);
        self.arithmetic(Multiply, Decimal, Quantity, Quantity);
        self.arithmetic(Multiply, Quantity, Integer, Quantity);
        self.arithmetic(Multiply, Quantity, Decimal, Quantity);

        self.arithmetic(Divide, Integer, Integer, Decimal);
        self.arithmetic(Divide, Integer, Decimal, Decimal);
        self.arithmetic(Divide, Integer, Quantity, Decimal);
        self.arithmetic(Divide, Decimal, Integer, Decimal);
        self.arithmetic(Divide, Decimal, Decimal, Decimal);
        self.arithmetic(Divide, Decimal, Quantity, Decimal);
        self.arithmetic(Divide, Quantity, Integer, Quantity);
        self.arithmetic(Divide, Quantity, Decimal, Quantity);
        self.arithmetic(Divide, Quantity, Quantity, Decimal);

        self.arithmetic(Mod, Integer, Integer, Integer);
        self.arithmetic(Mod, Integer, Decimal, Decimal);
        self.arithmetic(Mod, Decimal, Integer, Decimal);
        self.arithmetic(Mod, Decimal, Decimal, Decimal);

        self.arithmetic(Div, Integer, Integer, Integer);
        self.arithmetic(Div, Integer, Decimal, Integer);
        self.arithmetic(Div, Decimal, Integer, Integer);
        self.arithmetic(Div, Decimal, Decimal, Integer);

        for name in [
            Equals,
            NotEquals,
            Equivalent,
            NotEquivalent,
            Less,
            LessOrEqual,
            Greater,
            GreaterOrEqual,
        ] {
            self.add(
                name,
                Type::Generic('T'),
                Type::Generic('T'),
                OperatorReturn::PreserveSingle(Boolean),
            );
        }

        self.add(
            In,
            Type::single(Type::Generic('T')),
            Type::Generic('T'),
            OperatorReturn::Fixed(Type::single(Boolean)),
        );
        self.add(
            Contains,
            Type::Generic('T'),
            Type::single(Type::Generic('T')),
            OperatorReturn::Fixed(Type::single(Boolean)),
        );

        for name in [And, Or, Xor, Implies] {
            self.arithmetic(name, Boolean, Boolean, Boolean);
        }

        self.add(Union, Type::Generic('A'), Type::Generic('B'), OperatorReturn::Union);

        self.add(
            Is,
            Type::Generic('T'),
            Type::type_of(Type::Generic('X')),
            OperatorReturn::Fixed(Boolean),
        );
        self.add(
            As,
            Type::Generic('T'),
            Type::type_of(Type::Generic('X')),
            OperatorReturn::TypeArgument,
        );
    }

    pub fn overloads(&self) -> &[OperatorOverload] {
        &self.overloads
    }

    /// Distinct operator names, in table order.
    pub fn names(&self) -> Vec<OperatorName> {
        let mut names: Vec<OperatorName> = Vec::new();
        for overload in &self.overloads {
            if !names.contains(&overload.name) {
                names.push(overload.name);
            }
        }
        names
    }

    fn match_overload(
        &self,
        types: &TypeRegistry,
        overload: &OperatorOverload,
        left: &Type,
        right: &Type,
    ) -> Option<Bindings> {
        let left_bindings =
            types.match_type_pattern(&overload.left, operand(&overload.left, left), &Bindings::new())?;
        let right_bindings =
            types.match_type_pattern(&overload.right, operand(&overload.right, right), &Bindings::new())?;
        types.merge_bindings(&left_bindings, &right_bindings)
    }

    /// Result type of `left <name> right`.
    ///
    /// An `Invalid` operand is returned unchanged.
    pub fn resolve(&self, types: &TypeRegistry, name: OperatorName, left: &Type, right: &Type) -> Type {
        if let Some(invalid) = left.first_invalid().or_else(|| right.first_invalid()) {
            return invalid.clone();
        }
        self.overloads
            .iter()
            .filter(|overload| overload.name == name)
            .find_map(|overload| {
                self.match_overload(types, overload, left, right)
                    .map(|bindings| overload.returns.apply(types, left, right, &bindings))
            })
            .unwrap_or_else(|| {
                Type::invalid(format!("No matching overload for operator \"{}\"", name))
            })
    }

    /// Overloads whose left pattern accepts `left`.
    pub fn suggest_operators_for_left_type<'a>(
        &'a self,
        types: &'a TypeRegistry,
        left: &'a Type,
    ) -> impl Iterator<Item = &'a OperatorOverload> + 'a {
        self.overloads.iter().filter(move |overload| {
            types
                .match_type_pattern(&overload.left, operand(&overload.left, left), &Bindings::new())
                .is_some()
        })
    }

    /// Union of the right-hand patterns of `name` that accept `left`, with the
    /// left operand's bindings substituted in.
    pub fn suggest_right_types_for_operator(
        &self,
        types: &TypeRegistry,
        name: OperatorName,
        left: &Type,
    ) -> Type {
        let candidates = self
            .overloads
            .iter()
            .filter(|overload| overload.name == name)
            .filter_map(|overload| {
                types
                    .match_type_pattern(&overload.left, operand(&overload.left, left), &Bindings::new())
                    .map(|bindings| overload.right.substitute(&bindings))
            })
            .collect();
        types.normalize_choice(candidates)
    }
}

/// Operands bind generics by element type unless the pattern itself
/// requires `Single`, so `T = T` holds between a collection and a singleton.
fn operand<'a>(pattern: &Type, actual: &'a Type) -> &'a Type {
    if pattern.is_single() {
        actual
    } else {
        actual.element_type()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FhirPrimitive;

    fn resolve(name: OperatorName, left: Type, right: Type) -> Type {
        OperatorRegistry::new().resolve(&TypeRegistry::new(), name, &left, &right)
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(resolve(OperatorName::Plus, Type::Integer, Type::Decimal), Type::Decimal);
        assert_eq!(resolve(OperatorName::Plus, Type::Quantity, Type::Quantity), Type::Quantity);
        assert_eq!(resolve(OperatorName::Divide, Type::Quantity, Type::Quantity), Type::Decimal);
        assert_eq!(resolve(OperatorName::Divide, Type::Integer, Type::Integer), Type::Decimal);
        assert_eq!(resolve(OperatorName::Div, Type::Decimal, Type::Decimal), Type::Integer);
        assert!(resolve(OperatorName::Plus, Type::String, Type::Integer).is_invalid());
        assert!(resolve(OperatorName::Minus, Type::String, Type::String).is_invalid());
    }

    #[test]
    fn test_single_operands_keep_cardinality() {
        assert_eq!(
            resolve(
                OperatorName::Plus,
                Type::single(Type::Integer),
                Type::single(Type::Decimal)
            ),
            Type::single(Type::Decimal)
        );
        assert_eq!(
            resolve(OperatorName::Plus, Type::single(Type::Integer), Type::Integer),
            Type::Integer
        );
    }

    #[test]
    fn test_no_overload_message() {
        assert_eq!(
            resolve(OperatorName::Multiply, Type::Quantity, Type::Quantity),
            Type::invalid("No matching overload for operator \"*\"")
        );
    }

    #[test]
    fn test_invalid_operand_passes_through() {
        assert_eq!(
            resolve(OperatorName::Plus, Type::invalid("x"), Type::Integer),
            Type::invalid("x")
        );
        assert_eq!(
            resolve(OperatorName::And, Type::Boolean, Type::single(Type::invalid("y"))),
            Type::invalid("y")
        );
    }

    #[test]
    fn test_equality_uses_generic_consistency() {
        let code = Type::Primitive(FhirPrimitive::Code);
        assert_eq!(resolve(OperatorName::Equals, code, Type::String), Type::Boolean);
        assert!(resolve(OperatorName::Equals, Type::Integer, Type::String).is_invalid());
        assert_eq!(
            resolve(
                OperatorName::Equals,
                Type::Primitive(FhirPrimitive::String),
                Type::single(Type::String)
            ),
            Type::Boolean
        );
        assert_eq!(
            resolve(
                OperatorName::Less,
                Type::single(Type::Date),
                Type::single(Type::Date)
            ),
            Type::single(Type::Boolean)
        );
    }

    #[test]
    fn test_membership() {
        let list = Type::String;
        let item = Type::single(Type::String);
        assert_eq!(
            resolve(OperatorName::In, item.clone(), list.clone()),
            Type::single(Type::Boolean)
        );
        assert_eq!(
            resolve(OperatorName::Contains, list.clone(), item),
            Type::single(Type::Boolean)
        );
        assert!(resolve(OperatorName::In, list, Type::String).is_invalid());
    }

    #[test]
    fn test_union_and_type_operators() {
        assert_eq!(resolve(OperatorName::Union, Type::Integer, Type::Integer), Type::Integer);
        assert_eq!(resolve(OperatorName::Union, Type::Integer, Type::Decimal), Type::Decimal);
        assert_eq!(
            resolve(OperatorName::Union, Type::String, Type::Boolean),
            Type::Choice(vec![Type::String, Type::Boolean])
        );
        assert_eq!(
            resolve(
                OperatorName::As,
                Type::schema_ref(["Resource"]),
                Type::type_of(Type::schema_ref(["Patient"]))
            ),
            Type::schema_ref(["Patient"])
        );
        assert_eq!(
            resolve(OperatorName::Is, Type::Integer, Type::type_of(Type::String)),
            Type::Boolean
        );
        assert!(resolve(OperatorName::Is, Type::Integer, Type::String).is_invalid());
    }

    #[test]
    fn test_suggestions() {
        let types = TypeRegistry::new();
        let operators = OperatorRegistry::new();

        let names: Vec<_> = operators
            .suggest_operators_for_left_type(&types, &Type::String)
            .map(|o| o.name)
            .collect();
        assert!(names.contains(&OperatorName::Concat));
        assert!(names.contains(&OperatorName::Equals));
        assert!(!names.contains(&OperatorName::Multiply));

        assert_eq!(
            operators.suggest_right_types_for_operator(&types, OperatorName::Multiply, &Type::Integer),
            Type::Choice(vec![Type::Integer, Type::Decimal, Type::Quantity])
        );
        assert_eq!(
            operators.suggest_right_types_for_operator(&types, OperatorName::Equals, &Type::Date),
            Type::Date
        );
    }

    #[test]
    fn test_precedence_table() {
        assert_eq!(OperatorName::Multiply.precedence().priority, 10);
        assert_eq!(OperatorName::Implies.precedence().associativity, Associativity::Right);
        assert_eq!(OperatorName::from_symbol("div"), Some(OperatorName::Div));
        assert_eq!(OperatorName::from_symbol("**"), None);
        let names = OperatorRegistry::new().names();
        assert_eq!(names.len(), 24);
        assert_eq!(names[0], OperatorName::Concat);
        for name in names {
            assert_eq!(OperatorName::from_symbol(name.symbol()), Some(name));
        }
    }

    #[test]
    fn test_operator_groups() {
        assert_eq!(OperatorName::Div.group(), OperatorGroup::Math);
        assert_eq!(OperatorName::Concat.group(), OperatorGroup::Collection);
        assert_eq!(OperatorName::Union.group(), OperatorGroup::Collection);
        assert_eq!(OperatorName::NotEquivalent.group(), OperatorGroup::Comparison);
        assert_eq!(OperatorName::As.group(), OperatorGroup::Type);
    }
}
