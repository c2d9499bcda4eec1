//! Function registry for FHIRPath functions
//!
//! Each function has an input pattern, ordered argument specs and a return
//! rule. Resolution unifies the input, then each argument in order, threading
//! generic bindings through; lambda arguments are typed against the context
//! their pattern prescribes.
//!
//! Categories use a compile-time perfect hash map (phf).

use std::collections::HashMap;

use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::types::{Bindings, FhirPrimitive, Type, TypeRegistry};

/// Function groups, following the FHIRPath specification sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCategory {
    Existence,
    FilteringAndProjection,
    Subsetting,
    Combining,
    Conversion,
    StringManipulation,
    AdditionalString,
    Math,
    TreeNavigation,
    Utility,
    Aggregates,
    FhirExtensions,
    SdcExtensions,
}

impl FunctionCategory {
    pub fn label(self) -> &'static str {
        match self {
            FunctionCategory::Existence => "Existence",
            FunctionCategory::FilteringAndProjection => "Filtering and projection",
            FunctionCategory::Subsetting => "Subsetting",
            FunctionCategory::Combining => "Combining",
            FunctionCategory::Conversion => "Conversion",
            FunctionCategory::StringManipulation => "String Manipulation",
            FunctionCategory::AdditionalString => "Additional String Functions",
            FunctionCategory::Math => "Math",
            FunctionCategory::TreeNavigation => "Tree Navigation",
            FunctionCategory::Utility => "Utility Functions",
            FunctionCategory::Aggregates => "Aggregates",
            FunctionCategory::FhirExtensions => "FHIR Extensions",
            FunctionCategory::SdcExtensions => "SDC Extensions",
        }
    }
}

static FUNCTION_CATEGORIES: phf::Map<&'static str, FunctionCategory> = phf_map! {
    // 5.1
    "empty" => FunctionCategory::Existence,
    "exists" => FunctionCategory::Existence,
    "all" => FunctionCategory::Existence,
    "allTrue" => FunctionCategory::Existence,
    "anyTrue" => FunctionCategory::Existence,
    "allFalse" => FunctionCategory::Existence,
    "anyFalse" => FunctionCategory::Existence,
    "subsetOf" => FunctionCategory::Existence,
    "supersetOf" => FunctionCategory::Existence,
    "count" => FunctionCategory::Existence,
    "distinct" => FunctionCategory::Existence,
    "isDistinct" => FunctionCategory::Existence,

    // 5.2
    "where" => FunctionCategory::FilteringAndProjection,
    "select" => FunctionCategory::FilteringAndProjection,
    "repeat" => FunctionCategory::FilteringAndProjection,
    "ofType" => FunctionCategory::FilteringAndProjection,

    // 5.3
    "single" => FunctionCategory::Subsetting,
    "first" => FunctionCategory::Subsetting,
    "last" => FunctionCategory::Subsetting,
    "tail" => FunctionCategory::Subsetting,
    "skip" => FunctionCategory::Subsetting,
    "take" => FunctionCategory::Subsetting,
    "intersect" => FunctionCategory::Subsetting,
    "exclude" => FunctionCategory::Subsetting,

    // 5.4
    "union" => FunctionCategory::Combining,
    "combine" => FunctionCategory::Combining,

    // 5.5
    "iif" => FunctionCategory::Conversion,
    "toBoolean" => FunctionCategory::Conversion,
    "convertsToBoolean" => FunctionCategory::Conversion,
    "toInteger" => FunctionCategory::Conversion,
    "convertsToInteger" => FunctionCategory::Conversion,
    "toDate" => FunctionCategory::Conversion,
    "convertsToDate" => FunctionCategory::Conversion,
    "toDateTime" => FunctionCategory::Conversion,
    "convertsToDateTime" => FunctionCategory::Conversion,
    "toDecimal" => FunctionCategory::Conversion,
    "convertsToDecimal" => FunctionCategory::Conversion,
    "toQuantity" => FunctionCategory::Conversion,
    "convertsToQuantity" => FunctionCategory::Conversion,
    "toString" => FunctionCategory::Conversion,
    "convertsToString" => FunctionCategory::Conversion,
    "toTime" => FunctionCategory::Conversion,
    "convertsToTime" => FunctionCategory::Conversion,

    // 5.6
    "indexOf" => FunctionCategory::StringManipulation,
    "substring" => FunctionCategory::StringManipulation,
    "startsWith" => FunctionCategory::StringManipulation,
    "endsWith" => FunctionCategory::StringManipulation,
    "contains" => FunctionCategory::StringManipulation,
    "upper" => FunctionCategory::StringManipulation,
    "lower" => FunctionCategory::StringManipulation,
    "replace" => FunctionCategory::StringManipulation,
    "matches" => FunctionCategory::StringManipulation,
    "replaceMatches" => FunctionCategory::StringManipulation,
    "length" => FunctionCategory::StringManipulation,
    "toChars" => FunctionCategory::StringManipulation,

    // 5.7
    "encode" => FunctionCategory::AdditionalString,
    "decode" => FunctionCategory::AdditionalString,
    "trim" => FunctionCategory::AdditionalString,
    "split" => FunctionCategory::AdditionalString,
    "join" => FunctionCategory::AdditionalString,
    "abs" => FunctionCategory::Math,
    "ceiling" => FunctionCategory::Math,
    "exp" => FunctionCategory::Math,
    "floor" => FunctionCategory::Math,
    "ln" => FunctionCategory::Math,
    "log" => FunctionCategory::Math,
    "power" => FunctionCategory::Math,
    "round" => FunctionCategory::Math,
    "sqrt" => FunctionCategory::Math,
    "truncate" => FunctionCategory::Math,

    // 5.8
    "children" => FunctionCategory::TreeNavigation,
    "descendants" => FunctionCategory::TreeNavigation,

    // 5.9
    "trace" => FunctionCategory::Utility,
    "now" => FunctionCategory::Utility,
    "timeOfDay" => FunctionCategory::Utility,
    "today" => FunctionCategory::Utility,

    // 7
    "aggregate" => FunctionCategory::Aggregates,

    "extension" => FunctionCategory::FhirExtensions,
    "hasValue" => FunctionCategory::FhirExtensions,
    "getValue" => FunctionCategory::FhirExtensions,

    "ordinal" => FunctionCategory::SdcExtensions,
    "sum" => FunctionCategory::SdcExtensions,
    "min" => FunctionCategory::SdcExtensions,
    "max" => FunctionCategory::SdcExtensions,
    "avg" => FunctionCategory::SdcExtensions,
};

/// How a function computes its result type from the resolved call.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionReturn {
    Fixed(Type),
    /// The input type as given
    Input,
    /// `Single(input)`
    SingleInput,
    /// The type bound to a generic letter
    Bound(char),
    /// `Single` of the type bound to a letter
    SingleOf(char),
    /// The type bound to a letter, without its `Single` wrapper
    UnwrapSingle(char),
    /// The type named by a `TypeOf(X)` argument
    TypeArgument,
    /// `iif`: `T`, or `T | F` when the else branch is present
    Conditional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg {
    pub name: &'static str,
    pub ty: Type,
    pub optional: bool,
}

/// Function metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetadata {
    pub name: &'static str,
    pub input: Type,
    pub args: Vec<FunctionArg>,
    pub returns: FunctionReturn,
}

impl FunctionMetadata {
    pub fn category(&self) -> Option<FunctionCategory> {
        FUNCTION_CATEGORIES.get(self.name).copied()
    }

    pub fn required_args(&self) -> usize {
        self.args.iter().filter(|a| !a.optional).count()
    }

    fn return_type(
        &self,
        types: &TypeRegistry,
        input: &Type,
        args: &[Type],
        bindings: &Bindings,
    ) -> Type {
        let bound = |letter: char| {
            bindings.get(letter).cloned().unwrap_or_else(|| {
                Type::invalid(format!(
                    "Unbound type parameter {} in function \"{}\"",
                    letter, self.name
                ))
            })
        };
        match &self.returns {
            FunctionReturn::Fixed(ty) => ty.clone(),
            FunctionReturn::Input => input.clone(),
            FunctionReturn::SingleInput => Type::single(input.clone()),
            FunctionReturn::Bound(letter) => bound(*letter),
            FunctionReturn::SingleOf(letter) => Type::single(bound(*letter)),
            FunctionReturn::UnwrapSingle(letter) => bound(*letter).unwrap_single(),
            FunctionReturn::TypeArgument => match bindings.get('X') {
                Some(x) => types.normalize_choice(vec![x.clone()]),
                None => bound('X'),
            },
            FunctionReturn::Conditional => {
                let then_type = bound('T');
                match args.get(2) {
                    Some(Type::Null) | None => then_type,
                    Some(_) => types.normalize_choice(vec![then_type, bound('F')]),
                }
            }
        }
    }
}

fn arg(name: &'static str, ty: Type) -> FunctionArg {
    FunctionArg {
        name,
        ty,
        optional: false,
    }
}

fn optional(name: &'static str, ty: Type) -> FunctionArg {
    FunctionArg {
        name,
        ty,
        optional: true,
    }
}

fn t() -> Type {
    Type::Generic('T')
}

fn single_t() -> Type {
    Type::single(Type::Generic('T'))
}

fn numeric() -> Type {
    Type::Choice(vec![Type::Decimal, Type::Integer, Type::Quantity])
}

/// Registry of every function the editor offers, in presentation order.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: Vec<FunctionMetadata>,
    index: HashMap<&'static str, usize>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: Vec::new(),
            index: HashMap::new(),
        };
        registry.init_functions();
        registry
    }

    fn add(&mut self, name: &'static str, input: Type, args: Vec<FunctionArg>, returns: FunctionReturn) {
        self.index.insert(name, self.functions.len());
        self.functions.push(FunctionMetadata {
            name,
            input,
            args,
            returns,
        });
    }

    fn init_functions(&mut self) {
        use FunctionReturn::*;

        // Existence
        self.add("empty", t(), vec![], Fixed(Type::Boolean));
        self.add(
            "exists",
            t(),
            vec![optional("criteria", Type::lambda(Type::Boolean, t()))],
            Fixed(Type::Boolean),
        );
        self.add(
            "all",
            t(),
            vec![arg("criteria", Type::lambda(Type::Boolean, t()))],
            Fixed(Type::Boolean),
        );
        for name in ["allTrue", "anyTrue", "allFalse", "anyFalse"] {
            self.add(name, Type::Boolean, vec![], Fixed(Type::Boolean));
        }
        self.add("subsetOf", t(), vec![arg("other", t())], Fixed(Type::Boolean));
        self.add("supersetOf", t(), vec![arg("other", t())], Fixed(Type::Boolean));
        self.add("count", t(), vec![], Fixed(Type::Integer));
        self.add("distinct", t(), vec![], Bound('T'));
        self.add("isDistinct", t(), vec![], Fixed(Type::Boolean));

        // Filtering and projection
        self.add(
            "where",
            t(),
            vec![arg("criteria", Type::lambda(Type::Boolean, single_t()))],
            Bound('T'),
        );
        self.add(
            "select",
            t(),
            vec![arg("projection", Type::lambda(Type::Generic('R'), single_t()))],
            Bound('R'),
        );
        self.add(
            "repeat",
            t(),
            vec![arg("projection", Type::lambda(Type::Generic('R'), single_t()))],
            UnwrapSingle('R'),
        );
        self.add(
            "ofType",
            t(),
            vec![arg("type", Type::type_of(Type::Generic('X')))],
            TypeArgument,
        );

        // Subsetting
        for name in ["single", "first", "last"] {
            self.add(name, t(), vec![], SingleOf('T'));
        }
        self.add("tail", t(), vec![], Bound('T'));
        self.add("skip", t(), vec![arg("num", Type::Integer)], Bound('T'));
        self.add("take", t(), vec![arg("num", Type::Integer)], Bound('T'));
        self.add("intersect", t(), vec![arg("other", t())], Bound('T'));
        self.add("exclude", t(), vec![arg("other", t())], Bound('T'));

        // Combining
        self.add("union", t(), vec![arg("other", t())], UnwrapSingle('T'));
        self.add("combine", t(), vec![arg("other", t())], UnwrapSingle('T'));

        // Conversion
        let branch_context = || Type::single(Type::Generic('I'));
        self.add(
            "iif",
            Type::Generic('I'),
            vec![
                arg("condition", Type::lambda(Type::Generic('C'), branch_context())),
                arg("then", Type::lambda(Type::Generic('T'), branch_context())),
                optional("else", Type::lambda(Type::Generic('F'), branch_context())),
            ],
            Conditional,
        );
        let conversions = [
            ("toBoolean", "convertsToBoolean", Type::Boolean),
            ("toInteger", "convertsToInteger", Type::Integer),
            ("toDate", "convertsToDate", Type::Date),
            ("toDateTime", "convertsToDateTime", Type::DateTime),
            ("toDecimal", "convertsToDecimal", Type::Decimal),
        ];
        for (to, converts_to, ty) in conversions {
            self.add(to, t(), vec![], Fixed(ty));
            self.add(converts_to, t(), vec![], Fixed(Type::Boolean));
        }
        self.add(
            "toQuantity",
            t(),
            vec![optional("unit", Type::String)],
            Fixed(Type::Quantity),
        );
        self.add(
            "convertsToQuantity",
            t(),
            vec![optional("unit", Type::String)],
            Fixed(Type::Boolean),
        );
        self.add("toString", t(), vec![], Fixed(Type::String));
        self.add("convertsToString", t(), vec![], Fixed(Type::Boolean));
        self.add("toTime", t(), vec![], Fixed(Type::Time));
        self.add("convertsToTime", t(), vec![], Fixed(Type::Boolean));

        // String manipulation
        let s = || Type::String;
        self.add("indexOf", s(), vec![arg("substring", s())], Fixed(Type::Integer));
        self.add(
            "substring",
            s(),
            vec![arg("start", Type::Integer), optional("length", Type::Integer)],
            Fixed(s()),
        );
        self.add("startsWith", s(), vec![arg("prefix", s())], Fixed(Type::Boolean));
        self.add("endsWith", s(), vec![arg("suffix", s())], Fixed(Type::Boolean));
        self.add("contains", s(), vec![arg("substring", s())], Fixed(Type::Boolean));
        self.add("upper", s(), vec![], Fixed(s()));
        self.add("lower", s(), vec![], Fixed(s()));
        self.add(
            "replace",
            s(),
            vec![arg("pattern", s()), arg("substitution", s())],
            Fixed(s()),
        );
        self.add("matches", s(), vec![arg("regex", s())], Fixed(Type::Boolean));
        self.add(
            "replaceMatches",
            s(),
            vec![arg("regex", s()), arg("substitution", s())],
            Fixed(s()),
        );
        self.add("length", s(), vec![], Fixed(Type::Integer));
        self.add("toChars", s(), vec![], Fixed(s()));

        // Additional string functions
        self.add("encode", s(), vec![arg("format", s())], Fixed(s()));
        self.add("decode", s(), vec![arg("format", s())], Fixed(s()));
        self.add("trim", s(), vec![], Fixed(s()));
        self.add("split", s(), vec![arg("separator", s())], Fixed(s()));
        self.add("join", s(), vec![optional("separator", s())], Fixed(s()));

        // Math
        self.add(
            "abs",
            Type::Choice(vec![Type::Integer, Type::Decimal, Type::Quantity]),
            vec![],
            Input,
        );
        self.add("ceiling", Type::Decimal, vec![], Fixed(Type::Integer));
        self.add("exp", Type::Decimal, vec![], Fixed(Type::Decimal));
        self.add("floor", Type::Decimal, vec![], Fixed(Type::Integer));
        self.add("ln", Type::Decimal, vec![], Fixed(Type::Decimal));
        self.add("log", Type::Decimal, vec![arg("base", Type::Decimal)], Fixed(Type::Decimal));
        self.add(
            "power",
            Type::Decimal,
            vec![arg("exponent", Type::Choice(vec![Type::Integer, Type::Decimal]))],
            Fixed(Type::Decimal),
        );
        self.add(
            "round",
            Type::Decimal,
            vec![optional("precision", Type::Integer)],
            Fixed(Type::Decimal),
        );
        self.add("sqrt", Type::Decimal, vec![], Fixed(Type::Decimal));
        self.add("truncate", Type::Decimal, vec![], Fixed(Type::Integer));

        // Tree navigation
        for name in ["children", "descendants"] {
            self.add(name, t(), vec![], Fixed(Type::schema_ref(["Element"])));
        }

        // Utility
        self.add(
            "trace",
            t(),
            vec![
                arg("name", Type::String),
                optional("projection", Type::lambda(Type::Generic('R'), t())),
            ],
            Bound('T'),
        );
        self.add("now", t(), vec![], Fixed(Type::DateTime));
        self.add("timeOfDay", t(), vec![], Fixed(Type::Time));
        self.add("today", t(), vec![], Fixed(Type::Date));

        // Aggregates
        self.add(
            "aggregate",
            t(),
            vec![
                arg("aggregator", Type::lambda(Type::Generic('R'), t())),
                optional("init", Type::Generic('R')),
            ],
            Bound('R'),
        );

        // FHIR extensions
        self.add("extension", t(), vec![arg("url", Type::String)], Bound('T'));
        self.add("hasValue", t(), vec![], Fixed(Type::Boolean));
        self.add(
            "getValue",
            t(),
            vec![],
            Fixed(Type::Choice(
                FhirPrimitive::ALL.into_iter().map(Type::Primitive).collect(),
            )),
        );

        // SDC extensions
        self.add("ordinal", t(), vec![], Fixed(Type::Decimal));
        for name in ["sum", "min", "max", "avg"] {
            self.add(name, numeric(), vec![], SingleInput);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionMetadata> {
        self.index.get(name).map(|&position| &self.functions[position])
    }

    pub fn functions(&self) -> &[FunctionMetadata] {
        &self.functions
    }

    /// Result type of `input.name(args...)`.
    ///
    /// `argument_type(index, context)` types the sub-program supplied for
    /// argument `index` under `context`, or returns `None` when the argument
    /// is missing.
    pub fn resolve_call<F>(
        &self,
        types: &TypeRegistry,
        name: &str,
        input: &Type,
        context: &Type,
        mut argument_type: F,
    ) -> Type
    where
        F: FnMut(usize, &Type) -> Option<Type>,
    {
        let Some(meta) = self.get(name) else {
            return Type::invalid(format!("Unknown function \"{}\"", name));
        };
        let Some(mut bindings) = types.match_type_pattern(&meta.input, input, &Bindings::new()) else {
            return Type::invalid(format!(
                "Input type mismatch for {}. Expected {}, got {}",
                name, meta.input, input
            ));
        };

        let mut resolved_args = Vec::with_capacity(meta.args.len());
        for (index, param) in meta.args.iter().enumerate() {
            let expected = param.ty.substitute(&bindings);
            let (arg_context, lambda_context) = match &expected {
                Type::Lambda { context_type, .. } => ((**context_type).clone(), true),
                _ => (context.clone(), false),
            };

            let actual = match argument_type(index, &arg_context) {
                None if param.optional => {
                    resolved_args.push(Type::Null);
                    continue;
                }
                None => {
                    return Type::invalid(format!(
                        "Missing required argument \"{}\" (at index {}) for function \"{}\"",
                        param.name, index, name
                    ))
                }
                Some(body) if body.is_invalid() => return body,
                Some(body) if lambda_context => Type::lambda(body, arg_context),
                Some(body) => body,
            };

            let Some(matched) = types.match_type_pattern(&param.ty, &actual, &bindings) else {
                return Type::invalid(format!(
                    "Argument type mismatch for \"{}\" (at index {}) of function \"{}\". Expected compatible with {}, got {}",
                    param.name, index, name, expected, actual
                ));
            };
            let Some(merged) = types.merge_bindings(&bindings, &matched) else {
                return Type::invalid(format!(
                    "Binding conflict for argument {} at index {} in function \"{}\"",
                    param.name, index, name
                ));
            };
            bindings = merged;
            resolved_args.push(actual);
        }

        meta.return_type(types, input, &resolved_args, &bindings)
    }

    /// The `$this` type argument `index` of `name` is typed under, given the
    /// types of the arguments before it.
    pub fn argument_context_type<F>(
        &self,
        types: &TypeRegistry,
        index: usize,
        name: &str,
        input: &Type,
        context: &Type,
        mut argument_type: F,
    ) -> Type
    where
        F: FnMut(usize, &Type) -> Option<Type>,
    {
        let mut captured = None;
        self.resolve_call(types, name, input, context, |arg_index, arg_context| {
            if arg_index == index {
                captured = Some(arg_context.clone());
                None
            } else if arg_index < index {
                argument_type(arg_index, arg_context)
            } else {
                None
            }
        });
        captured.unwrap_or_else(|| Type::invalid("Failed to capture argument context"))
    }

    /// Functions whose input pattern accepts `input`.
    pub fn suggest_functions_for_input_type<'a>(
        &'a self,
        types: &'a TypeRegistry,
        input: &'a Type,
    ) -> impl Iterator<Item = &'a FunctionMetadata> + 'a {
        self.functions.iter().filter(move |meta| {
            types
                .match_type_pattern(&meta.input, input, &Bindings::new())
                .is_some()
        })
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, input: Type, args: Vec<Option<Type>>) -> Type {
        FunctionRegistry::new().resolve_call(
            &TypeRegistry::new(),
            name,
            &input,
            &Type::schema_ref(["Patient"]),
            |index, _| args.get(index).cloned().flatten(),
        )
    }

    #[test]
    fn test_registry_covers_categories() {
        let registry = FunctionRegistry::new();
        for meta in registry.functions() {
            assert!(meta.category().is_some(), "{} has no category", meta.name);
        }
        assert_eq!(registry.functions().len(), FUNCTION_CATEGORIES.len());
        assert_eq!(
            registry.get("where").and_then(FunctionMetadata::category),
            Some(FunctionCategory::FilteringAndProjection)
        );
        assert!(registry.get("resolve").is_none());
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            call("frobnicate", Type::Integer, vec![]),
            Type::invalid("Unknown function \"frobnicate\"")
        );
    }

    #[test]
    fn test_input_mismatch() {
        let result = call("upper", Type::Integer, vec![]);
        assert_eq!(
            result,
            Type::invalid("Input type mismatch for upper. Expected String, got Integer")
        );
    }

    #[test]
    fn test_subsetting_wraps_single() {
        let names = Type::schema_ref(["HumanName"]);
        assert_eq!(call("first", names.clone(), vec![]), Type::single(names.clone()));
        assert_eq!(call("tail", names.clone(), vec![]), names);
        assert_eq!(
            call(
                "union",
                Type::single(Type::String),
                vec![Some(Type::single(Type::String))]
            ),
            Type::String
        );
    }

    #[test]
    fn test_lambda_argument_binds_result() {
        let names = Type::schema_ref(["HumanName"]);
        let result = call("select", names.clone(), vec![Some(Type::String)]);
        assert_eq!(result, Type::String);

        let filtered = call("where", names.clone(), vec![Some(Type::single(Type::Boolean))]);
        assert_eq!(filtered, names);

        let bad = call("where", names, vec![Some(Type::Integer)]);
        assert!(bad.is_invalid());
    }

    #[test]
    fn test_lambda_context_is_single_input() {
        let registry = FunctionRegistry::new();
        let types = TypeRegistry::new();
        let input = Type::schema_ref(["HumanName"]);
        let mut seen = None;
        registry.resolve_call(&types, "where", &input, &Type::Null, |_, context| {
            seen = Some(context.clone());
            Some(Type::Boolean)
        });
        assert_eq!(seen, Some(Type::single(input.clone())));

        let context = registry.argument_context_type(
            &types,
            0,
            "exists",
            &input,
            &Type::Null,
            |_, _| None,
        );
        assert_eq!(context, input);

        let plain = registry.argument_context_type(
            &types,
            0,
            "skip",
            &input,
            &Type::schema_ref(["Patient"]),
            |_, _| None,
        );
        assert_eq!(plain, Type::schema_ref(["Patient"]));
    }

    #[test]
    fn test_missing_arguments() {
        assert_eq!(call("exists", Type::Integer, vec![]), Type::Boolean);
        assert_eq!(
            call("skip", Type::Integer, vec![]),
            Type::invalid("Missing required argument \"num\" (at index 0) for function \"skip\"")
        );
        assert_eq!(
            call("substring", Type::String, vec![Some(Type::Integer)]),
            Type::String
        );
    }

    #[test]
    fn test_invalid_argument_propagates() {
        assert_eq!(
            call("skip", Type::Integer, vec![Some(Type::invalid("bad arg"))]),
            Type::invalid("bad arg")
        );
    }

    #[test]
    fn test_generic_argument_conflict() {
        let result = call("subsetOf", Type::Integer, vec![Some(Type::String)]);
        assert!(result.is_invalid());
        assert_eq!(call("subsetOf", Type::Integer, vec![Some(Type::Integer)]), Type::Boolean);
    }

    #[test]
    fn test_iif_branches() {
        let then_only = call(
            "iif",
            Type::Integer,
            vec![Some(Type::Boolean), Some(Type::String)],
        );
        assert_eq!(then_only, Type::String);

        let both = call(
            "iif",
            Type::Integer,
            vec![Some(Type::Boolean), Some(Type::String), Some(Type::Integer)],
        );
        assert_eq!(both, Type::Choice(vec![Type::String, Type::Integer]));
    }

    #[test]
    fn test_of_type_and_aggregates() {
        assert_eq!(
            call(
                "ofType",
                Type::schema_ref(["Resource"]),
                vec![Some(Type::type_of(Type::schema_ref(["Patient"])))]
            ),
            Type::schema_ref(["Patient"])
        );
        assert_eq!(call("sum", Type::Integer, vec![]), Type::single(Type::Integer));
        assert_eq!(call("abs", Type::Quantity, vec![]), Type::Quantity);
        assert!(call("sum", Type::String, vec![]).is_invalid());
    }

    #[test]
    fn test_suggest_for_input() {
        let registry = FunctionRegistry::new();
        let types = TypeRegistry::new();
        let names: Vec<_> = registry
            .suggest_functions_for_input_type(&types, &Type::Integer)
            .map(|m| m.name)
            .collect();
        assert!(names.contains(&"count"));
        assert!(names.contains(&"sum"));
        assert!(!names.contains(&"upper"));
        assert!(!names.contains(&"round"));
    }
}
