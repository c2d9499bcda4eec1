//! Type analysis of token chains and operator trees
//!
//! [`Analyzer`] types an expression left to right: chains resolve fields,
//! indexes, function calls and answers against the schema registry, and
//! operator trees combine operand types through the operator registry.

use std::collections::HashMap;
use std::sync::Arc;

use ferrum_schema::SchemaRegistry;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::fields;
use crate::functions::FunctionRegistry;
use crate::operators::{OperatorName, OperatorRegistry};
use crate::questionnaire::QuestionnaireItemRegistry;
use crate::token::{Program, Token};
use crate::tree::{build_operator_tree, OperatorTree};
use crate::types::{Bindings, Type, TypeRegistry};

/// Names and types visible while typing an expression.
#[derive(Debug, Clone, Copy)]
pub struct TypeEnv<'a> {
    /// Type of `$this` for chains that do not start with a literal or variable
    pub context_type: &'a Type,
    /// Binding name to type, externals and in-scope locals alike
    pub binding_types: &'a HashMap<String, Type>,
    pub questionnaire_items: &'a QuestionnaireItemRegistry,
}

impl<'a> TypeEnv<'a> {
    pub fn new(
        context_type: &'a Type,
        binding_types: &'a HashMap<String, Type>,
        questionnaire_items: &'a QuestionnaireItemRegistry,
    ) -> Self {
        Self {
            context_type,
            binding_types,
            questionnaire_items,
        }
    }
}

/// Static typing of token expressions.
///
/// Holds the immutable registries the typing rules consult. Cloning is cheap
/// and the analyzer can be shared across threads.
#[derive(Debug, Clone)]
pub struct Analyzer {
    types: Arc<TypeRegistry>,
    operators: Arc<OperatorRegistry>,
    functions: Arc<FunctionRegistry>,
    schema: Arc<SchemaRegistry>,
}

impl Analyzer {
    /// Analyzer with the built-in type hierarchy, operators and functions.
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self::with_registries(
            Arc::new(TypeRegistry::new()),
            Arc::new(OperatorRegistry::new()),
            Arc::new(FunctionRegistry::new()),
            schema,
        )
    }

    /// Analyzer over schemas given as a JSON array.
    pub fn from_schema_json(schemas: serde_json::Value) -> Result<Self> {
        let schema = SchemaRegistry::from_json(schemas)?;
        Ok(Self::new(Arc::new(schema)))
    }

    pub fn with_registries(
        types: Arc<TypeRegistry>,
        operators: Arc<OperatorRegistry>,
        functions: Arc<FunctionRegistry>,
        schema: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            types,
            operators,
            functions,
            schema,
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn fields(&self, ty: &Type) -> IndexMap<String, Type> {
        fields::fields(&self.schema, ty)
    }

    pub fn resolve_operator(&self, name: OperatorName, left: &Type, right: &Type) -> Type {
        self.operators.resolve(&self.types, name, left, right)
    }

    /// Whether `actual` is accepted where `pattern` is expected.
    pub fn matches(&self, pattern: &Type, actual: &Type) -> bool {
        self.types
            .match_type_pattern(pattern, actual, &Bindings::new())
            .is_some()
    }

    // ============================================
    // Expressions
    // ============================================

    pub fn expression_type(&self, expression: &[Token], env: &TypeEnv) -> Type {
        self.tree_type(&build_operator_tree(expression), env)
    }

    /// Type of a function-argument program. Inner bindings are typed in
    /// declaration order, each seeing the outer names plus earlier inner ones.
    pub fn program_type(&self, program: &Program, env: &TypeEnv) -> Type {
        if program.bindings.is_empty() {
            return self.expression_type(&program.expression, env);
        }
        let mut scope = env.binding_types.clone();
        for binding in &program.bindings {
            let ty = self.expression_type(
                &binding.expression,
                &TypeEnv {
                    binding_types: &scope,
                    ..*env
                },
            );
            scope.insert(binding.name.clone(), ty);
        }
        self.expression_type(
            &program.expression,
            &TypeEnv {
                binding_types: &scope,
                ..*env
            },
        )
    }

    fn tree_type(&self, tree: &OperatorTree, env: &TypeEnv) -> Type {
        match tree {
            OperatorTree::Chain(tokens) => self.chain_type(tokens, env),
            OperatorTree::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.tree_type(left, env);
                if left.is_invalid() {
                    return left;
                }
                let right = self.tree_type(right, env);
                self.resolve_operator(*operator, &left, &right)
            }
        }
    }

    fn chain_type(&self, tokens: &[Token], env: &TypeEnv) -> Type {
        let Some((first, rest)) = tokens.split_first() else {
            return Type::invalid("Empty expression");
        };

        let (mut current, rest) = match self.leading_type(first, env) {
            Some(ty) => (ty, rest),
            None => (env.context_type.clone(), tokens),
        };

        for token in rest {
            if current.is_invalid() {
                break;
            }
            current = self.step_type(token, current, env);
        }
        current
    }

    /// Type of a token that can only start a chain.
    pub(crate) fn leading_type(&self, token: &Token, env: &TypeEnv) -> Option<Type> {
        let ty = match token {
            Token::Number(value) if value.contains('.') => Type::single(Type::Decimal),
            Token::Number(_) => Type::single(Type::Integer),
            Token::String(_) => Type::single(Type::String),
            Token::Boolean(_) => Type::single(Type::Boolean),
            Token::Date(_) => Type::single(Type::Date),
            Token::DateTime(_) => Type::single(Type::DateTime),
            Token::Time(_) => Type::single(Type::Time),
            Token::Quantity { .. } => Type::single(Type::Quantity),
            Token::TypeValue(ty) => Type::type_of(ty.clone()),
            Token::Variable(name) => env
                .binding_types
                .get(name)
                .cloned()
                .unwrap_or_else(|| Type::invalid(format!("Unknown variable \"{}\"", name))),
            _ => return None,
        };
        Some(ty)
    }

    fn step_type(&self, token: &Token, current: Type, env: &TypeEnv) -> Type {
        match token {
            Token::Field(name) => fields::field_type(&self.schema, &current, name)
                .unwrap_or_else(|| Type::invalid(format!("Unknown field \"{}\"", name))),
            Token::Index(_) => Type::single(current),
            Token::Function { name, args } => self.function_type(name, args, &current, env),
            Token::Answer(link_id) => self.answer_type(link_id, &current, env),
            other => Type::invalid(format!("Unexpected {:?} token", other.kind())),
        }
    }

    fn function_type(
        &self,
        name: &str,
        args: &[Option<Program>],
        input: &Type,
        env: &TypeEnv,
    ) -> Type {
        self.functions
            .resolve_call(&self.types, name, input, env.context_type, |index, context| {
                self.argument_type(args, index, context, env)
            })
    }

    /// Type of argument `index` under `context`, `None` when missing.
    fn argument_type(
        &self,
        args: &[Option<Program>],
        index: usize,
        context: &Type,
        env: &TypeEnv,
    ) -> Option<Type> {
        let program = args.get(index)?.as_ref()?;
        if program.bindings.is_empty() && program.expression.is_empty() {
            return None;
        }
        Some(self.program_type(
            program,
            &TypeEnv {
                context_type: context,
                ..*env
            },
        ))
    }

    fn answer_type(&self, link_id: &str, current: &Type, env: &TypeEnv) -> Type {
        if !self.matches(&Type::schema_ref(["QuestionnaireResponse"]), current) {
            return Type::invalid("Answer token cannot be used in this context");
        }

        let answer = env
            .questionnaire_items
            .get(link_id)
            .map(|item| item.ty.clone())
            .or_else(|| {
                fields::field_type(
                    &self.schema,
                    &Type::schema_ref(["QuestionnaireResponse", "item", "answer"]),
                    "value",
                )
            })
            .unwrap_or_else(|| Type::invalid(format!("Unknown answer \"{}\"", link_id)));

        if current.is_single() {
            answer
        } else {
            answer.unwrap_single()
        }
    }

    // ============================================
    // Function arguments
    // ============================================

    /// Input type of the function token at `token_index`: the type of the
    /// chain before it, or the context type when it starts a chain.
    pub fn function_input_type(&self, expression: &[Token], token_index: usize, env: &TypeEnv) -> Type {
        let chain_start = expression[..token_index.min(expression.len())]
            .iter()
            .rposition(|token| token.operator().is_some())
            .map_or(0, |position| position + 1);
        if chain_start >= token_index {
            env.context_type.clone()
        } else {
            self.chain_type(&expression[chain_start..token_index], env)
        }
    }

    /// The `$this` type argument `arg_index` of the function at
    /// `token_index` is typed under.
    pub fn argument_context_type(
        &self,
        expression: &[Token],
        token_index: usize,
        arg_index: usize,
        env: &TypeEnv,
    ) -> Result<Type> {
        let token = expression
            .get(token_index)
            .ok_or(Error::TokenNotFound(token_index))?;
        let Token::Function { name, args } = token else {
            return Err(Error::NotAFunction(token_index));
        };
        let Some(meta) = self.functions.get(name) else {
            return Ok(Type::invalid(format!("Unknown function \"{}\"", name)));
        };
        if arg_index >= meta.args.len() {
            return Err(Error::ArgumentOutOfRange {
                function: name.clone(),
                arg: arg_index,
            });
        }

        let input = self.function_input_type(expression, token_index, env);
        Ok(self.functions.argument_context_type(
            &self.types,
            arg_index,
            name,
            &input,
            env.context_type,
            |index, context| self.argument_type(args, index, context, env),
        ))
    }
}
