//! FHIRPath Editor - Structured token editing for FHIRPath expressions
//!
//! Expressions are edited as flat token sequences instead of text, so the
//! engine can type every prefix, suggest what may come next and keep named
//! bindings consistent while the user types.
//!
//! # Architecture Overview
//!
//! ```text
//! Edit
//!   |
//! ProgramStore -> new Program
//!   |
//! DependencyGraph (sequentially scoped bindings)
//!   |
//! Analyzer -> Type per node (operator tree, chains, functions)
//!   |
//! stringify -> ExpressionEvaluator -> FhirValue per node
//!   |
//! ProgramState snapshot
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrum_fhirpath_editor::{
//!     Analyzer, Context, Edit, NoopEvaluator, Program, ProgramStore, StoreOptions, Token, Type,
//! };
//! use ferrum_schema::SchemaRegistry;
//!
//! let schema = Arc::new(SchemaRegistry::from_json(schemas)?);
//! let store = ProgramStore::new(
//!     Arc::new(Analyzer::new(schema)),
//!     Arc::new(NoopEvaluator),
//!     Context::typed(Type::schema_ref(["Patient"])),
//!     Vec::new(),
//!     StoreOptions::default(),
//! );
//!
//! let state = store.load(Program::default());
//! let state = store.apply(&state, Edit::AddToken { node: None, token: Token::field("name") });
//! let suggestions = store.suggest_next_tokens(&state, &None)?;
//! ```

pub mod analyzer;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod fields;
pub mod functions;
pub mod graph;
pub mod operators;
pub mod questionnaire;
pub mod store;
pub mod stringify;
pub mod suggest;
pub mod token;
pub mod tree;
pub mod types;
pub mod value;

pub use analyzer::{Analyzer, TypeEnv};
pub use config::StoreOptions;
pub use context::{Context, ExternalBinding};
pub use error::{Error, Result};
pub use evaluator::{ExpressionEvaluator, NoopEvaluator};
pub use functions::{FunctionMetadata, FunctionRegistry};
pub use graph::{can_move_binding, DependencyGraph};
pub use operators::{OperatorName, OperatorRegistry};
pub use questionnaire::{QuestionnaireItem, QuestionnaireItemRegistry};
pub use store::{Edit, ProgramState, ProgramStore};
pub use stringify::{stringify_expression, stringify_program};
pub use suggest::{SuggestEnv, SuggestedToken, VariableCandidate};
pub use token::{BindingId, LocalBinding, NodeId, Program, Token, TokenKind};
pub use types::{FhirPrimitive, Type, TypeRegistry};
pub use value::FhirValue;
