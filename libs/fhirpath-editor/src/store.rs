//! Program store
//!
//! The store owns everything a program is edited against (analyzer,
//! evaluator, context, externals) and turns edits into new snapshots:
//! `apply(&state, edit)` never mutates `state`. Each snapshot carries the
//! dependency graph plus the type and value of every node, refreshed in
//! dependency order as part of the same edit.
//!
//! Invalid edits (bad indices, unknown ids, name collisions, illegal moves,
//! references to names that are not in scope) leave the snapshot unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::analyzer::{Analyzer, TypeEnv};
use crate::config::StoreOptions;
use crate::context::{Context, ExternalBinding};
use crate::error::{Error, Result};
use crate::evaluator::ExpressionEvaluator;
use crate::graph::{can_move_binding, extract_referenced_names, DependencyGraph};
use crate::questionnaire::QuestionnaireItemRegistry;
use crate::stringify::stringify_program;
use crate::suggest::{SuggestEnv, SuggestedToken, VariableCandidate};
use crate::token::{BindingId, LocalBinding, NodeId, Program, Token};
use crate::types::Type;
use crate::value::FhirValue;

const DEFAULT_BINDING_NAME: &str = "var0";
const NAMED_EXPRESSION_NAME: &str = "var1";

/// One edit of a program. Nodes are addressed by binding id, `None` being
/// the main expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "camelCase")]
pub enum Edit {
    AddToken {
        node: NodeId,
        token: Token,
    },
    UpdateToken {
        node: NodeId,
        index: usize,
        token: Token,
    },
    /// Deletes the token at `index`, or the last one
    DeleteToken {
        node: NodeId,
        index: Option<usize>,
    },
    /// Sets a function argument, padding skipped arguments as missing
    UpdateArg {
        node: NodeId,
        token_index: usize,
        arg_index: usize,
        program: Program,
    },
    DeleteArg {
        node: NodeId,
        token_index: usize,
        arg_index: usize,
    },
    /// Deletes the last token, or the binding itself once it is empty
    TrimBinding {
        node: NodeId,
    },
    AddBinding {
        name: Option<String>,
        #[serde(default)]
        expression: Vec<Token>,
        /// Insert position, appended when absent
        at: Option<usize>,
    },
    DuplicateBinding {
        id: BindingId,
    },
    DeleteBinding {
        id: BindingId,
    },
    RenameBinding {
        id: BindingId,
        name: String,
    },
    MoveBinding {
        from: usize,
        to: usize,
    },
    /// Moves the main expression into a new binding and references it
    NameExpression,
}

impl Edit {
    pub fn name(&self) -> &'static str {
        match self {
            Edit::AddToken { .. } => "addToken",
            Edit::UpdateToken { .. } => "updateToken",
            Edit::DeleteToken { .. } => "deleteToken",
            Edit::UpdateArg { .. } => "updateArg",
            Edit::DeleteArg { .. } => "deleteArg",
            Edit::TrimBinding { .. } => "trimBinding",
            Edit::AddBinding { .. } => "addBinding",
            Edit::DuplicateBinding { .. } => "duplicateBinding",
            Edit::DeleteBinding { .. } => "deleteBinding",
            Edit::RenameBinding { .. } => "renameBinding",
            Edit::MoveBinding { .. } => "moveBinding",
            Edit::NameExpression => "nameExpression",
        }
    }
}

/// What an accepted edit invalidates.
enum Refresh {
    /// These nodes and their dependents
    Nodes(Vec<NodeId>),
    /// Every node, after bindings were added, removed or reordered
    All,
}

/// An immutable program snapshot with its derived graph, types and values.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramState {
    program: Program,
    graph: DependencyGraph,
    types: HashMap<NodeId, Type>,
    values: HashMap<NodeId, FhirValue>,
}

impl ProgramState {
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn binding_type(&self, node: &NodeId) -> Option<&Type> {
        self.types.get(node)
    }

    pub fn binding_value(&self, node: &NodeId) -> Option<&FhirValue> {
        self.values.get(node)
    }

    pub fn expression(&self, node: &NodeId) -> Option<&Vec<Token>> {
        self.program.node_expression(node)
    }

    pub fn token(&self, node: &NodeId, index: usize) -> Option<&Token> {
        self.expression(node)?.get(index)
    }

    /// Whether the token at `index` starts a chain.
    pub fn is_leading_token(&self, node: &NodeId, index: usize) -> bool {
        index == 0 || matches!(self.token(node, index - 1), Some(Token::Operator(_)))
    }
}

pub struct ProgramStore {
    analyzer: Arc<Analyzer>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    context: Context,
    externals: Vec<ExternalBinding>,
    variables: HashMap<String, JsonValue>,
    questionnaire_items: QuestionnaireItemRegistry,
    options: StoreOptions,
}

impl ProgramStore {
    pub fn new(
        analyzer: Arc<Analyzer>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        context: Context,
        externals: Vec<ExternalBinding>,
        options: StoreOptions,
    ) -> Self {
        let questionnaire_items =
            QuestionnaireItemRegistry::from_external_bindings(analyzer.types(), &externals);
        let variables = externals
            .iter()
            .map(|binding| (binding.name.clone(), binding.value.value.clone()))
            .collect();
        Self {
            analyzer,
            evaluator,
            context,
            externals,
            variables,
            questionnaire_items,
            options,
        }
    }

    /// Replace the questionnaire items derived from the externals.
    pub fn with_questionnaire_items(mut self, items: QuestionnaireItemRegistry) -> Self {
        self.questionnaire_items = items;
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn external_bindings(&self) -> &[ExternalBinding] {
        &self.externals
    }

    pub fn questionnaire_items(&self) -> &QuestionnaireItemRegistry {
        &self.questionnaire_items
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Snapshot of `program` with every node typed and evaluated.
    pub fn load(&self, program: Program) -> ProgramState {
        tracing::debug!(bindings = program.bindings.len(), "Loading program");
        self.refresh(None, program, Refresh::All)
    }

    /// Apply `edit` to `state`. Rejected edits return an unchanged copy.
    pub fn apply(&self, state: &ProgramState, edit: Edit) -> ProgramState {
        let name = edit.name();
        let mut program = state.program.clone();
        match self.edit_program(&mut program, edit) {
            Some(refresh) => {
                tracing::debug!(edit = name, "Applied edit");
                self.refresh(Some(state), program, refresh)
            }
            None => {
                tracing::debug!(edit = name, "Rejected edit");
                state.clone()
            }
        }
    }

    // ============================================
    // Edits
    // ============================================

    fn edit_program(&self, program: &mut Program, edit: Edit) -> Option<Refresh> {
        let binding_edit = matches!(
            edit,
            Edit::AddBinding { .. }
                | Edit::DuplicateBinding { .. }
                | Edit::DeleteBinding { .. }
                | Edit::RenameBinding { .. }
                | Edit::MoveBinding { .. }
                | Edit::NameExpression
        );
        if binding_edit && !self.options.allow_bindings {
            return None;
        }

        match edit {
            Edit::AddToken { node, token } => {
                self.check_scope(program, &node, std::slice::from_ref(&token))?;
                program.node_expression_mut(&node)?.push(token);
                Some(Refresh::Nodes(vec![node]))
            }
            Edit::UpdateToken { node, index, token } => {
                self.check_scope(program, &node, std::slice::from_ref(&token))?;
                let slot = program.node_expression_mut(&node)?.get_mut(index)?;
                *slot = token;
                Some(Refresh::Nodes(vec![node]))
            }
            Edit::DeleteToken { node, index } => {
                let expression = program.node_expression_mut(&node)?;
                let index = match index {
                    Some(index) => index,
                    None => expression.len().checked_sub(1)?,
                };
                if index >= expression.len() {
                    return None;
                }
                expression.remove(index);
                Some(Refresh::Nodes(vec![node]))
            }
            Edit::UpdateArg {
                node,
                token_index,
                arg_index,
                program: arg,
            } => {
                let probe = [Token::function("", vec![Some(arg.clone())])];
                self.check_scope(program, &node, &probe)?;
                let Token::Function { args, .. } = program.node_expression_mut(&node)?.get_mut(token_index)? else {
                    return None;
                };
                if arg_index >= args.len() {
                    args.resize(arg_index + 1, None);
                }
                args[arg_index] = Some(arg);
                Some(Refresh::Nodes(vec![node]))
            }
            Edit::DeleteArg {
                node,
                token_index,
                arg_index,
            } => {
                let Token::Function { args, .. } = program.node_expression_mut(&node)?.get_mut(token_index)? else {
                    return None;
                };
                if arg_index >= args.len() {
                    return None;
                }
                if arg_index + 1 == args.len() {
                    args.pop();
                } else {
                    args[arg_index] = None;
                }
                Some(Refresh::Nodes(vec![node]))
            }
            Edit::TrimBinding { node } => {
                let expression = program.node_expression_mut(&node)?;
                if expression.pop().is_some() {
                    return Some(Refresh::Nodes(vec![node]));
                }
                match node {
                    Some(id) if self.options.allow_bindings => self.delete_binding(program, &id),
                    _ => None,
                }
            }
            Edit::AddBinding {
                name,
                expression,
                at,
            } => {
                let at = at.unwrap_or(program.bindings.len()).min(program.bindings.len());
                let name = name.filter(|name| !name.is_empty());
                let name = self.unique_name(program, name.as_deref().unwrap_or(DEFAULT_BINDING_NAME));
                let visible = self.visible_names(&program.bindings[..at]);
                if !names_visible(&expression, &visible) {
                    return None;
                }
                program.bindings.insert(at, LocalBinding::new(name, expression));
                Some(Refresh::All)
            }
            Edit::DuplicateBinding { id } => {
                let position = program.position(&id)?;
                let original = &program.bindings[position];
                let name = self.unique_name(program, &format!("{}_copy", original.name));
                let copy = LocalBinding::new(name, original.expression.clone());
                program.bindings.insert(position + 1, copy);
                Some(Refresh::All)
            }
            Edit::DeleteBinding { id } => self.delete_binding(program, &id),
            Edit::RenameBinding { id, name } => self.rename_binding(program, &id, name),
            Edit::MoveBinding { from, to } => {
                if !can_move_binding(&program.bindings, from, to) {
                    return None;
                }
                let to = to.min(program.bindings.len() - 1);
                let binding = program.bindings.remove(from);
                program.bindings.insert(to, binding);
                Some(Refresh::All)
            }
            Edit::NameExpression => {
                if program.expression.is_empty() {
                    return None;
                }
                let name = self.unique_name(program, NAMED_EXPRESSION_NAME);
                let expression = std::mem::take(&mut program.expression);
                program.bindings.push(LocalBinding::new(name.clone(), expression));
                program.expression = vec![Token::Variable(name)];
                Some(Refresh::All)
            }
        }
    }

    fn delete_binding(&self, program: &mut Program, id: &BindingId) -> Option<Refresh> {
        let position = program.position(id)?;
        program.bindings.remove(position);
        Some(Refresh::All)
    }

    fn rename_binding(&self, program: &mut Program, id: &BindingId, name: String) -> Option<Refresh> {
        let position = program.position(id)?;
        let old = program.bindings[position].name.clone();
        if name.is_empty() || name == old || !self.is_name_free(program, &name, Some(id)) {
            return None;
        }
        // The binding would reference itself.
        if extract_referenced_names(&program.bindings[position].expression).contains(&name) {
            return None;
        }

        // Rewritten nodes need not depend on the renamed binding.
        let mut changed = vec![Some(id.clone())];
        for (index, binding) in program.bindings.iter_mut().enumerate() {
            if index != position && rename_variable(&mut binding.expression, &old, &name) {
                changed.push(Some(binding.id.clone()));
            }
        }
        if rename_variable(&mut program.expression, &old, &name) {
            changed.push(None);
        }
        program.bindings[position].name = name;
        Some(Refresh::Nodes(changed))
    }

    /// Rejects tokens that reference names `node` cannot see.
    fn check_scope(&self, program: &Program, node: &NodeId, tokens: &[Token]) -> Option<()> {
        let earlier = match node {
            None => &program.bindings[..],
            Some(id) => &program.bindings[..program.position(id)?],
        };
        let visible = self.visible_names(earlier);
        names_visible(tokens, &visible).then_some(())
    }

    fn visible_names<'a>(&'a self, earlier: &'a [LocalBinding]) -> HashSet<&'a str> {
        self.externals
            .iter()
            .map(|binding| binding.name.as_str())
            .chain(earlier.iter().map(|binding| binding.name.as_str()))
            .collect()
    }

    fn is_name_free(&self, program: &Program, name: &str, exclude: Option<&BindingId>) -> bool {
        !program
            .bindings
            .iter()
            .any(|binding| Some(&binding.id) != exclude && binding.name == name)
            && !self.externals.iter().any(|binding| binding.name == name)
    }

    /// `base`, or `base` with its trailing number bumped until it is free.
    fn unique_name(&self, program: &Program, base: &str) -> String {
        let mut name = base.to_string();
        while !self.is_name_free(program, &name, None) {
            name = next_name(&name);
        }
        name
    }

    // ============================================
    // Recomputation
    // ============================================

    fn refresh(&self, previous: Option<&ProgramState>, program: Program, refresh: Refresh) -> ProgramState {
        let graph = DependencyGraph::build(&program);
        let (mut types, mut values, order) = match (previous, refresh) {
            (Some(previous), Refresh::Nodes(changed)) => (
                previous.types.clone(),
                previous.values.clone(),
                graph.affected(&changed),
            ),
            _ => (HashMap::new(), HashMap::new(), graph.walk()),
        };

        for node in order {
            tracing::trace!(node = node_label(&node), "Recomputing node");
            let Some(expression) = program.node_expression(&node) else {
                continue;
            };
            let ty = self.compute_type(&program, &types, &node, expression);
            types.insert(node.clone(), ty);
            let value = self.compute_value(&program, &graph, &values, &node, expression);
            values.insert(node, value);
        }

        ProgramState {
            program,
            graph,
            types,
            values,
        }
    }

    /// Types of the names `node` can see: externals, then earlier locals (all
    /// locals for the main expression).
    fn scope_types(&self, program: &Program, types: &HashMap<NodeId, Type>, node: &NodeId) -> HashMap<String, Type> {
        let mut scope: HashMap<String, Type> = self
            .externals
            .iter()
            .map(|binding| (binding.name.clone(), binding.ty.clone()))
            .collect();
        let earlier = match node {
            None => program.bindings.len(),
            Some(id) => program.position(id).unwrap_or(0),
        };
        for binding in &program.bindings[..earlier] {
            let ty = types
                .get(&Some(binding.id.clone()))
                .cloned()
                .unwrap_or_else(|| Type::invalid(format!("Binding \"{}\" is not typed", binding.name)));
            scope.insert(binding.name.clone(), ty);
        }
        scope
    }

    fn compute_type(
        &self,
        program: &Program,
        types: &HashMap<NodeId, Type>,
        node: &NodeId,
        expression: &[Token],
    ) -> Type {
        let scope = self.scope_types(program, types, node);
        let env = TypeEnv::new(&self.context.ty, &scope, &self.questionnaire_items);
        self.analyzer.expression_type(expression, &env)
    }

    fn compute_value(
        &self,
        program: &Program,
        graph: &DependencyGraph,
        values: &HashMap<NodeId, FhirValue>,
        node: &NodeId,
        expression: &[Token],
    ) -> FhirValue {
        if self.options.is_lambda || expression.is_empty() {
            return FhirValue::empty();
        }

        let upstream_failure = graph
            .dependencies(node)
            .filter_map(|dependency| values.get(&Some(dependency.clone())))
            .find(|value| value.is_error());
        if let Some(failure) = upstream_failure {
            return failure.clone();
        }

        self.evaluate(program, graph, node, expression)
    }

    /// Evaluate `expression` with the bindings `node` depends on in scope.
    fn evaluate(&self, program: &Program, graph: &DependencyGraph, node: &NodeId, expression: &[Token]) -> FhirValue {
        let dependencies = graph.transitive_dependencies(node);
        let bindings = program
            .bindings
            .iter()
            .filter(|binding| dependencies.contains(&binding.id))
            .cloned()
            .collect();
        let text = stringify_program(
            &Program::new(bindings, expression.to_vec()),
            &self.questionnaire_items,
        );
        let origin = node
            .as_ref()
            .and_then(|id| program.binding(id))
            .map(|binding| binding.name.as_str());

        match self.evaluator.evaluate(&self.context.value.value, &text, &self.variables) {
            Ok(value) => FhirValue::new(value).with_origin(origin),
            Err(e) => {
                tracing::debug!(
                    node = node_label(node),
                    expression = text.as_str(),
                    "Evaluation failed: {}",
                    e
                );
                let message = match e {
                    Error::Evaluation(message) => message,
                    other => other.to_string(),
                };
                FhirValue::failed(message, origin)
            }
        }
    }

    // ============================================
    // Queries
    // ============================================

    /// Type of a local node, or of an external binding by id.
    pub fn binding_type(&self, state: &ProgramState, node: &NodeId) -> Option<Type> {
        if let Some(ty) = state.binding_type(node) {
            return Some(ty.clone());
        }
        let id = node.as_ref()?;
        self.external(id).map(|binding| binding.ty.clone())
    }

    /// Value of a local node, or of an external binding by id.
    pub fn binding_value(&self, state: &ProgramState, node: &NodeId) -> Option<FhirValue> {
        if let Some(value) = state.binding_value(node) {
            return Some(value.clone());
        }
        let id = node.as_ref()?;
        self.external(id).map(|binding| binding.value.clone())
    }

    fn external(&self, id: &BindingId) -> Option<&ExternalBinding> {
        self.externals.iter().find(|binding| &binding.id == id)
    }

    fn expression_of<'a>(&self, state: &'a ProgramState, node: &NodeId) -> Result<&'a Vec<Token>> {
        state
            .expression(node)
            .ok_or_else(|| Error::BindingNotFound(node_label(node).to_string()))
    }

    /// Type of the first `up_to` tokens of `node`. An empty prefix has the
    /// context type.
    pub fn expression_type_at(&self, state: &ProgramState, node: &NodeId, up_to: usize) -> Result<Type> {
        let expression = self.expression_of(state, node)?;
        let prefix = &expression[..up_to.min(expression.len())];
        if prefix.is_empty() {
            return Ok(self.context.ty.clone());
        }
        Ok(self.compute_type(&state.program, &state.types, node, prefix))
    }

    /// Value of the first `up_to` tokens of `node`. An empty prefix has the
    /// context value.
    pub fn expression_value_at(&self, state: &ProgramState, node: &NodeId, up_to: usize) -> Result<FhirValue> {
        let expression = self.expression_of(state, node)?;
        let prefix = &expression[..up_to.min(expression.len())];
        if prefix.is_empty() {
            return Ok(self.context.value.clone());
        }
        if self.options.is_lambda {
            return Ok(FhirValue::empty());
        }
        Ok(self.evaluate(&state.program, &state.graph, node, prefix))
    }

    /// Variables `node` may reference: externals, then locals other than
    /// `node` and the bindings that depend on it. Locals declared at or after
    /// `node` are listed out of scope.
    pub fn variable_candidates(&self, state: &ProgramState, node: &NodeId) -> Vec<VariableCandidate> {
        let dependents = state.graph.transitive_dependents(node);
        let position = match node {
            None => state.program.bindings.len(),
            Some(id) => state.program.position(id).unwrap_or(0),
        };

        let externals = self.externals.iter().map(|binding| VariableCandidate {
            name: binding.name.clone(),
            ty: binding.ty.clone(),
            in_scope: true,
        });
        let locals = state
            .program
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| {
                let id = Some(binding.id.clone());
                &id != node && !dependents.contains(&id)
            })
            .map(|(index, binding)| VariableCandidate {
                name: binding.name.clone(),
                ty: state
                    .types
                    .get(&Some(binding.id.clone()))
                    .cloned()
                    .unwrap_or_else(|| Type::invalid("Binding is not typed")),
                in_scope: index < position,
            });
        externals.chain(locals).collect()
    }

    /// The variables `node` can reference right now.
    pub fn bindable_bindings(&self, state: &ProgramState, node: &NodeId) -> Vec<VariableCandidate> {
        self.variable_candidates(state, node)
            .into_iter()
            .filter(|candidate| candidate.in_scope)
            .collect()
    }

    /// Local bindings `node` depends on, in declaration order.
    pub fn depending_bindings<'a>(&self, state: &'a ProgramState, node: &NodeId) -> Vec<&'a LocalBinding> {
        let dependencies = state.graph.transitive_dependencies(node);
        state
            .program
            .bindings
            .iter()
            .filter(|binding| dependencies.contains(&binding.id))
            .collect()
    }

    /// Nodes that depend on `node`, including the main expression.
    pub fn dependant_binding_ids(&self, state: &ProgramState, node: &NodeId) -> IndexSet<NodeId> {
        state.graph.transitive_dependents(node)
    }

    /// Evaluation order of all nodes.
    pub fn bindings_order(&self, state: &ProgramState) -> Vec<NodeId> {
        state.graph.walk()
    }

    pub fn is_binding_name_unique(&self, state: &ProgramState, name: &str, exclude: Option<&BindingId>) -> bool {
        self.is_name_free(&state.program, name, exclude)
    }

    fn with_suggest_env<R>(&self, state: &ProgramState, node: &NodeId, f: impl FnOnce(&SuggestEnv) -> R) -> R {
        let scope = self.scope_types(&state.program, &state.types, node);
        let variables = self.variable_candidates(state, node);
        let env = SuggestEnv {
            types: TypeEnv::new(&self.context.ty, &scope, &self.questionnaire_items),
            variables: &variables,
            now: chrono::Local::now().naive_local(),
        };
        f(&env)
    }

    pub fn suggest_next_tokens(&self, state: &ProgramState, node: &NodeId) -> Result<Vec<SuggestedToken>> {
        let expression = self.expression_of(state, node)?;
        Ok(self.with_suggest_env(state, node, |env| {
            self.analyzer.suggest_next_tokens(expression, env)
        }))
    }

    pub fn suggest_tokens_at(&self, state: &ProgramState, node: &NodeId, index: usize) -> Result<Vec<SuggestedToken>> {
        let expression = self.expression_of(state, node)?;
        if index >= expression.len() {
            return Err(Error::TokenNotFound(index));
        }
        Ok(self.with_suggest_env(state, node, |env| {
            self.analyzer.suggest_tokens_at(index, expression, env)
        }))
    }

    /// The `$this` type argument `arg_index` of the function at
    /// `token_index` is edited under.
    pub fn argument_context_type(
        &self,
        state: &ProgramState,
        node: &NodeId,
        token_index: usize,
        arg_index: usize,
    ) -> Result<Type> {
        let expression = self.expression_of(state, node)?;
        let scope = self.scope_types(&state.program, &state.types, node);
        let env = TypeEnv::new(&self.context.ty, &scope, &self.questionnaire_items);
        self.analyzer
            .argument_context_type(expression, token_index, arg_index, &env)
    }

    /// Argument program of a function token; missing arguments are empty.
    pub fn argument(&self, state: &ProgramState, node: &NodeId, token_index: usize, arg_index: usize) -> Result<Program> {
        let expression = self.expression_of(state, node)?;
        match expression.get(token_index) {
            Some(Token::Function { args, .. }) => Ok(args.get(arg_index).cloned().flatten().unwrap_or_default()),
            Some(_) => Err(Error::NotAFunction(token_index)),
            None => Err(Error::TokenNotFound(token_index)),
        }
    }
}

fn node_label(node: &NodeId) -> &str {
    node.as_ref().map_or("main", BindingId::as_str)
}

fn names_visible(tokens: &[Token], visible: &HashSet<&str>) -> bool {
    extract_referenced_names(tokens)
        .iter()
        .all(|name| visible.contains(name.as_str()))
}

/// Bump the trailing number of `name`, or append `1`.
fn next_name(name: &str) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    match name[stem.len()..].parse::<u64>() {
        Ok(number) => format!("{}{}", stem, number + 1),
        Err(_) => format!("{}1", name),
    }
}

/// Rewrite references to `old` as `new`, stopping where a nested argument
/// program declares its own `old`.
/// Rewrites `Variable(old)` tokens; returns whether any token changed.
fn rename_variable(expression: &mut [Token], old: &str, new: &str) -> bool {
    let mut renamed = false;
    for token in expression {
        match token {
            Token::Variable(name) if name == old => {
                *name = new.to_string();
                renamed = true;
            }
            Token::Function { args, .. } => {
                for program in args.iter_mut().flatten() {
                    renamed |= rename_in_program(program, old, new);
                }
            }
            _ => {}
        }
    }
    renamed
}

fn rename_in_program(program: &mut Program, old: &str, new: &str) -> bool {
    let mut renamed = false;
    for binding in &mut program.bindings {
        renamed |= rename_variable(&mut binding.expression, old, new);
        if binding.name == old {
            return renamed;
        }
    }
    renamed | rename_variable(&mut program.expression, old, new)
}
