//! Binding dependency graph
//!
//! Derived from token content and rebuilt on every edit. Bindings are scoped
//! sequentially: a binding can only see bindings declared before it, while the
//! main expression (node `None`) sees all of them. Edges therefore always
//! point backwards in declaration order and the graph is acyclic.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::token::{BindingId, LocalBinding, NodeId, Program, Token};

/// Direct references of every node, in declaration order with the main
/// expression last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    edges: IndexMap<NodeId, IndexSet<BindingId>>,
}

impl DependencyGraph {
    pub fn build(program: &Program) -> Self {
        let mut edges = IndexMap::with_capacity(program.bindings.len() + 1);
        let mut scope: HashMap<&str, &BindingId> = HashMap::new();

        for binding in &program.bindings {
            let dependencies = resolve_names(&binding.expression, &scope);
            edges.insert(Some(binding.id.clone()), dependencies);
            scope.insert(binding.name.as_str(), &binding.id);
        }
        edges.insert(None, resolve_names(&program.expression, &scope));

        Self { edges }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.edges.keys()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Bindings `node` references directly.
    pub fn dependencies(&self, node: &NodeId) -> impl Iterator<Item = &BindingId> {
        self.edges.get(node).into_iter().flatten()
    }

    /// Every binding `node` depends on, directly or not.
    pub fn transitive_dependencies(&self, node: &NodeId) -> IndexSet<BindingId> {
        let mut result = IndexSet::new();
        let mut stack: Vec<&BindingId> = self.dependencies(node).collect();
        while let Some(id) = stack.pop() {
            if result.insert(id.clone()) {
                stack.extend(self.dependencies(&Some(id.clone())));
            }
        }
        result
    }

    /// Every node that depends on `node`, directly or not.
    pub fn transitive_dependents(&self, node: &NodeId) -> IndexSet<NodeId> {
        let mut result = IndexSet::new();
        let Some(id) = node else {
            return result;
        };
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for (dependent, dependencies) in &self.edges {
                if dependencies.contains(current) && result.insert(dependent.clone()) {
                    if let Some(dependent_id) = dependent {
                        queue.push_back(dependent_id);
                    }
                }
            }
        }
        result
    }

    /// Topological order: a node comes after everything it depends on, ties
    /// are broken by declaration order, the main expression comes last.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.edges.len());
        let mut visited: HashSet<Option<&BindingId>> = HashSet::with_capacity(self.edges.len());

        while order.len() < self.edges.len() {
            let next = self.edges.iter().find(|(node, dependencies)| {
                !visited.contains(&node.as_ref())
                    && dependencies.iter().all(|dep| visited.contains(&Some(dep)))
            });
            let Some((node, _)) = next else {
                warn!("Dependency graph has unreachable nodes, stopping walk");
                break;
            };
            visited.insert(node.as_ref());
            order.push(node.clone());
        }
        order
    }

    /// `changed` plus all their dependents, in walk order.
    pub fn affected(&self, changed: &[NodeId]) -> Vec<NodeId> {
        let mut affected: HashSet<NodeId> = changed.iter().cloned().collect();
        for node in changed {
            affected.extend(self.transitive_dependents(node));
        }
        self.walk()
            .into_iter()
            .filter(|node| affected.contains(node))
            .collect()
    }
}

fn resolve_names(expression: &[Token], scope: &HashMap<&str, &BindingId>) -> IndexSet<BindingId> {
    extract_referenced_names(expression)
        .iter()
        .filter_map(|name| scope.get(name.as_str()).map(|&id| id.clone()))
        .collect()
}

/// Names of every variable `expression` reads, including inside function
/// arguments. Names declared by an argument's own bindings shadow outer ones.
pub fn extract_referenced_names(expression: &[Token]) -> IndexSet<String> {
    let mut names = IndexSet::new();
    collect_names(expression, &HashSet::new(), &mut names);
    names
}

fn collect_names(expression: &[Token], shadowed: &HashSet<String>, out: &mut IndexSet<String>) {
    for token in expression {
        match token {
            Token::Variable(name) if !shadowed.contains(name) => {
                out.insert(name.clone());
            }
            Token::Function { args, .. } => {
                for program in args.iter().flatten() {
                    collect_program_names(program, shadowed, out);
                }
            }
            _ => {}
        }
    }
}

fn collect_program_names(program: &Program, shadowed: &HashSet<String>, out: &mut IndexSet<String>) {
    if program.bindings.is_empty() {
        collect_names(&program.expression, shadowed, out);
        return;
    }
    let mut inner = shadowed.clone();
    for binding in &program.bindings {
        collect_names(&binding.expression, &inner, out);
        inner.insert(binding.name.clone());
    }
    collect_names(&program.expression, &inner, out);
}

/// Ids of the `candidates` that `expression` references by name.
pub fn extract_referenced_bindings(expression: &[Token], candidates: &[LocalBinding]) -> IndexSet<BindingId> {
    let names = extract_referenced_names(expression);
    candidates
        .iter()
        .filter(|binding| names.contains(&binding.name))
        .map(|binding| binding.id.clone())
        .collect()
}

/// Whether the binding at `from` can move to position `to` without ending up
/// before a binding it references or after a binding that references it.
/// A `to` past the end means the last position.
pub fn can_move_binding(bindings: &[LocalBinding], from: usize, to: usize) -> bool {
    let Some(binding) = bindings.get(from) else {
        return false;
    };
    let to = to.min(bindings.len() - 1);

    if to < from {
        let references = extract_referenced_names(&binding.expression);
        !bindings[to..from]
            .iter()
            .any(|other| references.contains(&other.name))
    } else if to > from {
        !bindings[from + 1..=to]
            .iter()
            .any(|other| extract_referenced_names(&other.expression).contains(&binding.name))
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorName;

    fn binding(id: &str, name: &str, expression: Vec<Token>) -> LocalBinding {
        LocalBinding {
            id: BindingId::new(id),
            name: name.to_string(),
            expression,
        }
    }

    fn node(id: &str) -> NodeId {
        Some(BindingId::new(id))
    }

    /// a = 1; b = %a + 1; c = 2; main = %b + %c
    fn program() -> Program {
        Program::new(
            vec![
                binding("a", "a", vec![Token::number("1")]),
                binding(
                    "b",
                    "b",
                    vec![
                        Token::variable("a"),
                        Token::Operator(OperatorName::Plus),
                        Token::number("1"),
                    ],
                ),
                binding("c", "c", vec![Token::number("2")]),
            ],
            vec![
                Token::variable("b"),
                Token::Operator(OperatorName::Plus),
                Token::variable("c"),
            ],
        )
    }

    #[test]
    fn test_edges_follow_sequential_scope() {
        let mut program = program();
        // forward reference from a to c is not an edge
        program.bindings[0].expression = vec![Token::variable("c")];
        let graph = DependencyGraph::build(&program);

        assert_eq!(graph.dependencies(&node("a")).count(), 0);
        assert_eq!(
            graph.dependencies(&node("b")).cloned().collect::<Vec<_>>(),
            vec![BindingId::new("a")]
        );
        assert_eq!(graph.dependencies(&None).count(), 2);
        assert_eq!(graph.nodes().last(), Some(&None));
    }

    #[test]
    fn test_transitive_queries() {
        let graph = DependencyGraph::build(&program());
        let dependencies = graph.transitive_dependencies(&None);
        assert!(dependencies.contains(&BindingId::new("a")));
        assert_eq!(dependencies.len(), 3);

        let dependents = graph.transitive_dependents(&node("a"));
        assert_eq!(dependents.len(), 2);
        assert!(dependents.contains(&node("b")));
        assert!(dependents.contains(&None));
        assert!(graph.transitive_dependents(&None).is_empty());
    }

    #[test]
    fn test_walk_and_affected() {
        let graph = DependencyGraph::build(&program());
        assert_eq!(graph.walk(), vec![node("a"), node("b"), node("c"), None]);
        assert_eq!(graph.affected(&[node("a")]), vec![node("a"), node("b"), None]);
        assert_eq!(graph.affected(&[node("c")]), vec![node("c"), None]);
    }

    #[test]
    fn test_nested_arguments_and_shadowing() {
        let inner = Program::new(
            vec![binding("x", "a", vec![Token::variable("b")])],
            vec![Token::variable("a"), Token::variable("c")],
        );
        let expression = vec![Token::field("name"), Token::function("select", vec![Some(inner), None])];
        let names = extract_referenced_names(&expression);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_can_move_binding() {
        let bindings = program().bindings;
        // a cannot move below b, which references it
        assert!(!can_move_binding(&bindings, 0, 1));
        assert!(!can_move_binding(&bindings, 0, 2));
        // b cannot move above a
        assert!(!can_move_binding(&bindings, 1, 0));
        assert!(can_move_binding(&bindings, 1, 2));
        assert!(can_move_binding(&bindings, 2, 0));
        // out of range targets clamp to the end
        assert!(can_move_binding(&bindings, 1, 10));
        assert!(!can_move_binding(&bindings, 0, 10));
        assert!(!can_move_binding(&bindings, 5, 0));
    }
}
