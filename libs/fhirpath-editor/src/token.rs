//! Token model for structured expressions
//!
//! An expression is a flat token list edited one token at a time. Tokens keep
//! raw values; what a token means depends on where it sits in the list.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operators::OperatorName;
use crate::types::Type;

/// One editor token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Token {
    /// Raw number text; a `.` makes it a decimal
    Number(String),
    String(String),
    Boolean(bool),
    /// `YYYY-MM-DD`
    Date(String),
    /// `YYYY-MM-DDTHH:MM[:SS]`
    DateTime(String),
    /// `HH:MM[:SS]`
    Time(String),
    Quantity {
        value: String,
        unit: String,
    },
    #[serde(rename = "type")]
    TypeValue(Type),
    Index(usize),
    Operator(OperatorName),
    Variable(String),
    Field(String),
    Function {
        name: String,
        args: Vec<Option<Program>>,
    },
    Answer(String),
}

/// Token kinds, in the order suggestion lists present them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Field,
    Function,
    Variable,
    Type,
    Answer,
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    Quantity,
    Time,
    Index,
    Operator,
}

impl TokenKind {
    /// Kinds that start a fresh chain, including after an operator.
    pub const START: [TokenKind; 12] = [
        TokenKind::Field,
        TokenKind::Function,
        TokenKind::Variable,
        TokenKind::Type,
        TokenKind::Answer,
        TokenKind::String,
        TokenKind::Number,
        TokenKind::Boolean,
        TokenKind::Date,
        TokenKind::DateTime,
        TokenKind::Quantity,
        TokenKind::Time,
    ];

    /// Kinds allowed after a complete value.
    pub const CONTINUATION: [TokenKind; 4] = [
        TokenKind::Field,
        TokenKind::Function,
        TokenKind::Index,
        TokenKind::Operator,
    ];

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Number
                | TokenKind::Boolean
                | TokenKind::Date
                | TokenKind::DateTime
                | TokenKind::Quantity
                | TokenKind::Time
        )
    }
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Number(_) => TokenKind::Number,
            Token::String(_) => TokenKind::String,
            Token::Boolean(_) => TokenKind::Boolean,
            Token::Date(_) => TokenKind::Date,
            Token::DateTime(_) => TokenKind::DateTime,
            Token::Time(_) => TokenKind::Time,
            Token::Quantity { .. } => TokenKind::Quantity,
            Token::TypeValue(_) => TokenKind::Type,
            Token::Index(_) => TokenKind::Index,
            Token::Operator(_) => TokenKind::Operator,
            Token::Variable(_) => TokenKind::Variable,
            Token::Field(_) => TokenKind::Field,
            Token::Function { .. } => TokenKind::Function,
            Token::Answer(_) => TokenKind::Answer,
        }
    }

    pub fn operator(&self) -> Option<OperatorName> {
        match self {
            Token::Operator(name) => Some(*name),
            _ => None,
        }
    }

    pub fn field(name: impl Into<String>) -> Token {
        Token::Field(name.into())
    }

    pub fn variable(name: impl Into<String>) -> Token {
        Token::Variable(name.into())
    }

    pub fn number(value: impl Into<String>) -> Token {
        Token::Number(value.into())
    }

    pub fn string(value: impl Into<String>) -> Token {
        Token::String(value.into())
    }

    pub fn function(name: impl Into<String>, args: Vec<Option<Program>>) -> Token {
        Token::Function {
            name: name.into(),
            args,
        }
    }
}

/// Stable identity of a local binding, independent of its (renamable) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(pub String);

impl BindingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("binding-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node of the dependency graph: a local binding, or `None` for the main
/// expression.
pub type NodeId = Option<BindingId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBinding {
    pub id: BindingId,
    pub name: String,
    #[serde(default)]
    pub expression: Vec<Token>,
}

impl LocalBinding {
    pub fn new(name: impl Into<String>, expression: Vec<Token>) -> Self {
        Self {
            id: BindingId::generate(),
            name: name.into(),
            expression,
        }
    }
}

/// Bindings declared in order, followed by the main expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub bindings: Vec<LocalBinding>,
    #[serde(default)]
    pub expression: Vec<Token>,
}

impl Program {
    pub fn new(bindings: Vec<LocalBinding>, expression: Vec<Token>) -> Self {
        Self {
            bindings,
            expression,
        }
    }

    /// A program with no bindings.
    pub fn expression(expression: Vec<Token>) -> Self {
        Self::new(Vec::new(), expression)
    }

    pub fn binding(&self, id: &BindingId) -> Option<&LocalBinding> {
        self.bindings.iter().find(|b| &b.id == id)
    }

    pub fn position(&self, id: &BindingId) -> Option<usize> {
        self.bindings.iter().position(|b| &b.id == id)
    }

    /// Expression of a graph node.
    pub fn node_expression(&self, node: &NodeId) -> Option<&Vec<Token>> {
        match node {
            None => Some(&self.expression),
            Some(id) => self.binding(id).map(|b| &b.expression),
        }
    }

    pub fn node_expression_mut(&mut self, node: &NodeId) -> Option<&mut Vec<Token>> {
        match node {
            None => Some(&mut self.expression),
            Some(id) => self
                .bindings
                .iter_mut()
                .find(|b| &b.id == id)
                .map(|b| &mut b.expression),
        }
    }
}
