//! Operator tree over a flat token list
//!
//! Precedence climbing splits an expression at its operators. The leaves are
//! borrowed chains (runs of non-operator tokens), so building a tree never
//! copies tokens. A missing operand becomes an empty chain instead of an
//! error, since expressions are usually incomplete while being edited.

use crate::operators::{Associativity, OperatorName};
use crate::token::Token;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorTree<'a> {
    Chain(&'a [Token]),
    Binary {
        operator: OperatorName,
        left: Box<OperatorTree<'a>>,
        right: Box<OperatorTree<'a>>,
    },
}

impl<'a> OperatorTree<'a> {
    pub fn is_chain(&self) -> bool {
        matches!(self, OperatorTree::Chain(_))
    }
}

pub fn build_operator_tree(tokens: &[Token]) -> OperatorTree<'_> {
    let mut builder = TreeBuilder { tokens, pos: 0 };
    builder.parse_expression(0)
}

struct TreeBuilder<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TreeBuilder<'a> {
    fn peek_operator(&self) -> Option<OperatorName> {
        self.tokens.get(self.pos).and_then(Token::operator)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_chain(&mut self) -> OperatorTree<'a> {
        let start = self.pos;
        while !self.at_end() && self.peek_operator().is_none() {
            self.pos += 1;
        }
        OperatorTree::Chain(&self.tokens[start..self.pos])
    }

    fn parse_expression(&mut self, min_priority: u8) -> OperatorTree<'a> {
        let mut left = self.parse_chain();

        while let Some(operator) = self.peek_operator() {
            let precedence = operator.precedence();
            if precedence.priority < min_priority {
                break;
            }
            self.pos += 1;

            let right = if self.at_end() || self.peek_operator().is_some() {
                OperatorTree::Chain(&[])
            } else {
                let next_min = match precedence.associativity {
                    Associativity::Left => precedence.priority + 1,
                    Associativity::Right => precedence.priority,
                };
                self.parse_expression(next_min)
            };

            left = OperatorTree::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        left
    }
}
