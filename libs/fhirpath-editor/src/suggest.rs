//! Next-token suggestions
//!
//! Suggestions are computed from the tokens before the cursor. After a value
//! the chain can be continued; after an operator (or at the start) a fresh
//! operand begins. Every candidate is listed. Candidates that would not type
//! check are flagged `incompatible` rather than hidden.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::analyzer::{Analyzer, TypeEnv};
use crate::operators::OperatorName;
use crate::token::{Token, TokenKind};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedToken {
    pub token: Token,
    /// Type of the candidate where it is known up front
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<Type>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub incompatible: bool,
}

impl SuggestedToken {
    fn new(token: Token, type_hint: Option<Type>, incompatible: bool) -> Self {
        Self {
            token,
            type_hint,
            incompatible,
        }
    }
}

/// A variable that can be offered at the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableCandidate {
    pub name: String,
    pub ty: Type,
    /// False for locals declared at or after the edited binding
    pub in_scope: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SuggestEnv<'a> {
    pub types: TypeEnv<'a>,
    pub variables: &'a [VariableCandidate],
    /// Seed for date and time literals
    pub now: NaiveDateTime,
}

/// Kinds allowed next, and the tokens they are typed against.
#[derive(Debug, Clone, PartialEq)]
pub struct NextTokenKinds<'a> {
    pub kinds: &'static [TokenKind],
    /// The chain being continued, or the left operand of `operator`
    pub context: &'a [Token],
    pub operator: Option<OperatorName>,
}

pub fn suggest_next_token_kinds(preceding: &[Token]) -> NextTokenKinds<'_> {
    match preceding.last() {
        None => NextTokenKinds {
            kinds: &TokenKind::START,
            context: &[],
            operator: None,
        },
        Some(Token::Operator(operator)) => NextTokenKinds {
            kinds: &TokenKind::START,
            context: left_operand(preceding, *operator),
            operator: Some(*operator),
        },
        Some(_) => {
            let start = preceding
                .iter()
                .rposition(|token| token.operator().is_some())
                .map_or(0, |position| position + 1);
            NextTokenKinds {
                kinds: &TokenKind::CONTINUATION,
                context: &preceding[start..],
                operator: None,
            }
        }
    }
}

/// Tokens of the left operand of the trailing `operator`: everything back to
/// the nearest operator that binds more loosely.
fn left_operand(tokens: &[Token], operator: OperatorName) -> &[Token] {
    let end = tokens.len().saturating_sub(1);
    let precedence = operator.precedence();
    let start = tokens[..end]
        .iter()
        .rposition(|token| {
            token.operator().is_some_and(|other| {
                let other = other.precedence();
                other.priority < precedence.priority
                    || (other.priority == precedence.priority
                        && other.associativity != precedence.associativity)
            })
        })
        .map_or(0, |position| position + 1);
    &tokens[start..end]
}

/// What candidates are typed against.
struct SuggestionScope {
    /// Receiver of fields, functions and operators
    input: Type,
    /// Right operand types accepted after an operator
    expected: Option<Type>,
}

impl Analyzer {
    pub fn suggest_next_tokens(&self, expression: &[Token], env: &SuggestEnv) -> Vec<SuggestedToken> {
        let next = suggest_next_token_kinds(expression);
        let scope = self.suggestion_scope(&next, env);
        next.kinds
            .iter()
            .flat_map(|kind| self.to_tokens(*kind, &scope, env))
            .collect()
    }

    /// Alternatives for the token at `index`, restricted to its kind.
    pub fn suggest_tokens_at(
        &self,
        index: usize,
        expression: &[Token],
        env: &SuggestEnv,
    ) -> Vec<SuggestedToken> {
        let Some(token) = expression.get(index) else {
            return Vec::new();
        };
        let next = suggest_next_token_kinds(&expression[..index]);
        let kind = token.kind();
        if !next.kinds.contains(&kind) {
            return Vec::new();
        }
        let scope = self.suggestion_scope(&next, env);
        self.to_tokens(kind, &scope, env)
    }

    fn suggestion_scope(&self, next: &NextTokenKinds, env: &SuggestEnv) -> SuggestionScope {
        let context_type = env.types.context_type.clone();
        match next.operator {
            Some(operator) => SuggestionScope {
                input: context_type,
                expected: self.expected_right_type(operator, next.context, env),
            },
            None if next.context.is_empty() => SuggestionScope {
                input: context_type,
                expected: None,
            },
            None => SuggestionScope {
                input: self.expression_type(next.context, &env.types),
                expected: None,
            },
        }
    }

    fn expected_right_type(
        &self,
        operator: OperatorName,
        left: &[Token],
        env: &SuggestEnv,
    ) -> Option<Type> {
        if left.is_empty() {
            return None;
        }
        let left = self.expression_type(left, &env.types);
        if left.is_invalid() {
            return None;
        }
        match self
            .operators()
            .suggest_right_types_for_operator(self.types(), operator, &left)
        {
            Type::Choice(options) if options.is_empty() => None,
            expected => Some(expected),
        }
    }

    fn fits(&self, scope: &SuggestionScope, actual: &Type) -> bool {
        scope
            .expected
            .as_ref()
            .map_or(true, |expected| self.matches(expected, actual))
    }

    fn to_tokens(&self, kind: TokenKind, scope: &SuggestionScope, env: &SuggestEnv) -> Vec<SuggestedToken> {
        match kind {
            TokenKind::Field => self
                .fields(&scope.input)
                .into_iter()
                .map(|(name, ty)| {
                    let incompatible = !self.fits(scope, &ty);
                    SuggestedToken::new(Token::Field(name), Some(ty), incompatible)
                })
                .collect(),
            TokenKind::Function => {
                let functions = self.functions();
                functions
                    .functions()
                    .iter()
                    .map(|meta| {
                        let compatible = self.matches(&meta.input, &scope.input);
                        SuggestedToken::new(Token::function(meta.name, Vec::new()), None, !compatible)
                    })
                    .collect()
            }
            TokenKind::Operator => {
                let compatible: Vec<OperatorName> = self
                    .operators()
                    .suggest_operators_for_left_type(self.types(), &scope.input)
                    .map(|overload| overload.name)
                    .collect();
                self.operators()
                    .names()
                    .into_iter()
                    .map(|name| {
                        SuggestedToken::new(Token::Operator(name), None, !compatible.contains(&name))
                    })
                    .collect()
            }
            TokenKind::Variable => env
                .variables
                .iter()
                .map(|candidate| {
                    let incompatible = !candidate.in_scope || !self.fits(scope, &candidate.ty);
                    SuggestedToken::new(
                        Token::Variable(candidate.name.clone()),
                        Some(candidate.ty.clone()),
                        incompatible,
                    )
                })
                .collect(),
            TokenKind::Answer => {
                let response = Type::schema_ref(["QuestionnaireResponse"]);
                if !self.matches(&response, env.types.context_type) {
                    return Vec::new();
                }
                env.types
                    .questionnaire_items
                    .iter()
                    .map(|item| {
                        let incompatible = !self.fits(scope, &item.ty);
                        SuggestedToken::new(
                            Token::Answer(item.link_id().to_string()),
                            Some(item.ty.clone()),
                            incompatible,
                        )
                    })
                    .collect()
            }
            TokenKind::Index => vec![SuggestedToken::new(Token::Index(0), None, false)],
            literal => {
                let token = default_token(literal, &env.now);
                let ty = self.leading_type(&token, &env.types);
                let incompatible = ty.as_ref().is_some_and(|ty| !self.fits(scope, ty));
                vec![SuggestedToken::new(token, ty, incompatible)]
            }
        }
    }
}

/// Placeholder token for a literal kind.
fn default_token(kind: TokenKind, now: &NaiveDateTime) -> Token {
    match kind {
        TokenKind::String => Token::String(String::new()),
        TokenKind::Number => Token::Number("0".to_string()),
        TokenKind::Boolean => Token::Boolean(true),
        TokenKind::Date => Token::Date(now.format("%Y-%m-%d").to_string()),
        TokenKind::DateTime => Token::DateTime(now.format("%Y-%m-%dT%H:%M").to_string()),
        TokenKind::Time => Token::Time(now.format("%H:%M").to_string()),
        TokenKind::Quantity => Token::Quantity {
            value: "0".to_string(),
            unit: "seconds".to_string(),
        },
        TokenKind::Type => Token::TypeValue(Type::String),
        TokenKind::Index => Token::Index(0),
        TokenKind::Field => Token::Field(String::new()),
        TokenKind::Variable => Token::Variable(String::new()),
        TokenKind::Answer => Token::Answer(String::new()),
        TokenKind::Function => Token::function("", Vec::new()),
        TokenKind::Operator => Token::Operator(OperatorName::Equals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use ferrum_schema::SchemaRegistry;
    use serde_json::json;

    use crate::questionnaire::QuestionnaireItemRegistry;

    fn analyzer() -> Analyzer {
        let schema = SchemaRegistry::from_json(json!([
            {
                "id": "Patient",
                "type": "Patient",
                "elements": {
                    "name": { "type": "HumanName", "array": true },
                    "birthDate": { "type": "date", "scalar": true }
                }
            }
        ]))
        .unwrap();
        Analyzer::new(Arc::new(schema))
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .unwrap()
    }

    fn suggest(expression: &[Token], variables: &[VariableCandidate]) -> Vec<SuggestedToken> {
        let context = Type::single(Type::schema_ref(["Patient"]));
        let bindings: HashMap<String, Type> = variables
            .iter()
            .map(|v| (v.name.clone(), v.ty.clone()))
            .collect();
        let items = QuestionnaireItemRegistry::new();
        let env = SuggestEnv {
            types: TypeEnv::new(&context, &bindings, &items),
            variables,
            now: now(),
        };
        analyzer().suggest_next_tokens(expression, &env)
    }

    #[test]
    fn test_kinds_at_start_and_after_value() {
        assert_eq!(suggest_next_token_kinds(&[]).kinds, &TokenKind::START);
        let tokens = vec![Token::field("name")];
        let next = suggest_next_token_kinds(&tokens);
        assert_eq!(next.kinds, &TokenKind::CONTINUATION);
        assert_eq!(next.context, &tokens[..]);
    }

    #[test]
    fn test_left_operand_stops_at_looser_operator() {
        // 1 = 2 + 3 *
        let tokens = vec![
            Token::number("1"),
            Token::Operator(OperatorName::Equals),
            Token::number("2"),
            Token::Operator(OperatorName::Plus),
            Token::number("3"),
            Token::Operator(OperatorName::Multiply),
        ];
        let next = suggest_next_token_kinds(&tokens);
        assert_eq!(next.operator, Some(OperatorName::Multiply));
        assert_eq!(next.context, &tokens[4..5]);

        // 1 * 2 +
        let tokens = vec![
            Token::number("1"),
            Token::Operator(OperatorName::Multiply),
            Token::number("2"),
            Token::Operator(OperatorName::Plus),
        ];
        assert_eq!(suggest_next_token_kinds(&tokens).context, &tokens[0..3]);
    }

    #[test]
    fn test_literal_defaults() {
        let suggestions = suggest(&[], &[]);
        let tokens: Vec<&Token> = suggestions.iter().map(|s| &s.token).collect();
        assert!(tokens.contains(&&Token::Date("2024-03-09".into())));
        assert!(tokens.contains(&&Token::DateTime("2024-03-09T14:05".into())));
        assert!(tokens.contains(&&Token::Time("14:05".into())));
        assert!(tokens.contains(&&Token::Number("0".into())));
        assert!(!suggestions.iter().any(|s| s.token.kind() == TokenKind::Operator));
    }

    #[test]
    fn test_fields_and_functions_after_value() {
        let suggestions = suggest(&[Token::field("birthDate")], &[]);
        assert!(suggestions.iter().any(|s| s.token == Token::Index(0)));
        let upper = suggestions
            .iter()
            .find(|s| s.token == Token::function("upper", Vec::new()))
            .unwrap();
        assert!(upper.incompatible);
        let exists = suggestions
            .iter()
            .find(|s| s.token == Token::function("exists", Vec::new()))
            .unwrap();
        assert!(!exists.incompatible);
        let plus = suggestions
            .iter()
            .find(|s| s.token == Token::Operator(OperatorName::Plus))
            .unwrap();
        assert!(!plus.incompatible);
    }

    #[test]
    fn test_right_operand_compatibility() {
        let variables = vec![
            VariableCandidate {
                name: "count".into(),
                ty: Type::single(Type::Integer),
                in_scope: true,
            },
            VariableCandidate {
                name: "label".into(),
                ty: Type::single(Type::String),
                in_scope: true,
            },
            VariableCandidate {
                name: "later".into(),
                ty: Type::single(Type::Integer),
                in_scope: false,
            },
        ];
        let suggestions = suggest(
            &[Token::number("1"), Token::Operator(OperatorName::Multiply)],
            &variables,
        );
        let flag = |token: Token| {
            suggestions
                .iter()
                .find(|s| s.token == token)
                .map(|s| s.incompatible)
        };
        assert_eq!(flag(Token::variable("count")), Some(false));
        assert_eq!(flag(Token::variable("label")), Some(true));
        assert_eq!(flag(Token::variable("later")), Some(true));
        assert_eq!(flag(Token::String(String::new())), Some(true));
        assert_eq!(flag(Token::number("0")), Some(false));
    }
}
