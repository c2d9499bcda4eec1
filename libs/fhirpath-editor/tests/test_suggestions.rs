//! Integration tests for next-token suggestions through the store

use std::collections::HashSet;
use std::sync::Arc;

use ferrum_fhirpath_editor::{
    BindingId, Context, FhirPrimitive, LocalBinding, OperatorName, Program, ProgramStore,
    StoreOptions, SuggestedToken, Token, TokenKind, Type,
};

mod test_support;

use test_support::EchoEvaluator;

fn binding(id: &str, name: &str, expression: Vec<Token>) -> LocalBinding {
    LocalBinding {
        id: BindingId::new(id),
        name: name.to_string(),
        expression,
    }
}

fn find<'a>(suggestions: &'a [SuggestedToken], token: &Token) -> &'a SuggestedToken {
    suggestions
        .iter()
        .find(|suggestion| &suggestion.token == token)
        .unwrap_or_else(|| panic!("{:?} was not suggested", token))
}

#[test]
fn test_empty_expression_offers_start_kinds() {
    let (store, _) = test_support::store();
    let state = store.load(Program::default());
    let suggestions = store.suggest_next_tokens(&state, &None).unwrap();

    let kinds: HashSet<TokenKind> = suggestions.iter().map(|s| s.token.kind()).collect();
    for kind in TokenKind::START {
        // answers need a QuestionnaireResponse context
        if kind != TokenKind::Answer {
            assert!(kinds.contains(&kind), "missing {:?}", kind);
        }
    }
    assert!(!kinds.contains(&TokenKind::Operator));
    assert!(!kinds.contains(&TokenKind::Index));

    let birth_date = find(&suggestions, &Token::field("birthDate"));
    assert_eq!(
        birth_date.type_hint,
        Some(Type::single(Type::Primitive(FhirPrimitive::Date)))
    );
}

#[test]
fn test_continuation_after_field() {
    let (store, _) = test_support::store();
    let state = store.load(Program::expression(vec![
        Token::variable("patient"),
        Token::field("name"),
    ]));
    let suggestions = store.suggest_next_tokens(&state, &None).unwrap();

    assert_eq!(
        find(&suggestions, &Token::field("family")).type_hint,
        Some(Type::Primitive(FhirPrimitive::String))
    );
    assert!(!find(&suggestions, &Token::Index(0)).incompatible);
    assert!(find(&suggestions, &Token::function("upper", Vec::new())).incompatible);
    assert!(!find(&suggestions, &Token::function("first", Vec::new())).incompatible);
    assert!(!find(&suggestions, &Token::Operator(OperatorName::Union)).incompatible);
    assert!(!suggestions.iter().any(|s| s.token.kind() == TokenKind::Variable));
}

#[test]
fn test_right_operand_is_checked_against_left() {
    let (store, _) = test_support::store();
    let state = store.load(Program::new(
        vec![
            binding("n", "n", vec![Token::number("1")]),
            binding("s", "s", vec![Token::string("x")]),
        ],
        vec![Token::variable("n"), Token::Operator(OperatorName::Minus)],
    ));
    let suggestions = store.suggest_next_tokens(&state, &None).unwrap();

    assert!(!find(&suggestions, &Token::variable("n")).incompatible);
    assert!(find(&suggestions, &Token::variable("s")).incompatible);
    assert!(!find(&suggestions, &Token::number("0")).incompatible);
    assert!(find(&suggestions, &Token::string("")).incompatible);
}

#[test]
fn test_variables_respect_declaration_order() {
    let (store, _) = test_support::store();
    let state = store.load(Program::new(
        vec![
            binding("a", "a", vec![Token::number("1")]),
            binding("b", "b", vec![Token::variable("a")]),
            binding("c", "c", vec![Token::number("2")]),
        ],
        Vec::new(),
    ));

    let suggestions = store.suggest_next_tokens(&state, &Some(BindingId::new("a"))).unwrap();
    // b depends on a, so it is never offered; c is declared later
    assert!(!suggestions.iter().any(|s| s.token == Token::variable("b")));
    assert!(!suggestions.iter().any(|s| s.token == Token::variable("a")));
    assert!(find(&suggestions, &Token::variable("c")).incompatible);
    assert!(!find(&suggestions, &Token::variable("patient")).incompatible);

    let suggestions = store.suggest_next_tokens(&state, &None).unwrap();
    for name in ["a", "b", "c"] {
        assert!(!find(&suggestions, &Token::variable(name)).incompatible);
    }
}

#[test]
fn test_answers_in_response_context() {
    let store = ProgramStore::new(
        test_support::analyzer(),
        Arc::new(EchoEvaluator::default()),
        Context::typed(Type::single(Type::schema_ref(["QuestionnaireResponse"]))),
        test_support::externals(),
        StoreOptions::default(),
    );
    let state = store.load(Program::default());
    let suggestions = store.suggest_next_tokens(&state, &None).unwrap();

    let answers: Vec<&SuggestedToken> = suggestions
        .iter()
        .filter(|s| s.token.kind() == TokenKind::Answer)
        .collect();
    assert_eq!(answers.len(), 3);
    assert_eq!(
        find(&suggestions, &Token::Answer("pain".into())).type_hint,
        Some(Type::single(Type::Primitive(FhirPrimitive::Decimal)))
    );
}

#[test]
fn test_alternatives_for_existing_token() {
    let (store, _) = test_support::store();
    let state = store.load(Program::expression(vec![
        Token::variable("patient"),
        Token::field("name"),
    ]));

    let fields = store.suggest_tokens_at(&state, &None, 1).unwrap();
    assert!(fields.iter().all(|s| s.token.kind() == TokenKind::Field));
    assert!(fields.iter().any(|s| s.token == Token::field("birthDate")));

    let variables = store.suggest_tokens_at(&state, &None, 0).unwrap();
    assert!(variables.iter().all(|s| s.token.kind() == TokenKind::Variable));
    assert_eq!(variables.len(), 3);

    assert!(store.suggest_tokens_at(&state, &None, 2).is_err());
}

#[test]
fn test_argument_context() {
    let (store, _) = test_support::store();
    let state = store.load(Program::expression(vec![
        Token::field("name"),
        Token::function("where", Vec::new()),
        Token::field("family"),
    ]));

    assert_eq!(
        store.argument_context_type(&state, &None, 1, 0),
        Ok(Type::single(Type::schema_ref(["HumanName"])))
    );
    assert!(store.argument_context_type(&state, &None, 2, 0).is_err());
    assert!(store.argument_context_type(&state, &None, 1, 3).is_err());
}
