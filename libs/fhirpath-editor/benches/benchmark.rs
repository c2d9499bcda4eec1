//! Criterion benchmarks for typing, suggestions and store edits

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use ferrum_fhirpath_editor::{
    Analyzer, Context, Edit, NoopEvaluator, OperatorName, Program, ProgramStore,
    QuestionnaireItemRegistry, StoreOptions, Token, Type, TypeEnv,
};
use ferrum_schema::SchemaRegistry;

fn create_analyzer() -> Arc<Analyzer> {
    let schema = SchemaRegistry::from_json(json!([
        {
            "id": "Patient",
            "type": "Patient",
            "elements": {
                "name": { "type": "HumanName", "array": true },
                "birthDate": { "type": "date", "scalar": true },
                "active": { "type": "boolean", "scalar": true }
            }
        },
        {
            "id": "HumanName",
            "type": "HumanName",
            "elements": {
                "family": { "type": "string", "scalar": true },
                "given": { "type": "string", "array": true }
            }
        }
    ]))
    .unwrap_or_else(|e| panic!("failed to load benchmark schemas: {}", e));
    Arc::new(Analyzer::new(Arc::new(schema)))
}

fn custom_criterion() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .warm_up_time(Duration::from_millis(100))
        .measurement_time(Duration::from_secs(1))
        .nresamples(1000)
        .noise_threshold(0.05)
}

/// name.where(given.exists()).first().family & ' ' & name[0].given.first()
fn sample_expression() -> Vec<Token> {
    vec![
        Token::field("name"),
        Token::function(
            "where",
            vec![Some(Program::expression(vec![
                Token::field("given"),
                Token::function("exists", Vec::new()),
            ]))],
        ),
        Token::function("first", Vec::new()),
        Token::field("family"),
        Token::Operator(OperatorName::Concat),
        Token::string(" "),
        Token::Operator(OperatorName::Concat),
        Token::field("name"),
        Token::Index(0),
        Token::field("given"),
        Token::function("first", Vec::new()),
    ]
}

fn bench_expression_type(c: &mut Criterion) {
    let analyzer = create_analyzer();
    let context = Type::single(Type::schema_ref(["Patient"]));
    let bindings = HashMap::new();
    let items = QuestionnaireItemRegistry::new();
    let env = TypeEnv::new(&context, &bindings, &items);
    let expression = sample_expression();

    c.bench_function("expression_type", |b| {
        b.iter(|| analyzer.expression_type(black_box(&expression), &env))
    });
}

fn bench_suggestions(c: &mut Criterion) {
    let store = ProgramStore::new(
        create_analyzer(),
        Arc::new(NoopEvaluator),
        Context::typed(Type::single(Type::schema_ref(["Patient"]))),
        Vec::new(),
        StoreOptions::default(),
    );
    let state = store.load(Program::expression(sample_expression()));

    c.bench_function("suggest_next_tokens", |b| {
        b.iter(|| store.suggest_next_tokens(black_box(&state), &None))
    });
}

fn bench_store_edits(c: &mut Criterion) {
    let store = ProgramStore::new(
        create_analyzer(),
        Arc::new(NoopEvaluator),
        Context::typed(Type::single(Type::schema_ref(["Patient"]))),
        Vec::new(),
        StoreOptions::default(),
    );
    let mut program = Program::default();
    for i in 0..10 {
        let expression = if i == 0 {
            vec![Token::number("1")]
        } else {
            vec![
                Token::variable(format!("v{}", i - 1)),
                Token::Operator(OperatorName::Plus),
                Token::number("1"),
            ]
        };
        program
            .bindings
            .push(ferrum_fhirpath_editor::LocalBinding::new(format!("v{}", i), expression));
    }
    program.expression = vec![Token::variable("v9")];
    let state = store.load(program);
    let first = state.program().bindings[0].id.clone();

    c.bench_function("update_token_with_dependents", |b| {
        b.iter(|| {
            store.apply(
                black_box(&state),
                Edit::UpdateToken {
                    node: Some(first.clone()),
                    index: 0,
                    token: Token::number("2"),
                },
            )
        })
    });

    c.bench_function("load_program", |b| {
        b.iter(|| store.load(black_box(state.program().clone())))
    });
}

criterion_group! {
    name = benches;
    config = custom_criterion();
    targets =
        bench_expression_type,
        bench_suggestions,
        bench_store_edits
}
criterion_main!(benches);
