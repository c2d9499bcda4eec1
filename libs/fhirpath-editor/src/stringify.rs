//! FHIRPath text for token programs
//!
//! The external evaluator only understands FHIRPath source, so programs are
//! rendered to text before evaluation. Local bindings become a chain of
//! `defineVariable` calls closed by `select(main)`.

use std::fmt::Write;

use crate::questionnaire::QuestionnaireItemRegistry;
use crate::token::{LocalBinding, Program, Token};
use crate::types::Type;

pub fn stringify_program(program: &Program, items: &QuestionnaireItemRegistry) -> String {
    let main = stringify_expression(&program.expression, items);
    if program.bindings.is_empty() {
        return main;
    }
    let bindings: Vec<String> = program
        .bindings
        .iter()
        .map(|binding| stringify_binding(binding, items))
        .collect();
    format!("{}.\nselect({})", bindings.join(".\n"), main)
}

pub fn stringify_binding(binding: &LocalBinding, items: &QuestionnaireItemRegistry) -> String {
    let name = escape(&binding.name);
    if binding.expression.is_empty() {
        format!("defineVariable('{}')", name)
    } else {
        format!(
            "defineVariable('{}', {})",
            name,
            stringify_expression(&binding.expression, items)
        )
    }
}

pub fn stringify_expression(expression: &[Token], items: &QuestionnaireItemRegistry) -> String {
    let mut out = String::new();
    let mut leading = true;
    for token in expression {
        write_token(&mut out, token, leading, items);
        leading = token.operator().is_some();
    }
    out.trim().to_string()
}

/// Name of a type as FHIRPath writes it after `is` / `as`.
pub fn stringify_type_value(ty: &Type) -> String {
    match ty {
        Type::Primitive(primitive) => primitive.code().to_string(),
        Type::FhirSchemaRef(path) => path.join("."),
        other => other.to_string(),
    }
}

fn write_token(out: &mut String, token: &Token, leading: bool, items: &QuestionnaireItemRegistry) {
    let dot = if leading { "" } else { "." };
    // Writing to a String cannot fail.
    let _ = match token {
        Token::Number(value) => out.write_str(or_zero(value)),
        Token::String(value) => write!(out, "'{}'", escape(value)),
        Token::Boolean(value) => write!(out, "{}", value),
        Token::Date(value) | Token::DateTime(value) => write!(out, "@{}", value),
        Token::Time(value) => write!(out, "@T{}", value),
        Token::Quantity { value, unit } => write!(out, "{} '{}'", or_zero(value), escape(unit)),
        Token::TypeValue(ty) => out.write_str(&stringify_type_value(ty)),
        Token::Index(index) => write!(out, "[{}]", index),
        Token::Operator(name) => write!(out, " {} ", name.symbol()),
        Token::Variable(name) => write!(out, "%{}", name),
        Token::Field(name) => write!(out, "{}{}", dot, name),
        Token::Function { name, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|arg| match arg {
                    Some(program) => stringify_program(program, items),
                    None => "{}".to_string(),
                })
                .collect();
            write!(out, "{}{}({})", dot, name, args.join(", "))
        }
        Token::Answer(link_id) => {
            let suffix = match items.get(link_id) {
                Some(item) if item.is_choice() => ".ordinal()",
                Some(item) if item.is_quantity() => ".value",
                _ => "",
            };
            write!(
                out,
                "{}repeat(item).where(linkId = '{}').answer.value{}",
                dot,
                escape(link_id),
                suffix
            )
        }
    };
}

fn or_zero(value: &str) -> &str {
    if value.is_empty() {
        "0"
    } else {
        value
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
