//! Request body checks driven by the entity's validation rules.

use crate::config::{ResolvedEntity, ValidationRule};
use crate::error::AppError;
use crate::store::Record;
use regex::Regex;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Full body for a create: required fields must be present and non-null.
    pub fn check_create(entity: &ResolvedEntity, body: &Record) -> Result<(), AppError> {
        let mut problems = Vec::new();
        for (col, rule) in sorted_rules(entity) {
            match body.get(col) {
                None | Some(Value::Null) if rule.required == Some(true) => {
                    problems.push(format!("{} is required", col));
                }
                Some(v) => check_field(col, v, rule, &mut problems),
                None => {}
            }
        }
        finish(problems)
    }

    /// Partial body for an update: only the fields present are checked, and a required field
    /// may not be set to null.
    pub fn check_update(entity: &ResolvedEntity, body: &Record) -> Result<(), AppError> {
        let mut problems = Vec::new();
        for (col, rule) in sorted_rules(entity) {
            match body.get(col) {
                Some(Value::Null) if rule.required == Some(true) => {
                    problems.push(format!("{} is required", col));
                }
                Some(v) => check_field(col, v, rule, &mut problems),
                None => {}
            }
        }
        finish(problems)
    }
}

fn sorted_rules(entity: &ResolvedEntity) -> Vec<(&str, &ValidationRule)> {
    let mut rules: Vec<_> = entity.validation.iter().map(|(k, r)| (k.as_str(), r)).collect();
    rules.sort_by_key(|(k, _)| *k);
    rules
}

fn finish(problems: Vec<String>) -> Result<(), AppError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems.join("; ")))
    }
}

fn check_field(col: &str, v: &Value, rule: &ValidationRule, problems: &mut Vec<String>) {
    if v.is_null() {
        return;
    }
    if let Some(format) = &rule.format {
        if let Some(msg) = check_format(col, v, format) {
            problems.push(msg);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length.filter(|m| len > *m as usize) {
            problems.push(format!("{} must be at most {} characters", col, max));
        }
        if let Some(min) = rule.min_length.filter(|m| len < *m as usize) {
            problems.push(format!("{} must be at least {} characters", col, min));
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    problems.push(format!("{} does not match required pattern", col));
                }
                Ok(_) => {}
                Err(_) => problems.push(format!("invalid pattern for {}", col)),
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            problems.push(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum.filter(|m| n < *m) {
            problems.push(format!("{} must be at least {}", col, min));
        }
        if let Some(max) = rule.maximum.filter(|m| n > *m) {
            problems.push(format!("{} must be at most {}", col, max));
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(col: &str, v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => Some(format!("{} must be a valid email", col)),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Some(format!("{} must be a valid UUID", col)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::widget_model;
    use serde_json::json;

    fn body(v: Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    fn message(r: Result<(), AppError>) -> String {
        match r {
            Err(AppError::Validation(m)) => m,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn create_requires_configured_fields() {
        let model = widget_model();
        let widget = model.entity("widget").unwrap();
        assert!(RequestValidator::check_create(widget, &body(json!({"name": "ok"}))).is_ok());
        assert_eq!(
            message(RequestValidator::check_create(widget, &body(json!({"color": "red"})))),
            "name is required"
        );
        assert_eq!(
            message(RequestValidator::check_create(widget, &body(json!({"name": null})))),
            "name is required"
        );
    }

    #[test]
    fn update_checks_only_present_fields() {
        let model = widget_model();
        let widget = model.entity("widget").unwrap();
        assert!(RequestValidator::check_update(widget, &body(json!({"color": "red"}))).is_ok());
        assert_eq!(
            message(RequestValidator::check_update(widget, &body(json!({"name": "x".repeat(21)})))),
            "name must be at most 20 characters"
        );
    }

    #[test]
    fn length_counts_characters() {
        let model = widget_model();
        let widget = model.entity("widget").unwrap();
        assert!(RequestValidator::check_update(widget, &body(json!({"name": "é".repeat(20)}))).is_ok());
    }

    #[test]
    fn rule_kinds() {
        let rule = ValidationRule {
            required: None,
            format: Some("email".into()),
            max_length: None,
            min_length: Some(5),
            pattern: Some("^[a-z@.]+$".into()),
            allowed: None,
            minimum: None,
            maximum: None,
        };
        let mut problems = Vec::new();
        check_field("mail", &json!("A"), &rule, &mut problems);
        assert_eq!(
            problems,
            vec![
                "mail must be a valid email",
                "mail must be at least 5 characters",
                "mail does not match required pattern",
            ]
        );

        let rule = ValidationRule {
            allowed: Some(vec![json!(1), json!(2)]),
            minimum: Some(1.0),
            maximum: Some(2.0),
            ..ValidationRule::default()
        };
        let mut problems = Vec::new();
        check_field("n", &json!(2.0), &rule, &mut problems);
        assert!(problems.is_empty());
        check_field("n", &json!(3), &rule, &mut problems);
        assert_eq!(problems.len(), 2);
    }
}
