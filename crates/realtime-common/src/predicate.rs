//! Shared predicate grammar used by change-notification filter specs and by
//! the reference row-level-security engine.
//!
//! Grammar: a comma-joined conjunction of clauses `column=OP.value`, where
//! `OP` is one of `eq|neq|lt|lte|gt|gte|in`. `in` takes a parenthesized,
//! comma-separated list: `id=in.(1,2,3)`. A value of the form
//! `claims.<key>` is resolved against the evaluating claims instead of
//! being taken literally, which is what lets the same grammar express both
//! change filters (`owner_id=eq.42`) and RLS policies
//! (`owner_id=eq.claims.uid`).

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("empty clause in predicate")]
    EmptyClause,
    #[error("malformed clause: {0}")]
    MalformedClause(String),
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("malformed `in` list: {0}")]
    MalformedList(String),
    #[error("unrecognized change event: {0}")]
    UnknownEventType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl Op {
    fn parse(s: &str) -> Result<Self, PredicateError> {
        match s {
            "eq" => Ok(Op::Eq),
            "neq" => Ok(Op::Neq),
            "lt" => Ok(Op::Lt),
            "lte" => Ok(Op::Lte),
            "gt" => Ok(Op::Gt),
            "gte" => Ok(Op::Gte),
            "in" => Ok(Op::In),
            other => Err(PredicateError::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    /// Resolved against claims at evaluation time (`claims.<key>`).
    ClaimsRef(String),
    Literal(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub op: Op,
    value: RawValue,
}

/// A parsed conjunction of clauses. An empty predicate always matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    pub fn parse(text: &str) -> Result<Self, PredicateError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Predicate::default());
        }

        let mut clauses = Vec::new();
        for raw_clause in split_top_level_commas(text) {
            clauses.push(parse_clause(raw_clause.trim())?);
        }
        Ok(Predicate { clauses })
    }

    /// Evaluate the conjunction against `row`, resolving any `claims.<key>`
    /// references against `claims`. Unknown columns evaluate to `false`,
    /// never to an error, per the grammar's spec.
    pub fn evaluate(&self, row: &Value, claims: &BTreeMap<String, Value>) -> bool {
        self.clauses
            .iter()
            .all(|clause| evaluate_clause(clause, row, claims))
    }
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_clause(text: &str) -> Result<Clause, PredicateError> {
    if text.is_empty() {
        return Err(PredicateError::EmptyClause);
    }
    let (column, rest) = text
        .split_once('=')
        .ok_or_else(|| PredicateError::MalformedClause(text.to_string()))?;
    let (op_str, value_str) = rest
        .split_once('.')
        .ok_or_else(|| PredicateError::MalformedClause(text.to_string()))?;
    let op = Op::parse(op_str)?;

    let value = if op == Op::In {
        let inner = value_str
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| PredicateError::MalformedList(value_str.to_string()))?;
        let items = split_top_level_commas(inner)
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect();
        RawValue::List(items)
    } else if let Some(key) = value_str.strip_prefix("claims.") {
        RawValue::ClaimsRef(key.to_string())
    } else {
        RawValue::Literal(value_str.to_string())
    };

    Ok(Clause {
        column: column.trim().to_string(),
        op,
        value,
    })
}

fn evaluate_clause(clause: &Clause, row: &Value, claims: &BTreeMap<String, Value>) -> bool {
    let Some(field) = row.get(&clause.column) else {
        return false;
    };

    match (&clause.op, &clause.value) {
        (Op::In, RawValue::List(items)) => items
            .iter()
            .any(|item| compare_eq(field, &Value::from(item.as_str()))),
        (Op::In, _) => false,
        (_, RawValue::List(_)) => false,
        (op, RawValue::Literal(lit)) => apply_op(*op, field, &literal_value(field, lit)),
        (op, RawValue::ClaimsRef(key)) => match claims.get(key) {
            Some(claim_value) => apply_op(*op, field, claim_value),
            None => false,
        },
    }
}

/// Coerce a literal string to the same JSON type family as `field` so that
/// `age=gt.18` compares numerically against a numeric row value.
fn literal_value(field: &Value, literal: &str) -> Value {
    match field {
        Value::Number(_) => literal
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(literal.to_string())),
        Value::Bool(_) => literal
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(literal.to_string())),
        _ => Value::String(literal.to_string()),
    }
}

fn apply_op(op: Op, field: &Value, value: &Value) -> bool {
    match op {
        Op::Eq => compare_eq(field, value),
        Op::Neq => !compare_eq(field, value),
        Op::Lt => compare_ord(field, value) == Some(std::cmp::Ordering::Less),
        Op::Lte => matches!(
            compare_ord(field, value),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        ),
        Op::Gt => compare_ord(field, value) == Some(std::cmp::Ordering::Greater),
        Op::Gte => matches!(
            compare_ord(field, value),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        ),
        Op::In => false,
    }
}

fn compare_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        // Cross-type comparison: fall back to string rendering, the way a
        // loosely typed wire predicate would when the row's column is a
        // string but the filter value parsed as something else.
        _ => a.to_string().trim_matches('"') == b.to_string().trim_matches('"'),
    }
}

fn compare_ord(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_conjunction() {
        let p = Predicate::parse("owner_id=eq.U1,age=gt.18").unwrap();
        assert_eq!(p.clauses.len(), 2);
    }

    #[test]
    fn matches_equality_on_string_column() {
        let p = Predicate::parse("owner_id=eq.U1").unwrap();
        let row = json!({"owner_id": "U1", "body": "hi"});
        assert!(p.evaluate(&row, &BTreeMap::new()));
        let row2 = json!({"owner_id": "U2"});
        assert!(!p.evaluate(&row2, &BTreeMap::new()));
    }

    #[test]
    fn numeric_comparison_coerces_literal() {
        let p = Predicate::parse("age=gte.21").unwrap();
        assert!(p.evaluate(&json!({"age": 21}), &BTreeMap::new()));
        assert!(p.evaluate(&json!({"age": 30}), &BTreeMap::new()));
        assert!(!p.evaluate(&json!({"age": 20}), &BTreeMap::new()));
    }

    #[test]
    fn in_list_matches_any_member() {
        let p = Predicate::parse("status=in.(open,pending)").unwrap();
        assert!(p.evaluate(&json!({"status": "pending"}), &BTreeMap::new()));
        assert!(!p.evaluate(&json!({"status": "closed"}), &BTreeMap::new()));
    }

    #[test]
    fn unknown_column_is_false_not_error() {
        let p = Predicate::parse("missing=eq.1").unwrap();
        assert!(!p.evaluate(&json!({"other": 1}), &BTreeMap::new()));
    }

    #[test]
    fn claims_reference_is_resolved_at_evaluation_time() {
        let p = Predicate::parse("owner_id=eq.claims.uid").unwrap();
        let mut claims = BTreeMap::new();
        claims.insert("uid".to_string(), json!("U1"));
        assert!(p.evaluate(&json!({"owner_id": "U1"}), &claims));
        assert!(!p.evaluate(&json!({"owner_id": "U2"}), &claims));
    }

    #[test]
    fn empty_predicate_always_matches() {
        let p = Predicate::parse("").unwrap();
        assert!(p.evaluate(&json!({}), &BTreeMap::new()));
    }
}
