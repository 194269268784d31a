//! The condition grammar: casting textual operands, formatting native values
//! back into operand form, and checking condition expressions against raw
//! documents.
//!
//! A routable query is `"<type>::<clause>[;<clause>...]"`. Each clause is an
//! alternating sequence of operands and operators, tokenized by longest match
//! over a fixed operator table. Operands resolve against the record's raw
//! document by key, falling back to [`cast`]. The result of an expression is
//! the conjunction of every operator in every clause; there is no OR.

use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{LarderError, Result};

/// Splits the type tag from the condition expression.
pub const QUERY_DIVIDER: &str = "::";
/// Splits a textual operand into list elements.
pub const LIST_DIVIDER: char = ',';
/// Splits a condition expression into clauses.
pub const CLAUSE_DIVIDER: char = ';';

// ------------- Operators -------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparison {
    In,
    StartsWith,
    EndsWith,
    Equals,
    Is,
    Le,
    Ge,
    Lt,
    Gt,
}

struct Op {
    token: &'static str,
    base: Comparison,
    negate: bool,
    fold_case: bool,
}

const fn op(token: &'static str, base: Comparison, negate: bool, fold_case: bool) -> Op {
    Op { token, base, negate, fold_case }
}

// The table is ordered longest-match-first and the tokenizer tries entries in
// this order. A `!` prefix negates, a trailing `.` lowercases both sides.
// Ordering and identity operators deliberately have no negated or folded
// variants; their absence from the table is what enforces the grammar rule.
static OPERATORS: [Op; 21] = [
    op("!->.", Comparison::In, true, true),
    op("!<%.", Comparison::StartsWith, true, true),
    op("!%>.", Comparison::EndsWith, true, true),
    op("!=.", Comparison::Equals, true, true),
    op("->.", Comparison::In, false, true),
    op("<%.", Comparison::StartsWith, false, true),
    op("%>.", Comparison::EndsWith, false, true),
    op("==.", Comparison::Equals, false, true),
    op("!->", Comparison::In, true, false),
    op("!<%", Comparison::StartsWith, true, false),
    op("!%>", Comparison::EndsWith, true, false),
    op("!=", Comparison::Equals, true, false),
    op("->", Comparison::In, false, false),
    op("<%", Comparison::StartsWith, false, false),
    op("%>", Comparison::EndsWith, false, false),
    op("==", Comparison::Equals, false, false),
    op("=>", Comparison::Is, false, false),
    op("<=", Comparison::Le, false, false),
    op(">=", Comparison::Ge, false, false),
    op("<", Comparison::Lt, false, false),
    op(">", Comparison::Gt, false, false),
];

lazy_static! {
    static ref OPERATOR_SPLIT: Regex = {
        let alternation = OPERATORS
            .iter()
            .map(|o| regex::escape(o.token))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\s*({alternation})\s*")).unwrap()
    };
    static ref NUMBER: Regex = Regex::new(r"^-?\d*(\.\d+)?$").unwrap();
}

// ------------- Casting and formatting -------------

/// Casts a textual operand into its native value.
///
/// A `,`-joined token becomes an array of recursively cast elements,
/// `true`/`false` (any case) become booleans, a quoted token becomes its
/// unquoted contents, a numeric literal becomes an integer (no `.`) or a
/// float (with `.`), and anything else is null.
pub fn cast(value: &str) -> Value {
    let value = value.trim();
    if value.split(LIST_DIVIDER).count() > 1 {
        return Value::Array(value.split(LIST_DIVIDER).map(cast).collect());
    }
    let lowered = value.to_lowercase();
    if lowered == "true" || lowered == "false" {
        return Value::Bool(lowered == "true");
    }
    if let Some(inner) = unquote(value) {
        return Value::String(inner.to_string());
    }
    if NUMBER.is_match(value) {
        if value.contains('.') {
            if let Some(number) = value.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                return Value::Number(number);
            }
        } else if let Ok(integer) = value.parse::<i64>() {
            return Value::from(integer);
        }
    }
    Value::Null
}

fn unquote(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

/// Formats a native value back into the textual operand form [`cast`] accepts:
/// strings are quoted, arrays joined element-wise with the list divider.
/// Round-trips with [`cast`] for scalars and flat lists thereof.
pub fn format(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(format)
            .collect::<Vec<_>>()
            .join(&LIST_DIVIDER.to_string()),
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Builds a routable query from a condition template, substituting each `{}`
/// placeholder with the [`format`]ted argument.
pub fn statement(kind: &str, template: &str, args: &[Value]) -> String {
    let parts: Vec<&str> = template.split("{}").collect();
    let mut filled = String::from(parts[0]);
    for (i, part) in parts[1..].iter().enumerate() {
        if let Some(arg) = args.get(i) {
            filled.push_str(&format(arg));
        }
        filled.push_str(part);
    }
    format!("{kind}{QUERY_DIVIDER}{filled}")
}

/// Splits a routable query into its type tag and condition expression, on the
/// last occurrence of the divider. A string without the divider is not a
/// routable query and yields `None` rather than an error.
pub fn params(query: &str) -> Option<(&str, &str)> {
    query.rsplit_once(QUERY_DIVIDER)
}

// ------------- Evaluation -------------

/// Checks a condition expression against a raw document.
///
/// A clause with a token count mismatch is a hard parse error. An empty or
/// operator-free clause asserts no facts and is vacuously true.
pub fn check_conditions(doc: &Map<String, Value>, conditions: &str) -> Result<bool> {
    for clause in conditions.split(CLAUSE_DIVIDER) {
        if clause.trim().is_empty() {
            continue;
        }
        let (texts, ops) = tokenize(clause);
        if texts.len() != ops.len() + 1 {
            return Err(LarderError::Parse {
                message: format!(
                    "clause `{}` must have exactly one more operand than operators",
                    clause.trim()
                ),
            });
        }
        let operands: Vec<Value> = texts
            .iter()
            .map(|t| {
                let t = t.trim();
                doc.get(t).cloned().unwrap_or_else(|| cast(t))
            })
            .collect();
        for (i, operator) in ops.iter().enumerate() {
            if !apply(operator, &operands[i], &operands[i + 1]) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn tokenize(clause: &str) -> (Vec<&str>, Vec<&'static Op>) {
    let mut operands = Vec::new();
    let mut ops = Vec::new();
    let mut last = 0;
    for captures in OPERATOR_SPLIT.captures_iter(clause) {
        let whole = captures.get(0).unwrap();
        operands.push(&clause[last..whole.start()]);
        let token = captures.get(1).unwrap().as_str();
        ops.push(OPERATORS.iter().find(|o| o.token == token).unwrap());
        last = whole.end();
    }
    operands.push(&clause[last..]);
    (operands, ops)
}

fn apply(operator: &Op, a: &Value, b: &Value) -> bool {
    let result = match operator.base {
        Comparison::Equals => {
            if operator.fold_case {
                fold(a) == fold(b)
            } else {
                loose_eq(a, b)
            }
        }
        // the closest analogue of identity: same variant, exactly equal
        Comparison::Is => a == b,
        Comparison::In => contains(b, a, operator.fold_case),
        Comparison::StartsWith => {
            if operator.fold_case {
                fold(a).starts_with(&fold(b))
            } else {
                text(a).starts_with(&text(b))
            }
        }
        Comparison::EndsWith => {
            if operator.fold_case {
                fold(a).ends_with(&fold(b))
            } else {
                text(a).ends_with(&text(b))
            }
        }
        Comparison::Le => matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal)),
        Comparison::Ge => matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => matches!(compare(a, b), Some(Ordering::Less)),
        Comparison::Gt => matches!(compare(a, b), Some(Ordering::Greater)),
    };
    result != operator.negate
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format(other),
    }
}

fn fold(value: &Value) -> String {
    text(value).to_lowercase()
}

// equality with numeric coercion, so 5 == 5.0
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_number() && b.is_number() {
        match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    } else {
        a == b
    }
}

// incomparable operands are simply unordered and every ordering test on
// them evaluates to false
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value, fold_case: bool) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| {
            if fold_case {
                fold(item) == fold(needle)
            } else {
                loose_eq(item, needle)
            }
        }),
        Value::String(s) => {
            if fold_case {
                s.to_lowercase().contains(&fold(needle))
            } else {
                s.contains(&text(needle))
            }
        }
        _ => false,
    }
}
