//! Expression evaluation over typed values.
//!
//! Expressions evaluate bottom-up against a read-only [`State`],
//! producing `Option<Value>` -- `None` is NULL. The generic NULL rule:
//! operators that require non-NULL operands yield NULL when any
//! required operand is NULL; operators whose purpose is to test
//! nullity (`isNull`) always yield a definite boolean.
//!
//! Contract violations -- an operand with the wrong cardinality or base
//! type -- are authoring errors in the source document and are raised
//! as `WrongCardinality`/`WrongBaseType`, never tolerated.
//!
//! Random draws come from the caller-supplied RNG so that evaluation
//! is reproducible under a pinned seed.

use proctor_core::expression::{Expression, Operator, ToleranceMode};
use proctor_core::types::{BaseType, Cardinality};
use proctor_core::value::{is_null, Scalar, Value};
use rand::rngs::StdRng;
use rand::Rng;
use std::cmp::Ordering;

use crate::error::RuntimeError;
use crate::numeric::{self, Number};
use crate::state::State;

/// Evaluate an expression tree against a variable store.
pub fn eval(
    expr: &Expression,
    state: &State,
    rng: &mut StdRng,
) -> Result<Option<Value>, RuntimeError> {
    match expr {
        Expression::BaseValue { value, .. } => Ok(Some(Value::Single(value.clone()))),
        Expression::Null => Ok(None),
        Expression::Variable { identifier } => Ok(state.variable(identifier)?.value().cloned()),
        Expression::Correct { identifier } => {
            Ok(state.variable(identifier)?.correct_response().cloned())
        }
        Expression::Default { identifier } => {
            Ok(state.variable(identifier)?.default_value().cloned())
        }
        Expression::MapResponse { identifier } => map_response(state, identifier),
        Expression::RandomInteger { min, max, step } => random_integer(*min, *max, *step, rng),
        Expression::RandomFloat { min, max } => random_float(*min, *max, rng),
        Expression::Operator { op, operands } => {
            let values: Vec<Option<Value>> = operands
                .iter()
                .map(|e| eval(e, state, rng))
                .collect::<Result<_, _>>()?;
            apply(op, &values, rng)
        }
    }
}

fn apply(
    op: &Operator,
    operands: &[Option<Value>],
    rng: &mut StdRng,
) -> Result<Option<Value>, RuntimeError> {
    let name = op.name();
    match op {
        Operator::IsNull => {
            require_count(name, operands, 1)?;
            Ok(Some(Value::boolean(is_null(&operands[0]))))
        }
        Operator::Not => {
            require_count(name, operands, 1)?;
            match single_boolean(name, &operands[0])? {
                Some(b) => Ok(Some(Value::boolean(!b))),
                None => Ok(None),
            }
        }
        Operator::And => {
            require_at_least(name, operands, 1)?;
            let mut saw_null = false;
            for operand in operands {
                match single_boolean(name, operand)? {
                    Some(false) => return Ok(Some(Value::boolean(false))),
                    Some(true) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                Ok(None)
            } else {
                Ok(Some(Value::boolean(true)))
            }
        }
        Operator::Or => {
            require_at_least(name, operands, 1)?;
            let mut saw_null = false;
            for operand in operands {
                match single_boolean(name, operand)? {
                    Some(true) => return Ok(Some(Value::boolean(true))),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                Ok(None)
            } else {
                Ok(Some(Value::boolean(false)))
            }
        }
        Operator::Match => op_match(name, operands),
        Operator::Equal(mode) => op_equal(name, operands, mode),
        Operator::StringMatch { case_sensitive } => {
            op_string_match(name, operands, *case_sensitive)
        }
        Operator::Lt => op_compare(name, operands, |o| o == Ordering::Less),
        Operator::Lte => op_compare(name, operands, |o| o != Ordering::Greater),
        Operator::Gt => op_compare(name, operands, |o| o == Ordering::Greater),
        Operator::Gte => op_compare(name, operands, |o| o != Ordering::Less),
        Operator::Sum => op_sum(name, operands),
        Operator::Product => op_product(name, operands),
        Operator::Subtract => op_subtract(name, operands),
        Operator::Divide => op_divide(name, operands),
        Operator::IntegerDivide => op_integer_divide(name, operands, false),
        Operator::IntegerModulus => op_integer_divide(name, operands, true),
        Operator::Round => op_round(name, operands, f64::round),
        Operator::Truncate => op_round(name, operands, f64::trunc),
        Operator::Gcd => op_gcd_lcm(name, operands, false),
        Operator::Lcm => op_gcd_lcm(name, operands, true),
        Operator::Max => op_max_min(name, operands, Ordering::Greater),
        Operator::Min => op_max_min(name, operands, Ordering::Less),
        Operator::Member => op_member(name, operands),
        Operator::Contains => op_contains(name, operands),
        Operator::Multiple => op_merge(name, operands, Cardinality::Multiple),
        Operator::Ordered => op_merge(name, operands, Cardinality::Ordered),
        Operator::Index { n } => op_index(name, operands, *n),
        Operator::FieldValue { field } => op_field_value(name, operands, field),
        Operator::Random => op_random(name, operands, rng),
    }
}

// ──────────────────────────────────────────────
// Operand helpers
// ──────────────────────────────────────────────

fn require_count(
    op: &'static str,
    operands: &[Option<Value>],
    expected: usize,
) -> Result<(), RuntimeError> {
    if operands.len() != expected {
        return Err(RuntimeError::OperatorFailure {
            operator: op,
            message: format!("expected {} operand(s), got {}", expected, operands.len()),
        });
    }
    Ok(())
}

fn require_at_least(
    op: &'static str,
    operands: &[Option<Value>],
    min: usize,
) -> Result<(), RuntimeError> {
    if operands.len() < min {
        return Err(RuntimeError::OperatorFailure {
            operator: op,
            message: format!(
                "expected at least {} operand(s), got {}",
                min,
                operands.len()
            ),
        });
    }
    Ok(())
}

fn wrong_cardinality(op: &'static str, message: impl Into<String>) -> RuntimeError {
    RuntimeError::WrongCardinality {
        operator: op,
        message: message.into(),
    }
}

fn wrong_base_type(op: &'static str, message: impl Into<String>) -> RuntimeError {
    RuntimeError::WrongBaseType {
        operator: op,
        message: message.into(),
    }
}

/// A non-NULL operand's single scalar, or an error when the operand is
/// a container. NULL maps to `Ok(None)`.
fn single_scalar<'a>(
    op: &'static str,
    operand: &'a Option<Value>,
) -> Result<Option<&'a Scalar>, RuntimeError> {
    match operand {
        None => Ok(None),
        Some(Value::Single(s)) => Ok(Some(s)),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => Err(wrong_cardinality(
            op,
            format!("expected single cardinality, got {}", v.cardinality()),
        )),
    }
}

fn single_boolean(
    op: &'static str,
    operand: &Option<Value>,
) -> Result<Option<bool>, RuntimeError> {
    match single_scalar(op, operand)? {
        None => Ok(None),
        Some(s) => s.as_boolean().map(Some).ok_or_else(|| {
            wrong_base_type(op, format!("expected boolean, got {}", s.base_type()))
        }),
    }
}

fn single_number(
    op: &'static str,
    operand: &Option<Value>,
) -> Result<Option<Number>, RuntimeError> {
    match single_scalar(op, operand)? {
        None => Ok(None),
        Some(s) => Number::from_scalar(s).map(Some).ok_or_else(|| {
            wrong_base_type(op, format!("expected a numeric operand, got {}", s.base_type()))
        }),
    }
}

fn two_numbers(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<(Number, Number)>, RuntimeError> {
    require_count(op, operands, 2)?;
    let a = single_number(op, &operands[0])?;
    let b = single_number(op, &operands[1])?;
    match (a, b) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        _ => Ok(None),
    }
}

/// Flatten single/multiple/ordered numeric operands into one list of
/// numbers. NULL anywhere (including an empty container) makes the
/// whole aggregate NULL.
fn flatten_numeric(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Vec<Number>>, RuntimeError> {
    let mut numbers = Vec::new();
    for operand in operands {
        let Some(value) = operand else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let scalars = value.scalars().ok_or_else(|| {
            wrong_cardinality(op, "record operands are not allowed".to_string())
        })?;
        for s in scalars {
            let n = Number::from_scalar(s).ok_or_else(|| {
                wrong_base_type(op, format!("expected a numeric operand, got {}", s.base_type()))
            })?;
            numbers.push(n);
        }
    }
    Ok(Some(numbers))
}

/// Flatten single/multiple/ordered integer operands, rejecting floats.
fn flatten_integers(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Vec<i64>>, RuntimeError> {
    let mut integers = Vec::new();
    for operand in operands {
        let Some(value) = operand else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let scalars = value.scalars().ok_or_else(|| {
            wrong_cardinality(op, "record operands are not allowed".to_string())
        })?;
        for s in scalars {
            let i = s.as_integer().ok_or_else(|| {
                wrong_base_type(op, format!("expected integer operands, got {}", s.base_type()))
            })?;
            integers.push(i);
        }
    }
    Ok(Some(integers))
}

// ──────────────────────────────────────────────
// Comparison operators
// ──────────────────────────────────────────────

fn op_match(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 2)?;
    let (Some(a), Some(b)) = (&operands[0], &operands[1]) else {
        return Ok(None);
    };
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    if a.cardinality() != b.cardinality() {
        return Err(wrong_cardinality(
            op,
            format!("cannot match {} against {}", a.cardinality(), b.cardinality()),
        ));
    }
    if a.cardinality() != Cardinality::Record && a.base_type() != b.base_type() {
        return Err(wrong_base_type(
            op,
            "operands must share a base type".to_string(),
        ));
    }
    Ok(Some(Value::boolean(a == b)))
}

fn op_equal(
    op: &'static str,
    operands: &[Option<Value>],
    mode: &ToleranceMode,
) -> Result<Option<Value>, RuntimeError> {
    let Some((a, b)) = two_numbers(op, operands)? else {
        return Ok(None);
    };
    let equal = match mode {
        ToleranceMode::Exact => numeric::compare(a, b) == Some(Ordering::Equal),
        ToleranceMode::Absolute { lower, upper } => {
            let (a, b) = (a.as_f64(), b.as_f64());
            b >= a - lower && b <= a + upper
        }
    };
    Ok(Some(Value::boolean(equal)))
}

fn op_string_match(
    op: &'static str,
    operands: &[Option<Value>],
    case_sensitive: bool,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 2)?;
    let a = single_scalar(op, &operands[0])?;
    let b = single_scalar(op, &operands[1])?;
    let (Some(a), Some(b)) = (a, b) else {
        return Ok(None);
    };
    match (a, b) {
        (Scalar::String(a), Scalar::String(b)) => {
            let matched = if case_sensitive {
                a == b
            } else {
                a.to_lowercase() == b.to_lowercase()
            };
            Ok(Some(Value::boolean(matched)))
        }
        _ => Err(wrong_base_type(op, "expected string operands".to_string())),
    }
}

fn op_compare(
    op: &'static str,
    operands: &[Option<Value>],
    admit: impl Fn(Ordering) -> bool,
) -> Result<Option<Value>, RuntimeError> {
    let Some((a, b)) = two_numbers(op, operands)? else {
        return Ok(None);
    };
    match numeric::compare(a, b) {
        Some(ordering) => Ok(Some(Value::boolean(admit(ordering)))),
        // NaN comparisons are undefined; the result is NULL.
        None => Ok(None),
    }
}

// ──────────────────────────────────────────────
// Arithmetic operators
// ──────────────────────────────────────────────

fn op_sum(op: &'static str, operands: &[Option<Value>]) -> Result<Option<Value>, RuntimeError> {
    require_at_least(op, operands, 1)?;
    let Some(numbers) = flatten_numeric(op, operands)? else {
        return Ok(None);
    };
    if numbers.iter().all(|n| n.is_int()) {
        let mut total = 0i64;
        for n in &numbers {
            if let Number::Int(i) = n {
                total = numeric::checked_add(op, total, *i)?;
            }
        }
        Ok(Some(Value::integer(total)))
    } else {
        Ok(Some(Value::float(numbers.iter().map(|n| n.as_f64()).sum())))
    }
}

fn op_product(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    require_at_least(op, operands, 1)?;
    let Some(numbers) = flatten_numeric(op, operands)? else {
        return Ok(None);
    };
    if numbers.iter().all(|n| n.is_int()) {
        let mut total = 1i64;
        for n in &numbers {
            if let Number::Int(i) = n {
                total = numeric::checked_mul(op, total, *i)?;
            }
        }
        Ok(Some(Value::integer(total)))
    } else {
        Ok(Some(Value::float(
            numbers.iter().map(|n| n.as_f64()).product(),
        )))
    }
}

fn op_subtract(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    let Some((a, b)) = two_numbers(op, operands)? else {
        return Ok(None);
    };
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => {
            Ok(Some(Value::integer(numeric::checked_sub(op, a, b)?)))
        }
        _ => Ok(Some(Value::float(a.as_f64() - b.as_f64()))),
    }
}

fn op_divide(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    let Some((a, b)) = two_numbers(op, operands)? else {
        return Ok(None);
    };
    let divisor = b.as_f64();
    // Division by zero is NULL, not an error.
    if divisor == 0.0 {
        return Ok(None);
    }
    Ok(Some(Value::float(a.as_f64() / divisor)))
}

fn op_integer_divide(
    op: &'static str,
    operands: &[Option<Value>],
    modulus: bool,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 2)?;
    let a = require_integer(op, &operands[0])?;
    let b = require_integer(op, &operands[1])?;
    let (Some(a), Some(b)) = (a, b) else {
        return Ok(None);
    };
    if b == 0 {
        return Ok(None);
    }
    let result = if modulus {
        a.checked_rem(b)
    } else {
        a.checked_div(b)
    };
    let result = result.ok_or_else(|| RuntimeError::OperatorFailure {
        operator: op,
        message: "integer overflow".to_string(),
    })?;
    Ok(Some(Value::integer(result)))
}

fn require_integer(
    op: &'static str,
    operand: &Option<Value>,
) -> Result<Option<i64>, RuntimeError> {
    match single_scalar(op, operand)? {
        None => Ok(None),
        Some(s) => s.as_integer().map(Some).ok_or_else(|| {
            wrong_base_type(op, format!("expected integer operands, got {}", s.base_type()))
        }),
    }
}

fn op_round(
    op: &'static str,
    operands: &[Option<Value>],
    apply: impl Fn(f64) -> f64,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 1)?;
    match single_number(op, &operands[0])? {
        None => Ok(None),
        Some(Number::Int(i)) => Ok(Some(Value::integer(i))),
        Some(Number::Float(f)) => {
            if !f.is_finite() {
                return Ok(None);
            }
            Ok(Some(Value::integer(apply(f) as i64)))
        }
    }
}

fn op_gcd_lcm(
    op: &'static str,
    operands: &[Option<Value>],
    lcm: bool,
) -> Result<Option<Value>, RuntimeError> {
    require_at_least(op, operands, 1)?;
    let Some(integers) = flatten_integers(op, operands)? else {
        return Ok(None);
    };
    let mut result = integers[0].abs();
    for &i in &integers[1..] {
        result = if lcm {
            numeric::lcm(op, result, i)?
        } else {
            numeric::gcd(result, i)
        };
    }
    Ok(Some(Value::integer(result)))
}

fn op_max_min(
    op: &'static str,
    operands: &[Option<Value>],
    keep: Ordering,
) -> Result<Option<Value>, RuntimeError> {
    require_at_least(op, operands, 1)?;
    let Some(numbers) = flatten_numeric(op, operands)? else {
        return Ok(None);
    };
    let mut best = numbers[0];
    for &n in &numbers[1..] {
        match numeric::compare(n, best) {
            Some(ordering) if ordering == keep => best = n,
            Some(_) => {}
            None => return Ok(None),
        }
    }
    match best {
        Number::Int(i) => Ok(Some(Value::integer(i))),
        Number::Float(f) => Ok(Some(Value::float(f))),
    }
}

// ──────────────────────────────────────────────
// Container operators
// ──────────────────────────────────────────────

fn op_member(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 2)?;
    let (Some(first), Some(haystack)) = (&operands[0], &operands[1]) else {
        return Ok(None);
    };
    if first.is_null() || haystack.is_null() {
        return Ok(None);
    }
    let needle = match first {
        Value::Single(s) => s,
        v => {
            return Err(wrong_cardinality(
                op,
                format!("first operand must be single, got {}", v.cardinality()),
            ))
        }
    };
    match haystack {
        // A single second operand is promoted to a one-element container.
        Value::Single(_) | Value::Multiple { .. } | Value::Ordered { .. } => {
            if haystack.base_type() != Some(needle.base_type()) {
                return Err(wrong_base_type(
                    op,
                    "operands must share a base type".to_string(),
                ));
            }
            Ok(Some(Value::boolean(haystack.contains(needle))))
        }
        Value::Record(_) => Err(wrong_cardinality(
            op,
            "second operand must be single, multiple or ordered".to_string(),
        )),
    }
}

fn op_contains(
    op: &'static str,
    operands: &[Option<Value>],
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 2)?;
    let (Some(a), Some(b)) = (&operands[0], &operands[1]) else {
        return Ok(None);
    };
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    match (a, b) {
        (
            Value::Multiple { base_type: ab, values: av },
            Value::Multiple { base_type: bb, values: bv },
        ) => {
            if ab != bb {
                return Err(wrong_base_type(op, "operands must share a base type".to_string()));
            }
            Ok(Some(Value::boolean(multiset_contains(av, bv))))
        }
        (
            Value::Ordered { base_type: ab, values: av },
            Value::Ordered { base_type: bb, values: bv },
        ) => {
            if ab != bb {
                return Err(wrong_base_type(op, "operands must share a base type".to_string()));
            }
            Ok(Some(Value::boolean(subsequence_contains(av, bv))))
        }
        _ => Err(wrong_cardinality(
            op,
            "operands must both be multiple or both be ordered".to_string(),
        )),
    }
}

/// Multiset containment: `haystack` holds every `needle` element with
/// at least its multiplicity.
fn multiset_contains(haystack: &[Scalar], needle: &[Scalar]) -> bool {
    let mut used = vec![false; haystack.len()];
    for item in needle {
        let mut found = false;
        for (i, candidate) in haystack.iter().enumerate() {
            if !used[i] && item == candidate {
                used[i] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

/// Contiguous subsequence containment for ordered containers.
fn subsequence_contains(haystack: &[Scalar], needle: &[Scalar]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

fn op_merge(
    op: &'static str,
    operands: &[Option<Value>],
    target: Cardinality,
) -> Result<Option<Value>, RuntimeError> {
    let mut base_type: Option<BaseType> = None;
    let mut merged: Vec<Scalar> = Vec::new();
    for operand in operands {
        // NULL operands are skipped, not propagated.
        let Some(value) = operand else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let scalars = match (target, value) {
            (_, Value::Single(s)) => std::slice::from_ref(s),
            (Cardinality::Multiple, Value::Multiple { values, .. }) => values.as_slice(),
            (Cardinality::Ordered, Value::Ordered { values, .. }) => values.as_slice(),
            _ => {
                return Err(wrong_cardinality(
                    op,
                    format!("cannot merge a {} operand", value.cardinality()),
                ));
            }
        };
        // Single scalars and non-record containers always carry a base
        // type.
        let operand_base = match value.base_type() {
            Some(b) => b,
            None => {
                return Err(wrong_cardinality(
                    op,
                    "record operands are not allowed".to_string(),
                ))
            }
        };
        match base_type {
            None => base_type = Some(operand_base),
            Some(expected) if expected != operand_base => {
                return Err(wrong_base_type(
                    op,
                    "operands must share a base type".to_string(),
                ));
            }
            Some(_) => {}
        }
        merged.extend(scalars.iter().cloned());
    }
    match base_type {
        // No non-NULL operand at all: the result is NULL.
        None => Ok(None),
        Some(base_type) => {
            let value = match target {
                Cardinality::Multiple => Value::Multiple { base_type, values: merged },
                _ => Value::Ordered { base_type, values: merged },
            };
            Ok(Some(value))
        }
    }
}

fn op_index(
    op: &'static str,
    operands: &[Option<Value>],
    n: usize,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 1)?;
    if n == 0 {
        return Err(RuntimeError::OperatorFailure {
            operator: op,
            message: "index is 1-based".to_string(),
        });
    }
    match &operands[0] {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(Value::Ordered { values, .. }) => Ok(values.get(n - 1).cloned().map(Value::Single)),
        Some(v) => Err(wrong_cardinality(
            op,
            format!("expected an ordered container, got {}", v.cardinality()),
        )),
    }
}

fn op_field_value(
    op: &'static str,
    operands: &[Option<Value>],
    field: &str,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 1)?;
    match &operands[0] {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(Value::Record(fields)) => Ok(fields.get(field).cloned().map(Value::Single)),
        Some(v) => Err(wrong_cardinality(
            op,
            format!("expected a record, got {}", v.cardinality()),
        )),
    }
}

fn op_random(
    op: &'static str,
    operands: &[Option<Value>],
    rng: &mut StdRng,
) -> Result<Option<Value>, RuntimeError> {
    require_count(op, operands, 1)?;
    match &operands[0] {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(Value::Multiple { values, .. }) | Some(Value::Ordered { values, .. }) => {
            let pick = rng.gen_range(0..values.len());
            Ok(Some(Value::Single(values[pick].clone())))
        }
        Some(v) => Err(wrong_cardinality(
            op,
            format!("expected a multiple or ordered container, got {}", v.cardinality()),
        )),
    }
}

// ──────────────────────────────────────────────
// Leaf expressions
// ──────────────────────────────────────────────

fn random_integer(
    min: i64,
    max: i64,
    step: i64,
    rng: &mut StdRng,
) -> Result<Option<Value>, RuntimeError> {
    if step <= 0 || max < min {
        return Err(RuntimeError::OperatorFailure {
            operator: "randomInteger",
            message: format!("invalid range [{}, {}] step {}", min, max, step),
        });
    }
    let steps = (max - min) / step;
    let k = rng.gen_range(0..=steps);
    Ok(Some(Value::integer(min + k * step)))
}

fn random_float(min: f64, max: f64, rng: &mut StdRng) -> Result<Option<Value>, RuntimeError> {
    if !(min <= max) {
        return Err(RuntimeError::OperatorFailure {
            operator: "randomFloat",
            message: format!("invalid range [{}, {}]", min, max),
        });
    }
    Ok(Some(Value::float(rng.gen_range(min..=max))))
}

/// Score a response variable through its declared mapping.
///
/// Each distinct response value is counted once: mapped entries
/// contribute their mapped value, unmatched values contribute the
/// mapping default, and the total is clamped to the declared bounds.
/// A NULL response scores the bare default.
fn map_response(state: &State, identifier: &str) -> Result<Option<Value>, RuntimeError> {
    let variable = state.variable(identifier)?;
    let mapping = variable.mapping().ok_or_else(|| RuntimeError::OperatorFailure {
        operator: "mapResponse",
        message: format!("variable '{}' declares no mapping", identifier),
    })?;

    let total = match variable.value() {
        None => mapping.default_value,
        Some(v) if v.is_null() => mapping.default_value,
        Some(value) => {
            let Some(scalars) = value.scalars() else {
                return Err(wrong_cardinality(
                    "mapResponse",
                    "record responses cannot be mapped".to_string(),
                ));
            };
            let mut seen: Vec<&Scalar> = Vec::new();
            let mut total = 0.0;
            for s in scalars {
                if seen.iter().any(|prev| *prev == s) {
                    continue;
                }
                seen.push(s);
                total += lookup_map_entry(mapping, s);
            }
            total
        }
    };

    let mut clamped = total;
    if let Some(upper) = mapping.upper_bound {
        clamped = clamped.min(upper);
    }
    if let Some(lower) = mapping.lower_bound {
        clamped = clamped.max(lower);
    }
    Ok(Some(Value::float(clamped)))
}

fn lookup_map_entry(mapping: &proctor_core::item::Mapping, value: &Scalar) -> f64 {
    for entry in &mapping.entries {
        let matched = match (&entry.key, value) {
            (Scalar::String(k), Scalar::String(v)) if !entry.case_sensitive => {
                k.to_lowercase() == v.to_lowercase()
            }
            (k, v) => k == v,
        };
        if matched {
            return entry.mapped_value;
        }
    }
    mapping.default_value
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
