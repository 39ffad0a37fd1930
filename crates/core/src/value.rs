//! Typed scalar and container values with NULL propagation semantics.
//!
//! A [`Value`] is always a container: a single scalar, an unordered
//! multiple bag, an ordered sequence, or a record of named fields. NULL
//! is represented structurally -- an absent value (`Option::None` at the
//! call sites) or any container with zero entries -- never as a scalar
//! sentinel.
//!
//! Equality follows the container kind: scalar equality for single
//! (pairs compare unordered), multiset equality for multiple, sequence
//! equality for ordered, field-wise equality for record. Base types
//! must match for two values to compare equal; there is no implicit
//! integer/float coercion here.

use crate::types::{BaseType, Cardinality};
use std::collections::BTreeMap;
use std::fmt;
use time::Duration;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// A value failed to conform to a declared cardinality or base type.
///
/// Raised on construction and on assignment checks; conformance is
/// never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    TypeMismatch { expected: String, got: String },
    CardinalityMismatch { expected: Cardinality, got: Cardinality },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            ValueError::CardinalityMismatch { expected, got } => {
                write!(
                    f,
                    "cardinality mismatch: expected {}, got {}",
                    expected, got
                )
            }
        }
    }
}

impl std::error::Error for ValueError {}

// ──────────────────────────────────────────────
// Scalars
// ──────────────────────────────────────────────

/// A scalar value, one variant per concrete base type.
#[derive(Debug, Clone)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),
    Duration(Duration),
    /// An (x, y) coordinate.
    Point(i64, i64),
    /// An unordered association of two identifiers: (a, b) == (b, a).
    Pair(String, String),
    /// An ordered association of two identifiers.
    DirectedPair(String, String),
    Uri(String),
    File { name: String, mime_type: String },
}

impl Scalar {
    pub fn identifier(id: impl Into<String>) -> Scalar {
        Scalar::Identifier(id.into())
    }

    pub fn string(s: impl Into<String>) -> Scalar {
        Scalar::String(s.into())
    }

    /// The concrete base type of this scalar.
    pub fn base_type(&self) -> BaseType {
        match self {
            Scalar::Boolean(_) => BaseType::Boolean,
            Scalar::Integer(_) => BaseType::Integer,
            Scalar::Float(_) => BaseType::Float,
            Scalar::String(_) => BaseType::String,
            Scalar::Identifier(_) => BaseType::Identifier,
            Scalar::Duration(_) => BaseType::Duration,
            Scalar::Point(_, _) => BaseType::Point,
            Scalar::Pair(_, _) => BaseType::Pair,
            Scalar::DirectedPair(_, _) => BaseType::DirectedPair,
            Scalar::Uri(_) => BaseType::Uri,
            Scalar::File { .. } => BaseType::File,
        }
    }

    /// Whether this scalar conforms to a declared base type.
    ///
    /// `IntOrIdentifier` admits integer and identifier scalars; every
    /// other declared type requires an exact match. Integers do NOT
    /// conform to a declared float -- widening happens only inside
    /// numeric operators.
    pub fn matches_base_type(&self, declared: BaseType) -> bool {
        match declared {
            BaseType::IntOrIdentifier => {
                matches!(self, Scalar::Integer(_) | Scalar::Identifier(_))
            }
            other => self.base_type() == other,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view with integer-to-float widening. Only integers and
    /// floats are numeric.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// JSON rendering for reporting surfaces.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Boolean(b) => serde_json::json!(b),
            Scalar::Integer(i) => serde_json::json!(i),
            Scalar::Float(f) => serde_json::json!(f),
            Scalar::String(s) => serde_json::json!(s),
            Scalar::Identifier(s) => serde_json::json!(s),
            Scalar::Duration(d) => serde_json::json!(d.whole_seconds()),
            Scalar::Point(x, y) => serde_json::json!([x, y]),
            Scalar::Pair(a, b) => serde_json::json!([a, b]),
            Scalar::DirectedPair(a, b) => serde_json::json!([a, b]),
            Scalar::Uri(u) => serde_json::json!(u),
            Scalar::File { name, mime_type } => {
                serde_json::json!({ "name": name, "mimeType": mime_type })
            }
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Identifier(a), Scalar::Identifier(b)) => a == b,
            (Scalar::Duration(a), Scalar::Duration(b)) => a == b,
            (Scalar::Point(ax, ay), Scalar::Point(bx, by)) => ax == bx && ay == by,
            // Pairs are unordered associations.
            (Scalar::Pair(a1, a2), Scalar::Pair(b1, b2)) => {
                (a1 == b1 && a2 == b2) || (a1 == b2 && a2 == b1)
            }
            (Scalar::DirectedPair(a1, a2), Scalar::DirectedPair(b1, b2)) => a1 == b1 && a2 == b2,
            (Scalar::Uri(a), Scalar::Uri(b)) => a == b,
            (
                Scalar::File { name: an, mime_type: am },
                Scalar::File { name: bn, mime_type: bm },
            ) => an == bn && am == bm,
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Container values
// ──────────────────────────────────────────────

/// A typed container value.
///
/// Multiple and ordered containers carry their declared element base
/// type so that an empty (NULL) container still knows what it holds.
/// Records have no container-level base type; each field carries its
/// own.
#[derive(Debug, Clone)]
pub enum Value {
    Single(Scalar),
    Multiple { base_type: BaseType, values: Vec<Scalar> },
    Ordered { base_type: BaseType, values: Vec<Scalar> },
    Record(BTreeMap<String, Scalar>),
}

impl Value {
    pub fn single(scalar: Scalar) -> Value {
        Value::Single(scalar)
    }

    pub fn integer(i: i64) -> Value {
        Value::Single(Scalar::Integer(i))
    }

    pub fn float(f: f64) -> Value {
        Value::Single(Scalar::Float(f))
    }

    pub fn boolean(b: bool) -> Value {
        Value::Single(Scalar::Boolean(b))
    }

    pub fn identifier(id: impl Into<String>) -> Value {
        Value::Single(Scalar::Identifier(id.into()))
    }

    /// Build a multiple container, validating element homogeneity
    /// against the declared base type.
    pub fn multiple(base_type: BaseType, values: Vec<Scalar>) -> Result<Value, ValueError> {
        check_elements(base_type, &values)?;
        Ok(Value::Multiple { base_type, values })
    }

    /// Build an ordered container, validating element homogeneity
    /// against the declared base type.
    pub fn ordered(base_type: BaseType, values: Vec<Scalar>) -> Result<Value, ValueError> {
        check_elements(base_type, &values)?;
        Ok(Value::Ordered { base_type, values })
    }

    pub fn record(fields: impl IntoIterator<Item = (String, Scalar)>) -> Value {
        Value::Record(fields.into_iter().collect())
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Value::Single(_) => Cardinality::Single,
            Value::Multiple { .. } => Cardinality::Multiple,
            Value::Ordered { .. } => Cardinality::Ordered,
            Value::Record(_) => Cardinality::Record,
        }
    }

    /// The base type of the container, or `None` for records (which
    /// are heterogeneous by design).
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Value::Single(s) => Some(s.base_type()),
            Value::Multiple { base_type, .. } | Value::Ordered { base_type, .. } => {
                Some(*base_type)
            }
            Value::Record(_) => None,
        }
    }

    /// A container with zero entries is NULL. A single scalar never is;
    /// absence of a single value is expressed as `Option::None` by the
    /// holder.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Single(_) => false,
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => values.is_empty(),
            Value::Record(fields) => fields.is_empty(),
        }
    }

    /// The scalar elements of a single/multiple/ordered container, in
    /// order. `None` for records.
    pub fn scalars(&self) -> Option<&[Scalar]> {
        match self {
            Value::Single(s) => Some(std::slice::from_ref(s)),
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => Some(values),
            Value::Record(_) => None,
        }
    }

    /// Whether a single/multiple/ordered container holds `scalar`.
    pub fn contains(&self, scalar: &Scalar) -> bool {
        self.scalars()
            .map(|vs| vs.iter().any(|v| v == scalar))
            .unwrap_or(false)
    }

    /// Check this value against a declared cardinality and base type.
    ///
    /// Records ignore the declared base type (they have none); all
    /// other containers require every element to conform. Failure is
    /// an error, never a coercion.
    pub fn check(
        &self,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Result<(), ValueError> {
        if self.cardinality() != cardinality {
            return Err(ValueError::CardinalityMismatch {
                expected: cardinality,
                got: self.cardinality(),
            });
        }
        if cardinality == Cardinality::Record {
            return Ok(());
        }
        let declared = base_type.ok_or_else(|| ValueError::TypeMismatch {
            expected: "no base type (record)".to_string(),
            got: self
                .base_type()
                .map(|b| b.to_string())
                .unwrap_or_else(|| "record".to_string()),
        })?;
        match self {
            Value::Single(s) => check_scalar(declared, s),
            Value::Multiple { base_type, values } | Value::Ordered { base_type, values } => {
                // The container's element tag must agree with the
                // declaration, and so must every element.
                if *base_type != declared {
                    return Err(ValueError::TypeMismatch {
                        expected: declared.to_string(),
                        got: base_type.to_string(),
                    });
                }
                check_elements(declared, values)
            }
            Value::Record(_) => unreachable!("record handled above"),
        }
    }

    /// JSON rendering for reporting surfaces.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Single(s) => s.to_json(),
            Value::Multiple { values, .. } | Value::Ordered { values, .. } => {
                serde_json::Value::Array(values.iter().map(Scalar::to_json).collect())
            }
            Value::Record(fields) => {
                let mut map = serde_json::Map::new();
                for (k, v) in fields {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Single(a), Value::Single(b)) => a == b,
            (
                Value::Multiple { base_type: ab, values: av },
                Value::Multiple { base_type: bb, values: bv },
            ) => ab == bb && multiset_eq(av, bv),
            (
                Value::Ordered { base_type: ab, values: av },
                Value::Ordered { base_type: bb, values: bv },
            ) => ab == bb && av == bv,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

/// Whether an absent-or-empty value is NULL.
pub fn is_null(value: &Option<Value>) -> bool {
    value.as_ref().map_or(true, Value::is_null)
}

/// Multiset equality: same elements with the same multiplicities,
/// order-insensitive. Quadratic, but containers are candidate-response
/// sized.
fn multiset_eq(a: &[Scalar], b: &[Scalar]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for item in a {
        let mut found = false;
        for (i, candidate) in b.iter().enumerate() {
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

fn check_scalar(declared: BaseType, scalar: &Scalar) -> Result<(), ValueError> {
    if scalar.matches_base_type(declared) {
        Ok(())
    } else {
        Err(ValueError::TypeMismatch {
            expected: declared.to_string(),
            got: scalar.base_type().to_string(),
        })
    }
}

fn check_elements(declared: BaseType, values: &[Scalar]) -> Result<(), ValueError> {
    for v in values {
        check_scalar(declared, v)?;
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_equality_is_unordered() {
        let a = Scalar::Pair("A".into(), "B".into());
        let b = Scalar::Pair("B".into(), "A".into());
        assert_eq!(a, b);

        let c = Scalar::DirectedPair("A".into(), "B".into());
        let d = Scalar::DirectedPair("B".into(), "A".into());
        assert_ne!(c, d);
    }

    #[test]
    fn integer_and_float_never_equal() {
        assert_ne!(
            Value::Single(Scalar::Integer(1)),
            Value::Single(Scalar::Float(1.0))
        );
    }

    #[test]
    fn multiple_compares_as_multiset() {
        let a = Value::multiple(
            BaseType::Identifier,
            vec![Scalar::identifier("A"), Scalar::identifier("B"), Scalar::identifier("A")],
        )
        .unwrap();
        let b = Value::multiple(
            BaseType::Identifier,
            vec![Scalar::identifier("B"), Scalar::identifier("A"), Scalar::identifier("A")],
        )
        .unwrap();
        let c = Value::multiple(
            BaseType::Identifier,
            vec![Scalar::identifier("A"), Scalar::identifier("B"), Scalar::identifier("B")],
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ordered_compares_as_sequence() {
        let a = Value::ordered(
            BaseType::Integer,
            vec![Scalar::Integer(1), Scalar::Integer(2)],
        )
        .unwrap();
        let b = Value::ordered(
            BaseType::Integer,
            vec![Scalar::Integer(2), Scalar::Integer(1)],
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_containers_are_null() {
        let empty = Value::multiple(BaseType::Integer, vec![]).unwrap();
        assert!(empty.is_null());
        assert!(is_null(&Some(empty)));
        assert!(is_null(&None));
        assert!(!is_null(&Some(Value::integer(0))));
    }

    #[test]
    fn heterogeneous_container_rejected() {
        let err = Value::multiple(
            BaseType::Integer,
            vec![Scalar::Integer(1), Scalar::string("two")],
        )
        .unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn check_enforces_declaration() {
        let v = Value::integer(3);
        assert!(v.check(Cardinality::Single, Some(BaseType::Integer)).is_ok());
        assert!(matches!(
            v.check(Cardinality::Multiple, Some(BaseType::Integer)),
            Err(ValueError::CardinalityMismatch { .. })
        ));
        assert!(matches!(
            v.check(Cardinality::Single, Some(BaseType::Float)),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn int_or_identifier_admits_both() {
        let i = Value::integer(5);
        let id = Value::identifier("FIVE");
        let s = Value::Single(Scalar::string("five"));
        assert!(i.check(Cardinality::Single, Some(BaseType::IntOrIdentifier)).is_ok());
        assert!(id.check(Cardinality::Single, Some(BaseType::IntOrIdentifier)).is_ok());
        assert!(s.check(Cardinality::Single, Some(BaseType::IntOrIdentifier)).is_err());
    }

    #[test]
    fn record_fields_are_unique_and_compared_fieldwise() {
        let a = Value::record(vec![
            ("x".to_string(), Scalar::Integer(1)),
            ("y".to_string(), Scalar::string("s")),
        ]);
        let b = Value::record(vec![
            ("y".to_string(), Scalar::string("s")),
            ("x".to_string(), Scalar::Integer(1)),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.base_type(), None);
        assert_eq!(a.cardinality(), Cardinality::Record);
    }

    #[test]
    fn record_ignores_declared_base_type_on_check() {
        let r = Value::record(vec![("score".to_string(), Scalar::Float(0.5))]);
        assert!(r.check(Cardinality::Record, None).is_ok());
    }
}
