//! Base enumerations shared by the document model and the runtime.
//!
//! These are the closed tag sets of the assessment model: the scalar
//! base types, the four container cardinalities, and the per-test-part
//! navigation and submission policies. All dispatch in the runtime is
//! done by matching on these enums, never by string tag lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scalar data type of a value.
///
/// `IntOrIdentifier` is a declaration-side union: a variable declared
/// with it accepts either an integer or an identifier scalar. It never
/// appears as the base type of a concrete scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Boolean,
    Integer,
    Float,
    String,
    Identifier,
    Duration,
    Point,
    Pair,
    DirectedPair,
    Uri,
    File,
    IntOrIdentifier,
}

impl BaseType {
    /// Whether values of this base type take part in numeric operators.
    pub fn is_numeric(self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Float)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Boolean => "boolean",
            BaseType::Integer => "integer",
            BaseType::Float => "float",
            BaseType::String => "string",
            BaseType::Identifier => "identifier",
            BaseType::Duration => "duration",
            BaseType::Point => "point",
            BaseType::Pair => "pair",
            BaseType::DirectedPair => "directedPair",
            BaseType::Uri => "uri",
            BaseType::File => "file",
            BaseType::IntOrIdentifier => "intOrIdentifier",
        };
        write!(f, "{}", name)
    }
}

/// How many values a variable holds, and with what structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// Exactly one value (or NULL).
    Single,
    /// An unordered bag; duplicates allowed.
    Multiple,
    /// A sequence; duplicates allowed.
    Ordered,
    /// Named fields, each holding a single value of its own base type.
    Record,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cardinality::Single => "single",
            Cardinality::Multiple => "multiple",
            Cardinality::Ordered => "ordered",
            Cardinality::Record => "record",
        };
        write!(f, "{}", name)
    }
}

/// Whether a test part lets the candidate move freely between items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationMode {
    Linear,
    NonLinear,
}

/// Whether responses are scored item by item or all at once at the end
/// of the test part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionMode {
    Individual,
    Simultaneous,
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
