//! Assessment item definitions: variable declarations, scoring tables,
//! session control, and the item's processing-rule trees.
//!
//! This is the immutable document model an external parser produces.
//! The runtime reads it; it never writes back.

use crate::rules::Rule;
use crate::types::{BaseType, Cardinality};
use crate::value::{Scalar, Value};
use time::Duration;

// ──────────────────────────────────────────────
// Response mappings
// ──────────────────────────────────────────────

/// One key of a response mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Scalar,
    pub mapped_value: f64,
    /// String keys only: compare case-insensitively when false.
    pub case_sensitive: bool,
}

impl MapEntry {
    pub fn new(key: Scalar, mapped_value: f64) -> MapEntry {
        MapEntry { key, mapped_value, case_sensitive: true }
    }
}

/// Maps response values onto a numeric score. Each distinct response
/// entry is counted once; unmatched entries contribute the default;
/// the total is clamped to the declared bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub default_value: f64,
    pub entries: Vec<MapEntry>,
}

impl Mapping {
    pub fn new(entries: Vec<MapEntry>) -> Mapping {
        Mapping {
            lower_bound: None,
            upper_bound: None,
            default_value: 0.0,
            entries,
        }
    }
}

// ──────────────────────────────────────────────
// Outcome lookup tables
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MatchTableEntry {
    pub source_value: i64,
    pub target_value: Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTableEntry {
    pub source_value: f64,
    /// When true the entry admits values equal to `source_value`.
    pub include_boundary: bool,
    pub target_value: Scalar,
}

/// A lookup table attached to an outcome declaration, consulted by the
/// `lookupOutcomeValue` action. Entries are tried in declaration order;
/// the first match wins.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupTable {
    Match {
        entries: Vec<MatchTableEntry>,
        default_value: Option<Scalar>,
    },
    Interpolation {
        entries: Vec<InterpolationTableEntry>,
        default_value: Option<Scalar>,
    },
}

// ──────────────────────────────────────────────
// Variable declarations
// ──────────────────────────────────────────────

/// Declaration of a candidate-input variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    /// None only for record cardinality.
    pub base_type: Option<BaseType>,
    pub default_value: Option<Value>,
    pub correct_response: Option<Value>,
    pub mapping: Option<Mapping>,
}

impl ResponseDeclaration {
    pub fn new(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> ResponseDeclaration {
        ResponseDeclaration {
            identifier: identifier.into(),
            cardinality,
            base_type,
            default_value: None,
            correct_response: None,
            mapping: None,
        }
    }

    pub fn with_correct_response(mut self, value: Value) -> ResponseDeclaration {
        self.correct_response = Some(value);
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> ResponseDeclaration {
        self.mapping = Some(mapping);
        self
    }
}

/// Declaration of a computed variable.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Option<Value>,
    pub normal_minimum: Option<f64>,
    pub normal_maximum: Option<f64>,
    pub lookup_table: Option<LookupTable>,
}

impl OutcomeDeclaration {
    pub fn new(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> OutcomeDeclaration {
        OutcomeDeclaration {
            identifier: identifier.into(),
            cardinality,
            base_type,
            default_value: None,
            normal_minimum: None,
            normal_maximum: None,
            lookup_table: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> OutcomeDeclaration {
        self.default_value = Some(value);
        self
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> OutcomeDeclaration {
        self.lookup_table = Some(table);
        self
    }
}

/// Declaration of an item-instantiation parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Option<Value>,
}

impl TemplateDeclaration {
    pub fn new(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> TemplateDeclaration {
        TemplateDeclaration {
            identifier: identifier.into(),
            cardinality,
            base_type,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> TemplateDeclaration {
        self.default_value = Some(value);
        self
    }
}

// ──────────────────────────────────────────────
// Session policy
// ──────────────────────────────────────────────

/// Per-item session policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSessionControl {
    /// 0 means unlimited.
    pub max_attempts: u32,
    pub show_feedback: bool,
    pub allow_review: bool,
    pub show_solution: bool,
}

impl Default for ItemSessionControl {
    fn default() -> ItemSessionControl {
        ItemSessionControl {
            max_attempts: 1,
            show_feedback: false,
            allow_review: true,
            show_solution: false,
        }
    }
}

/// Declared time limits. Enforcement is the caller's responsibility;
/// the session only accounts duration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLimits {
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
    pub allow_late_submission: bool,
}

// ──────────────────────────────────────────────
// The item
// ──────────────────────────────────────────────

/// An assessment item definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentItem {
    pub identifier: String,
    pub title: String,
    /// Adaptive items ignore the attempt limit.
    pub adaptive: bool,
    pub time_dependent: bool,
    pub response_declarations: Vec<ResponseDeclaration>,
    pub outcome_declarations: Vec<OutcomeDeclaration>,
    pub template_declarations: Vec<TemplateDeclaration>,
    pub template_processing: Vec<Rule>,
    pub response_processing: Vec<Rule>,
    pub session_control: ItemSessionControl,
    pub time_limits: Option<TimeLimits>,
}

impl AssessmentItem {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> AssessmentItem {
        AssessmentItem {
            identifier: identifier.into(),
            title: title.into(),
            adaptive: false,
            time_dependent: false,
            response_declarations: Vec::new(),
            outcome_declarations: Vec::new(),
            template_declarations: Vec::new(),
            template_processing: Vec::new(),
            response_processing: Vec::new(),
            session_control: ItemSessionControl::default(),
            time_limits: None,
        }
    }

    pub fn response_declaration(&self, identifier: &str) -> Option<&ResponseDeclaration> {
        self.response_declarations
            .iter()
            .find(|d| d.identifier == identifier)
    }

    pub fn outcome_declaration(&self, identifier: &str) -> Option<&OutcomeDeclaration> {
        self.outcome_declarations
            .iter()
            .find(|d| d.identifier == identifier)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
