//! proctor-core: assessment document model and typed value model.
//!
//! This crate holds the immutable, already-parsed form of an
//! assessment: item and test definitions, expression and rule trees,
//! and the typed scalar/container value model they share. Parsing the
//! source document format into these types, rendering item content,
//! and persisting session state are all external concerns.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`Value`], [`Scalar`] -- the typed value model
//! - [`BaseType`], [`Cardinality`] -- the closed tag sets
//! - [`Expression`], [`Operator`] -- expression trees
//! - [`Rule`] -- processing rules
//! - [`AssessmentItem`], [`AssessmentTest`] -- document roots

pub mod expression;
pub mod item;
pub mod rules;
pub mod types;
pub mod value;

pub use expression::{Expression, Operator, ToleranceMode};
pub use item::{
    AssessmentItem, InterpolationTableEntry, ItemSessionControl, LookupTable, MapEntry, Mapping,
    MatchTableEntry, OutcomeDeclaration, ResponseDeclaration, TemplateDeclaration, TimeLimits,
};
pub use rules::{ConditionBranch, Rule};
pub use test::{
    AssessmentItemRef, AssessmentSection, AssessmentTest, Ordering, SectionPart, Selection,
    TestPart,
};
pub use types::{BaseType, Cardinality, NavigationMode, SubmissionMode};
pub use value::{is_null, Scalar, Value, ValueError};
