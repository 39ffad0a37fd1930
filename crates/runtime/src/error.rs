//! Runtime error taxonomy.
//!
//! Variable-conformance and session/route errors are recoverable: the
//! failing call leaves state untouched and the caller may retry with
//! corrected input. Unknown-variable and operator-contract errors are
//! authoring defects in the source document and abort the enclosing
//! processing pass.

use proctor_core::types::Cardinality;
use proctor_core::value::ValueError;
use std::fmt;

use crate::session::ItemSessionState;

/// All errors that can be returned by the proctor runtime.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A value does not conform to its variable's declared base type.
    #[error("type mismatch for '{identifier}': expected {expected}, got {got}")]
    TypeMismatch {
        identifier: String,
        expected: String,
        got: String,
    },

    /// A value does not conform to its variable's declared cardinality.
    #[error("cardinality mismatch for '{identifier}': expected {expected}, got {got}")]
    CardinalityMismatch {
        identifier: String,
        expected: Cardinality,
        got: Cardinality,
    },

    /// A rule or expression references an undeclared identifier.
    #[error("unknown variable: {identifier}")]
    UnknownVariable { identifier: String },

    /// A variable identifier was declared twice in the same store.
    #[error("variable already declared: {identifier}")]
    DuplicateVariable { identifier: String },

    /// An operator received operands of a cardinality outside its contract.
    #[error("operator {operator}: wrong cardinality: {message}")]
    WrongCardinality {
        operator: &'static str,
        message: String,
    },

    /// An operator received operands of a base type outside its contract.
    #[error("operator {operator}: wrong base type: {message}")]
    WrongBaseType {
        operator: &'static str,
        message: String,
    },

    /// Operand-count violations, overflow, or missing scoring tables.
    #[error("operator {operator}: {message}")]
    OperatorFailure {
        operator: &'static str,
        message: String,
    },

    /// A session operation was invoked from a lifecycle state that does
    /// not permit it. No state mutation occurs.
    #[error("cannot {operation} while the item session is {from}")]
    StateTransition {
        operation: &'static str,
        from: ItemSessionState,
    },

    /// `begin_attempt` called after the declared attempt limit.
    #[error("maximum number of attempts ({limit}) reached")]
    MaxAttemptsExceeded { limit: u32 },

    /// A branch identifier resolves to nothing in the route.
    #[error("no branch target '{identifier}' found in the route")]
    BranchTarget { identifier: String },

    /// A template constraint stayed unsatisfied through the caller's
    /// retry bound. Fatal once surfaced.
    #[error("template constraint unsatisfied after {attempts} instantiation attempt(s)")]
    TemplateConstraint { attempts: usize },
}

impl RuntimeError {
    /// Attach a variable identifier to a conformance failure.
    pub(crate) fn from_value_error(identifier: &str, err: ValueError) -> RuntimeError {
        match err {
            ValueError::TypeMismatch { expected, got } => RuntimeError::TypeMismatch {
                identifier: identifier.to_string(),
                expected,
                got,
            },
            ValueError::CardinalityMismatch { expected, got } => {
                RuntimeError::CardinalityMismatch {
                    identifier: identifier.to_string(),
                    expected,
                    got,
                }
            }
        }
    }

    /// Whether the caller can recover by rejecting the input and
    /// retrying, as opposed to a fatal authoring defect.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RuntimeError::TypeMismatch { .. }
                | RuntimeError::CardinalityMismatch { .. }
                | RuntimeError::StateTransition { .. }
                | RuntimeError::MaxAttemptsExceeded { .. }
                | RuntimeError::BranchTarget { .. }
        )
    }
}

/// Independent failures accumulated across a batch pass, surfaced
/// together instead of first-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingErrors(pub Vec<RuntimeError>);

impl ProcessingErrors {
    pub fn new() -> ProcessingErrors {
        ProcessingErrors(Vec::new())
    }

    pub fn push(&mut self, err: RuntimeError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Ok when nothing failed, otherwise the whole collection.
    pub fn into_result(self) -> Result<(), ProcessingErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ProcessingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} processing failure(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "; {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessingErrors {}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
