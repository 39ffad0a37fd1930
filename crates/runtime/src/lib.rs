//! proctor-runtime: the assessment evaluation engine.
//!
//! Consumes the immutable document model from `proctor-core` and
//! implements the runtime semantics on top of it:
//!
//! - [`state`] -- variables and the insertion-ordered variable store
//! - [`operators`] -- the expression/operator evaluator
//! - [`processing`] -- the rule interpreter for response, template,
//!   and test-level outcome processing
//! - [`session`] -- the item-session lifecycle state machine
//! - [`route`] -- route construction, indexing, and navigation
//!
//! Everything is single-threaded and synchronous: each operation runs
//! to completion before returning, and nothing here performs I/O. One
//! [`ItemSession`] belongs to exactly one (candidate, item-occurrence)
//! pair; a [`Route`] is read-mostly after construction and may be
//! shared across the sessions scoring against the same test.

pub mod error;
pub mod numeric;
pub mod operators;
pub mod processing;
pub mod route;
pub mod session;
pub mod state;

pub use error::{ProcessingErrors, RuntimeError};
pub use operators::eval;
pub use processing::{
    check_template_constraints, run_rules, run_template_processing, Exit, PassOutcome,
};
pub use route::{Route, RouteItem};
pub use session::{ItemSession, ItemSessionState};
pub use state::{State, Variable, VariableKind};
