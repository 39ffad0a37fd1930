//! Item-session lifecycle state machine.
//!
//! One [`ItemSession`] owns one candidate's interaction with one item
//! occurrence: its variable store, attempt counter, accumulated
//! duration, and lifecycle state. All side effects stay inside the
//! session's own store; sessions never touch each other's variables.
//!
//! Time is injected, never read from a clock: the host calls
//! [`ItemSession::set_time`] and duration accrues only while the
//! session is INTERACTING. Time-limit enforcement stays with the host,
//! which watches the accumulated duration and decides when to force
//! `end_attempt`/`end_item_session`.

use proctor_core::item::AssessmentItem;
use proctor_core::types::{BaseType, Cardinality};
use proctor_core::value::{Scalar, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

use crate::error::RuntimeError;
use crate::processing::{self, Exit, PassOutcome};
use crate::state::{State, Variable, VariableKind};

/// Built-in variable identifiers every item session declares.
pub const NUM_ATTEMPTS: &str = "numAttempts";
pub const DURATION: &str = "duration";
pub const COMPLETION_STATUS: &str = "completionStatus";

/// Default bound on template re-instantiation attempts.
pub const DEFAULT_TEMPLATE_RETRY_LIMIT: usize = 10;

/// Lifecycle states of an item session.
///
/// `NotSelected` is initial; `Closed` is terminal for scoring.
/// `Solution` and `Review` are auxiliary review-mode states reachable
/// from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSessionState {
    NotSelected,
    Initial,
    Interacting,
    ModalFeedback,
    Suspended,
    Closed,
    Solution,
    Review,
}

impl fmt::Display for ItemSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemSessionState::NotSelected => "notSelected",
            ItemSessionState::Initial => "initial",
            ItemSessionState::Interacting => "interacting",
            ItemSessionState::ModalFeedback => "modalFeedback",
            ItemSessionState::Suspended => "suspended",
            ItemSessionState::Closed => "closed",
            ItemSessionState::Solution => "solution",
            ItemSessionState::Review => "review",
        };
        write!(f, "{}", name)
    }
}

/// One candidate's session against one item occurrence.
#[derive(Debug)]
pub struct ItemSession {
    item: Arc<AssessmentItem>,
    state: ItemSessionState,
    variables: State,
    attempts: u32,
    duration: Duration,
    time_reference: Option<OffsetDateTime>,
    template_retry_limit: usize,
    rng: StdRng,
}

impl ItemSession {
    /// A session with entropy-seeded randomness.
    pub fn new(item: Arc<AssessmentItem>) -> ItemSession {
        ItemSession::build(item, StdRng::from_entropy())
    }

    /// A session with pinned randomness, for reproducible evaluation.
    pub fn with_seed(item: Arc<AssessmentItem>, seed: u64) -> ItemSession {
        ItemSession::build(item, StdRng::seed_from_u64(seed))
    }

    fn build(item: Arc<AssessmentItem>, rng: StdRng) -> ItemSession {
        ItemSession {
            item,
            state: ItemSessionState::NotSelected,
            variables: State::new(),
            attempts: 0,
            duration: Duration::ZERO,
            time_reference: None,
            template_retry_limit: DEFAULT_TEMPLATE_RETRY_LIMIT,
            rng,
        }
    }

    pub fn set_template_retry_limit(&mut self, limit: usize) {
        self.template_retry_limit = limit;
    }

    pub fn item(&self) -> &AssessmentItem {
        &self.item
    }

    pub fn state(&self) -> ItemSessionState {
        self.state
    }

    pub fn num_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `unknown`, `not_attempted`, `completed`, or `incomplete`.
    pub fn completion_status(&self) -> String {
        match self.variables.value(COMPLETION_STATUS) {
            Ok(Some(Value::Single(Scalar::Identifier(id)))) => id.clone(),
            _ => "not_attempted".to_string(),
        }
    }

    /// The current value of any session variable.
    pub fn value(&self, identifier: &str) -> Result<Option<&Value>, RuntimeError> {
        self.variables.value(identifier)
    }

    /// Read-only view of the whole store.
    pub fn variables(&self) -> &State {
        &self.variables
    }

    fn transition_error(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::StateTransition {
            operation,
            from: self.state,
        }
    }

    /// Start the session: install built-ins and declared variables, run
    /// template processing, and apply outcome/response defaults.
    ///
    /// Valid only from `NotSelected`.
    pub fn begin_item_session(&mut self) -> Result<(), RuntimeError> {
        if self.state != ItemSessionState::NotSelected {
            return Err(self.transition_error("begin the item session"));
        }

        let mut variables = State::new();
        variables.declare(
            Variable::new(
                NUM_ATTEMPTS,
                VariableKind::Response,
                Cardinality::Single,
                Some(BaseType::Integer),
            )
            .with_value(Value::integer(0))?,
        )?;
        variables.declare(
            Variable::new(
                DURATION,
                VariableKind::Response,
                Cardinality::Single,
                Some(BaseType::Duration),
            )
            .with_value(Value::Single(Scalar::Duration(Duration::ZERO)))?,
        )?;
        variables.declare(
            Variable::new(
                COMPLETION_STATUS,
                VariableKind::Outcome,
                Cardinality::Single,
                Some(BaseType::Identifier),
            )
            .with_value(Value::identifier("not_attempted"))?,
        )?;

        for decl in &self.item.template_declarations {
            variables.declare(Variable::from_template_declaration(decl))?;
        }
        for decl in &self.item.response_declarations {
            variables.declare(Variable::from_response_declaration(decl))?;
        }
        for decl in &self.item.outcome_declarations {
            variables.declare(Variable::from_outcome_declaration(decl))?;
        }
        self.variables = variables;

        if !self.item.template_processing.is_empty() {
            processing::run_template_processing(
                &self.item.template_processing,
                &mut self.variables,
                &mut self.rng,
                self.template_retry_limit,
            )?;
        } else {
            for id in self.variables.identifiers_of_kind(VariableKind::Template) {
                self.variables.variable_mut(&id)?.reset_to_default();
            }
        }

        // Defaults after template processing, which may have rewritten
        // them through setDefaultValue.
        for id in self.variables.identifiers_of_kind(VariableKind::Outcome) {
            if id != COMPLETION_STATUS {
                self.variables.variable_mut(&id)?.reset_to_default();
            }
        }
        for id in self.variables.identifiers_of_kind(VariableKind::Response) {
            if id != NUM_ATTEMPTS && id != DURATION {
                let variable = self.variables.variable_mut(&id)?;
                let default = variable.default_value().cloned();
                variable.set_value(default)?;
            }
        }

        self.state = ItemSessionState::Initial;
        Ok(())
    }

    /// Start (or restart) an attempt. Valid from `Initial` and
    /// `Interacting`. Fails with MaxAttemptsExceeded -- leaving the
    /// counter untouched -- once a non-adaptive item's declared limit
    /// (0 meaning unlimited) is reached.
    pub fn begin_attempt(&mut self) -> Result<(), RuntimeError> {
        if !matches!(
            self.state,
            ItemSessionState::Initial | ItemSessionState::Interacting
        ) {
            return Err(self.transition_error("begin an attempt"));
        }
        let limit = self.item.session_control.max_attempts;
        if !self.item.adaptive && limit > 0 && self.attempts >= limit {
            return Err(RuntimeError::MaxAttemptsExceeded { limit });
        }
        self.attempts += 1;
        self.variables
            .set_value(NUM_ATTEMPTS, Some(Value::integer(i64::from(self.attempts))))?;
        if self.attempts == 1 {
            self.variables
                .set_value(COMPLETION_STATUS, Some(Value::identifier("unknown")))?;
        }
        self.state = ItemSessionState::Interacting;
        Ok(())
    }

    /// Bind candidate responses and run response processing.
    ///
    /// Valid only while `Interacting`. Every supplied response is
    /// checked against its declaration before anything is assigned, so
    /// a mismatch aborts the attempt without mutating outcomes.
    pub fn end_attempt(&mut self, responses: &State) -> Result<(), RuntimeError> {
        if self.state != ItemSessionState::Interacting {
            return Err(self.transition_error("end an attempt"));
        }

        // Validate first.
        for supplied in responses.iter() {
            let decl = self
                .item
                .response_declaration(supplied.identifier())
                .ok_or_else(|| RuntimeError::UnknownVariable {
                    identifier: supplied.identifier().to_string(),
                })?;
            if let Some(value) = supplied.value() {
                value
                    .check(decl.cardinality, decl.base_type)
                    .map_err(|e| RuntimeError::from_value_error(supplied.identifier(), e))?;
            }
        }

        // Then bind.
        for decl in &self.item.response_declarations {
            if let Some(supplied) = responses.get(&decl.identifier) {
                self.variables
                    .set_value(&decl.identifier, supplied.value().cloned())?;
            }
        }

        let outcome = processing::run_rules(
            &self.item.response_processing,
            &mut self.variables,
            &mut self.rng,
        )?;
        let status = match outcome {
            PassOutcome::Exited(Exit::Response) => "incomplete",
            _ => "completed",
        };
        self.variables
            .set_value(COMPLETION_STATUS, Some(Value::identifier(status)))?;

        let limit = self.item.session_control.max_attempts;
        if !self.item.adaptive && limit > 0 && self.attempts >= limit {
            self.state = ItemSessionState::Closed;
            self.time_reference = None;
        } else if self.item.session_control.show_feedback {
            self.state = ItemSessionState::ModalFeedback;
        }
        Ok(())
    }

    /// Pause the session; duration stops accruing.
    pub fn suspend(&mut self) -> Result<(), RuntimeError> {
        if !matches!(
            self.state,
            ItemSessionState::Interacting | ItemSessionState::ModalFeedback
        ) {
            return Err(self.transition_error("suspend"));
        }
        self.state = ItemSessionState::Suspended;
        Ok(())
    }

    /// Return to interaction from suspension or modal feedback.
    pub fn resume(&mut self) -> Result<(), RuntimeError> {
        if !matches!(
            self.state,
            ItemSessionState::Suspended | ItemSessionState::ModalFeedback
        ) {
            return Err(self.transition_error("resume"));
        }
        self.state = ItemSessionState::Interacting;
        Ok(())
    }

    /// Close the session. Valid from any non-terminal state; no further
    /// mutating call is permitted afterward.
    pub fn end_item_session(&mut self) -> Result<(), RuntimeError> {
        if matches!(
            self.state,
            ItemSessionState::Closed | ItemSessionState::Solution | ItemSessionState::Review
        ) {
            return Err(self.transition_error("end the item session"));
        }
        self.state = ItemSessionState::Closed;
        self.time_reference = None;
        Ok(())
    }

    /// Enter review mode on a closed session.
    pub fn enter_review(&mut self) -> Result<(), RuntimeError> {
        if !matches!(
            self.state,
            ItemSessionState::Closed | ItemSessionState::Solution
        ) || !self.item.session_control.allow_review
        {
            return Err(self.transition_error("enter review"));
        }
        self.state = ItemSessionState::Review;
        Ok(())
    }

    /// Enter solution mode on a closed session.
    pub fn enter_solution(&mut self) -> Result<(), RuntimeError> {
        if !matches!(
            self.state,
            ItemSessionState::Closed | ItemSessionState::Review
        ) || !self.item.session_control.show_solution
        {
            return Err(self.transition_error("enter the solution"));
        }
        self.state = ItemSessionState::Solution;
        Ok(())
    }

    /// Register the host's clock. Duration accrues between consecutive
    /// calls only while the session is `Interacting`.
    pub fn set_time(&mut self, now: OffsetDateTime) -> Result<(), RuntimeError> {
        if self.state == ItemSessionState::Interacting {
            if let Some(reference) = self.time_reference {
                let elapsed = now - reference;
                if elapsed > Duration::ZERO {
                    self.duration += elapsed;
                    self.variables.set_value(
                        DURATION,
                        Some(Value::Single(Scalar::Duration(self.duration))),
                    )?;
                }
            }
        }
        self.time_reference = Some(now);
        Ok(())
    }

    /// JSON snapshot of the session for reporting surfaces.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "item": self.item.identifier,
            "state": self.state.to_string(),
            "numAttempts": self.attempts,
            "completionStatus": self.completion_status(),
            "durationSeconds": self.duration.whole_seconds(),
            "variables": self.variables.to_json(),
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::expression::{Expression, Operator};
    use proctor_core::item::{ItemSessionControl, OutcomeDeclaration, ResponseDeclaration};
    use proctor_core::rules::Rule;
    use proctor_core::value::Scalar;
    use time::macros::datetime;

    /// A single-choice item scoring 1.0 for the correct identifier.
    fn choice_item() -> Arc<AssessmentItem> {
        let mut item = AssessmentItem::new("Q01", "Composition of Water");
        item.response_declarations.push(
            ResponseDeclaration::new(
                "RESPONSE",
                Cardinality::Single,
                Some(BaseType::Identifier),
            )
            .with_correct_response(Value::identifier("H2O")),
        );
        item.outcome_declarations.push(OutcomeDeclaration::new(
            "SCORE",
            Cardinality::Single,
            Some(BaseType::Float),
        ));
        item.response_processing = vec![Rule::Condition {
            if_branch: proctor_core::rules::ConditionBranch::new(
                Expression::op(
                    Operator::Match,
                    vec![
                        Expression::variable("RESPONSE"),
                        Expression::correct("RESPONSE"),
                    ],
                ),
                vec![Rule::set_outcome("SCORE", Expression::float(1.0))],
            ),
            else_if: vec![],
            else_rules: vec![Rule::set_outcome("SCORE", Expression::float(0.0))],
        }];
        Arc::new(item)
    }

    fn response(id: &str, value: Value) -> State {
        let mut responses = State::new();
        responses
            .declare(
                Variable::new(
                    id,
                    VariableKind::Response,
                    value.cardinality(),
                    value.base_type(),
                )
                .with_value(value)
                .unwrap(),
            )
            .unwrap();
        responses
    }

    #[test]
    fn full_attempt_scores_and_completes() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        assert_eq!(session.state(), ItemSessionState::Initial);
        assert_eq!(session.completion_status(), "not_attempted");

        session.begin_attempt().unwrap();
        assert_eq!(session.completion_status(), "unknown");

        session
            .end_attempt(&response("RESPONSE", Value::identifier("H2O")))
            .unwrap();
        assert_eq!(session.num_attempts(), 1);
        assert_eq!(session.completion_status(), "completed");
        assert_eq!(
            session.value("SCORE").unwrap(),
            Some(&Value::float(1.0))
        );
        // maxAttempts defaults to 1, so the session closed itself.
        assert_eq!(session.state(), ItemSessionState::Closed);
    }

    #[test]
    fn wrong_answer_scores_zero() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();
        session
            .end_attempt(&response("RESPONSE", Value::identifier("CO2")))
            .unwrap();
        assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(0.0)));
    }

    #[test]
    fn attempt_limit_is_enforced_without_mutation() {
        let mut item = (*choice_item()).clone();
        item.session_control = ItemSessionControl {
            max_attempts: 2,
            ..ItemSessionControl::default()
        };
        let mut session = ItemSession::with_seed(Arc::new(item), 1);
        session.begin_item_session().unwrap();

        for _ in 0..2 {
            session.begin_attempt().unwrap();
            session
                .end_attempt(&response("RESPONSE", Value::identifier("CO2")))
                .unwrap();
        }
        assert_eq!(session.state(), ItemSessionState::Closed);
        assert_eq!(session.num_attempts(), 2);
    }

    #[test]
    fn begin_attempt_past_the_limit_fails() {
        let mut item = (*choice_item()).clone();
        item.session_control = ItemSessionControl {
            max_attempts: 2,
            ..ItemSessionControl::default()
        };
        let mut session = ItemSession::with_seed(Arc::new(item), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();
        session.begin_attempt().unwrap();
        let err = session.begin_attempt().unwrap_err();
        assert_eq!(err, RuntimeError::MaxAttemptsExceeded { limit: 2 });
        // The counter is untouched by the failed call.
        assert_eq!(session.num_attempts(), 2);
    }

    #[test]
    fn mismatched_response_aborts_without_scoring() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();

        let err = session
            .end_attempt(&response("RESPONSE", Value::integer(3)))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
        // Outcomes untouched, still interacting.
        assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(0.0)));
        assert_eq!(session.completion_status(), "unknown");
        assert_eq!(session.state(), ItemSessionState::Interacting);
    }

    #[test]
    fn undeclared_response_is_rejected() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();
        let err = session
            .end_attempt(&response("GHOST", Value::identifier("A")))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownVariable { .. }));
    }

    #[test]
    fn lifecycle_guards_reject_out_of_order_calls() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        // No attempt can end before the session begins.
        let err = session.end_attempt(&State::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::StateTransition { .. }));

        session.begin_item_session().unwrap();
        let err = session.begin_item_session().unwrap_err();
        assert!(matches!(err, RuntimeError::StateTransition { .. }));

        session.end_item_session().unwrap();
        let err = session.begin_attempt().unwrap_err();
        assert!(matches!(err, RuntimeError::StateTransition { .. }));
        let err = session.end_item_session().unwrap_err();
        assert!(matches!(err, RuntimeError::StateTransition { .. }));
    }

    #[test]
    fn duration_accrues_only_while_interacting() {
        let mut item = (*choice_item()).clone();
        item.session_control = ItemSessionControl {
            max_attempts: 0,
            ..ItemSessionControl::default()
        };
        let mut session = ItemSession::with_seed(Arc::new(item), 1);
        session.begin_item_session().unwrap();
        session.set_time(datetime!(2024-03-01 10:00:00 UTC)).unwrap();
        session.begin_attempt().unwrap();
        session.set_time(datetime!(2024-03-01 10:00:30 UTC)).unwrap();
        assert_eq!(session.duration(), Duration::seconds(30));

        session.suspend().unwrap();
        session.set_time(datetime!(2024-03-01 10:05:00 UTC)).unwrap();
        // Suspended time does not count.
        assert_eq!(session.duration(), Duration::seconds(30));

        session.resume().unwrap();
        session.set_time(datetime!(2024-03-01 10:05:10 UTC)).unwrap();
        assert_eq!(session.duration(), Duration::seconds(40));
        assert_eq!(
            session.value(DURATION).unwrap(),
            Some(&Value::Single(Scalar::Duration(Duration::seconds(40))))
        );
    }

    #[test]
    fn review_gating_follows_session_control() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        session.end_item_session().unwrap();
        // allow_review defaults to true.
        session.enter_review().unwrap();
        assert_eq!(session.state(), ItemSessionState::Review);
        // show_solution defaults to false.
        let err = session.enter_solution().unwrap_err();
        assert!(matches!(err, RuntimeError::StateTransition { .. }));
    }

    #[test]
    fn modal_feedback_round_trip() {
        let mut item = (*choice_item()).clone();
        item.session_control = ItemSessionControl {
            max_attempts: 0,
            show_feedback: true,
            ..ItemSessionControl::default()
        };
        let mut session = ItemSession::with_seed(Arc::new(item), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();
        session
            .end_attempt(&response("RESPONSE", Value::identifier("H2O")))
            .unwrap();
        assert_eq!(session.state(), ItemSessionState::ModalFeedback);
        session.resume().unwrap();
        assert_eq!(session.state(), ItemSessionState::Interacting);
    }

    #[test]
    fn exit_response_marks_incomplete() {
        let mut item = (*choice_item()).clone();
        item.response_processing = vec![Rule::ExitResponse];
        let mut session = ItemSession::with_seed(Arc::new(item), 1);
        session.begin_item_session().unwrap();
        session.begin_attempt().unwrap();
        session
            .end_attempt(&response("RESPONSE", Value::identifier("H2O")))
            .unwrap();
        assert_eq!(session.completion_status(), "incomplete");
    }

    #[test]
    fn snapshot_reports_session_surface() {
        let mut session = ItemSession::with_seed(choice_item(), 1);
        session.begin_item_session().unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot["item"], "Q01");
        assert_eq!(snapshot["state"], "initial");
        assert_eq!(snapshot["completionStatus"], "not_attempted");
        assert!(snapshot["variables"].get("SCORE").is_some());
    }
}
