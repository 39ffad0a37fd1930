//! Rule interpreter: response, template, and test-level outcome
//! processing passes.
//!
//! A rule list executes in declaration order against an exclusively
//! borrowed [`State`], so every action's mutation is visible to all
//! later rules and expressions in the same pass. `exit*` actions end
//! the pass as normal control flow; template-constraint violations ask
//! the template pass to re-instantiate, bounded by a caller-supplied
//! retry limit.

use proctor_core::item::LookupTable;
use proctor_core::rules::{ConditionBranch, Rule};
use proctor_core::value::{Scalar, Value};
use rand::rngs::StdRng;

use crate::error::{ProcessingErrors, RuntimeError};
use crate::operators::eval;
use crate::state::{State, VariableKind};

/// Which `exit*` action ended a pass early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Response,
    Template,
    Test,
}

/// How a processing pass finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The rule list ran to its end.
    Completed,
    /// An `exit*` action ended the pass early. Normal control flow.
    Exited(Exit),
}

/// Internal step result, including the template-constraint signal that
/// never escapes `run_template_processing`.
enum Signal {
    Continue,
    Exit(Exit),
    ConstraintViolated,
}

/// Run a rule list to completion. Used directly for response processing
/// and test-level outcome processing.
pub fn run_rules(
    rules: &[Rule],
    state: &mut State,
    rng: &mut StdRng,
) -> Result<PassOutcome, RuntimeError> {
    match exec_list(rules, state, rng)? {
        Signal::Continue => Ok(PassOutcome::Completed),
        Signal::Exit(exit) => Ok(PassOutcome::Exited(exit)),
        // A constraint outside a template pass reads as an immediately
        // exhausted instantiation.
        Signal::ConstraintViolated => Err(RuntimeError::TemplateConstraint { attempts: 1 }),
    }
}

/// Run template processing, re-instantiating template variables from
/// their defaults and restarting the pass each time a constraint is
/// violated. `retry_limit` bounds the restarts; exhausting it is fatal.
pub fn run_template_processing(
    rules: &[Rule],
    state: &mut State,
    rng: &mut StdRng,
    retry_limit: usize,
) -> Result<PassOutcome, RuntimeError> {
    let template_ids = state.identifiers_of_kind(VariableKind::Template);
    let attempts = retry_limit + 1;
    for _ in 0..attempts {
        for id in &template_ids {
            state.variable_mut(id)?.reset_to_default();
        }
        match exec_list(rules, state, rng)? {
            Signal::Continue => return Ok(PassOutcome::Completed),
            Signal::Exit(exit) => return Ok(PassOutcome::Exited(exit)),
            Signal::ConstraintViolated => continue,
        }
    }
    Err(RuntimeError::TemplateConstraint { attempts })
}

/// Evaluate every top-level template constraint in one sweep, without
/// executing any actions, and report all violations together.
pub fn check_template_constraints(
    rules: &[Rule],
    state: &State,
    rng: &mut StdRng,
) -> Result<(), ProcessingErrors> {
    let mut errors = ProcessingErrors::new();
    for rule in rules {
        if let Rule::TemplateConstraint { expression } = rule {
            match eval(expression, state, rng) {
                Ok(Some(Value::Single(Scalar::Boolean(true)))) => {}
                Ok(_) => errors.push(RuntimeError::TemplateConstraint { attempts: 1 }),
                Err(err) => errors.push(err),
            }
        }
    }
    errors.into_result()
}

fn exec_list(
    rules: &[Rule],
    state: &mut State,
    rng: &mut StdRng,
) -> Result<Signal, RuntimeError> {
    for rule in rules {
        match exec_rule(rule, state, rng)? {
            Signal::Continue => {}
            other => return Ok(other),
        }
    }
    Ok(Signal::Continue)
}

fn exec_rule(rule: &Rule, state: &mut State, rng: &mut StdRng) -> Result<Signal, RuntimeError> {
    match rule {
        Rule::Condition { if_branch, else_if, else_rules } => {
            if branch_taken(if_branch, state, rng)? {
                return exec_list(&if_branch.rules, state, rng);
            }
            for branch in else_if {
                if branch_taken(branch, state, rng)? {
                    return exec_list(&branch.rules, state, rng);
                }
            }
            exec_list(else_rules, state, rng)
        }
        Rule::SetOutcomeValue { identifier, expression } => {
            assign(state, rng, identifier, expression, VariableKind::Outcome)
        }
        Rule::SetResponseValue { identifier, expression } => {
            assign(state, rng, identifier, expression, VariableKind::Response)
        }
        Rule::SetTemplateValue { identifier, expression } => {
            assign(state, rng, identifier, expression, VariableKind::Template)
        }
        Rule::SetDefaultValue { identifier, expression } => {
            let value = eval(expression, state, rng)?;
            state.variable_mut(identifier)?.set_default_value(value)?;
            Ok(Signal::Continue)
        }
        Rule::SetCorrectResponse { identifier, expression } => {
            let value = eval(expression, state, rng)?;
            let variable = state.variable_mut(identifier)?;
            if variable.kind() != VariableKind::Response {
                return Err(RuntimeError::TypeMismatch {
                    identifier: identifier.clone(),
                    expected: VariableKind::Response.to_string(),
                    got: variable.kind().to_string(),
                });
            }
            variable.set_correct_response(value)?;
            Ok(Signal::Continue)
        }
        Rule::LookupOutcomeValue { identifier, expression } => {
            lookup_outcome(state, rng, identifier, expression)
        }
        Rule::ExitResponse => Ok(Signal::Exit(Exit::Response)),
        Rule::ExitTemplate => Ok(Signal::Exit(Exit::Template)),
        Rule::ExitTest => Ok(Signal::Exit(Exit::Test)),
        Rule::TemplateConstraint { expression } => {
            match eval(expression, state, rng)? {
                Some(Value::Single(Scalar::Boolean(true))) => Ok(Signal::Continue),
                // False or NULL: re-instantiate.
                _ => Ok(Signal::ConstraintViolated),
            }
        }
    }
}

/// A condition guard is taken only when it evaluates to boolean true;
/// NULL and false fall through. A non-boolean guard is an authoring
/// error.
fn branch_taken(
    branch: &ConditionBranch,
    state: &State,
    rng: &mut StdRng,
) -> Result<bool, RuntimeError> {
    match eval(&branch.condition, state, rng)? {
        None => Ok(false),
        Some(Value::Single(Scalar::Boolean(b))) => Ok(b),
        Some(v) if v.is_null() => Ok(false),
        Some(v) => Err(RuntimeError::WrongBaseType {
            operator: "condition",
            message: format!(
                "guard must be boolean, got {}",
                v.base_type().map(|b| b.to_string()).unwrap_or_else(|| "record".into())
            ),
        }),
    }
}

fn assign(
    state: &mut State,
    rng: &mut StdRng,
    identifier: &str,
    expression: &proctor_core::expression::Expression,
    expected_kind: VariableKind,
) -> Result<Signal, RuntimeError> {
    let value = eval(expression, state, rng)?;
    let variable = state.variable_mut(identifier)?;
    if variable.kind() != expected_kind {
        return Err(RuntimeError::TypeMismatch {
            identifier: identifier.to_string(),
            expected: expected_kind.to_string(),
            got: variable.kind().to_string(),
        });
    }
    variable.set_value(value)?;
    Ok(Signal::Continue)
}

/// Assign an outcome through its declared lookup table. Entries are
/// consulted in declaration order; the first match wins. A miss falls
/// back to the table default, else NULL.
fn lookup_outcome(
    state: &mut State,
    rng: &mut StdRng,
    identifier: &str,
    expression: &proctor_core::expression::Expression,
) -> Result<Signal, RuntimeError> {
    let source = eval(expression, state, rng)?;
    let variable = state.variable_mut(identifier)?;
    let table = variable
        .lookup_table()
        .ok_or_else(|| RuntimeError::OperatorFailure {
            operator: "lookupOutcomeValue",
            message: format!("variable '{}' declares no lookup table", identifier),
        })?;

    let scalar = match &source {
        Some(Value::Single(s)) => Some(s),
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            return Err(RuntimeError::WrongCardinality {
                operator: "lookupOutcomeValue",
                message: format!("expected a single source value, got {}", v.cardinality()),
            })
        }
    };

    let target = match (table, scalar) {
        (_, None) => None,
        (LookupTable::Match { entries, default_value }, Some(s)) => {
            let source = s.as_integer().ok_or_else(|| RuntimeError::WrongBaseType {
                operator: "lookupOutcomeValue",
                message: format!("match tables take integer sources, got {}", s.base_type()),
            })?;
            entries
                .iter()
                .find(|e| e.source_value == source)
                .map(|e| e.target_value.clone())
                .or_else(|| default_value.clone())
        }
        (LookupTable::Interpolation { entries, default_value }, Some(s)) => {
            let source = s.as_float().ok_or_else(|| RuntimeError::WrongBaseType {
                operator: "lookupOutcomeValue",
                message: format!(
                    "interpolation tables take numeric sources, got {}",
                    s.base_type()
                ),
            })?;
            entries
                .iter()
                .find(|e| {
                    if e.include_boundary {
                        source <= e.source_value
                    } else {
                        source < e.source_value
                    }
                })
                .map(|e| e.target_value.clone())
                .or_else(|| default_value.clone())
        }
    };

    variable.set_value(target.map(Value::Single))?;
    Ok(Signal::Continue)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
