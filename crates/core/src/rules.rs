//! Processing-rule trees: conditions and actions.
//!
//! The same rule shape is used for all three processing passes
//! (response, template, and test-level outcome processing); which
//! actions are meaningful in which pass is a document-authoring
//! concern. Rules in a list execute strictly in declaration order, and
//! every action's mutation is visible to the rules that follow it in
//! the same pass.

use crate::expression::Expression;

/// One `if`/`else-if` arm of a condition: a boolean guard and the rules
/// to run when it is true.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionBranch {
    pub condition: Expression,
    pub rules: Vec<Rule>,
}

impl ConditionBranch {
    pub fn new(condition: Expression, rules: Vec<Rule>) -> ConditionBranch {
        ConditionBranch { condition, rules }
    }
}

/// A processing rule: either a condition tree or a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `if` / ordered `else-if` arms / optional `else`. A NULL or false
    /// guard falls through to the next arm; the first true guard runs
    /// its rules and completes the whole condition.
    Condition {
        if_branch: ConditionBranch,
        else_if: Vec<ConditionBranch>,
        /// Empty when the condition has no `else`.
        else_rules: Vec<Rule>,
    },
    /// Assign an outcome variable.
    SetOutcomeValue { identifier: String, expression: Expression },
    /// Assign a response variable.
    SetResponseValue { identifier: String, expression: Expression },
    /// Assign a template variable.
    SetTemplateValue { identifier: String, expression: Expression },
    /// Replace a variable's declared default value.
    SetDefaultValue { identifier: String, expression: Expression },
    /// Replace a response variable's declared correct response.
    SetCorrectResponse { identifier: String, expression: Expression },
    /// Assign an outcome variable through its declared lookup table.
    LookupOutcomeValue { identifier: String, expression: Expression },
    /// End the response-processing pass. Normal control flow.
    ExitResponse,
    /// End the template-processing pass. Normal control flow.
    ExitTemplate,
    /// End the test-level outcome-processing pass. Normal control flow.
    ExitTest,
    /// Require the expression to be true; a false or NULL result asks
    /// the template pass to re-instantiate template variables.
    TemplateConstraint { expression: Expression },
}

impl Rule {
    /// A plain `if` with no else-if/else arms.
    pub fn simple_condition(condition: Expression, rules: Vec<Rule>) -> Rule {
        Rule::Condition {
            if_branch: ConditionBranch::new(condition, rules),
            else_if: Vec::new(),
            else_rules: Vec::new(),
        }
    }

    pub fn set_outcome(identifier: impl Into<String>, expression: Expression) -> Rule {
        Rule::SetOutcomeValue { identifier: identifier.into(), expression }
    }

    pub fn set_template(identifier: impl Into<String>, expression: Expression) -> Rule {
        Rule::SetTemplateValue { identifier: identifier.into(), expression }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
