//! Item-session integration scenarios.
//!
//! Each test drives a complete item definition through the full
//! lifecycle: begin the session, attempt, bind responses, run response
//! processing, and read outcomes back through the public surface.

use proctor_core::expression::{Expression, Operator};
use proctor_core::item::{
    AssessmentItem, InterpolationTableEntry, ItemSessionControl, LookupTable, MapEntry, Mapping,
    OutcomeDeclaration, ResponseDeclaration, TemplateDeclaration,
};
use proctor_core::rules::{ConditionBranch, Rule};
use proctor_core::types::{BaseType, Cardinality};
use proctor_core::value::{Scalar, Value};
use proctor_runtime::{ItemSession, ItemSessionState, State, Variable, VariableKind};
use std::sync::Arc;

fn responses(entries: Vec<(&str, Value)>) -> State {
    let mut state = State::new();
    for (id, value) in entries {
        state
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
    }
    state
}

/// A multiple-response item: two correct choices mapped to 1.0 each,
/// a distractor mapped to -1.0, the mapped score graded through an
/// interpolation table.
fn mapped_choice_item() -> Arc<AssessmentItem> {
    let mut item = AssessmentItem::new("Q_MAPPED", "Prime numbers");
    item.session_control = ItemSessionControl {
        max_attempts: 0,
        ..ItemSessionControl::default()
    };
    item.response_declarations.push(
        ResponseDeclaration::new("RESPONSE", Cardinality::Multiple, Some(BaseType::Identifier))
            .with_correct_response(
                Value::multiple(
                    BaseType::Identifier,
                    vec![Scalar::identifier("TWO"), Scalar::identifier("THREE")],
                )
                .unwrap(),
            )
            .with_mapping(Mapping {
                lower_bound: Some(0.0),
                upper_bound: Some(2.0),
                default_value: 0.0,
                entries: vec![
                    MapEntry::new(Scalar::identifier("TWO"), 1.0),
                    MapEntry::new(Scalar::identifier("THREE"), 1.0),
                    MapEntry::new(Scalar::identifier("FOUR"), -1.0),
                ],
            }),
    );
    item.outcome_declarations.push(OutcomeDeclaration::new(
        "SCORE",
        Cardinality::Single,
        Some(BaseType::Float),
    ));
    item.outcome_declarations.push(
        OutcomeDeclaration::new("GRADE", Cardinality::Single, Some(BaseType::Identifier))
            .with_lookup_table(LookupTable::Interpolation {
                entries: vec![
                    InterpolationTableEntry {
                        source_value: 0.5,
                        include_boundary: true,
                        target_value: Scalar::identifier("fail"),
                    },
                    InterpolationTableEntry {
                        source_value: 1.5,
                        include_boundary: true,
                        target_value: Scalar::identifier("pass"),
                    },
                ],
                default_value: Some(Scalar::identifier("distinction")),
            }),
    );
    item.response_processing = vec![
        Rule::set_outcome(
            "SCORE",
            Expression::MapResponse { identifier: "RESPONSE".to_string() },
        ),
        Rule::LookupOutcomeValue {
            identifier: "GRADE".to_string(),
            expression: Expression::variable("SCORE"),
        },
    ];
    Arc::new(item)
}

/// A templated arithmetic item: X and Y drawn at instantiation under a
/// constraint, correct response computed from them.
fn templated_sum_item() -> Arc<AssessmentItem> {
    let mut item = AssessmentItem::new("Q_TEMPLATE", "Add the two numbers");
    item.session_control = ItemSessionControl {
        max_attempts: 0,
        ..ItemSessionControl::default()
    };
    item.template_declarations.push(TemplateDeclaration::new(
        "X",
        Cardinality::Single,
        Some(BaseType::Integer),
    ));
    item.template_declarations.push(TemplateDeclaration::new(
        "Y",
        Cardinality::Single,
        Some(BaseType::Integer),
    ));
    item.response_declarations.push(ResponseDeclaration::new(
        "RESPONSE",
        Cardinality::Single,
        Some(BaseType::Integer),
    ));
    item.outcome_declarations.push(OutcomeDeclaration::new(
        "SCORE",
        Cardinality::Single,
        Some(BaseType::Float),
    ));
    item.template_processing = vec![
        Rule::set_template("X", Expression::RandomInteger { min: 1, max: 9, step: 1 }),
        Rule::set_template("Y", Expression::RandomInteger { min: 1, max: 9, step: 1 }),
        // Avoid the degenerate X == Y presentation.
        Rule::TemplateConstraint {
            expression: Expression::op(
                Operator::Not,
                vec![Expression::op(
                    Operator::Match,
                    vec![Expression::variable("X"), Expression::variable("Y")],
                )],
            ),
        },
        Rule::SetCorrectResponse {
            identifier: "RESPONSE".to_string(),
            expression: Expression::op(
                Operator::Sum,
                vec![Expression::variable("X"), Expression::variable("Y")],
            ),
        },
    ];
    item.response_processing = vec![Rule::Condition {
        if_branch: ConditionBranch::new(
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

#[test]
fn mapped_response_scores_and_grades() {
    let mut session = ItemSession::with_seed(mapped_choice_item(), 42);
    session.begin_item_session().unwrap();
    session.begin_attempt().unwrap();

    // Both correct choices, plus a duplicate that must count once.
    session
        .end_attempt(&responses(vec![(
            "RESPONSE",
            Value::multiple(
                BaseType::Identifier,
                vec![
                    Scalar::identifier("TWO"),
                    Scalar::identifier("TWO"),
                    Scalar::identifier("THREE"),
                ],
            )
            .unwrap(),
        )]))
        .unwrap();

    assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(2.0)));
    assert_eq!(
        session.value("GRADE").unwrap(),
        Some(&Value::identifier("distinction"))
    );
    assert_eq!(session.completion_status(), "completed");
}

#[test]
fn distractor_drags_the_mapped_score_down() {
    let mut session = ItemSession::with_seed(mapped_choice_item(), 42);
    session.begin_item_session().unwrap();
    session.begin_attempt().unwrap();
    session
        .end_attempt(&responses(vec![(
            "RESPONSE",
            Value::multiple(
                BaseType::Identifier,
                vec![Scalar::identifier("TWO"), Scalar::identifier("FOUR")],
            )
            .unwrap(),
        )]))
        .unwrap();

    // 1.0 - 1.0 clamped at the lower bound 0.0, graded "fail".
    assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(0.0)));
    assert_eq!(
        session.value("GRADE").unwrap(),
        Some(&Value::identifier("fail"))
    );
}

#[test]
fn null_response_maps_to_the_default_score() {
    let mut session = ItemSession::with_seed(mapped_choice_item(), 42);
    session.begin_item_session().unwrap();
    session.begin_attempt().unwrap();
    // No response bound at all.
    session.end_attempt(&State::new()).unwrap();
    assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(0.0)));
}

#[test]
fn templated_item_instantiates_under_its_constraint() {
    let mut session = ItemSession::with_seed(templated_sum_item(), 7);
    session.set_template_retry_limit(100);
    session.begin_item_session().unwrap();

    let x = match session.value("X").unwrap() {
        Some(Value::Single(Scalar::Integer(i))) => *i,
        other => panic!("unexpected X: {:?}", other),
    };
    let y = match session.value("Y").unwrap() {
        Some(Value::Single(Scalar::Integer(i))) => *i,
        other => panic!("unexpected Y: {:?}", other),
    };
    assert_ne!(x, y, "the template constraint forbids X == Y");

    // The computed correct response follows the drawn template values.
    session.begin_attempt().unwrap();
    session
        .end_attempt(&responses(vec![("RESPONSE", Value::integer(x + y))]))
        .unwrap();
    assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(1.0)));
    assert_eq!(session.num_attempts(), 1);
}

#[test]
fn same_seed_same_instantiation() {
    let values = |seed: u64| {
        let mut session = ItemSession::with_seed(templated_sum_item(), seed);
        session.set_template_retry_limit(100);
        session.begin_item_session().unwrap();
        (
            session.value("X").unwrap().cloned(),
            session.value("Y").unwrap().cloned(),
        )
    };
    assert_eq!(values(123), values(123));
}

#[test]
fn reattempts_are_allowed_while_unlimited() {
    let mut session = ItemSession::with_seed(templated_sum_item(), 7);
    session.set_template_retry_limit(100);
    session.begin_item_session().unwrap();

    for attempt in 1..=3u32 {
        session.begin_attempt().unwrap();
        session
            .end_attempt(&responses(vec![("RESPONSE", Value::integer(-1))]))
            .unwrap();
        assert_eq!(session.num_attempts(), attempt);
        assert_eq!(session.state(), ItemSessionState::Interacting);
    }
    assert_eq!(session.value("SCORE").unwrap(), Some(&Value::float(0.0)));

    session.end_item_session().unwrap();
    assert_eq!(session.state(), ItemSessionState::Closed);
    assert!(session.begin_attempt().is_err());
}
