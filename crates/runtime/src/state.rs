//! Variables and the insertion-ordered variable store.
//!
//! A [`Variable`] pairs a declaration (kind, cardinality, base type,
//! defaults, scoring tables) with its current value. A [`State`] maps
//! identifiers to variables, unique keys, iterated in insertion order.
//! The same type serves as an item session's store and as the response
//! payload handed to `end_attempt`.

use proctor_core::item::{
    LookupTable, Mapping, OutcomeDeclaration, ResponseDeclaration, TemplateDeclaration,
};
use proctor_core::types::{BaseType, Cardinality};
use proctor_core::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::RuntimeError;

/// Which declaration class a variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableKind {
    Response,
    Outcome,
    Template,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableKind::Response => "response",
            VariableKind::Outcome => "outcome",
            VariableKind::Template => "template",
        };
        write!(f, "{} variable", name)
    }
}

/// A declared variable and its current value.
///
/// The declared cardinality and base type never change after
/// construction; only the contents do, and only through checked
/// assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    identifier: String,
    kind: VariableKind,
    cardinality: Cardinality,
    base_type: Option<BaseType>,
    value: Option<Value>,
    default_value: Option<Value>,
    // Response variables only.
    correct_response: Option<Value>,
    mapping: Option<Mapping>,
    // Outcome variables only.
    lookup_table: Option<LookupTable>,
    normal_minimum: Option<f64>,
    normal_maximum: Option<f64>,
}

impl Variable {
    /// A bare variable with a NULL value. Used for responses supplied
    /// by the candidate and for built-in session variables.
    pub fn new(
        identifier: impl Into<String>,
        kind: VariableKind,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Variable {
        Variable {
            identifier: identifier.into(),
            kind,
            cardinality,
            base_type,
            value: None,
            default_value: None,
            correct_response: None,
            mapping: None,
            lookup_table: None,
            normal_minimum: None,
            normal_maximum: None,
        }
    }

    pub fn from_response_declaration(decl: &ResponseDeclaration) -> Variable {
        Variable {
            identifier: decl.identifier.clone(),
            kind: VariableKind::Response,
            cardinality: decl.cardinality,
            base_type: decl.base_type,
            value: None,
            default_value: decl.default_value.clone(),
            correct_response: decl.correct_response.clone(),
            mapping: decl.mapping.clone(),
            lookup_table: None,
            normal_minimum: None,
            normal_maximum: None,
        }
    }

    pub fn from_outcome_declaration(decl: &OutcomeDeclaration) -> Variable {
        Variable {
            identifier: decl.identifier.clone(),
            kind: VariableKind::Outcome,
            cardinality: decl.cardinality,
            base_type: decl.base_type,
            value: None,
            default_value: decl.default_value.clone(),
            correct_response: None,
            mapping: None,
            lookup_table: decl.lookup_table.clone(),
            normal_minimum: decl.normal_minimum,
            normal_maximum: decl.normal_maximum,
        }
    }

    pub fn from_template_declaration(decl: &TemplateDeclaration) -> Variable {
        Variable {
            identifier: decl.identifier.clone(),
            kind: VariableKind::Template,
            cardinality: decl.cardinality,
            base_type: decl.base_type,
            value: None,
            default_value: decl.default_value.clone(),
            correct_response: None,
            mapping: None,
            lookup_table: None,
            normal_minimum: None,
            normal_maximum: None,
        }
    }

    /// Seed a value at construction time, bypassing no checks: the
    /// value must conform to the declaration handed in alongside it.
    pub fn with_value(mut self, value: Value) -> Result<Variable, RuntimeError> {
        self.check(&value)?;
        self.value = Some(value);
        Ok(self)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn base_type(&self) -> Option<BaseType> {
        self.base_type
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn correct_response(&self) -> Option<&Value> {
        self.correct_response.as_ref()
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    pub fn lookup_table(&self) -> Option<&LookupTable> {
        self.lookup_table.as_ref()
    }

    pub fn normal_minimum(&self) -> Option<f64> {
        self.normal_minimum
    }

    pub fn normal_maximum(&self) -> Option<f64> {
        self.normal_maximum
    }

    pub fn is_null(&self) -> bool {
        proctor_core::value::is_null(&self.value)
    }

    fn check(&self, value: &Value) -> Result<(), RuntimeError> {
        value
            .check(self.cardinality, self.base_type)
            .map_err(|e| RuntimeError::from_value_error(&self.identifier, e))
    }

    /// Checked assignment. `None` clears the value to NULL.
    pub fn set_value(&mut self, value: Option<Value>) -> Result<(), RuntimeError> {
        if let Some(v) = &value {
            self.check(v)?;
        }
        self.value = value;
        Ok(())
    }

    /// Checked replacement of the declared default.
    pub fn set_default_value(&mut self, value: Option<Value>) -> Result<(), RuntimeError> {
        if let Some(v) = &value {
            self.check(v)?;
        }
        self.default_value = value;
        Ok(())
    }

    /// Checked replacement of the declared correct response.
    pub fn set_correct_response(&mut self, value: Option<Value>) -> Result<(), RuntimeError> {
        if let Some(v) = &value {
            self.check(v)?;
        }
        self.correct_response = value;
        Ok(())
    }

    /// Reset to the declared default. With no default, single integer
    /// and float variables get a zero; everything else goes NULL.
    pub fn reset_to_default(&mut self) {
        self.value = match (&self.default_value, self.cardinality, self.base_type) {
            (Some(default), _, _) => Some(default.clone()),
            (None, Cardinality::Single, Some(BaseType::Integer)) => Some(Value::integer(0)),
            (None, Cardinality::Single, Some(BaseType::Float)) => Some(Value::float(0.0)),
            _ => None,
        };
    }
}

/// An insertion-ordered mapping from identifier to [`Variable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    order: Vec<String>,
    vars: BTreeMap<String, Variable>,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.vars.contains_key(identifier)
    }

    /// Declare a variable. Identifiers are unique within a store.
    pub fn declare(&mut self, variable: Variable) -> Result<(), RuntimeError> {
        let identifier = variable.identifier().to_string();
        if self.vars.contains_key(&identifier) {
            return Err(RuntimeError::DuplicateVariable { identifier });
        }
        self.order.push(identifier.clone());
        self.vars.insert(identifier, variable);
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<&Variable> {
        self.vars.get(identifier)
    }

    /// Resolve a variable, failing with UnknownVariable.
    pub fn variable(&self, identifier: &str) -> Result<&Variable, RuntimeError> {
        self.vars
            .get(identifier)
            .ok_or_else(|| RuntimeError::UnknownVariable {
                identifier: identifier.to_string(),
            })
    }

    /// Mutable resolution, failing with UnknownVariable.
    pub fn variable_mut(&mut self, identifier: &str) -> Result<&mut Variable, RuntimeError> {
        self.vars
            .get_mut(identifier)
            .ok_or_else(|| RuntimeError::UnknownVariable {
                identifier: identifier.to_string(),
            })
    }

    /// The current value of a declared variable.
    pub fn value(&self, identifier: &str) -> Result<Option<&Value>, RuntimeError> {
        Ok(self.variable(identifier)?.value())
    }

    /// Checked assignment through the store.
    pub fn set_value(
        &mut self,
        identifier: &str,
        value: Option<Value>,
    ) -> Result<(), RuntimeError> {
        self.variable_mut(identifier)?.set_value(value)
    }

    /// Variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().map(|id| &self.vars[id])
    }

    /// Identifiers of all variables of a kind, in insertion order.
    pub fn identifiers_of_kind(&self, kind: VariableKind) -> Vec<String> {
        self.iter()
            .filter(|v| v.kind() == kind)
            .map(|v| v.identifier().to_string())
            .collect()
    }

    /// JSON snapshot of every variable's current value, in insertion
    /// order of declaration.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for var in self.iter() {
            let value = match var.value() {
                Some(v) if !v.is_null() => v.to_json(),
                _ => serde_json::Value::Null,
            };
            map.insert(var.identifier().to_string(), value);
        }
        serde_json::Value::Object(map)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
