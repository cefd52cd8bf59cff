//! Error taxonomy shared by every resource service.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::DatabaseRole;

/// Errors surfaced at the service boundary.
///
/// Expected outcomes (`NotFound`, `Conflict`, `Validation`) are distinct from
/// infrastructure failures so the HTTP layer can map them without inspecting
/// driver messages.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource} with {field} '{value}' already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("timed out waiting for a {role} database connection")]
    PoolTimeout { role: DatabaseRole },

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt {column} value in {table}: {reason}")]
    Decode {
        table: &'static str,
        column: &'static str,
        reason: String,
    },
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(resource: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::Conflict {
            resource,
            field,
            value: value.into(),
        }
    }

    /// True for failures the caller caused (bad input, missing row, duplicate).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Conflict { .. } | Self::Validation(_)
        )
    }
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    pub value: Option<Value>,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Input rejected before any database work was attempted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let violation = FieldViolation::new(field, message);
        Self {
            message: violation.message.clone(),
            violations: vec![violation],
        }
    }

    pub fn from_violations(violations: Vec<FieldViolation>) -> Self {
        let message = match violations.as_slice() {
            [single] => single.message.clone(),
            _ => "validation error".to_string(),
        };
        Self {
            message,
            violations,
        }
    }
}

/// Accumulates field violations across a whole input model so the caller
/// sees every problem at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn push(&mut self, violation: FieldViolation) {
        self.0.push(violation);
    }

    pub fn check(&mut self, ok: bool, violation: impl FnOnce() -> FieldViolation) {
        if !ok {
            self.0.push(violation());
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::from_violations(self.0))
        }
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || db_err.message().contains("UNIQUE")
                || db_err.message().contains("Duplicate entry")
        }
        _ => false,
    }
}
