//! Shared identifiers and error types for the cross-tracker engine.

use serde::{Deserialize, Serialize};

use crate::validation::Fault;

pub type ProjectId = i64;
pub type TrackerId = i64;
pub type FieldId = i64;
pub type ArtifactId = i64;
pub type ChangesetId = i64;
pub type UserId = i64;
pub type UgroupId = i64;
pub type BindValueId = i64;

/// Position of a syntax error in the TQL source (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A TQL syntax error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub message: String,
    pub location: Location,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.location)
    }
}

/// Every fault found while validating one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Faults(pub Vec<Fault>);

impl Faults {
    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, predicate: impl Fn(&Fault) -> bool) -> bool {
        self.0.iter().any(predicate)
    }
}

impl std::fmt::Display for Faults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|fault| fault.to_string()).collect();
        write!(f, "{}", messages.join(" "))
    }
}

/// All errors that can occur while compiling or running a query.
#[derive(thiserror::Error, Debug)]
pub enum TqlError {
    #[error("Syntax error: {0}")]
    Syntax(SyntaxError),

    #[error("Invalid query: {0}")]
    Invalid(Faults),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TqlError {
    /// Whether the error is caused by the query text rather than the platform.
    pub fn is_user_error(&self) -> bool {
        matches!(self, TqlError::Syntax(_) | TqlError::Invalid(_))
    }
}

impl From<SyntaxError> for TqlError {
    fn from(e: SyntaxError) -> Self {
        TqlError::Syntax(e)
    }
}

impl From<Faults> for TqlError {
    fn from(faults: Faults) -> Self {
        TqlError::Invalid(faults)
    }
}

/// Convenience result type.
pub type TqlResult<T> = Result<T, TqlError>;
