//! Error types for rowgraph

use thiserror::Error;

/// Result type alias for rowgraph operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database and mapping operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Error reported by a non-Postgres driver
    #[error("Driver error: {0}")]
    Driver(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// More rows than the caller asked for
    #[error("Too many rows: expected {expected}, got {got}")]
    TooManyRows { expected: usize, got: usize },

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Driver-level decode error for a result column
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A value could not be converted to the requested Rust type
    #[error("Cannot convert {found} to {expected}")]
    Conversion {
        expected: &'static str,
        found: &'static str,
    },

    /// Mapping a column into an entity field failed
    #[error("Mapping error on {entity}.{field}: {source}")]
    Mapping {
        entity: &'static str,
        field: String,
        #[source]
        source: Box<OrmError>,
    },

    /// Entity declaration is unusable (duplicate key, missing map key, ...)
    #[error("Configuration error on {entity}.{field}: {message}")]
    Configuration {
        entity: &'static str,
        field: String,
        message: String,
    },

    /// A lazy field was accessed after its session was closed
    #[error("Session is closed")]
    SessionClosed,

    /// A lazy field was accessed on an instance never bound to a session
    #[error("Lazy field {entity}.{field} is not bound to a session")]
    Unbound { entity: &'static str, field: String },

    /// Statement executed with unbound placeholders
    #[error("Missing value for parameter(s): {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    /// A named placeholder appears more than once in one statement
    #[error("Duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// A value was set for a name the statement does not declare
    #[error("Unknown parameter name: {0}")]
    UnknownParameter(String),

    /// A positional index outside `1..=count`
    #[error("Parameter index {index} out of range (statement has {count} positional parameters)")]
    ParameterIndex { index: usize, count: usize },

    /// Malformed SQL text (unterminated literal or comment)
    #[error("SQL parse error: {0}")]
    SqlParse(String),

    /// The unit of work failed and its transaction was rolled back
    #[error("Transaction rolled back: {0}")]
    RolledBack(#[source] Box<OrmError>),

    /// The unit of work failed and rolling its transaction back failed too
    #[error("Transaction rollback failed: {rollback} (after: {source})")]
    RollbackFailed {
        #[source]
        source: Box<OrmError>,
        rollback: Box<OrmError>,
    },

    /// A top-level session was requested while one is already active here
    #[error("A session is already active on this thread")]
    SessionActive,

    /// Configuration file or environment error
    #[error("Config error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a too-many-rows error
    pub fn too_many_rows(expected: usize, got: usize) -> Self {
        Self::TooManyRows { expected, got }
    }

    /// Create a configuration error for `entity.field`
    pub fn configuration(
        entity: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            entity,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised while populating `entity.field`
    pub fn mapping(entity: &'static str, field: impl Into<String>, source: OrmError) -> Self {
        Self::Mapping {
            entity,
            field: field.into(),
            source: Box::new(source),
        }
    }

    /// Wrap the error that caused a unit of work to roll back
    pub fn rolled_back(source: OrmError) -> Self {
        Self::RolledBack(Box::new(source))
    }

    /// Wrap the error that caused a rollback which then failed as well
    pub fn rollback_failed(source: OrmError, rollback: OrmError) -> Self {
        Self::RollbackFailed {
            source: Box::new(source),
            rollback: Box::new(rollback),
        }
    }

    /// Strip rollback and `Mapping` wrappers down to the original failure.
    pub fn root_cause(&self) -> &OrmError {
        match self {
            Self::RolledBack(inner) => inner.root_cause(),
            Self::RollbackFailed { source, .. } => source.root_cause(),
            Self::Mapping { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.root_cause(), Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }

    /// Check if this is a closed-session error
    pub fn is_session_closed(&self) -> bool {
        matches!(self.root_cause(), Self::SessionClosed)
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), Self::Configuration { .. })
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_lists_every_name() {
        let err = OrmError::MissingParameters(vec!["b".into(), "?2".into()]);
        assert_eq!(err.to_string(), "Missing value for parameter(s): b, ?2");
    }

    #[test]
    fn root_cause_unwraps_rollback_and_mapping() {
        let err = OrmError::rolled_back(OrmError::mapping(
            "Author",
            "age",
            OrmError::Conversion {
                expected: "i32",
                found: "text",
            },
        ));
        assert!(matches!(err.root_cause(), OrmError::Conversion { .. }));
        assert!(!err.is_session_closed());
        assert!(OrmError::rolled_back(OrmError::SessionClosed).is_session_closed());
    }

    #[test]
    fn failed_rollback_keeps_the_original_cause() {
        let err = OrmError::rollback_failed(
            OrmError::not_found("author 7"),
            OrmError::Connection("reset by peer".into()),
        );
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Transaction rollback failed: Connection error: reset by peer \
             (after: Not found: author 7)"
        );
    }
}
