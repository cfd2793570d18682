//! Error types for sqlplan

use crate::catalog::CatalogError;
use crate::render::RenderError;
use std::fmt;
use thiserror::Error;

/// Result type alias for sqlplan operations
pub type PlanResult<T> = Result<T, PlanError>;

/// What kind of fluent input failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Field,
    Param,
    Operator,
    Direction,
    NullsOrdering,
    Condition,
    AggregateFunction,
    Table,
    WindowFunction,
    FrameBound,
    Conflict,
    LockMode,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationKind::Field => "field",
            ValidationKind::Param => "param",
            ValidationKind::Operator => "operator",
            ValidationKind::Direction => "direction",
            ValidationKind::NullsOrdering => "nulls-ordering",
            ValidationKind::Condition => "condition",
            ValidationKind::AggregateFunction => "aggregate-function",
            ValidationKind::Table => "table",
            ValidationKind::WindowFunction => "window-function",
            ValidationKind::FrameBound => "frame-bound",
            ValidationKind::Conflict => "conflict",
            ValidationKind::LockMode => "lock-mode",
        };
        f.write_str(s)
    }
}

/// A fluent input that could not be turned into a plan element.
#[derive(Debug, Clone, Error)]
#[error("invalid {kind} '{name}'{}", .source.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub name: String,
    #[source]
    pub source: Option<CatalogError>,
}

impl ValidationError {
    pub fn new(kind: ValidationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            source: None,
        }
    }

    pub fn from_catalog(kind: ValidationKind, name: impl Into<String>, err: CatalogError) -> Self {
        Self {
            kind,
            name: name.into(),
            source: Some(err),
        }
    }
}

/// Which fluent builder produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    Select,
    Insert,
    Update,
    Delete,
    Aggregate,
}

impl fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuilderKind::Select => "select",
            BuilderKind::Insert => "insert",
            BuilderKind::Update => "update",
            BuilderKind::Delete => "delete",
            BuilderKind::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

/// Phase of the render → execute → scan pipeline an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Render,
    Execution,
    Scan,
    Iteration,
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryPhase::Render => "render",
            QueryPhase::Execution => "execution",
            QueryPhase::Scan => "scan",
            QueryPhase::Iteration => "iteration",
        };
        f.write_str(s)
    }
}

/// Error types for building and running query plans
#[derive(Debug, Error)]
pub enum PlanError {
    /// A field/param/operator/... failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// First error captured during a fluent chain
    #[error("{kind} builder: {source}")]
    Builder {
        kind: BuilderKind,
        #[source]
        source: Box<PlanError>,
    },

    /// Render/execute/scan failure annotated with where it happened
    #[error("{operation} failed during {phase}: {source}")]
    Query {
        phase: QueryPhase,
        operation: String,
        #[source]
        source: Box<PlanError>,
    },

    /// UPDATE or DELETE without any WHERE condition
    #[error("refusing to run {kind} on \"{table}\" without a WHERE condition")]
    UnsafeOperation { kind: BuilderKind, table: String },

    /// Single-record query returned no rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// Single-record query returned more than one row
    #[error("expected exactly one row, got {got}")]
    MultipleRows { got: usize },

    /// Renderer rejected the plan
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Rendered SQL references a parameter that was never bound
    #[error("missing value for parameter :{0}")]
    MissingParam(String),

    /// Batch stopped at the first failing record
    #[error("batch stopped at record {failed_at} after {affected} affected rows: {source}")]
    PartialBatch {
        affected: u64,
        failed_at: usize,
        #[source]
        source: Box<PlanError>,
    },

    /// Database round trip exceeded the configured deadline
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl PlanError {
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

    pub(crate) fn builder(kind: BuilderKind, source: PlanError) -> Self {
        Self::Builder {
            kind,
            source: Box::new(source),
        }
    }

    pub(crate) fn query(phase: QueryPhase, operation: impl Into<String>, source: PlanError) -> Self {
        Self::Query {
            phase,
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.root(), Self::UniqueViolation(_))
    }

    /// Check if this is the missing-WHERE guard
    pub fn is_unsafe(&self) -> bool {
        matches!(self.root(), Self::UnsafeOperation { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout(_))
    }

    /// The validation kind, looking through builder/query wrappers.
    pub fn validation_kind(&self) -> Option<ValidationKind> {
        match self.root() {
            Self::Validation(v) => Some(v.kind),
            _ => None,
        }
    }

    /// The outermost query phase annotation, if any.
    pub fn phase(&self) -> Option<QueryPhase> {
        let mut cur = self;
        loop {
            match cur {
                Self::Query { phase, .. } => return Some(*phase),
                Self::Builder { source, .. } | Self::PartialBatch { source, .. } => cur = source,
                _ => return None,
            }
        }
    }

    /// The builder kind tag, if this error came out of a fluent chain.
    pub fn builder_kind(&self) -> Option<BuilderKind> {
        match self {
            Self::Builder { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Unwrap builder/query/batch wrappers down to the underlying cause.
    pub fn root(&self) -> &PlanError {
        let mut cur = self;
        loop {
            match cur {
                Self::Builder { source, .. }
                | Self::Query { source, .. }
                | Self::PartialBatch { source, .. } => cur = source,
                other => return other,
            }
        }
    }

    /// Parse a tokio_postgres error into a more specific PlanError
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
        Self::Database(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for PlanError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<CatalogError> for PlanError {
    fn from(err: CatalogError) -> Self {
        let kind = match &err {
            CatalogError::UnknownTable { .. } => ValidationKind::Table,
            CatalogError::UnknownField { .. } => ValidationKind::Field,
            CatalogError::InvalidParamName { .. } => ValidationKind::Param,
            CatalogError::InvalidIdentifier { .. } => ValidationKind::Field,
        };
        let name = err.name().to_string();
        Self::Validation(ValidationError::from_catalog(kind, name, err))
    }
}
