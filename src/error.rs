use crate::entity::EntityKind;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    Io,
    Driver,
    Decode,
    Validation,
    InvalidConfig,
    IntegrityError,
    OptimisticLock,
    MissingMapping,
    UnknownStatement,
    TypeMismatch,
    SchemaMismatch,
    MissingSchema,
    UnresolvableVersion,
    MigrationStatement,
    MissingResource,
}

impl StoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorCode::Io => "io",
            StoreErrorCode::Driver => "driver",
            StoreErrorCode::Decode => "decode",
            StoreErrorCode::Validation => "validation",
            StoreErrorCode::InvalidConfig => "invalid_config",
            StoreErrorCode::IntegrityError => "integrity_error",
            StoreErrorCode::OptimisticLock => "optimistic_lock",
            StoreErrorCode::MissingMapping => "missing_mapping",
            StoreErrorCode::UnknownStatement => "unknown_statement",
            StoreErrorCode::TypeMismatch => "type_mismatch",
            StoreErrorCode::SchemaMismatch => "schema_mismatch",
            StoreErrorCode::MissingSchema => "missing_schema",
            StoreErrorCode::UnresolvableVersion => "unresolvable_version",
            StoreErrorCode::MigrationStatement => "migration_statement",
            StoreErrorCode::MissingResource => "missing_resource",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("integrity error: {message}")]
    IntegrityError { message: String },
    #[error("{kind} '{id}' was updated by another transaction concurrently")]
    OptimisticLock { kind: EntityKind, id: String },
    #[error("no {operation} statement mapped for {kind}")]
    MissingMapping {
        kind: EntityKind,
        operation: &'static str,
    },
    #[error("unknown statement '{0}'")]
    UnknownStatement(String),
    #[error("cached {kind} '{id}' is not of the requested type")]
    TypeMismatch { kind: EntityKind, id: String },
    #[error("schema version mismatch: library expects {expected}, database has {actual}")]
    SchemaMismatch { expected: String, actual: String },
    #[error("database problem: missing {} tables", components.join(", "))]
    MissingSchema { components: Vec<String> },
    #[error("could not update schema: unknown version from database: '{version}'")]
    UnresolvableVersion { version: String },
    #[error("statement failed in '{resource}': {message} (statement: {statement})")]
    MigrationStatement {
        resource: String,
        statement: String,
        message: String,
    },
    #[error("schema resource '{resource}' not found")]
    MissingResource { resource: String },
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::Io(_) => StoreErrorCode::Io,
            StoreError::Driver(_) => StoreErrorCode::Driver,
            StoreError::Decode(_) => StoreErrorCode::Decode,
            StoreError::Validation(_) => StoreErrorCode::Validation,
            StoreError::InvalidConfig { .. } => StoreErrorCode::InvalidConfig,
            StoreError::IntegrityError { .. } => StoreErrorCode::IntegrityError,
            StoreError::OptimisticLock { .. } => StoreErrorCode::OptimisticLock,
            StoreError::MissingMapping { .. } => StoreErrorCode::MissingMapping,
            StoreError::UnknownStatement(_) => StoreErrorCode::UnknownStatement,
            StoreError::TypeMismatch { .. } => StoreErrorCode::TypeMismatch,
            StoreError::SchemaMismatch { .. } => StoreErrorCode::SchemaMismatch,
            StoreError::MissingSchema { .. } => StoreErrorCode::MissingSchema,
            StoreError::UnresolvableVersion { .. } => StoreErrorCode::UnresolvableVersion,
            StoreError::MigrationStatement { .. } => StoreErrorCode::MigrationStatement,
            StoreError::MissingResource { .. } => StoreErrorCode::MissingResource,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Only lost-update conflicts are worth re-running; everything else is a
    /// setup or data defect.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::OptimisticLock { .. })
    }

    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, StoreError::OptimisticLock { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidConfig { .. }
                | StoreError::MissingMapping { .. }
                | StoreError::UnknownStatement(_)
                | StoreError::TypeMismatch { .. }
        )
    }
}
