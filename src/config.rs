use crate::error::StoreError;
use std::path::PathBuf;
use std::time::Duration;

/// What the store does to the physical schema when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SchemaUpdateMode {
    /// Fail unless every enabled component is present at the current version.
    #[default]
    Check,
    /// Create missing components, upgrade outdated ones.
    Update,
    /// Create components; an existing engine at another version is an error.
    Create,
    /// Like `Create`, and drop everything again when the store closes.
    CreateDrop,
    /// Drop whatever exists, then create from scratch.
    DropCreate,
    None,
}

impl SchemaUpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaUpdateMode::Check => "check",
            SchemaUpdateMode::Update => "update",
            SchemaUpdateMode::Create => "create",
            SchemaUpdateMode::CreateDrop => "create-drop",
            SchemaUpdateMode::DropCreate => "drop-create",
            SchemaUpdateMode::None => "none",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "check" | "false" => Some(SchemaUpdateMode::Check),
            "update" | "true" => Some(SchemaUpdateMode::Update),
            "create" => Some(SchemaUpdateMode::Create),
            "create-drop" => Some(SchemaUpdateMode::CreateDrop),
            "drop-create" => Some(SchemaUpdateMode::DropCreate),
            "none" => Some(SchemaUpdateMode::None),
            _ => None,
        }
    }
}

/// Backoff for commands that lose an optimistic-lock race.
/// Wait before attempt `n + 1` is `initial_wait * factor^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_wait_ms: u64,
    pub wait_increase_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_wait_ms: 50,
            wait_increase_factor: 5.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn wait_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2);
        let factor = self.wait_increase_factor.max(1.0).powi(exponent as i32);
        Duration::from_millis((self.initial_wait_ms as f64 * factor) as u64)
    }
}

/// Runtime configuration for a process store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub dialect: String,
    pub schema_update: SchemaUpdateMode,
    pub history_enabled: bool,
    pub identity_enabled: bool,
    /// Directory searched for schema scripts before the embedded ones.
    pub resource_dir: Option<PathBuf>,
    pub id_block_size: i64,
    pub bulk_insert_enabled: bool,
    pub max_statements_in_bulk_insert: usize,
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub job_lock_owner: String,
    pub job_lock_time_ms: u64,
    pub max_jobs_per_acquisition: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("procstore.db"),
            dialect: "sqlite".to_string(),
            schema_update: SchemaUpdateMode::Check,
            history_enabled: true,
            identity_enabled: true,
            resource_dir: None,
            id_block_size: 2500,
            bulk_insert_enabled: true,
            max_statements_in_bulk_insert: 100,
            busy_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
            job_lock_owner: uuid::Uuid::new_v4().to_string(),
            job_lock_time_ms: 5 * 60 * 1000,
            max_jobs_per_acquisition: 1,
        }
    }
}

impl StoreConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Fails fast on an outdated schema and keeps the large id blocks.
    pub fn production(database_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_update: SchemaUpdateMode::Check,
            busy_timeout_ms: 10_000,
            ..Self::new(database_path)
        }
    }

    /// Creates and upgrades the schema on open, with small id blocks so
    /// allocation paths are exercised often.
    pub fn development(database_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_update: SchemaUpdateMode::Update,
            id_block_size: 100,
            ..Self::new(database_path)
        }
    }

    pub fn with_schema_update(mut self, mode: SchemaUpdateMode) -> Self {
        self.schema_update = mode;
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    pub fn with_identity(mut self, enabled: bool) -> Self {
        self.identity_enabled = enabled;
        self
    }

    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = Some(dir.into());
        self
    }

    pub fn with_id_block_size(mut self, block_size: i64) -> Self {
        self.id_block_size = block_size;
        self
    }

    pub fn with_bulk_insert(mut self, enabled: bool, max_statements: usize) -> Self {
        self.bulk_insert_enabled = enabled;
        self.max_statements_in_bulk_insert = max_statements;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_job_lock_owner(mut self, owner: impl Into<String>) -> Self {
        self.job_lock_owner = owner.into();
        self
    }

    pub fn with_job_lock_time(mut self, lock_time: Duration) -> Self {
        self.job_lock_time_ms = lock_time.as_millis() as u64;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn job_lock_time(&self) -> Duration {
        Duration::from_millis(self.job_lock_time_ms)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |message: &str| {
            Err(StoreError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.id_block_size <= 0 {
            return invalid("id_block_size must be greater than zero");
        }
        if self.max_statements_in_bulk_insert == 0 {
            return invalid("max_statements_in_bulk_insert must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.job_lock_owner.trim().is_empty() {
            return invalid("job_lock_owner must not be empty");
        }
        if self.job_lock_time_ms == 0 {
            return invalid("job_lock_time_ms must be greater than zero");
        }
        if self.max_jobs_per_acquisition == 0 {
            return invalid("max_jobs_per_acquisition must be greater than zero");
        }
        if self.dialect.trim().is_empty() {
            return invalid("dialect must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, SchemaUpdateMode, StoreConfig};
    use std::time::Duration;

    #[test]
    fn presets_differ_in_schema_handling() {
        assert_eq!(
            StoreConfig::production("p.db").schema_update,
            SchemaUpdateMode::Check
        );
        let dev = StoreConfig::development("d.db");
        assert_eq!(dev.schema_update, SchemaUpdateMode::Update);
        assert_eq!(dev.id_block_size, 100);
        dev.validate().expect("development preset is valid");
    }

    #[test]
    fn validate_rejects_zero_block_size() {
        let err = StoreConfig::new("x.db")
            .with_id_block_size(0)
            .validate()
            .expect_err("zero block size");
        assert!(err.to_string().contains("id_block_size"));
    }

    #[test]
    fn schema_update_mode_parses_legacy_booleans() {
        assert_eq!(SchemaUpdateMode::parse("true"), Some(SchemaUpdateMode::Update));
        assert_eq!(SchemaUpdateMode::parse("false"), Some(SchemaUpdateMode::Check));
        assert_eq!(
            SchemaUpdateMode::parse("Create-Drop"),
            Some(SchemaUpdateMode::CreateDrop)
        );
        assert_eq!(SchemaUpdateMode::parse("sometimes"), None);
    }

    #[test]
    fn retry_wait_grows_by_factor() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_wait_ms: 10,
            wait_increase_factor: 3.0,
        };
        assert_eq!(policy.wait_before(2), Duration::from_millis(10));
        assert_eq!(policy.wait_before(3), Duration::from_millis(30));
        assert_eq!(policy.wait_before(4), Duration::from_millis(90));
    }
}
