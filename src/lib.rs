pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod idgen;
pub mod jobs;
pub mod mapping;
pub mod migration;
pub mod order;
pub mod session;
pub mod store;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{RetryPolicy, SchemaUpdateMode, StoreConfig};
pub use crate::entity::{Entity, EntityKind, EntityRef, Params, PersistentEntity, Row, Value};
pub use crate::error::{StoreError, StoreErrorCode};
pub use crate::executor::CommandExecutor;
pub use crate::idgen::{DbIdGenerator, IdGenerator, UuidGenerator};
pub use crate::jobs::{AcquiredJobs, JobAcquirer};
pub use crate::mapping::{EntityMapping, MappingRegistry, StatementOperation};
pub use crate::migration::{SchemaComponent, SchemaManager, UpgradeStep, UpgradeStepRegistry};
pub use crate::session::{Session, SessionFactory, SessionSettings};
pub use crate::store::{Connection, ConnectionFactory, SqliteConnectionFactory};

use crate::migration::ResourceLocator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Persistence core of one engine node: session factory, id allocation,
/// schema management and job acquisition over one backing store.
pub struct ProcessStore {
    config: StoreConfig,
    sessions: Arc<SessionFactory>,
    executor: CommandExecutor,
    ids: Arc<dyn IdGenerator>,
    schema: SchemaManager,
    jobs: JobAcquirer,
}

impl ProcessStore {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        ProcessStoreBuilder::new(config).build()
    }

    pub fn builder(config: StoreConfig) -> ProcessStoreBuilder {
        ProcessStoreBuilder::new(config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn session_factory(&self) -> &Arc<SessionFactory> {
        &self.sessions
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn id_generator(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    /// Session wired to this store's id generator. The caller commits it.
    pub fn open_session(&self) -> Result<Session, StoreError> {
        self.executor.open_session()
    }

    /// Runs `command` in a fresh session and commits, retrying on optimistic
    /// lock conflicts per the configured policy.
    pub fn execute<T>(
        &self,
        command: impl FnMut(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.executor.execute(command)
    }

    pub fn acquire_jobs(
        &self,
        owner: &str,
        max_jobs: usize,
        lock_time: Duration,
    ) -> Result<AcquiredJobs, StoreError> {
        self.jobs.acquire_jobs(owner, max_jobs, lock_time)
    }

    /// Acquisition cycle with the configured owner, page size and lock time.
    pub fn acquire_due_jobs(&self) -> Result<AcquiredJobs, StoreError> {
        self.jobs.acquire_jobs(
            &self.config.job_lock_owner,
            self.config.max_jobs_per_acquisition,
            self.config.job_lock_time(),
        )
    }

    pub fn release_owned_jobs(&self, owner: &str) -> Result<usize, StoreError> {
        self.jobs.release_owned_jobs(owner)
    }

    /// Releases this node's job locks and, in create-drop mode, drops the
    /// schema.
    pub fn close(self) -> Result<(), StoreError> {
        if self.schema.is_present(SchemaComponent::Engine)? {
            if let Err(err) = self.jobs.release_owned_jobs(&self.config.job_lock_owner) {
                warn!(error = %err, "failed to release job locks on close");
            }
        }
        if self.config.schema_update == SchemaUpdateMode::CreateDrop {
            info!("dropping schema on close");
            self.schema.drop_schema()?;
        }
        Ok(())
    }
}

pub struct ProcessStoreBuilder {
    config: StoreConfig,
    mappings: Option<MappingRegistry>,
    connections: Option<Arc<dyn ConnectionFactory>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    clock: Option<Arc<dyn Clock>>,
    steps: UpgradeStepRegistry,
}

impl ProcessStoreBuilder {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            mappings: None,
            connections: None,
            id_generator: None,
            clock: None,
            steps: UpgradeStepRegistry::builtin(),
        }
    }

    /// Replaces the built-in registry. Start from
    /// [`MappingRegistry::builtin`] to add custom entity kinds.
    pub fn with_mappings(mut self, mappings: MappingRegistry) -> Self {
        self.mappings = Some(mappings);
        self
    }

    pub fn with_connection_factory(mut self, connections: Arc<dyn ConnectionFactory>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(ids);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_upgrade_step(mut self, name: impl Into<String>, step: impl UpgradeStep + 'static) -> Self {
        self.steps.register(name, step);
        self
    }

    pub fn build(self) -> Result<ProcessStore, StoreError> {
        let config = self.config;
        config.validate()?;

        let mappings = Arc::new(
            self.mappings
                .unwrap_or_else(|| MappingRegistry::builtin(config.dialect.as_str())),
        );
        let connections: Arc<dyn ConnectionFactory> = match self.connections {
            Some(connections) => connections,
            None => Arc::new(SqliteConnectionFactory::new(
                config.database_path.clone(),
                config.busy_timeout(),
                Arc::clone(&mappings),
            )),
        };
        let settings = SessionSettings {
            bulk_insert_enabled: config.bulk_insert_enabled,
            max_statements_in_bulk_insert: config.max_statements_in_bulk_insert,
        };
        let sessions = Arc::new(SessionFactory::new(connections, mappings, settings));

        let ids: Arc<dyn IdGenerator> = match self.id_generator {
            Some(ids) => ids,
            None => Arc::new(DbIdGenerator::new(
                CommandExecutor::new(Arc::clone(&sessions), None, config.retry),
                config.id_block_size,
            )),
        };
        let executor = CommandExecutor::new(Arc::clone(&sessions), Some(Arc::clone(&ids)), config.retry);

        let schema = SchemaManager::new(
            Arc::clone(&sessions),
            ResourceLocator::new(config.resource_dir.clone()),
            self.steps,
            config.history_enabled,
            config.identity_enabled,
        );
        if let Some(feedback) = schema.perform_startup_operations(config.schema_update)? {
            info!(feedback = %feedback, "schema updated");
        }

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        // Lock claims are never retried within a cycle; a lost race means
        // another executor owns the job.
        let jobs = JobAcquirer::new(
            CommandExecutor::new(Arc::clone(&sessions), Some(Arc::clone(&ids)), RetryPolicy::no_retry()),
            clock,
        );

        info!(
            path = %config.database_path.display(),
            dialect = %config.dialect,
            schema_update = config.schema_update.as_str(),
            "process store opened"
        );
        Ok(ProcessStore {
            config,
            sessions,
            executor,
            ids,
            schema,
            jobs,
        })
    }
}
