use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};
use chrono::{DateTime, Utc};

pub const DEFAULT_RETRIES: i32 = 3;

/// Asynchronous unit of work picked up by job executors. The lock token is
/// `lock_owner` plus `lock_expiration_time`; claiming it is a revision-guarded
/// update of this row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub job_type: String,
    pub lock_owner: Option<String>,
    pub lock_expiration_time: Option<DateTime<Utc>>,
    pub exclusive: bool,
    pub execution_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub retries: i32,
    pub exception_stack_id: Option<String>,
    pub exception_message: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub repeat: Option<String>,
    pub handler_type: Option<String>,
    pub handler_configuration: Option<String>,
    pub tenant_id: String,
}

impl JobEntity {
    pub fn message(handler_type: impl Into<String>) -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            job_type: "message".to_string(),
            lock_owner: None,
            lock_expiration_time: None,
            exclusive: true,
            execution_id: None,
            process_instance_id: None,
            process_definition_id: None,
            retries: DEFAULT_RETRIES,
            exception_stack_id: None,
            exception_message: None,
            due_date: None,
            repeat: None,
            handler_type: Some(handler_type.into()),
            handler_configuration: None,
            tenant_id: String::new(),
        }
    }

    pub fn timer(handler_type: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        let mut job = Self::message(handler_type);
        job.job_type = "timer".to_string();
        job.due_date = Some(due_date);
        job
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_process_instance(mut self, process_instance_id: impl Into<String>) -> Self {
        let process_instance_id = process_instance_id.into();
        self.execution_id = Some(process_instance_id.clone());
        self.process_instance_id = Some(process_instance_id);
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn lock(&mut self, owner: &str, expires_at: DateTime<Utc>) {
        self.lock_owner = Some(owner.to_string());
        self.lock_expiration_time = Some(expires_at);
    }

    pub fn unlock(&mut self) {
        self.lock_owner = None;
        self.lock_expiration_time = None;
    }

    pub fn is_locked_by(&self, owner: &str) -> bool {
        self.lock_owner.as_deref() == Some(owner)
    }

    pub fn is_lockable_at(&self, now: DateTime<Utc>) -> bool {
        self.retries > 0
            && self.due_date.is_none_or(|due| due <= now)
            && self.lock_expiration_time.is_none_or(|expires| expires <= now)
    }
}

impl Entity for JobEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Job
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn persistent_state(&self) -> Params {
        Params::new()
            .with("job_type", self.job_type.as_str())
            .with("lock_owner", self.lock_owner.clone())
            .with("lock_expiration_time", self.lock_expiration_time)
            .with("exclusive", self.exclusive)
            .with("execution_id", self.execution_id.clone())
            .with("process_instance_id", self.process_instance_id.clone())
            .with("process_definition_id", self.process_definition_id.clone())
            .with("retries", self.retries)
            .with("exception_stack_id", self.exception_stack_id.clone())
            .with("exception_message", self.exception_message.clone())
            .with("due_date", self.due_date)
            .with("repeat", self.repeat.clone())
            .with("handler_type", self.handler_type.clone())
            .with("handler_configuration", self.handler_configuration.clone())
            .with("tenant_id", self.tenant_id.as_str())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for JobEntity {
    const KIND: EntityKind = EntityKind::Job;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            job_type: row.text("job_type")?,
            lock_owner: row.opt_text("lock_owner")?,
            lock_expiration_time: row.opt_datetime("lock_exp_time")?,
            exclusive: row.bool("is_exclusive")?,
            execution_id: row.opt_text("execution_id")?,
            process_instance_id: row.opt_text("process_instance_id")?,
            process_definition_id: row.opt_text("proc_def_id")?,
            retries: row.i32("retries")?,
            exception_stack_id: row.opt_text("exception_stack_id")?,
            exception_message: row.opt_text("exception_msg")?,
            due_date: row.opt_datetime("duedate")?,
            repeat: row.opt_text("repeat")?,
            handler_type: row.opt_text("handler_type")?,
            handler_configuration: row.opt_text("handler_cfg")?,
            tenant_id: row.opt_text("tenant_id")?.unwrap_or_default(),
        })
    }
}

const COLUMNS: &str = "j.id, j.rev, j.job_type, j.lock_exp_time, j.lock_owner, j.is_exclusive, \
     j.execution_id, j.process_instance_id, j.proc_def_id, j.retries, j.exception_stack_id, \
     j.exception_msg, j.duedate, j.repeat, j.handler_type, j.handler_cfg, j.tenant_id";

/// Shared eligibility predicate: retries left, due, unlocked or lock expired,
/// and the owning process instance not suspended.
const ELIGIBLE: &str = "j.retries > 0 \
     AND (j.duedate IS NULL OR j.duedate <= :now) \
     AND (j.lock_exp_time IS NULL OR j.lock_exp_time <= :now) \
     AND (j.process_instance_id IS NULL OR NOT EXISTS ( \
         SELECT 1 FROM ru_execution e \
         WHERE e.id = j.process_instance_id AND e.suspension_state = 2))";

const INSERT: &str = "INSERT INTO ru_job \
     (id, rev, job_type, lock_exp_time, lock_owner, is_exclusive, execution_id, \
     process_instance_id, proc_def_id, retries, exception_stack_id, exception_msg, duedate, \
     repeat, handler_type, handler_cfg, tenant_id) \
     VALUES (:id, 1, :job_type, :lock_expiration_time, :lock_owner, :exclusive, :execution_id, \
     :process_instance_id, :process_definition_id, :retries, :exception_stack_id, \
     :exception_message, :due_date, :repeat, :handler_type, :handler_configuration, :tenant_id)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(EntityKind::Job, "Job"))
        .register_statement("insertJob", INSERT)
        .register_statement("bulkInsertJob", INSERT)
        .register_statement(
            "updateJob",
            "UPDATE ru_job SET rev = :revision_next, lock_exp_time = :lock_expiration_time, \
             lock_owner = :lock_owner, retries = :retries, exception_stack_id = :exception_stack_id, \
             exception_msg = :exception_message, duedate = :due_date \
             WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteJob",
            "DELETE FROM ru_job WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectJob",
            format!("SELECT {COLUMNS} FROM ru_job j WHERE j.id = :id"),
        )
        .register_statement(
            "selectJobsByProcessInstance",
            format!(
                "SELECT {COLUMNS} FROM ru_job j WHERE j.process_instance_id = :process_instance_id \
                 ORDER BY j.id"
            ),
        )
        .register_statement(
            "selectJobsByLockOwner",
            format!("SELECT {COLUMNS} FROM ru_job j WHERE j.lock_owner = :lock_owner ORDER BY j.id"),
        )
        .register_statement(
            "selectNextJobsToExecute",
            format!(
                "SELECT {COLUMNS} FROM ru_job j WHERE {ELIGIBLE} \
                 ORDER BY j.duedate, j.id LIMIT :max_results"
            ),
        )
        .register_statement(
            "selectExclusiveJobsToExecute",
            format!(
                "SELECT {COLUMNS} FROM ru_job j WHERE {ELIGIBLE} \
                 AND j.is_exclusive = 1 AND j.process_instance_id = :process_instance_id \
                 ORDER BY j.duedate, j.id"
            ),
        )
        .register_statement(
            "unlockJobsOwnedBy",
            "UPDATE ru_job SET rev = rev + 1, lock_owner = NULL, lock_exp_time = NULL \
             WHERE lock_owner = :lock_owner",
        );
}

#[cfg(test)]
mod tests {
    use super::JobEntity;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn lockability_follows_due_date_and_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut job = JobEntity::message("async-continuation");
        assert!(job.is_lockable_at(now));

        job.lock("node-a", now + Duration::minutes(5));
        assert!(job.is_locked_by("node-a"));
        assert!(!job.is_lockable_at(now));
        assert!(job.is_lockable_at(now + Duration::minutes(5)));

        job.unlock();
        assert!(job.is_lockable_at(now));

        let timer = JobEntity::timer("timer-start", now + Duration::hours(1));
        assert!(!timer.is_lockable_at(now));

        job.retries = 0;
        assert!(!job.is_lockable_at(now));
    }
}
