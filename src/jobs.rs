use crate::clock::Clock;
use crate::entity::builtin::JobEntity;
use crate::entity::{Entity, EntityRef, Params};
use crate::error::StoreError;
use crate::executor::CommandExecutor;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Jobs locked by one acquisition cycle. Exclusive jobs of one process
/// instance arrive together as a single batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquiredJobs {
    batches: Vec<Vec<String>>,
}

impl AcquiredJobs {
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.batches.iter().flatten().any(|id| id == job_id)
    }

    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, batch: Vec<String>) {
        if !batch.is_empty() {
            self.batches.push(batch);
        }
    }
}

/// Claims due jobs for one executor. Each claim is a revision-guarded update
/// committed in its own session, so concurrent executors racing for the same
/// row see exactly one winner.
pub struct JobAcquirer {
    executor: CommandExecutor,
    clock: Arc<dyn Clock>,
}

impl JobAcquirer {
    pub fn new(executor: CommandExecutor, clock: Arc<dyn Clock>) -> Self {
        Self { executor, clock }
    }

    pub fn acquire_jobs(
        &self,
        owner: &str,
        max_jobs: usize,
        lock_time: Duration,
    ) -> Result<AcquiredJobs, StoreError> {
        let now = self.clock.now();
        let expires_at = now
            + chrono::Duration::from_std(lock_time).map_err(|e| StoreError::InvalidConfig {
                message: format!("job lock time out of range: {e}"),
            })?;

        let candidates: Vec<EntityRef<JobEntity>> = {
            let mut session = self.executor.open_session()?;
            session.select_list(
                "selectNextJobsToExecute",
                &Params::new()
                    .with("now", now)
                    .with("max_results", max_jobs),
            )?
        };

        let mut acquired = AcquiredJobs::default();
        let mut handled = HashSet::new();
        for candidate in candidates {
            let (job_id, group) = {
                let job = candidate.borrow();
                let group = if job.exclusive {
                    job.process_instance_id.clone()
                } else {
                    None
                };
                (job.id().unwrap_or_default().to_string(), group)
            };
            if handled.contains(&job_id) {
                continue;
            }

            let outcome = match &group {
                Some(process_instance_id) => {
                    self.lock_exclusive_group(process_instance_id, owner, now, expires_at)
                }
                None => self.lock_job(&candidate, owner, expires_at),
            };
            match outcome {
                Ok(batch) => {
                    handled.extend(batch.iter().cloned());
                    acquired.push(batch);
                }
                Err(err) if err.is_optimistic_lock() => {
                    debug!(job = %job_id, owner, "job claimed concurrently by another executor");
                }
                Err(err) => return Err(err),
            }
            handled.insert(job_id);
        }

        if !acquired.is_empty() {
            info!(owner, count = acquired.len(), "acquired jobs");
        }
        Ok(acquired)
    }

    fn lock_job(
        &self,
        candidate: &EntityRef<JobEntity>,
        owner: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        self.executor.execute_once(|session| {
            candidate.borrow_mut().lock(owner, expires_at);
            session.update(candidate)?;
            Ok(candidate
                .borrow()
                .id()
                .map(|id| vec![id.to_string()])
                .unwrap_or_default())
        })
    }

    /// Locks every eligible exclusive job of one process instance in a single
    /// transaction: all of them or none.
    fn lock_exclusive_group(
        &self,
        process_instance_id: &str,
        owner: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        self.executor.execute_once(|session| {
            let jobs: Vec<EntityRef<JobEntity>> = session.select_list(
                "selectExclusiveJobsToExecute",
                &Params::new()
                    .with("now", now)
                    .with("process_instance_id", process_instance_id),
            )?;
            let mut ids = Vec::with_capacity(jobs.len());
            for job in &jobs {
                job.borrow_mut().lock(owner, expires_at);
                session.update(job)?;
                if let Some(id) = job.borrow().id() {
                    ids.push(id.to_string());
                }
            }
            Ok(ids)
        })
    }

    /// Clears the lock token of every job held by `owner`. Returns the number
    /// of jobs released.
    pub fn release_owned_jobs(&self, owner: &str) -> Result<usize, StoreError> {
        let released = self.executor.execute_once(|session| {
            session.update_bulk(
                "unlockJobsOwnedBy",
                &Params::new().with("lock_owner", owner),
            )
        })?;
        info!(owner, released, "released job locks");
        Ok(released)
    }
}
