use crate::config::RetryPolicy;
use crate::error::StoreError;
use crate::idgen::IdGenerator;
use crate::session::{Session, SessionFactory};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs a command inside a fresh session and commits it. Commands that fail
/// with an optimistic-lock conflict are re-run from scratch in a new session,
/// up to the retry policy's attempt limit.
#[derive(Clone)]
pub struct CommandExecutor {
    sessions: Arc<SessionFactory>,
    ids: Option<Arc<dyn IdGenerator>>,
    retry: RetryPolicy,
}

impl CommandExecutor {
    pub fn new(
        sessions: Arc<SessionFactory>,
        ids: Option<Arc<dyn IdGenerator>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sessions,
            ids,
            retry,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionFactory> {
        &self.sessions
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn open_session(&self) -> Result<Session, StoreError> {
        self.sessions.open_session(self.ids.clone())
    }

    /// One attempt: open, run, commit. No retry.
    pub fn execute_once<T>(
        &self,
        command: impl FnOnce(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut session = self.open_session()?;
        let value = command(&mut session)?;
        session.commit()?;
        Ok(value)
    }

    pub fn execute<T>(
        &self,
        mut command: impl FnMut(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute_once(&mut command) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_optimistic_lock() && attempt < max_attempts => {
                    attempt += 1;
                    let wait = self.retry.wait_before(attempt);
                    debug!(
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "retrying command after optimistic lock conflict"
                    );
                    std::thread::sleep(wait);
                }
                Err(err) => {
                    if err.is_optimistic_lock() {
                        warn!(attempts = attempt, error = %err, "command gave up after conflicts");
                    }
                    return Err(err);
                }
            }
        }
    }
}
