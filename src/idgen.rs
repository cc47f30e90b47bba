use crate::entity::builtin::PropertyEntity;
use crate::entity::builtin::property::NEXT_DBID;
use crate::error::StoreError;
use crate::executor::CommandExecutor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<String, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct IdBlock {
    next_id: i64,
    last_id: i64,
}

/// Hands out numeric ids from blocks reserved in the shared `next.dbid`
/// counter. A reservation is its own committed unit of work, so ids never
/// roll back with the session that consumed them.
pub struct DbIdGenerator {
    executor: CommandExecutor,
    block_size: i64,
    block: Mutex<IdBlock>,
    reserved_blocks: AtomicU64,
}

impl DbIdGenerator {
    /// `executor` must not carry an id generator of its own; reservations only
    /// update an existing property row.
    pub fn new(executor: CommandExecutor, block_size: i64) -> Self {
        Self {
            executor,
            block_size: block_size.max(1),
            block: Mutex::new(IdBlock {
                next_id: 0,
                last_id: -1,
            }),
            reserved_blocks: AtomicU64::new(0),
        }
    }

    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    pub fn reserved_blocks(&self) -> u64 {
        self.reserved_blocks.load(Ordering::Relaxed)
    }

    fn reserve_block(&self) -> Result<IdBlock, StoreError> {
        let block_size = self.block_size;
        let first = self.executor.execute(|session| {
            let property = session
                .select_by_id::<PropertyEntity>(NEXT_DBID)?
                .ok_or_else(|| StoreError::IntegrityError {
                    message: format!("property '{NEXT_DBID}' is missing; is the schema created?"),
                })?;
            let old = {
                let current = property.borrow();
                let raw = current.value.as_deref().unwrap_or_default();
                raw.trim().parse::<i64>().map_err(|_| StoreError::IntegrityError {
                    message: format!("property '{NEXT_DBID}' holds non-numeric value '{raw}'"),
                })?
            };
            property.borrow_mut().value = Some((old + block_size).to_string());
            Ok(old)
        })?;
        self.reserved_blocks.fetch_add(1, Ordering::Relaxed);
        debug!(first, last = first + block_size - 1, "reserved id block");
        Ok(IdBlock {
            next_id: first,
            last_id: first + block_size - 1,
        })
    }
}

impl IdGenerator for DbIdGenerator {
    fn next_id(&self) -> Result<String, StoreError> {
        let mut block = self.block.lock();
        if block.last_id < block.next_id {
            *block = self.reserve_block()?;
        }
        let id = block.next_id;
        block.next_id += 1;
        Ok(id.to_string())
    }
}

/// Random v4 UUIDs. No coordination with the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Result<String, StoreError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{IdGenerator, UuidGenerator};
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidGenerator;
        let seen: HashSet<_> = (0..64).map(|_| ids.next_id().expect("uuid")).collect();
        assert_eq!(seen.len(), 64);
    }
}
