pub mod sqlite;

pub use sqlite::{SqliteConnection, SqliteConnectionFactory};

use crate::entity::{Params, Row};
use crate::error::StoreError;

/// One open connection to the backing store. Every statement is addressed by
/// its registered name; the connection resolves the SQL text.
///
/// `update` and `delete` must report the number of affected rows, which is
/// what the optimistic concurrency checks rely on.
pub trait Connection {
    fn dialect(&self) -> &str;

    fn begin(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    fn insert(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError>;

    /// Inserts several rows through one batched statement.
    fn insert_batch(&mut self, statement: &str, rows: &[Params]) -> Result<usize, StoreError>;

    fn update(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError>;

    fn delete(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError>;

    fn select(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>, StoreError>;

    /// Runs literal SQL outside the statement registry. Used by schema scripts.
    fn execute_raw(&mut self, sql: &str) -> Result<(), StoreError>;

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;
}

pub trait ConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn Connection>, StoreError>;

    fn dialect(&self) -> &str;
}
