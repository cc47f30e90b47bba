use super::{Connection, ConnectionFactory};
use crate::entity::{Params, Row, Value};
use crate::error::StoreError;
use crate::mapping::MappingRegistry;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Statement, ToSql};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DIALECT: &str = "sqlite";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Driver(err.to_string())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value, StoreError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| StoreError::Decode(format!("invalid utf-8 in text column: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

/// Binds every `:name` placeholder of `stmt` from `params`. A placeholder
/// without a value is a mapping defect, not a NULL.
fn bind_named(stmt: &mut Statement<'_>, statement: &str, params: &Params) -> Result<(), StoreError> {
    for idx in 1..=stmt.parameter_count() {
        let Some(placeholder) = stmt.parameter_name(idx).map(str::to_string) else {
            return Err(StoreError::Validation(format!(
                "statement '{statement}' uses a positional parameter at {idx}"
            )));
        };
        let name = placeholder.trim_start_matches([':', '@', '$']);
        let value = params.get(name).ok_or_else(|| {
            StoreError::Validation(format!(
                "statement '{statement}' requires parameter '{placeholder}'"
            ))
        })?;
        stmt.raw_bind_parameter(idx, value)?;
    }
    Ok(())
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    mappings: Arc<MappingRegistry>,
}

impl SqliteConnection {
    pub fn open(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
        mappings: Arc<MappingRegistry>,
    ) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "sqlite connection opened");
        Ok(Self { conn, mappings })
    }

    fn execute(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        let sql = self.mappings.sql(statement)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        bind_named(&mut stmt, statement, params)?;
        Ok(stmt.raw_execute()?)
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> &str {
        DIALECT
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        // IMMEDIATE takes the write lock up front so a flush never has to
        // upgrade a read snapshot.
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn insert(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.execute(statement, params)
    }

    fn insert_batch(&mut self, statement: &str, rows: &[Params]) -> Result<usize, StoreError> {
        let sql = self.mappings.sql(statement)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut inserted = 0;
        for params in rows {
            bind_named(&mut stmt, statement, params)?;
            inserted += stmt.raw_execute()?;
        }
        Ok(inserted)
    }

    fn update(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.execute(statement, params)
    }

    fn delete(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.execute(statement, params)
    }

    fn select(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>, StoreError> {
        let sql = self.mappings.sql(statement)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        bind_named(&mut stmt, statement, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                values.push((column.as_str(), value_from_ref(row.get_ref(idx)?)?));
            }
            out.push(Row::from_columns(values));
        }
        Ok(out)
    }

    fn execute_raw(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Opens one SQLite connection per session against a database file.
pub struct SqliteConnectionFactory {
    path: PathBuf,
    busy_timeout: Duration,
    mappings: Arc<MappingRegistry>,
}

impl SqliteConnectionFactory {
    pub fn new(
        path: impl Into<PathBuf>,
        busy_timeout: Duration,
        mappings: Arc<MappingRegistry>,
    ) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            mappings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn open(&self) -> Result<Box<dyn Connection>, StoreError> {
        Ok(Box::new(SqliteConnection::open(
            &self.path,
            self.busy_timeout,
            Arc::clone(&self.mappings),
        )?))
    }

    fn dialect(&self) -> &str {
        DIALECT
    }
}
