use parking_lot::Mutex;
use procstore::entity::builtin::{
    ByteArrayEntity, ExecutionEntity, JobEntity, ProcessDefinitionEntity, PropertyEntity,
    TaskEntity, VariableInstanceEntity,
};
use procstore::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use procstore::{
    Connection, EntityMapping, MappingRegistry, Session, SessionSettings, StoreError,
    StoreErrorCode, UuidGenerator,
};
use std::rc::Rc;
use std::sync::Arc;

/// Connection that records every statement it is asked to run and reports one
/// affected row for each.
struct RecordingConnection {
    dialect: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingConnection {
    fn record(&self, op: &str, statement: &str, params: &Params) {
        let id = params
            .get("id")
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_else(|| "-".to_string());
        self.log.lock().push(format!("{op} {statement} {id}"));
    }
}

impl Connection for RecordingConnection {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.log.lock().push("begin".into());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.log.lock().push("commit".into());
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.log.lock().push("rollback".into());
        Ok(())
    }

    fn insert(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.record("insert", statement, params);
        Ok(1)
    }

    fn insert_batch(&mut self, statement: &str, rows: &[Params]) -> Result<usize, StoreError> {
        let ids: Vec<String> = rows
            .iter()
            .map(|row| {
                row.get("id")
                    .and_then(|v| v.as_text().map(str::to_string))
                    .unwrap_or_default()
            })
            .collect();
        self.log
            .lock()
            .push(format!("batch {statement} {}", ids.join(",")));
        Ok(rows.len())
    }

    fn update(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.record("update", statement, params);
        Ok(1)
    }

    fn delete(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        self.record("delete", statement, params);
        Ok(1)
    }

    fn select(&mut self, _statement: &str, _params: &Params) -> Result<Vec<Row>, StoreError> {
        Ok(Vec::new())
    }

    fn execute_raw(&mut self, sql: &str) -> Result<(), StoreError> {
        self.log.lock().push(format!("raw {sql}"));
        Ok(())
    }

    fn table_exists(&mut self, _table: &str) -> Result<bool, StoreError> {
        Ok(true)
    }
}

fn recording_session(
    mappings: MappingRegistry,
    settings: SessionSettings,
) -> (Session, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let conn = RecordingConnection {
        dialect: mappings.dialect().to_string(),
        log: Arc::clone(&log),
    };
    let session = Session::new(
        Box::new(conn),
        Arc::new(mappings),
        Some(Arc::new(UuidGenerator)),
        settings,
    );
    (session, log)
}

fn single_row_settings() -> SessionSettings {
    SessionSettings {
        bulk_insert_enabled: false,
        max_statements_in_bulk_insert: 100,
    }
}

fn position(log: &[String], needle: &str) -> usize {
    log.iter()
        .position(|line| line == needle)
        .unwrap_or_else(|| panic!("'{needle}' not found in {log:#?}"))
}

#[test]
fn inserts_follow_foreign_key_dependencies() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("sqlite"), single_row_settings());

    session
        .insert(JobEntity::message("async").with_id("job").with_process_instance("pi"))
        .expect("job");
    session
        .insert(TaskEntity::new("review").with_id("task").with_execution("pi", "pi"))
        .expect("task");
    session
        .insert(VariableInstanceEntity::text("amount", "10").with_id("var"))
        .expect("variable");
    session
        .insert(ExecutionEntity::new().with_id("pi").with_process_instance("pi"))
        .expect("execution");
    session
        .insert(ProcessDefinitionEntity::new("invoice", 1).with_id("def"))
        .expect("definition");
    session
        .insert(ByteArrayEntity::new("payload", vec![1, 2, 3]).with_id("bytes"))
        .expect("byte array");
    session.flush().expect("flush");

    let log = log.lock().clone();
    let def = position(&log, "insert insertProcessDefinition def");
    let exec = position(&log, "insert insertExecution pi");
    let bytes = position(&log, "insert insertByteArray bytes");
    let task = position(&log, "insert insertTask task");
    let var = position(&log, "insert insertVariableInstance var");
    let job = position(&log, "insert insertJob job");

    assert!(def < exec, "definition before execution: {log:#?}");
    assert!(exec < task && exec < job && exec < var);
    assert!(bytes < var && bytes < job);
}

#[test]
fn child_executions_are_inserted_after_and_deleted_before_parents() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("sqlite"), SessionSettings::default());

    let leaf = session
        .insert(
            ExecutionEntity::new()
                .with_id("leaf")
                .with_process_instance("root")
                .with_parent("scope"),
        )
        .expect("leaf");
    let scope = session
        .insert(
            ExecutionEntity::new()
                .with_id("scope")
                .with_process_instance("root")
                .with_parent("root"),
        )
        .expect("scope");
    let root = session
        .insert(ExecutionEntity::new().with_id("root").with_process_instance("root"))
        .expect("root");
    session.flush().expect("insert flush");

    assert_eq!(
        log.lock().as_slice(),
        ["batch bulkInsertExecution root,scope,leaf".to_string()]
    );
    log.lock().clear();

    session.delete(&root).expect("delete root");
    session.delete(&leaf).expect("delete leaf");
    session.delete(&scope).expect("delete scope");
    session.flush().expect("delete flush");

    let deletes: Vec<String> = log
        .lock()
        .iter()
        .filter(|line| line.starts_with("delete"))
        .cloned()
        .collect();
    assert_eq!(
        deletes,
        vec![
            "delete deleteExecution leaf".to_string(),
            "delete deleteExecution scope".to_string(),
            "delete deleteExecution root".to_string(),
        ]
    );
}

#[test]
fn deletes_run_dependents_first_and_bulk_deletes_take_their_kind_slot() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("sqlite"), single_row_settings());

    let definition = session
        .insert(ProcessDefinitionEntity::new("invoice", 1).with_id("def"))
        .expect("definition");
    let instance = session
        .insert(ExecutionEntity::new().with_id("pi").with_process_instance("pi"))
        .expect("execution");
    let job = session
        .insert(JobEntity::message("async").with_id("job").with_process_instance("pi"))
        .expect("job");
    let property = session
        .insert(PropertyEntity::new("custom.flag", "on"))
        .expect("property");
    session.flush().expect("insert flush");
    log.lock().clear();

    session.delete(&definition).expect("delete definition");
    session.delete(&instance).expect("delete execution");
    session.delete(&job).expect("delete job");
    session.delete(&property).expect("delete property");
    session.delete_bulk(
        "bulkDeleteTasksByProcessInstance",
        Params::new().with("process_instance_id", "pi"),
        EntityKind::Task,
    );
    session.flush().expect("delete flush");

    let log = log.lock().clone();
    assert_eq!(
        log,
        vec![
            "delete deleteProperty custom.flag".to_string(),
            "delete bulkDeleteTasksByProcessInstance -".to_string(),
            "delete deleteJob job".to_string(),
            "delete deleteExecution pi".to_string(),
            "delete deleteProcessDefinition def".to_string(),
        ]
    );
}

#[test]
fn bulk_inserts_are_chunked_by_the_statement_limit() {
    let settings = SessionSettings {
        bulk_insert_enabled: true,
        max_statements_in_bulk_insert: 2,
    };
    let (mut session, log) = recording_session(MappingRegistry::builtin("sqlite"), settings);

    for (idx, name) in ["a", "b", "c"].into_iter().enumerate() {
        session
            .insert(VariableInstanceEntity::long(name, idx as i64).with_id(format!("v{idx}")))
            .expect("variable");
    }
    session.insert(TaskEntity::new("only").with_id("t1")).expect("task");
    session.flush().expect("flush");

    assert_eq!(
        log.lock().as_slice(),
        [
            "batch bulkInsertVariableInstance v0,v1".to_string(),
            "batch bulkInsertVariableInstance v2".to_string(),
            "insert insertTask t1".to_string(),
        ]
    );
}

#[test]
fn dialect_exception_forces_single_row_byte_array_inserts() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("mssql"), SessionSettings::default());

    session
        .insert(ByteArrayEntity::new("one", vec![1]).with_id("b1"))
        .expect("b1");
    session
        .insert(ByteArrayEntity::new("two", vec![2]).with_id("b2"))
        .expect("b2");
    session
        .insert(PropertyEntity::new("p1", "x"))
        .expect("p1");
    session
        .insert(PropertyEntity::new("p2", "y"))
        .expect("p2");
    session.flush().expect("flush");

    let log = log.lock().clone();
    assert!(log.contains(&"insert insertByteArray b1".to_string()), "{log:#?}");
    assert!(log.contains(&"insert insertByteArray b2".to_string()), "{log:#?}");
    assert!(log.contains(&"batch bulkInsertProperty p1,p2".to_string()), "{log:#?}");
}

#[test]
fn inserted_then_deleted_entities_never_reach_the_store() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("sqlite"), SessionSettings::default());

    let task = session.insert(TaskEntity::new("short-lived")).expect("task");
    session.delete(&task).expect("delete");
    session.flush().expect("flush");

    assert!(log.lock().is_empty(), "{:#?}", log.lock());
    let id = task.borrow().id().map(str::to_string).expect("id assigned");
    assert!(!session.cache().contains(EntityKind::Task, &id));
}

const AUDIT_NOTE: EntityKind = EntityKind::Custom("audit_note");

#[derive(Debug)]
struct AuditNote {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    text: String,
}

impl AuditNote {
    fn new(id: &str, text: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            revision: 0,
            lifecycle: Lifecycle::default(),
            text: text.to_string(),
        }
    }
}

impl Entity for AuditNote {
    fn kind(&self) -> EntityKind {
        AUDIT_NOTE
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
        Params::new().with("text", self.text.as_str())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for AuditNote {
    const KIND: EntityKind = AUDIT_NOTE;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            text: row.text("text")?,
        })
    }
}

#[test]
fn custom_kinds_flush_after_every_builtin_kind() {
    let mut mappings = MappingRegistry::builtin("sqlite");
    mappings.register_entity(EntityMapping::conventional(AUDIT_NOTE, "AuditNote"));
    let (mut session, log) = recording_session(mappings, single_row_settings());

    let note = session.insert(AuditNote::new("n1", "created")).expect("note");
    let definition = session
        .insert(ProcessDefinitionEntity::new("invoice", 1).with_id("def"))
        .expect("definition");
    session.flush().expect("insert flush");
    assert_eq!(
        log.lock().as_slice(),
        [
            "insert insertProcessDefinition def".to_string(),
            "insert insertAuditNote n1".to_string(),
        ]
    );
    log.lock().clear();

    session.delete(&note).expect("delete note");
    session.delete(&definition).expect("delete definition");
    session.flush().expect("delete flush");
    assert_eq!(
        log.lock().as_slice(),
        [
            "delete deleteProcessDefinition def".to_string(),
            "delete deleteAuditNote n1".to_string(),
        ]
    );
}

#[test]
fn unmapped_kinds_fail_the_flush() {
    let (mut session, _log) =
        recording_session(MappingRegistry::builtin("sqlite"), SessionSettings::default());
    session.insert(AuditNote::new("n1", "orphan")).expect("insert is deferred");

    let err = session.commit().expect_err("no mapping for the custom kind");
    assert_eq!(err.code(), StoreErrorCode::MissingMapping);
}

#[test]
fn commit_wraps_the_flush_in_a_transaction() {
    let (mut session, log) =
        recording_session(MappingRegistry::builtin("sqlite"), SessionSettings::default());
    let task = session.insert(TaskEntity::new("t").with_id("t1")).expect("task");
    session.commit().expect("commit");

    assert_eq!(
        log.lock().as_slice(),
        [
            "begin".to_string(),
            "insert insertTask t1".to_string(),
            "commit".to_string(),
        ]
    );
    assert_eq!(task.borrow().revision(), Some(1));
    assert!(Rc::strong_count(&task) >= 2, "session keeps tracking the task");
}
