use super::SUSPENSION_ACTIVE;
use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub execution_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub name: Option<String>,
    pub task_definition_key: Option<String>,
    pub assignee: Option<String>,
    pub priority: i32,
    pub create_time: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub suspension_state: i32,
    pub tenant_id: String,
}

impl TaskEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            execution_id: None,
            process_instance_id: None,
            process_definition_id: None,
            name: Some(name.into()),
            task_definition_key: None,
            assignee: None,
            priority: 50,
            create_time: None,
            due_date: None,
            suspension_state: SUSPENSION_ACTIVE,
            tenant_id: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_execution(
        mut self,
        execution_id: impl Into<String>,
        process_instance_id: impl Into<String>,
    ) -> Self {
        self.execution_id = Some(execution_id.into());
        self.process_instance_id = Some(process_instance_id.into());
        self
    }
}

impl Entity for TaskEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Task
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
            .with("execution_id", self.execution_id.clone())
            .with("process_instance_id", self.process_instance_id.clone())
            .with("process_definition_id", self.process_definition_id.clone())
            .with("name", self.name.clone())
            .with("task_definition_key", self.task_definition_key.clone())
            .with("assignee", self.assignee.clone())
            .with("priority", self.priority)
            .with("create_time", self.create_time)
            .with("due_date", self.due_date)
            .with("suspension_state", self.suspension_state)
            .with("tenant_id", self.tenant_id.as_str())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for TaskEntity {
    const KIND: EntityKind = EntityKind::Task;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            execution_id: row.opt_text("execution_id")?,
            process_instance_id: row.opt_text("proc_inst_id")?,
            process_definition_id: row.opt_text("proc_def_id")?,
            name: row.opt_text("name")?,
            task_definition_key: row.opt_text("task_def_key")?,
            assignee: row.opt_text("assignee")?,
            priority: row.i32("priority")?,
            create_time: row.opt_datetime("create_time")?,
            due_date: row.opt_datetime("due_date")?,
            suspension_state: row.i32("suspension_state")?,
            tenant_id: row.opt_text("tenant_id")?.unwrap_or_default(),
        })
    }
}

const COLUMNS: &str = "id, rev, execution_id, proc_inst_id, proc_def_id, name, task_def_key, \
     assignee, priority, create_time, due_date, suspension_state, tenant_id";

const INSERT: &str = "INSERT INTO ru_task \
     (id, rev, execution_id, proc_inst_id, proc_def_id, name, task_def_key, assignee, priority, \
     create_time, due_date, suspension_state, tenant_id) \
     VALUES (:id, 1, :execution_id, :process_instance_id, :process_definition_id, :name, \
     :task_definition_key, :assignee, :priority, :create_time, :due_date, :suspension_state, \
     :tenant_id)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(EntityKind::Task, "Task"))
        .register_statement("insertTask", INSERT)
        .register_statement("bulkInsertTask", INSERT)
        .register_statement(
            "updateTask",
            "UPDATE ru_task SET rev = :revision_next, name = :name, assignee = :assignee, \
             priority = :priority, due_date = :due_date, suspension_state = :suspension_state \
             WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteTask",
            "DELETE FROM ru_task WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectTask",
            format!("SELECT {COLUMNS} FROM ru_task WHERE id = :id"),
        )
        .register_statement(
            "selectTasksByProcessInstance",
            format!(
                "SELECT {COLUMNS} FROM ru_task WHERE proc_inst_id = :process_instance_id ORDER BY id"
            ),
        )
        .register_statement(
            "bulkDeleteTasksByProcessInstance",
            "DELETE FROM ru_task WHERE proc_inst_id = :process_instance_id",
        );
}
