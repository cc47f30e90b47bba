use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};
use chrono::{DateTime, Utc};

/// Append-only audit row. Not revisioned and never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntryEntity {
    id: Option<String>,
    lifecycle: Lifecycle,
    pub event_type: String,
    pub process_definition_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub execution_id: Option<String>,
    pub task_id: Option<String>,
    pub time_stamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl EventLogEntryEntity {
    pub fn new(event_type: impl Into<String>, time_stamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            lifecycle: Lifecycle::default(),
            event_type: event_type.into(),
            process_definition_id: None,
            process_instance_id: None,
            execution_id: None,
            task_id: None,
            time_stamp,
            user_id: None,
            data: None,
        }
    }
}

impl Entity for EventLogEntryEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::EventLogEntry
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
            .with("event_type", self.event_type.as_str())
            .with("process_definition_id", self.process_definition_id.clone())
            .with("process_instance_id", self.process_instance_id.clone())
            .with("execution_id", self.execution_id.clone())
            .with("task_id", self.task_id.clone())
            .with("time_stamp", self.time_stamp)
            .with("user_id", self.user_id.clone())
            .with("data", self.data.clone())
    }
}

impl PersistentEntity for EventLogEntryEntity {
    const KIND: EntityKind = EntityKind::EventLogEntry;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            lifecycle: Lifecycle::default(),
            event_type: row.text("event_type")?,
            process_definition_id: row.opt_text("proc_def_id")?,
            process_instance_id: row.opt_text("proc_inst_id")?,
            execution_id: row.opt_text("execution_id")?,
            task_id: row.opt_text("task_id")?,
            time_stamp: row.datetime("time_stamp")?,
            user_id: row.opt_text("user_id")?,
            data: row.opt_blob("data")?,
        })
    }
}

const INSERT: &str = "INSERT INTO ru_event_log \
     (id, event_type, proc_def_id, proc_inst_id, execution_id, task_id, time_stamp, user_id, data) \
     VALUES (:id, :event_type, :process_definition_id, :process_instance_id, :execution_id, \
     :task_id, :time_stamp, :user_id, :data)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(
            EntityMapping::conventional(EntityKind::EventLogEntry, "EventLogEntry").without_update(),
        )
        .register_statement("insertEventLogEntry", INSERT)
        .register_statement("bulkInsertEventLogEntry", INSERT)
        .register_statement("deleteEventLogEntry", "DELETE FROM ru_event_log WHERE id = :id")
        .register_statement(
            "selectEventLogEntry",
            "SELECT id, event_type, proc_def_id, proc_inst_id, execution_id, task_id, time_stamp, \
             user_id, data FROM ru_event_log WHERE id = :id",
        )
        .register_statement(
            "selectEventLogEntriesByProcessInstance",
            "SELECT id, event_type, proc_def_id, proc_inst_id, execution_id, task_id, time_stamp, \
             user_id, data FROM ru_event_log WHERE proc_inst_id = :process_instance_id \
             ORDER BY time_stamp, id",
        );
}
