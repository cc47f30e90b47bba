use super::SUSPENSION_ACTIVE;
use crate::entity::{
    Entity, EntityKind, HierarchyLinks, Lifecycle, Params, PersistentEntity, Row,
};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};

/// A process instance or one of its child executions. Executions point at
/// their parent (and at a calling execution for sub processes), so a flush
/// orders them per instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub process_instance_id: Option<String>,
    pub business_key: Option<String>,
    pub parent_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub super_execution_id: Option<String>,
    pub activity_id: Option<String>,
    pub is_active: bool,
    pub is_concurrent: bool,
    pub is_scope: bool,
    pub suspension_state: i32,
    pub tenant_id: String,
}

impl ExecutionEntity {
    pub fn new() -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            process_instance_id: None,
            business_key: None,
            parent_id: None,
            process_definition_id: None,
            super_execution_id: None,
            activity_id: None,
            is_active: true,
            is_concurrent: false,
            is_scope: true,
            suspension_state: SUSPENSION_ACTIVE,
            tenant_id: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_super_execution(mut self, super_execution_id: impl Into<String>) -> Self {
        self.super_execution_id = Some(super_execution_id.into());
        self
    }

    pub fn with_process_instance(mut self, process_instance_id: impl Into<String>) -> Self {
        self.process_instance_id = Some(process_instance_id.into());
        self
    }

    pub fn is_process_instance(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Default for ExecutionEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for ExecutionEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Execution
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
            .with("process_instance_id", self.process_instance_id.clone())
            .with("business_key", self.business_key.clone())
            .with("parent_id", self.parent_id.clone())
            .with("process_definition_id", self.process_definition_id.clone())
            .with("super_execution_id", self.super_execution_id.clone())
            .with("activity_id", self.activity_id.clone())
            .with("is_active", self.is_active)
            .with("is_concurrent", self.is_concurrent)
            .with("is_scope", self.is_scope)
            .with("suspension_state", self.suspension_state)
            .with("tenant_id", self.tenant_id.as_str())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }

    fn hierarchy(&self) -> Option<HierarchyLinks> {
        Some(HierarchyLinks {
            parent_id: self.parent_id.clone(),
            super_id: self.super_execution_id.clone(),
        })
    }
}

impl PersistentEntity for ExecutionEntity {
    const KIND: EntityKind = EntityKind::Execution;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            process_instance_id: row.opt_text("proc_inst_id")?,
            business_key: row.opt_text("business_key")?,
            parent_id: row.opt_text("parent_id")?,
            process_definition_id: row.opt_text("proc_def_id")?,
            super_execution_id: row.opt_text("super_exec")?,
            activity_id: row.opt_text("act_id")?,
            is_active: row.bool("is_active")?,
            is_concurrent: row.bool("is_concurrent")?,
            is_scope: row.bool("is_scope")?,
            suspension_state: row.i32("suspension_state")?,
            tenant_id: row.opt_text("tenant_id")?.unwrap_or_default(),
        })
    }
}

const COLUMNS: &str = "id, rev, proc_inst_id, business_key, parent_id, proc_def_id, super_exec, \
     act_id, is_active, is_concurrent, is_scope, suspension_state, tenant_id";

const INSERT: &str = "INSERT INTO ru_execution \
     (id, rev, proc_inst_id, business_key, parent_id, proc_def_id, super_exec, act_id, \
     is_active, is_concurrent, is_scope, suspension_state, tenant_id) \
     VALUES (:id, 1, :process_instance_id, :business_key, :parent_id, :process_definition_id, \
     :super_execution_id, :activity_id, :is_active, :is_concurrent, :is_scope, \
     :suspension_state, :tenant_id)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(EntityKind::Execution, "Execution"))
        .register_statement("insertExecution", INSERT)
        .register_statement("bulkInsertExecution", INSERT)
        .register_statement(
            "updateExecution",
            "UPDATE ru_execution SET rev = :revision_next, business_key = :business_key, \
             parent_id = :parent_id, proc_def_id = :process_definition_id, \
             super_exec = :super_execution_id, act_id = :activity_id, is_active = :is_active, \
             is_concurrent = :is_concurrent, is_scope = :is_scope, \
             suspension_state = :suspension_state WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteExecution",
            "DELETE FROM ru_execution WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectExecution",
            format!("SELECT {COLUMNS} FROM ru_execution WHERE id = :id"),
        )
        .register_statement(
            "selectExecutionsByProcessInstance",
            format!(
                "SELECT {COLUMNS} FROM ru_execution WHERE proc_inst_id = :process_instance_id \
                 ORDER BY id"
            ),
        )
        .register_statement(
            "selectChildExecutions",
            format!("SELECT {COLUMNS} FROM ru_execution WHERE parent_id = :parent_id ORDER BY id"),
        );
}
