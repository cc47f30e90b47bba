use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};

/// Runtime process variable. Exactly one of the typed slots is meaningful for
/// a given `var_type`; large values live in a byte array row.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInstanceEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub var_type: String,
    pub name: String,
    pub execution_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub task_id: Option<String>,
    pub byte_array_id: Option<String>,
    pub double_value: Option<f64>,
    pub long_value: Option<i64>,
    pub text_value: Option<String>,
    pub text2_value: Option<String>,
}

impl VariableInstanceEntity {
    pub fn new(name: impl Into<String>, var_type: impl Into<String>) -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            var_type: var_type.into(),
            name: name.into(),
            execution_id: None,
            process_instance_id: None,
            task_id: None,
            byte_array_id: None,
            double_value: None,
            long_value: None,
            text_value: None,
            text2_value: None,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut variable = Self::new(name, "string");
        variable.text_value = Some(value.into());
        variable
    }

    pub fn long(name: impl Into<String>, value: i64) -> Self {
        let mut variable = Self::new(name, "long");
        variable.long_value = Some(value);
        variable
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn on_execution(
        mut self,
        execution_id: impl Into<String>,
        process_instance_id: impl Into<String>,
    ) -> Self {
        self.execution_id = Some(execution_id.into());
        self.process_instance_id = Some(process_instance_id.into());
        self
    }
}

impl Entity for VariableInstanceEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::VariableInstance
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
            .with("var_type", self.var_type.as_str())
            .with("name", self.name.as_str())
            .with("execution_id", self.execution_id.clone())
            .with("process_instance_id", self.process_instance_id.clone())
            .with("task_id", self.task_id.clone())
            .with("byte_array_id", self.byte_array_id.clone())
            .with("double_value", self.double_value)
            .with("long_value", self.long_value)
            .with("text_value", self.text_value.clone())
            .with("text2_value", self.text2_value.clone())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for VariableInstanceEntity {
    const KIND: EntityKind = EntityKind::VariableInstance;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            var_type: row.text("var_type")?,
            name: row.text("name")?,
            execution_id: row.opt_text("execution_id")?,
            process_instance_id: row.opt_text("proc_inst_id")?,
            task_id: row.opt_text("task_id")?,
            byte_array_id: row.opt_text("bytearray_id")?,
            double_value: row.opt_f64("double_value")?,
            long_value: row.opt_i64("long_value")?,
            text_value: row.opt_text("text_value")?,
            text2_value: row.opt_text("text2_value")?,
        })
    }
}

const COLUMNS: &str = "id, rev, var_type, name, execution_id, proc_inst_id, task_id, bytearray_id, \
     double_value, long_value, text_value, text2_value";

const INSERT: &str = "INSERT INTO ru_variable \
     (id, rev, var_type, name, execution_id, proc_inst_id, task_id, bytearray_id, double_value, \
     long_value, text_value, text2_value) \
     VALUES (:id, 1, :var_type, :name, :execution_id, :process_instance_id, :task_id, \
     :byte_array_id, :double_value, :long_value, :text_value, :text2_value)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(
            EntityKind::VariableInstance,
            "VariableInstance",
        ))
        .register_statement("insertVariableInstance", INSERT)
        .register_statement("bulkInsertVariableInstance", INSERT)
        .register_statement(
            "updateVariableInstance",
            "UPDATE ru_variable SET rev = :revision_next, var_type = :var_type, \
             execution_id = :execution_id, bytearray_id = :byte_array_id, \
             double_value = :double_value, long_value = :long_value, text_value = :text_value, \
             text2_value = :text2_value WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteVariableInstance",
            "DELETE FROM ru_variable WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectVariableInstance",
            format!("SELECT {COLUMNS} FROM ru_variable WHERE id = :id"),
        )
        .register_statement(
            "selectVariablesByExecution",
            format!("SELECT {COLUMNS} FROM ru_variable WHERE execution_id = :execution_id ORDER BY name"),
        );
}
