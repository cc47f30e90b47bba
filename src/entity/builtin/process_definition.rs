use super::SUSPENSION_ACTIVE;
use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinitionEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub key: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub version: i32,
    pub deployment_id: Option<String>,
    pub resource_name: Option<String>,
    pub suspension_state: i32,
    pub tenant_id: String,
}

impl ProcessDefinitionEntity {
    pub fn new(key: impl Into<String>, version: i32) -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            key: key.into(),
            name: None,
            category: None,
            version,
            deployment_id: None,
            resource_name: None,
            suspension_state: SUSPENSION_ACTIVE,
            tenant_id: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Entity for ProcessDefinitionEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::ProcessDefinition
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
            .with("key", self.key.as_str())
            .with("name", self.name.clone())
            .with("category", self.category.clone())
            .with("version", self.version)
            .with("deployment_id", self.deployment_id.clone())
            .with("resource_name", self.resource_name.clone())
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

impl PersistentEntity for ProcessDefinitionEntity {
    const KIND: EntityKind = EntityKind::ProcessDefinition;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            key: row.text("key")?,
            name: row.opt_text("name")?,
            category: row.opt_text("category")?,
            version: row.i32("version")?,
            deployment_id: row.opt_text("deployment_id")?,
            resource_name: row.opt_text("resource_name")?,
            suspension_state: row.i32("suspension_state")?,
            tenant_id: row.opt_text("tenant_id")?.unwrap_or_default(),
        })
    }
}

const COLUMNS: &str =
    "id, rev, key, name, category, version, deployment_id, resource_name, suspension_state, tenant_id";

pub(crate) fn register(registry: &mut MappingRegistry) {
    let insert = "INSERT INTO re_procdef \
         (id, rev, key, name, category, version, deployment_id, resource_name, suspension_state, tenant_id) \
         VALUES (:id, 1, :key, :name, :category, :version, :deployment_id, :resource_name, \
         :suspension_state, :tenant_id)";
    registry
        .register_entity(EntityMapping::conventional(
            EntityKind::ProcessDefinition,
            "ProcessDefinition",
        ))
        .register_statement("insertProcessDefinition", insert)
        .register_statement("bulkInsertProcessDefinition", insert)
        .register_statement(
            "updateProcessDefinition",
            "UPDATE re_procdef SET rev = :revision_next, name = :name, category = :category, \
             suspension_state = :suspension_state WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteProcessDefinition",
            "DELETE FROM re_procdef WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectProcessDefinition",
            format!("SELECT {COLUMNS} FROM re_procdef WHERE id = :id"),
        )
        .register_statement(
            "selectLatestProcessDefinitionByKey",
            format!(
                "SELECT {COLUMNS} FROM re_procdef WHERE key = :key AND tenant_id = :tenant_id \
                 ORDER BY version DESC LIMIT 1"
            ),
        );
}
