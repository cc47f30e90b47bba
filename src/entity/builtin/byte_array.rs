use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct ByteArrayEntity {
    id: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
    pub name: String,
    pub deployment_id: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub generated: bool,
}

impl ByteArrayEntity {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: None,
            revision: 0,
            lifecycle: Lifecycle::default(),
            name: name.into(),
            deployment_id: None,
            bytes: Some(bytes),
            generated: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Entity for ByteArrayEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::ByteArray
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
            .with("name", self.name.as_str())
            .with("deployment_id", self.deployment_id.clone())
            .with("bytes", self.bytes.clone())
            .with("generated", self.generated)
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for ByteArrayEntity {
    const KIND: EntityKind = EntityKind::ByteArray;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.text("id")?),
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
            name: row.opt_text("name")?.unwrap_or_default(),
            deployment_id: row.opt_text("deployment_id")?,
            bytes: row.opt_blob("bytes")?,
            generated: row.bool("generated")?,
        })
    }
}

const INSERT: &str = "INSERT INTO ge_bytearray (id, rev, name, deployment_id, bytes, generated) \
     VALUES (:id, 1, :name, :deployment_id, :bytes, :generated)";

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(EntityKind::ByteArray, "ByteArray"))
        .register_statement("insertByteArray", INSERT)
        .register_statement("bulkInsertByteArray", INSERT)
        .register_statement(
            "updateByteArray",
            "UPDATE ge_bytearray SET rev = :revision_next, name = :name, bytes = :bytes \
             WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "deleteByteArray",
            "DELETE FROM ge_bytearray WHERE id = :id AND rev = :revision",
        )
        .register_statement(
            "selectByteArray",
            "SELECT id, rev, name, deployment_id, bytes, generated FROM ge_bytearray WHERE id = :id",
        )
        .register_statement(
            "bulkDeleteByteArraysByDeployment",
            "DELETE FROM ge_bytearray WHERE deployment_id = :deployment_id",
        );
}
