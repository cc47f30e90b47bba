use crate::entity::{Entity, EntityKind, Lifecycle, Params, PersistentEntity, Row};
use crate::error::StoreError;
use crate::mapping::{EntityMapping, MappingRegistry};

pub const SCHEMA_VERSION: &str = "schema.version";
pub const SCHEMA_HISTORY: &str = "schema.history";
pub const NEXT_DBID: &str = "next.dbid";

/// Engine-wide name/value property. The name is the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntity {
    name: String,
    pub value: Option<String>,
    revision: i32,
    lifecycle: Lifecycle,
}

impl PropertyEntity {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            revision: 0,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for PropertyEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Property
    }

    fn id(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn set_id(&mut self, id: String) {
        self.name = id;
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn persistent_state(&self) -> Params {
        Params::new().with("value", self.value.clone())
    }

    fn revision(&self) -> Option<i32> {
        Some(self.revision)
    }

    fn set_revision(&mut self, revision: i32) {
        self.revision = revision;
    }
}

impl PersistentEntity for PropertyEntity {
    const KIND: EntityKind = EntityKind::Property;

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            name: row.text("name")?,
            value: row.opt_text("value")?,
            revision: row.i32("rev")?,
            lifecycle: Lifecycle::default(),
        })
    }
}

pub(crate) fn register(registry: &mut MappingRegistry) {
    registry
        .register_entity(EntityMapping::conventional(EntityKind::Property, "Property"))
        .register_statement(
            "insertProperty",
            "INSERT INTO ge_property (name, value, rev) VALUES (:id, :value, 1)",
        )
        .register_statement(
            "bulkInsertProperty",
            "INSERT INTO ge_property (name, value, rev) VALUES (:id, :value, 1)",
        )
        .register_statement(
            "updateProperty",
            "UPDATE ge_property SET rev = :revision_next, value = :value \
             WHERE name = :id AND rev = :revision",
        )
        .register_statement(
            "deleteProperty",
            "DELETE FROM ge_property WHERE name = :id AND rev = :revision",
        )
        .register_statement(
            "selectProperty",
            "SELECT name, value, rev FROM ge_property WHERE name = :id",
        )
        .register_statement(
            "selectProperties",
            "SELECT name, value, rev FROM ge_property ORDER BY name",
        );
}
