use crate::entity::EntityKind;
use crate::entity::builtin;
use crate::error::StoreError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementOperation {
    Insert,
    BulkInsert,
    Update,
    Delete,
    SelectById,
}

impl StatementOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementOperation::Insert => "insert",
            StatementOperation::BulkInsert => "bulk insert",
            StatementOperation::Update => "update",
            StatementOperation::Delete => "delete",
            StatementOperation::SelectById => "select",
        }
    }
}

/// Statement names for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    pub kind: EntityKind,
    pub insert: Option<String>,
    pub bulk_insert: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
    pub select_by_id: Option<String>,
    pub bulk_insertable: bool,
}

impl EntityMapping {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            insert: None,
            bulk_insert: None,
            update: None,
            delete: None,
            select_by_id: None,
            bulk_insertable: true,
        }
    }

    /// `insertX`, `bulkInsertX`, `updateX`, `deleteX`, `selectX`.
    pub fn conventional(kind: EntityKind, stem: &str) -> Self {
        Self {
            kind,
            insert: Some(format!("insert{stem}")),
            bulk_insert: Some(format!("bulkInsert{stem}")),
            update: Some(format!("update{stem}")),
            delete: Some(format!("delete{stem}")),
            select_by_id: Some(format!("select{stem}")),
            bulk_insertable: true,
        }
    }

    pub fn with_bulk_insertable(mut self, bulk_insertable: bool) -> Self {
        self.bulk_insertable = bulk_insertable;
        self
    }

    pub fn without_update(mut self) -> Self {
        self.update = None;
        self
    }

    pub fn statement(&self, operation: StatementOperation) -> Option<&str> {
        match operation {
            StatementOperation::Insert => self.insert.as_deref(),
            StatementOperation::BulkInsert => self.bulk_insert.as_deref(),
            StatementOperation::Update => self.update.as_deref(),
            StatementOperation::Delete => self.delete.as_deref(),
            StatementOperation::SelectById => self.select_by_id.as_deref(),
        }
    }
}

/// Explicit lookup from entity kind to statement names and from statement
/// name to SQL text. Built once when a store opens and shared read-only.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    dialect: String,
    entities: HashMap<EntityKind, EntityMapping>,
    statements: HashMap<String, String>,
    dialect_variants: HashMap<(String, String), String>,
    bulk_insert_exceptions: HashSet<(String, EntityKind)>,
}

impl MappingRegistry {
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            entities: HashMap::new(),
            statements: HashMap::new(),
            dialect_variants: HashMap::new(),
            bulk_insert_exceptions: HashSet::new(),
        }
    }

    /// Registry with every engine-owned entity and statement.
    pub fn builtin(dialect: impl Into<String>) -> Self {
        let mut registry = Self::new(dialect);
        builtin::register_all(&mut registry);
        // Multi-row inserts of blob columns are rejected by that driver.
        registry.disable_bulk_insert("mssql", EntityKind::ByteArray);
        registry
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn register_entity(&mut self, mapping: EntityMapping) -> &mut Self {
        self.entities.insert(mapping.kind, mapping);
        self
    }

    pub fn register_statement(
        &mut self,
        name: impl Into<String>,
        sql: impl Into<String>,
    ) -> &mut Self {
        self.statements.insert(name.into(), sql.into());
        self
    }

    pub fn register_dialect_variant(
        &mut self,
        dialect: impl Into<String>,
        statement: impl Into<String>,
        variant: impl Into<String>,
    ) -> &mut Self {
        self.dialect_variants
            .insert((dialect.into(), statement.into()), variant.into());
        self
    }

    pub fn disable_bulk_insert(&mut self, dialect: impl Into<String>, kind: EntityKind) -> &mut Self {
        self.bulk_insert_exceptions.insert((dialect.into(), kind));
        self
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityMapping> {
        self.entities.get(&kind)
    }

    /// Resolves the statement for `kind` and `operation`, already mapped to
    /// the dialect variant when one is registered.
    pub fn entity_statement(
        &self,
        kind: EntityKind,
        operation: StatementOperation,
    ) -> Result<&str, StoreError> {
        let name = self
            .entities
            .get(&kind)
            .and_then(|mapping| mapping.statement(operation))
            .ok_or(StoreError::MissingMapping {
                kind,
                operation: operation.as_str(),
            })?;
        Ok(self.map_statement(name))
    }

    pub fn map_statement<'a>(&'a self, statement: &'a str) -> &'a str {
        self.dialect_variants
            .get(&(self.dialect.clone(), statement.to_string()))
            .map(String::as_str)
            .unwrap_or(statement)
    }

    pub fn sql(&self, statement: &str) -> Result<&str, StoreError> {
        self.statements
            .get(statement)
            .map(String::as_str)
            .ok_or_else(|| StoreError::UnknownStatement(statement.to_string()))
    }

    pub fn is_bulk_insertable(&self, kind: EntityKind) -> bool {
        let Some(mapping) = self.entities.get(&kind) else {
            return false;
        };
        mapping.bulk_insertable
            && mapping.bulk_insert.is_some()
            && !self
                .bulk_insert_exceptions
                .contains(&(self.dialect.clone(), kind))
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityMapping, MappingRegistry, StatementOperation};
    use crate::entity::EntityKind;
    use crate::error::StoreError;

    #[test]
    fn builtin_registry_resolves_conventional_names() {
        let registry = MappingRegistry::builtin("sqlite");
        assert_eq!(
            registry
                .entity_statement(EntityKind::Execution, StatementOperation::Update)
                .expect("update execution"),
            "updateExecution"
        );
        assert!(registry.sql("updateExecution").is_ok());
        assert!(registry.sql("selectNextJobsToExecute").is_ok());
    }

    #[test]
    fn unmapped_kind_is_a_configuration_error() {
        let registry = MappingRegistry::builtin("sqlite");
        let err = registry
            .entity_statement(EntityKind::Custom("audit_note"), StatementOperation::Insert)
            .expect_err("custom kind is not registered");
        assert!(matches!(
            err,
            StoreError::MissingMapping {
                kind: EntityKind::Custom("audit_note"),
                operation: "insert"
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn dialect_variant_applies_only_to_its_dialect() {
        let mut mssql = MappingRegistry::new("mssql");
        mssql
            .register_entity(EntityMapping::conventional(EntityKind::Job, "Job"))
            .register_dialect_variant("mssql", "updateJob", "updateJob_mssql");
        assert_eq!(
            mssql
                .entity_statement(EntityKind::Job, StatementOperation::Update)
                .expect("mapped"),
            "updateJob_mssql"
        );
        assert_eq!(mssql.map_statement("deleteJob"), "deleteJob");

        let mut sqlite = MappingRegistry::new("sqlite");
        sqlite.register_dialect_variant("mssql", "updateJob", "updateJob_mssql");
        assert_eq!(sqlite.map_statement("updateJob"), "updateJob");
    }

    #[test]
    fn bulk_insert_exception_is_per_dialect() {
        let mssql = MappingRegistry::builtin("mssql");
        assert!(!mssql.is_bulk_insertable(EntityKind::ByteArray));
        assert!(mssql.is_bulk_insertable(EntityKind::Execution));

        let sqlite = MappingRegistry::builtin("sqlite");
        assert!(sqlite.is_bulk_insertable(EntityKind::ByteArray));
        assert!(!sqlite.is_bulk_insertable(EntityKind::Custom("x")));
    }
}
