pub mod resources;
pub mod versions;

pub use resources::{ResourceLocator, ScriptItem, UpgradeStep, UpgradeStepRegistry};
pub use versions::{SCHEMA_VERSIONS, SchemaVersion, current_version};

use crate::config::SchemaUpdateMode;
use crate::entity::builtin::PropertyEntity;
use crate::entity::builtin::property::{SCHEMA_HISTORY, SCHEMA_VERSION};
use crate::error::StoreError;
use crate::session::{Session, SessionFactory};
use crate::store::Connection;
use resources::{CREATE_DIR, DROP_DIR, UPGRADE_DIR, parse_script, resource_name};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Independently created and upgraded group of tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaComponent {
    Engine,
    History,
    Identity,
}

impl SchemaComponent {
    pub fn name(self) -> &'static str {
        match self {
            SchemaComponent::Engine => "engine",
            SchemaComponent::History => "history",
            SchemaComponent::Identity => "identity",
        }
    }

    /// Table whose presence means the component is installed.
    pub fn presence_table(self) -> &'static str {
        match self {
            SchemaComponent::Engine => "ru_execution",
            SchemaComponent::History => "hi_procinst",
            SchemaComponent::Identity => "id_user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Mandatory,
    Optional,
}

/// Creates, checks, upgrades and drops the physical schema.
pub struct SchemaManager {
    sessions: Arc<SessionFactory>,
    resources: ResourceLocator,
    steps: UpgradeStepRegistry,
    history_enabled: bool,
    identity_enabled: bool,
}

impl SchemaManager {
    pub fn new(
        sessions: Arc<SessionFactory>,
        resources: ResourceLocator,
        steps: UpgradeStepRegistry,
        history_enabled: bool,
        identity_enabled: bool,
    ) -> Self {
        Self {
            sessions,
            resources,
            steps,
            history_enabled,
            identity_enabled,
        }
    }

    fn dialect(&self) -> &str {
        self.sessions.dialect()
    }

    fn open_session(&self) -> Result<Session, StoreError> {
        self.sessions.open_session(None)
    }

    fn is_enabled(&self, component: SchemaComponent) -> bool {
        match component {
            SchemaComponent::Engine => true,
            SchemaComponent::History => self.history_enabled,
            SchemaComponent::Identity => self.identity_enabled,
        }
    }

    pub fn is_present(&self, component: SchemaComponent) -> Result<bool, StoreError> {
        let mut session = self.open_session()?;
        session.connection().table_exists(component.presence_table())
    }

    /// Persisted `schema.version`, or `None` when the engine tables are absent.
    pub fn db_version(&self) -> Result<Option<String>, StoreError> {
        let mut session = self.open_session()?;
        if !session
            .connection()
            .table_exists(SchemaComponent::Engine.presence_table())?
        {
            return Ok(None);
        }
        let property = session.select_by_id::<PropertyEntity>(SCHEMA_VERSION)?;
        Ok(property.and_then(|p| p.borrow().value.clone()))
    }

    pub fn check(&self) -> Result<(), StoreError> {
        let mut missing = Vec::new();
        if !self.is_present(SchemaComponent::Engine)? {
            missing.push(SchemaComponent::Engine.name().to_string());
        } else {
            let actual = self.db_version()?.unwrap_or_default();
            if actual != current_version() {
                return Err(StoreError::SchemaMismatch {
                    expected: current_version().to_string(),
                    actual,
                });
            }
        }
        for component in [SchemaComponent::History, SchemaComponent::Identity] {
            if self.is_enabled(component) && !self.is_present(component)? {
                missing.push(component.name().to_string());
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::MissingSchema {
                components: missing,
            });
        }
        debug!(version = current_version(), "schema check passed");
        Ok(())
    }

    pub fn create(&self) -> Result<(), StoreError> {
        if self.is_present(SchemaComponent::Engine)? {
            let actual = self.db_version()?.unwrap_or_default();
            if actual != current_version() {
                return Err(StoreError::SchemaMismatch {
                    expected: current_version().to_string(),
                    actual,
                });
            }
        } else {
            self.create_component(SchemaComponent::Engine)?;
        }
        for component in [SchemaComponent::History, SchemaComponent::Identity] {
            if self.is_enabled(component) && !self.is_present(component)? {
                self.create_component(component)?;
            }
        }
        Ok(())
    }

    /// Drops every installed component, optional ones first.
    pub fn drop_schema(&self) -> Result<(), StoreError> {
        for component in [
            SchemaComponent::Identity,
            SchemaComponent::History,
            SchemaComponent::Engine,
        ] {
            if self.is_present(component)? {
                self.drop_component(component)?;
            }
        }
        Ok(())
    }

    /// Drops optional components that are installed but disabled.
    pub fn prune(&self) -> Result<(), StoreError> {
        for component in [SchemaComponent::Identity, SchemaComponent::History] {
            if !self.is_enabled(component) && self.is_present(component)? {
                self.drop_component(component)?;
            }
        }
        Ok(())
    }

    /// Brings every enabled component to the current version. Returns a
    /// human-readable summary when anything was upgraded.
    pub fn update(&self) -> Result<Option<String>, StoreError> {
        let mut feedback = Vec::new();
        let mut upgraded_from = None;

        if self.is_present(SchemaComponent::Engine)? {
            let stored = self.db_version()?.ok_or_else(|| StoreError::IntegrityError {
                message: format!("engine tables exist but property '{SCHEMA_VERSION}' is missing"),
            })?;
            let index = versions::resolve_version_index(&stored)?;
            if index != versions::last_index() {
                info!(
                    from = %stored,
                    to = current_version(),
                    "upgrading engine schema"
                );
                self.upgrade_component(SchemaComponent::Engine, index)?;
                feedback.push(format!(
                    "upgraded engine schema from {stored} to {}",
                    current_version()
                ));
                upgraded_from = Some((stored, index));
            }
        } else {
            self.create_component(SchemaComponent::Engine)?;
        }

        for component in [SchemaComponent::History, SchemaComponent::Identity] {
            if !self.is_enabled(component) {
                continue;
            }
            if !self.is_present(component)? {
                self.create_component(component)?;
            } else if let Some((stored, index)) = &upgraded_from {
                self.upgrade_component(component, *index)?;
                feedback.push(format!(
                    "upgraded {} schema from {stored} to {}",
                    component.name(),
                    current_version()
                ));
            }
        }

        // The stored version only moves once every component's steps applied.
        if let Some((stored, _)) = &upgraded_from {
            self.record_upgrade(stored)?;
        }

        Ok((!feedback.is_empty()).then(|| feedback.join("; ")))
    }

    pub fn perform_startup_operations(
        &self,
        mode: SchemaUpdateMode,
    ) -> Result<Option<String>, StoreError> {
        debug!(mode = mode.as_str(), "schema startup operations");
        match mode {
            SchemaUpdateMode::Check => self.check().map(|()| None),
            SchemaUpdateMode::Update => self.update(),
            SchemaUpdateMode::Create | SchemaUpdateMode::CreateDrop => self.create().map(|()| None),
            SchemaUpdateMode::DropCreate => {
                if let Err(err) = self.drop_schema() {
                    info!(error = %err, "schema drop before create failed; continuing");
                }
                self.create().map(|()| None)
            }
            SchemaUpdateMode::None => Ok(None),
        }
    }

    fn record_upgrade(&self, stored: &str) -> Result<(), StoreError> {
        let current = current_version();
        let mut session = self.open_session()?;
        let version = session
            .select_by_id::<PropertyEntity>(SCHEMA_VERSION)?
            .ok_or_else(|| StoreError::IntegrityError {
                message: format!("property '{SCHEMA_VERSION}' is missing"),
            })?;
        version.borrow_mut().value = Some(current.to_string());

        let entry = format!(" upgrade({stored}->{current})");
        match session.select_by_id::<PropertyEntity>(SCHEMA_HISTORY)? {
            Some(history) => {
                let mut history = history.borrow_mut();
                let mut value = history.value.take().unwrap_or_default();
                value.push_str(&entry);
                history.value = Some(value);
            }
            None => {
                session.insert(PropertyEntity::new(
                    SCHEMA_HISTORY,
                    format!("create({stored}){entry}"),
                ))?;
            }
        }
        session.commit()
    }

    fn create_component(&self, component: SchemaComponent) -> Result<(), StoreError> {
        info!(component = component.name(), version = current_version(), "creating schema");
        let name = resource_name(CREATE_DIR, self.dialect(), "create", component.name());
        self.execute_resource(&name, ResourceKind::Mandatory)
    }

    fn drop_component(&self, component: SchemaComponent) -> Result<(), StoreError> {
        info!(component = component.name(), "dropping schema");
        let name = resource_name(DROP_DIR, self.dialect(), "drop", component.name());
        self.execute_resource(&name, ResourceKind::Mandatory)
    }

    fn upgrade_component(&self, component: SchemaComponent, from_index: usize) -> Result<(), StoreError> {
        for (from, to) in versions::upgrade_steps(from_index) {
            let operation = format!(
                "upgradestep.{}.to.{}",
                versions::clean_version(from),
                versions::clean_version(to)
            );
            let name = resource_name(UPGRADE_DIR, self.dialect(), &operation, component.name());
            self.execute_resource(&name, ResourceKind::Optional)?;
        }
        Ok(())
    }

    /// Runs every statement of a script. A failing statement does not stop
    /// the script; the first failure is returned once the script is done.
    fn execute_resource(&self, name: &str, kind: ResourceKind) -> Result<(), StoreError> {
        let Some(text) = self.resources.load(name)? else {
            return match kind {
                ResourceKind::Mandatory => Err(StoreError::MissingResource {
                    resource: name.to_string(),
                }),
                ResourceKind::Optional => {
                    debug!(resource = name, "no upgrade resource; skipping");
                    Ok(())
                }
            };
        };

        let mut session = self.open_session()?;
        let conn = session.connection();
        let mut first_failure = None;
        for item in parse_script(&text) {
            let outcome = match &item {
                ScriptItem::Comment(comment) => {
                    debug!(resource = name, comment = %comment, "script comment");
                    continue;
                }
                ScriptItem::Statement(statement) => conn.execute_raw(statement),
                ScriptItem::Step(step) => self.run_step(conn, step),
            };
            if let Err(err) = outcome {
                let statement = match &item {
                    ScriptItem::Step(step) => format!("execute step {step}"),
                    ScriptItem::Statement(statement) | ScriptItem::Comment(statement) => {
                        statement.clone()
                    }
                };
                warn!(resource = name, statement = %statement, error = %err, "schema statement failed");
                if first_failure.is_none() {
                    first_failure = Some(StoreError::MigrationStatement {
                        resource: name.to_string(),
                        statement,
                        message: err.to_string(),
                    });
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => {
                debug!(resource = name, "schema resource applied");
                Ok(())
            }
        }
    }

    fn run_step(&self, conn: &mut dyn Connection, step: &str) -> Result<(), StoreError> {
        let handler = self.steps.get(step).ok_or_else(|| StoreError::InvalidConfig {
            message: format!("unknown upgrade step '{step}'"),
        })?;
        info!(step, "running programmatic upgrade step");
        handler.execute(conn)
    }
}
