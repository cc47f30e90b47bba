use crate::error::StoreError;
use crate::store::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const CREATE_DIR: &str = "create";
pub const DROP_DIR: &str = "drop";
pub const UPGRADE_DIR: &str = "upgrade";

/// SQLite scripts compiled into the crate, keyed by resource name.
const EMBEDDED: &[(&str, &str)] = &[
    (
        "create/sqlite.create.engine.sql",
        include_str!("../../resources/create/sqlite.create.engine.sql"),
    ),
    (
        "create/sqlite.create.history.sql",
        include_str!("../../resources/create/sqlite.create.history.sql"),
    ),
    (
        "create/sqlite.create.identity.sql",
        include_str!("../../resources/create/sqlite.create.identity.sql"),
    ),
    (
        "drop/sqlite.drop.engine.sql",
        include_str!("../../resources/drop/sqlite.drop.engine.sql"),
    ),
    (
        "drop/sqlite.drop.history.sql",
        include_str!("../../resources/drop/sqlite.drop.history.sql"),
    ),
    (
        "drop/sqlite.drop.identity.sql",
        include_str!("../../resources/drop/sqlite.drop.identity.sql"),
    ),
    (
        "upgrade/sqlite.upgradestep.6003.to.6004.engine.sql",
        include_str!("../../resources/upgrade/sqlite.upgradestep.6003.to.6004.engine.sql"),
    ),
    (
        "upgrade/sqlite.upgradestep.6003.to.6004.history.sql",
        include_str!("../../resources/upgrade/sqlite.upgradestep.6003.to.6004.history.sql"),
    ),
];

/// `<directory>/<dialect>.<operation>.<component>.sql`
pub fn resource_name(directory: &str, dialect: &str, operation: &str, component: &str) -> String {
    format!("{directory}/{dialect}.{operation}.{component}.sql")
}

/// Finds schema scripts in an optional override directory first, then among
/// the embedded resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocator {
    override_dir: Option<PathBuf>,
}

impl ResourceLocator {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    pub fn load(&self, name: &str) -> Result<Option<String>, StoreError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(name);
            if path.is_file() {
                debug!(path = %path.display(), "loading schema resource from override directory");
                return Ok(Some(std::fs::read_to_string(&path)?));
            }
        }
        Ok(EMBEDDED
            .iter()
            .find(|(embedded, _)| *embedded == name)
            .map(|(_, text)| text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptItem {
    Comment(String),
    Statement(String),
    Step(String),
}

/// Splits a schema script into statements. A statement ends with a line
/// whose last character is `;`. Lines starting with `-- ` or `# ` are
/// comments, and `execute step <name>` names a programmatic step.
pub fn parse_script(text: &str) -> Vec<ScriptItem> {
    let mut items = Vec::new();
    let mut buffer = String::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("-- ") || line == "--" || line.starts_with("# ") || line == "#" {
            items.push(ScriptItem::Comment(line.to_string()));
            continue;
        }
        if let Some(name) = step_directive(line) {
            items.push(ScriptItem::Step(name));
            continue;
        }
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(line);
        if buffer.ends_with(';') {
            buffer.pop();
            let statement = buffer.trim().to_string();
            if !statement.is_empty() {
                items.push(ScriptItem::Statement(statement));
            }
            buffer.clear();
        }
    }
    let rest = buffer.trim();
    if !rest.is_empty() {
        items.push(ScriptItem::Statement(rest.to_string()));
    }
    items
}

fn step_directive(line: &str) -> Option<String> {
    const PREFIX: &str = "execute step ";
    let head = line.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let name = line[PREFIX.len()..].trim().trim_end_matches(';').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Programmatic migration step invoked from a script by name.
pub trait UpgradeStep: Send + Sync {
    fn execute(&self, conn: &mut dyn Connection) -> Result<(), StoreError>;
}

impl<F> UpgradeStep for F
where
    F: Fn(&mut dyn Connection) -> Result<(), StoreError> + Send + Sync,
{
    fn execute(&self, conn: &mut dyn Connection) -> Result<(), StoreError> {
        self(conn)
    }
}

#[derive(Clone, Default)]
pub struct UpgradeStepRegistry {
    steps: HashMap<String, Arc<dyn UpgradeStep>>,
}

impl UpgradeStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("normalize_tenant_ids", NormalizeTenantIds);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, step: impl UpgradeStep + 'static) {
        self.steps.insert(name.into(), Arc::new(step));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UpgradeStep>> {
        self.steps.get(name).cloned()
    }
}

/// Replaces NULL tenant ids with the empty tenant on runtime tables.
struct NormalizeTenantIds;

impl UpgradeStep for NormalizeTenantIds {
    fn execute(&self, conn: &mut dyn Connection) -> Result<(), StoreError> {
        for table in ["re_procdef", "ru_execution", "ru_task", "ru_job"] {
            if conn.table_exists(table)? {
                conn.execute_raw(&format!(
                    "UPDATE {table} SET tenant_id = '' WHERE tenant_id IS NULL"
                ))?;
            }
        }
        Ok(())
    }
}
