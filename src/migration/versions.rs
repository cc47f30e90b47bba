use crate::error::StoreError;

/// One released schema version and the other spellings it was persisted
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub main: &'static str,
    pub aliases: &'static [&'static str],
}

impl SchemaVersion {
    const fn new(main: &'static str) -> Self {
        Self { main, aliases: &[] }
    }

    const fn with_aliases(main: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { main, aliases }
    }

    pub fn matches(&self, version: &str) -> bool {
        self.main == version || self.aliases.contains(&version)
    }
}

/// Every version the schema has shipped, oldest first. The last entry is the
/// version this library creates and expects.
pub const SCHEMA_VERSIONS: &[SchemaVersion] = &[
    SchemaVersion::new("5.0"),
    SchemaVersion::new("5.1"),
    SchemaVersion::new("5.2"),
    SchemaVersion::new("5.3"),
    SchemaVersion::new("5.4"),
    SchemaVersion::new("5.5"),
    SchemaVersion::new("5.6"),
    SchemaVersion::new("5.7"),
    SchemaVersion::new("5.8"),
    SchemaVersion::new("5.9"),
    SchemaVersion::new("5.10"),
    SchemaVersion::new("5.11"),
    SchemaVersion::with_aliases("5.12", &["5.12T"]),
    SchemaVersion::new("5.12.1"),
    SchemaVersion::new("5.13"),
    SchemaVersion::new("5.14"),
    SchemaVersion::new("5.15"),
    SchemaVersion::new("5.15.1"),
    SchemaVersion::new("5.16"),
    SchemaVersion::new("5.16.1"),
    SchemaVersion::with_aliases("5.16.2", &["5.16.2-SNAPSHOT"]),
    SchemaVersion::new("5.16.3.0"),
    SchemaVersion::new("5.16.4.0"),
    SchemaVersion::new("5.17.0.0"),
    SchemaVersion::new("5.17.0.1"),
    SchemaVersion::new("5.17.0.2"),
    SchemaVersion::new("5.18.0.0"),
    SchemaVersion::new("5.18.0.1"),
    SchemaVersion::new("5.19.0.0"),
    SchemaVersion::new("5.19.0.1"),
    SchemaVersion::new("5.19.0.2"),
    SchemaVersion::new("5.19.0.3"),
    SchemaVersion::new("5.20.0.0"),
    SchemaVersion::new("5.20.0.1"),
    SchemaVersion::new("5.20.0.2"),
    SchemaVersion::new("5.21.0.0"),
    SchemaVersion::new("5.22.0.0"),
    // Catch-all for 5.x builds that never made it into this table.
    SchemaVersion::new("5.99.0.0"),
    SchemaVersion::new("6.0.0.0"),
    SchemaVersion::new("6.0.0.1"),
    SchemaVersion::new("6.0.0.2"),
    SchemaVersion::new("6.0.0.3"),
    SchemaVersion::new("6.0.0.4"),
];

pub const LEGACY_FALLBACK_VERSION: &str = "5.99.0.0";

pub fn current_version() -> &'static str {
    SCHEMA_VERSIONS[SCHEMA_VERSIONS.len() - 1].main
}

pub fn last_index() -> usize {
    SCHEMA_VERSIONS.len() - 1
}

/// Exact or alias match; first match wins.
pub fn find_version_index(version: &str) -> Option<usize> {
    SCHEMA_VERSIONS
        .iter()
        .position(|candidate| candidate.matches(version))
}

/// Like [`find_version_index`], but unknown `5.` versions resolve to the
/// 5.x catch-all.
pub fn resolve_version_index(version: &str) -> Result<usize, StoreError> {
    if let Some(idx) = find_version_index(version) {
        return Ok(idx);
    }
    if version.starts_with("5.") {
        if let Some(idx) = find_version_index(LEGACY_FALLBACK_VERSION) {
            return Ok(idx);
        }
    }
    Err(StoreError::UnresolvableVersion {
        version: version.to_string(),
    })
}

/// Version spelling used in upgrade resource names: `-SNAPSHOT` stripped,
/// dots removed.
pub fn clean_version(version: &str) -> String {
    version.replace("-SNAPSHOT", "").replace('.', "")
}

/// `(from, to)` pairs to apply when upgrading from `from_index` to current.
pub fn upgrade_steps(from_index: usize) -> Vec<(&'static str, &'static str)> {
    SCHEMA_VERSIONS
        .windows(2)
        .skip(from_index)
        .map(|pair| (pair[0].main, pair[1].main))
        .collect()
}
