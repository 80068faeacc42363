//! Optional on-disk project configuration (`bt-dsl.toml`).
//!
//! Grounded on `vex-pm/src/manifest.rs`'s `Manifest::from_file` shape,
//! swapped from `vex.json`/`serde_json` to a `toml` document since BT-DSL
//! has no package registry to mirror Vex's JSON manifest format. This is
//! `bt-dsl-cli`'s convenience only (spec.md §6 leaves project-file loading
//! out of the driver's programmatic API): a missing file is not an error,
//! and any value it supplies is a default the CLI's own flags can override.

use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Search roots for `bt-dsl-pkg://` imports, passed to [`crate::loader::FsLoader`].
    #[serde(default)]
    pub package_paths: Vec<String>,
    /// Default tree names to select as `PerModule` entry points, or as the
    /// `SingleOutput` root when the CLI isn't given `--entry-tree`.
    #[serde(default)]
    pub entry_trees: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads `<dir>/bt-dsl.toml` if present. Returns `Ok(None)` when the file
/// doesn't exist — the caller falls back to its own defaults rather than
/// treating "no project file" as a failure.
pub fn load(dir: &Path) -> Result<Option<ProjectConfig>, ConfigError> {
    let path = dir.join("bt-dsl.toml");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: ProjectConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn parses_package_paths_and_entry_trees() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("bt-dsl.toml")).unwrap();
        f.write_all(
            b"package_paths = [\"./vendor\"]\nentry_trees = [\"Main\"]\n",
        )
        .unwrap();
        let config = load(dir.path()).unwrap().unwrap();
        assert_eq!(config.package_paths, vec!["./vendor".to_string()]);
        assert_eq!(config.entry_trees, vec!["Main".to_string()]);
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("bt-dsl.toml")).unwrap();
        f.write_all(b"bogus = true\n").unwrap();
        assert!(matches!(load(dir.path()), Err(ConfigError::Parse { .. })));
    }
}
