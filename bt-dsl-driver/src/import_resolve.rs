//! Import URI resolution (spec.md §6). The parser already classifies a
//! raw import string into [`bt_dsl_ast::ImportTarget::Relative`] or
//! [`bt_dsl_ast::ImportTarget::Package`] and rejects absolute paths and
//! missing extensions at parse time (`bt-dsl-parser::items::classify_import`);
//! this module only does the part spec.md §6 assigns to "the driver":
//! turning a classified target plus the importing file's own URI into a
//! canonical URI the module graph can key modules by.
//!
//! Grounded on `vex-compiler/src/module_resolver.rs`'s
//! `module_path_to_file_path` (relative-to-source-file join, stdlib
//! search-path fallback), re-targeted from Vex's `std/mod.vx` convention
//! to spec.md §6's `bt-dsl-pkg://` URI scheme and the relative-path dot
//! normalization spec.md asks for explicitly (the teacher just calls into
//! `std::fs`/`std::path` without normalizing `..`, since Vex never
//! promises a canonical form).

use std::path::{Path, PathBuf};

use bt_dsl_ast::ImportTarget;

/// A resolved import target, ready to hand to a [`crate::loader::SourceLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedImport {
    /// `file://`-style canonical path, already dot-normalized.
    File(String),
    /// `bt-dsl-pkg://<spec>`.
    Package(String),
}

impl ResolvedImport {
    pub fn uri(&self) -> &str {
        match self {
            ResolvedImport::File(p) => p,
            ResolvedImport::Package(p) => p,
        }
    }
}

/// Joins `raw` (a `./`/`../`-relative path) against `importing_file`'s own
/// path and collapses `.`/`..` segments, without touching the filesystem
/// (spec.md §6: "normalizes dot-segments").
pub fn resolve_relative(importing_file: &str, raw: &str) -> String {
    let base = Path::new(importing_file)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    normalize(&base.join(raw))
}

/// Maps a package spec to its `bt-dsl-pkg://` URI (spec.md §6). Lookup in
/// the host's package cache is [`crate::loader::SourceLoader`]'s job, not
/// this function's.
pub fn resolve_package(raw: &str) -> String {
    format!("bt-dsl-pkg://{raw}")
}

/// Resolves a classified [`ImportTarget`] relative to the module that
/// contains it.
pub fn resolve(importing_file: &str, target: &ImportTarget) -> ResolvedImport {
    match target {
        ImportTarget::Relative(raw) => ResolvedImport::File(resolve_relative(importing_file, raw)),
        ImportTarget::Package(raw) => ResolvedImport::Package(resolve_package(raw)),
    }
}

fn normalize(path: &Path) -> String {
    use std::path::Component;
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                match out.last() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    _ => out.push(comp),
                }
            }
            other => out.push(other),
        }
    }
    let mut buf = PathBuf::new();
    for comp in out {
        buf.push(comp.as_os_str());
    }
    buf.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_import_joins_and_normalizes() {
        let resolved = resolve_relative("/proj/src/main.bt", "../lib/util.bt");
        assert_eq!(resolved, "/proj/lib/util.bt");
    }

    #[test]
    fn same_dir_import_strips_dot() {
        let resolved = resolve_relative("/proj/src/main.bt", "./helpers.bt");
        assert_eq!(resolved, "/proj/src/helpers.bt");
    }

    #[test]
    fn package_import_gets_scheme() {
        assert_eq!(resolve_package("robotics/nav"), "bt-dsl-pkg://robotics/nav");
    }
}
