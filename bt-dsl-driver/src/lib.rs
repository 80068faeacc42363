//! Compiler driver (spec.md §6): loads a set of entry source paths,
//! discovers and analyzes every module they transitively import, checks
//! the recursion/init-safety/null-safety invariants across the whole
//! module graph, and lowers to one or more BT.CPP XML artifacts.
//!
//! This crate is the one place spec.md's middle-end (`bt-dsl-sema`) meets
//! the outside world: it owns the single `AstArena`/`TypeContext` a
//! compilation shares (spec.md §5: "single-threaded per compilation"; no
//! concurrent analysis of multiple modules), orders modules so a module
//! is always analyzed after its imports, and threads import visibility
//! and initialization summaries between them.
//!
//! Grounded on `vex-compiler/src/module_resolver.rs` for the
//! cache-by-canonical-path shape (generalized into [`graph::discover`])
//! and `vex-cli/src/main.rs` for the "driver options select build mode,
//! report diagnostics, emit artifacts" shape `compile` mirrors.

pub mod config;
pub mod graph;
pub mod import_resolve;
pub mod loader;

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use bt_dsl_ast::{AstArena, Decl, TreeDecl, TypeContext};
use bt_dsl_diagnostics::DiagnosticBag;
use bt_dsl_sema::{init_safety, recursion, xml_gen, Analysis, ImportedModule};

use crate::graph::GraphModule;
use crate::loader::SourceLoader;

/// Selects between spec.md §4.10's two XML generation modes.
#[derive(Debug, Clone)]
pub enum OutputMode {
    /// One `<BehaviorTree>` per tree declared in each module, emitted
    /// once per module.
    PerModule,
    /// A single document rooted at `entry_tree`, with subtree calls to
    /// other modules mangled into `_SubTree_<moduleIx>_<name>` ids.
    SingleOutput { entry_tree: String },
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub mode: OutputMode,
    pub package_paths: Vec<PathBuf>,
    /// Project-level default tree names (from `bt-dsl.toml` or the CLI),
    /// consulted when a `PerModule` entry module declares more than one
    /// tree and the first-declared default isn't the one wanted.
    pub entry_trees: Vec<String>,
}

/// One emitted XML document, named after the tree (single-output mode)
/// or the module it came from (per-module mode).
pub struct Artifact {
    pub name: String,
    pub xml: String,
}

pub struct CompileResult {
    pub artifacts: Vec<Artifact>,
    /// Diagnostics per module, in discovery order, keyed by file id —
    /// parse diagnostics first, then whatever semantic passes added.
    pub diagnostics: Vec<(String, DiagnosticBag)>,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|(_, bag)| bag.has_errors())
    }
}

/// Compiles `entry_paths` end to end. Every module transitively imported
/// from them is discovered, analyzed in import order, and safety-checked
/// across the whole graph before any XML is emitted — spec.md §4.9's
/// recursion check and §4.7's subtree summaries both need the full graph,
/// not just the entry module.
pub fn compile(
    entry_paths: &[PathBuf],
    loader: &dyn SourceLoader,
    options: &CompileOptions,
) -> CompileResult {
    debug!("compile: discovering module graph from {} entry path(s)", entry_paths.len());
    let arena = AstArena::new();
    let type_arena = typed_arena::Arena::new();
    let type_ctx = TypeContext::new(&type_arena);

    let mut graph_diags = DiagnosticBag::new();
    let (modules, entry_ids) = graph::discover(entry_paths, loader, &arena, &mut graph_diags);
    debug!("compile: discovered {} module(s)", modules.len());

    // Index by file id up front so later modules can look up any earlier
    // one's `GraphModule` by import id while iterating `modules` by value.
    let index_of: HashMap<String, usize> =
        modules.iter().enumerate().map(|(i, m)| (m.file_id.clone(), i)).collect();

    // Each module's `Analysis` is leaked rather than kept behind a `Vec`
    // indirection: a later module's `ImportedModule` needs a reference
    // that outlives the whole compilation (it is tied to the same `'a`
    // as the arena), but this loop also keeps writing new entries into
    // `analyses` for modules processed after it. Leaking sidesteps the
    // aliasing that would otherwise require — the allocation dies with
    // the process either way, same as every other arena in this crate.
    let mut analyses: Vec<Option<&Analysis<'_>>> = vec![None; modules.len()];
    let mut per_module_diags: Vec<DiagnosticBag> = Vec::with_capacity(modules.len());
    let mut init_summaries: HashMap<usize, init_safety::TreeSummary<'_>> = HashMap::new();

    for (i, module) in modules.iter().enumerate() {
        debug!("compile: analyzing module {} ({})", i, module.file_id);
        let mut diags = module.parse_diagnostics.clone();
        if i == 0 {
            diags.extend(graph_diags.clone());
        }

        let imported: Vec<ImportedModule<'_>> = module
            .direct_import_ids
            .iter()
            .filter_map(|id| index_of.get(id).copied())
            .filter_map(|j| {
                let a = analyses.get(j).copied().flatten()?;
                Some(ImportedModule {
                    file_id: modules[j].file_id.clone(),
                    table: &a.table,
                })
            })
            .collect();

        let analysis = bt_dsl_sema::analyze(module.program, &arena, &type_ctx, &imported, &mut diags);

        let other_modules: Vec<recursion::RecursionModule<'_>> = modules
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, m)| recursion::RecursionModule {
                file_id: m.file_id.clone(),
                program: m.program,
            })
            .collect();

        let entry_tree_name =
            entry_tree_name_for(&options.mode, &options.entry_trees, &entry_ids, module, entry_paths);
        let summaries = bt_dsl_sema::check_safety(
            module.program,
            &module.file_id,
            entry_tree_name.as_deref(),
            &other_modules,
            &init_summaries,
            &analysis.block_var_types,
            &mut diags,
        );
        for (k, v) in summaries {
            init_summaries.insert(k, v);
        }

        per_module_diags.push(diags);
        analyses[i] = Some(&*Box::leak(Box::new(analysis)));
    }

    debug!("compile: emitting XML artifacts ({:?})", match &options.mode {
        OutputMode::PerModule => "per-module",
        OutputMode::SingleOutput { .. } => "single-output",
    });
    let artifacts = match &options.mode {
        OutputMode::PerModule => modules
            .iter()
            .map(|m| Artifact {
                name: m.file_id.clone(),
                xml: xml_gen::generate_per_module(m.program),
            })
            .collect(),
        OutputMode::SingleOutput { entry_tree } => {
            generate_single_output(&modules, entry_tree, &mut per_module_diags)
        }
    };

    let mut diagnostics: Vec<(String, DiagnosticBag)> = modules
        .into_iter()
        .zip(per_module_diags)
        .map(|(m, d)| (m.file_id, d))
        .collect();
    if diagnostics.is_empty() && graph_diags.has_errors() {
        diagnostics.push(("<driver>".to_string(), graph_diags));
    }

    CompileResult { artifacts, diagnostics }
}

fn entry_tree_name_for(
    mode: &OutputMode,
    entry_trees: &[String],
    entry_ids: &[String],
    module: &GraphModule<'_>,
    entry_paths: &[PathBuf],
) -> Option<String> {
    let is_entry_module = entry_ids.contains(&module.file_id)
        || entry_paths
            .iter()
            .any(|p| p.display().to_string() == module.file_id);
    if !is_entry_module {
        return None;
    }
    match mode {
        OutputMode::SingleOutput { entry_tree } => Some(entry_tree.clone()),
        OutputMode::PerModule => {
            let declared: Vec<&str> = module
                .program
                .items
                .iter()
                .filter_map(|d| match d {
                    Decl::Tree(t) => Some(t.name.as_str()),
                    _ => None,
                })
                .collect();
            // Prefer a configured entry tree the module actually declares,
            // falling back to the first declared tree as before.
            entry_trees
                .iter()
                .map(String::as_str)
                .find(|name| declared.contains(name))
                .or_else(|| declared.first().copied())
                .map(str::to_string)
        }
    }
}

fn generate_single_output(
    modules: &[GraphModule<'_>],
    entry_tree_name: &str,
    per_module_diags: &mut [DiagnosticBag],
) -> Vec<Artifact> {
    let mut tree_module_index: HashMap<usize, usize> = HashMap::new();
    let mut entry_tree: Option<&TreeDecl<'_>> = None;

    for (mi, module) in modules.iter().enumerate() {
        for decl in &module.program.items {
            if let Decl::Tree(t) = decl {
                tree_module_index.insert(*t as *const TreeDecl<'_> as usize, mi);
                if t.name == entry_tree_name && entry_tree.is_none() {
                    entry_tree = Some(t);
                }
            }
        }
    }

    let Some(entry_tree) = entry_tree else {
        if let Some(first) = per_module_diags.first_mut() {
            first.emit(bt_dsl_diagnostics::Diagnostic::error(
                bt_dsl_diagnostics::Category::Import,
                bt_dsl_diagnostics::error_codes::IMPORT_UNRESOLVED,
                format!("no tree named '{entry_tree_name}' found in the compiled module graph"),
                bt_dsl_diagnostics::ByteRange::empty_at(0),
            ));
        }
        return Vec::new();
    };

    vec![Artifact {
        name: entry_tree_name.to_string(),
        xml: xml_gen::generate_single_output(entry_tree, &tree_module_index),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FsLoader;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn per_module_single_file_compiles() {
        let dir = tempfile::tempdir().unwrap();
        let main = write_temp(
            &dir,
            "main.bt",
            "extern control Sequence();\ntree Main() { Sequence {} }\n",
        );
        let loader = FsLoader::new(vec![]);
        let options = CompileOptions {
            mode: OutputMode::PerModule,
            package_paths: vec![],
            entry_trees: vec![],
        };
        let result = compile(&[main], &loader, &options);
        assert!(!result.has_errors(), "{:?}", result.diagnostics[0].1.diagnostics());
        assert_eq!(result.artifacts.len(), 1);
        assert!(result.artifacts[0].xml.contains("BehaviorTree ID=\"Main\""));
        assert!(result.artifacts[0].xml.contains("main_tree_to_execute=\"Main\""));
    }

    #[test]
    fn cross_module_import_resolves_public_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_temp(
            &dir,
            "lib.bt",
            "extern action Log(in msg: string);\ntree Helper() { Log(msg: \"hi\"); }\n",
        );
        let main = write_temp(
            &dir,
            "main.bt",
            "import \"./lib.bt\";\ntree Main() { Helper(); }\n",
        );
        let loader = FsLoader::new(vec![]);
        let options = CompileOptions {
            mode: OutputMode::PerModule,
            package_paths: vec![],
            entry_trees: vec![],
        };
        let result = compile(&[main], &loader, &options);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.artifacts.len(), 2);
    }

    #[test]
    fn single_output_mangles_imported_subtree_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_temp(
            &dir,
            "lib.bt",
            "extern action Log(in msg: string);\ntree Helper() { Log(msg: \"hi\"); }\n",
        );
        let main = write_temp(
            &dir,
            "main.bt",
            "import \"./lib.bt\";\ntree Main() { Helper(); }\n",
        );
        let loader = FsLoader::new(vec![]);
        let options = CompileOptions {
            mode: OutputMode::SingleOutput {
                entry_tree: "Main".to_string(),
            },
            package_paths: vec![],
            entry_trees: vec![],
        };
        let result = compile(&[main], &loader, &options);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.artifacts.len(), 1);
        assert!(result.artifacts[0].xml.contains("_SubTree_"));
    }
}
