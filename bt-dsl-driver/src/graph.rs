//! Module graph: discovers every module transitively reachable from a set
//! of entry paths, parses each exactly once, and topologically orders them
//! so a module is always analyzed after every module it imports (spec.md
//! §3 "a module graph collects modules by canonical path; analysis runs
//! per module with access to its direct imports").
//!
//! Grounded on `vex-compiler/src/module_resolver.rs`'s `module_cache`
//! (canonical-path-keyed cache, load-once-then-reuse), generalized to a
//! full dependency graph with a topological pass — the teacher resolves
//! imports lazily and never needs a build order, since Vex has no
//! equivalent to spec.md §4.9's "assumes an acyclic call graph" contract
//! that forces BT-DSL's driver to analyze bottom-up.

use std::collections::{HashMap, HashSet};

use bt_dsl_ast::{AstArena, Decl, Program};
use bt_dsl_diagnostics::{error_codes, ByteRange, Category, Diagnostic, DiagnosticBag};
use bt_dsl_parser::parse_source;

use crate::import_resolve::{self, ResolvedImport};
use crate::loader::{LoadError, SourceLoader};

/// One discovered module: its parsed program plus the canonical ids of
/// the modules it directly imports, in source order (spec.md §4.3
/// resolves against *direct* imports only, in the order written).
pub struct GraphModule<'a> {
    pub file_id: String,
    pub source: String,
    pub program: &'a Program<'a>,
    pub parse_diagnostics: DiagnosticBag,
    pub direct_import_ids: Vec<String>,
}

/// Discovers and parses every module reachable from `entry_paths`, using
/// `arena` for every module's AST (a whole compilation shares one arena —
/// spec.md §5 rules out concurrent analysis of multiple modules within
/// one invocation, so nothing needs the isolation separate arenas would
/// buy). Returns the discovered modules plus the entry file ids, in
/// caller-supplied order.
pub fn discover<'a>(
    entry_paths: &[std::path::PathBuf],
    loader: &dyn SourceLoader,
    arena: &'a AstArena<'a>,
    diags: &mut DiagnosticBag,
) -> (Vec<GraphModule<'a>>, Vec<String>) {
    let mut modules: HashMap<String, GraphModule<'a>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut queue: Vec<String> = Vec::new();
    let mut entry_ids = Vec::new();

    for path in entry_paths {
        match loader.load_entry(path) {
            Ok((file_id, source)) => {
                entry_ids.push(file_id.clone());
                if !modules.contains_key(&file_id) {
                    queue.push(file_id.clone());
                    let module = parse_module(&file_id, source, arena);
                    order.push(file_id.clone());
                    modules.insert(file_id, module);
                }
            }
            Err(err) => emit_load_error(diags, &path.display().to_string(), &err),
        }
    }

    let mut i = 0;
    while i < queue.len() {
        let file_id = queue[i].clone();
        i += 1;
        let raw_targets: Vec<(ResolvedImport, ByteRange)> = {
            let module = &modules[&file_id];
            module
                .program
                .imports
                .iter()
                .filter_map(|d| match d {
                    Decl::Import(im) => Some((
                        import_resolve::resolve(&file_id, &im.target),
                        im.range,
                    )),
                    _ => None,
                })
                .collect()
        };

        for (resolved, range) in raw_targets {
            let child_id = resolved.uri().to_string();
            modules
                .get_mut(&file_id)
                .expect("module just looked up above")
                .direct_import_ids
                .push(child_id.clone());

            if modules.contains_key(&child_id) {
                continue;
            }
            match loader.load(&resolved) {
                Ok((canonical_id, source)) => {
                    let module = parse_module(&canonical_id, source, arena);
                    order.push(canonical_id.clone());
                    modules.insert(canonical_id.clone(), module);
                    queue.push(canonical_id);
                }
                Err(err) => {
                    diags.emit(Diagnostic::error(
                        Category::Import,
                        error_codes::IMPORT_UNRESOLVED,
                        format!("cannot resolve import: {err}"),
                        range,
                    ));
                }
            }
        }
    }

    let sorted = topo_sort(order, &mut modules, diags);
    (sorted, entry_ids)
}

fn parse_module<'a>(file_id: &str, source: String, arena: &'a AstArena<'a>) -> GraphModule<'a> {
    let (program, parse_diagnostics) = parse_source(&source, arena);
    GraphModule {
        file_id: file_id.to_string(),
        source,
        program,
        parse_diagnostics,
        direct_import_ids: Vec::new(),
    }
}

fn emit_load_error(diags: &mut DiagnosticBag, path: &str, err: &LoadError) {
    diags.emit(Diagnostic::error(
        Category::Import,
        error_codes::IMPORT_UNRESOLVED,
        format!("cannot load {path}: {err}"),
        ByteRange::empty_at(0),
    ));
}

/// Kahn's algorithm over the import graph, imports-first. A cycle is
/// reported once per entry into the cycle and the offending modules are
/// dropped from the returned order (their diagnostics already collected;
/// downstream analysis would otherwise see an import whose own analysis
/// never ran).
fn topo_sort<'a>(
    discovery_order: Vec<String>,
    modules: &mut HashMap<String, GraphModule<'a>>,
    diags: &mut DiagnosticBag,
) -> Vec<GraphModule<'a>> {
    // in_degree[id] = number of id's direct imports not yet emitted.
    let mut in_degree: HashMap<String, usize> = discovery_order
        .iter()
        .map(|id| (id.clone(), 0usize))
        .collect();
    for id in &discovery_order {
        let count = modules[id]
            .direct_import_ids
            .iter()
            .filter(|c| in_degree.contains_key(*c))
            .count();
        in_degree.insert(id.clone(), count);
    }

    let mut ready: Vec<String> = discovery_order
        .iter()
        .filter(|id| in_degree[*id] == 0)
        .cloned()
        .collect();
    ready.sort();

    let mut emitted: HashSet<String> = HashSet::new();
    let mut result: Vec<GraphModule<'a>> = Vec::new();
    let mut frontier = ready;

    while let Some(id) = frontier.pop() {
        if !emitted.insert(id.clone()) {
            continue;
        }
        // Decrement in-degree of every module that imports `id`.
        for other in &discovery_order {
            if emitted.contains(other) {
                continue;
            }
            if modules[other].direct_import_ids.contains(&id) {
                let deg = in_degree.get_mut(other).expect("tracked above");
                *deg -= 1;
                if *deg == 0 {
                    frontier.push(other.clone());
                }
            }
        }
        result.push(modules.remove(&id).expect("discovered above"));
    }

    if emitted.len() != discovery_order.len() {
        let stuck: Vec<&str> = discovery_order
            .iter()
            .filter(|id| !emitted.contains(*id))
            .map(|s| s.as_str())
            .collect();
        diags.emit(Diagnostic::error(
            Category::Import,
            error_codes::IMPORT_UNRESOLVED,
            format!("cyclic imports among: {}", stuck.join(" -> ")),
            ByteRange::empty_at(0),
        ));
    }

    result
}
