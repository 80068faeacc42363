//! Semantic analysis pipeline (spec.md §4): symbol table construction,
//! name resolution, constant evaluation, and type checking over a parsed
//! `Program`. Each pass lives in its own module and leaves its results on
//! the AST's `Cell` back-pointers; `analyze` just runs them in the order
//! later passes depend on.

pub mod cfg;
pub mod const_eval;
pub mod init_safety;
pub mod null_safety;
pub mod recursion;
pub mod resolver;
pub mod symtab_builder;
pub mod type_checker;
pub mod type_realize;
pub mod xml_gen;

use std::collections::HashMap;

use bt_dsl_ast::{AstArena, Decl, Program, SemanticType, SymbolTable, TreeDecl, TypeContext};
use bt_dsl_diagnostics::{DiagnosticBag, Severity};

pub use resolver::ImportedModule;
pub use symtab_builder::ScopeMap;

/// Result of running every implemented pass over one module. `type_ctx`
/// is returned alongside the table/scope map since callers (the driver,
/// the language-service workspace) need it alive to interpret any
/// `SemanticType` pointer left on the AST. `block_var_types` carries the
/// types the checker inferred for inline `out var` declarations, which
/// have nowhere else to live (spec.md §4.5's "type comes from first use"
/// rule for `InlineBlackboardDecl`); the safety checkers need the same
/// lookup.
pub struct Analysis<'a> {
    pub table: SymbolTable<'a>,
    pub scopes: ScopeMap,
    pub block_var_types: HashMap<usize, &'a SemanticType<'a>>,
}

/// Runs the symbol-table builder, resolver, and type checker over
/// `program`, in that order — each later pass relies on the previous
/// one's back-pointers being populated. Diagnostics from every pass are
/// merged into `diags`.
///
/// `type_ctx` is supplied by the caller rather than built here: a
/// multi-module compilation (`bt-dsl-driver`) must reuse one
/// `TypeContext` across every module in the compilation so that a
/// builtin or constructed type resolved in one module is the same
/// interned pointer an importing module sees for it (spec.md §4.1's
/// interning guarantee is compilation-wide, not per-file). A caller
/// analyzing a single buffer in isolation just constructs its own
/// throwaway context.
pub fn analyze<'a>(
    program: &'a Program<'a>,
    arena: &'a AstArena<'a>,
    type_ctx: &TypeContext<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) -> Analysis<'a> {
    let (table, scopes) = symtab_builder::build(program, arena, diags);
    resolver::resolve(program, &table, &scopes, imports, diags);

    let mut ev = const_eval::Evaluator::new();
    let mut checker = type_checker::Checker::new(type_ctx, arena, &mut ev);
    checker.check_program(program, diags);
    let block_var_types = checker.block_var_types;

    Analysis {
        table,
        scopes,
        block_var_types,
    }
}

/// Runs the CFG-based safety passes over `program` (spec.md §4.7–§4.9):
/// recursion detection, then initialization-safety, then null-safety.
/// Recursion is checked first and gates the rest — a cyclic tree-call
/// graph makes the other two passes' "acyclic call graph" assumption
/// false, so their CFG walks are skipped if it reports any error
/// (spec.md §4.9: "recursion is diagnosed before any other CFG-based
/// check runs on the offending trees").
///
/// `other_modules`/`external_init_summaries` carry the cross-module
/// context a multi-file build has available; a single-file caller (e.g.
/// a language-service "analyze this buffer in isolation" request) passes
/// `&[]`/an empty map and gets the same conservative treatment
/// `init_safety` already applies to unknown callees.
///
/// `entry_tree_name`, when it names a tree actually declared in
/// `program`, is the tree the driver intends to run first (spec.md §9:
/// "verify the entry-tree with concrete global initializers" — unlike a
/// subtree reached only through calls, nothing could have set the entry
/// tree's globals before it runs, so its uninitialized globals start
/// `Uninit` rather than `Unknown`). Passing `None` (a library module with
/// no tree the driver runs directly, or a language-service buffer check)
/// treats every tree in `program` the conservative way, as if it were
/// only ever reached as a subtree.
pub fn check_safety<'a>(
    program: &'a Program<'a>,
    file_id: &str,
    entry_tree_name: Option<&str>,
    other_modules: &[recursion::RecursionModule<'a>],
    external_init_summaries: &HashMap<usize, init_safety::TreeSummary<'a>>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) -> HashMap<usize, init_safety::TreeSummary<'a>> {
    let entry_module = recursion::RecursionModule {
        file_id: file_id.to_string(),
        program,
    };
    let before = diags.diagnostics().len();
    recursion::check(&entry_module, other_modules, diags);
    if diags.diagnostics()[before..]
        .iter()
        .any(|d| d.severity == Severity::Error)
    {
        return external_init_summaries.clone();
    }

    let entry_tree: Option<&'a TreeDecl<'a>> = entry_tree_name.and_then(|name| {
        program.items.iter().find_map(|d| match d {
            Decl::Tree(t) if t.name == name => Some(*t),
            _ => None,
        })
    });
    let summaries = init_safety::check(program, entry_tree, external_init_summaries, diags);
    null_safety::check(program, block_var_types, diags);
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_parser::parse_source;

    #[test]
    fn analyze_runs_every_pass_without_panicking() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let (program, mut diags) = parse_source(
            "extern node Log(in msg: string);\n\
             tree Main(in count: int32) {\n\
               var total: int64 = 0;\n\
               Log(msg: \"starting\");\n\
             }",
            &arena,
        );
        let analysis = analyze(program, &arena, &type_ctx, &[], &mut diags);
        assert!(!diags.has_errors());
        let tree = program
            .items
            .iter()
            .find_map(|d| match d {
                bt_dsl_ast::Decl::Tree(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert!(analysis.scopes.tree_body_scope(tree).is_some());
    }

    #[test]
    fn check_safety_flags_unguarded_nullable_ref_arg() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let (program, mut diags) = parse_source(
            "extern action Use(ref x: int32);\n\
             tree Main(ref v: int32?) { Use(x: ref v); }",
            &arena,
        );
        let analysis = analyze(program, &arena, &type_ctx, &[], &mut diags);
        check_safety(
            program,
            "main.bt",
            Some("Main"),
            &[],
            &HashMap::new(),
            &analysis.block_var_types,
            &mut diags,
        );
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == bt_dsl_diagnostics::error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }
}
