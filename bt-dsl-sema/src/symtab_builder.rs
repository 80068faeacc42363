//! Symbol-table builder (spec.md §4.2): a single AST walk that populates
//! `bt_dsl_ast::SymbolTable` and records, for every tree and every node
//! call with a children block, the `ScopeId` its body/children were
//! opened in. The resolver (`resolver.rs`) replays those scope ids
//! instead of re-deriving them, so the two passes can't drift apart.
//!
//! Grounded on `vex-compiler`'s one-file-per-pass layout and the
//! `symbol_table_builder.hpp` contract in `original_source` (register
//! globals/types/nodes first, then open one scope per tree, one nested
//! scope per children block).

use std::collections::HashMap;

use bt_dsl_ast::{
    AstArena, BlackboardVarDeclStmt, Decl, LocalConstDeclStmt, NodeCallStmt, Program, ScopeId,
    ScopeKind, Stmt, Symbol, SymbolTable, TreeDecl,
};
use bt_dsl_diagnostics::{error_codes, ByteRange, Category, Diagnostic, DiagnosticBag};

/// Maps AST node identity (its arena address) to the `ScopeId` opened for
/// it, so later passes can resume walking in the right scope without
/// re-running the builder's scope-opening logic.
#[derive(Debug, Default)]
pub struct ScopeMap {
    body: HashMap<usize, ScopeId>,
    params: HashMap<usize, ScopeId>,
    children: HashMap<usize, ScopeId>,
}

fn node_key<T>(node: &T) -> usize {
    node as *const T as usize
}

impl ScopeMap {
    pub fn tree_body_scope(&self, tree: &TreeDecl<'_>) -> Option<ScopeId> {
        self.body.get(&node_key(tree)).copied()
    }

    pub fn tree_params_scope(&self, tree: &TreeDecl<'_>) -> Option<ScopeId> {
        self.params.get(&node_key(tree)).copied()
    }

    pub fn children_scope(&self, call: &NodeCallStmt<'_>) -> Option<ScopeId> {
        self.children.get(&node_key(call)).copied()
    }
}

/// Runs the builder over `program`, returning the populated table and the
/// scope map the resolver needs.
pub fn build<'a>(
    program: &'a Program<'a>,
    arena: &'a AstArena<'a>,
    diags: &mut DiagnosticBag,
) -> (SymbolTable<'a>, ScopeMap) {
    let mut table = SymbolTable::new();
    let mut scopes = ScopeMap::default();
    let root = table.root();

    // Pass 1: globals, then extern types/aliases, then extern nodes/trees
    // (spec.md §4.2 item 1's registration order).
    for decl in &program.items {
        if let Decl::GlobalVar(d) = decl {
            declare(&mut table, root, arena.alloc_symbol(Symbol::GlobalVariable(d)), diags);
        }
    }
    for decl in &program.items {
        if let Decl::GlobalConst(d) = decl {
            declare(&mut table, root, arena.alloc_symbol(Symbol::GlobalConst(d)), diags);
        }
    }
    for decl in &program.items {
        match decl {
            Decl::ExternType(d) => {
                declare(&mut table, root, arena.alloc_symbol(Symbol::ExternType(d)), diags);
            }
            Decl::TypeAlias(d) => {
                declare(&mut table, root, arena.alloc_symbol(Symbol::Alias(d)), diags);
            }
            _ => {}
        }
    }
    for decl in &program.items {
        match decl {
            Decl::ExternNode(d) => {
                declare(&mut table, root, arena.alloc_symbol(Symbol::ExternNode(d)), diags);
            }
            Decl::Tree(d) => {
                declare(&mut table, root, arena.alloc_symbol(Symbol::Tree(d)), diags);
            }
            _ => {}
        }
    }

    // Pass 2: open each tree's parameter scope and body/children scopes.
    for decl in &program.items {
        if let Decl::Tree(tree) = decl {
            build_tree(tree, arena, &mut table, &mut scopes, diags);
        }
    }

    (table, scopes)
}

fn build_tree<'a>(
    tree: &'a TreeDecl<'a>,
    arena: &'a AstArena<'a>,
    table: &mut SymbolTable<'a>,
    scopes: &mut ScopeMap,
    diags: &mut DiagnosticBag,
) {
    let root = table.root();
    let params_scope = table.open_scope(root, ScopeKind::TreeParams);
    for p in &tree.params {
        declare(table, params_scope, arena.alloc_symbol(Symbol::Parameter(p)), diags);
    }
    scopes.params.insert(node_key(tree), params_scope);
    let body_scope = table.open_scope(params_scope, ScopeKind::Block);
    scopes.body.insert(node_key(tree), body_scope);
    build_stmt_list(&tree.body, arena, table, scopes, body_scope, diags);
}

fn build_stmt_list<'a>(
    stmts: &[&'a Stmt<'a>],
    arena: &'a AstArena<'a>,
    table: &mut SymbolTable<'a>,
    scopes: &mut ScopeMap,
    scope: ScopeId,
    diags: &mut DiagnosticBag,
) {
    for stmt in stmts {
        match stmt {
            Stmt::BlackboardVarDecl(d) => declare_local_var(table, scope, arena, d, diags),
            Stmt::LocalConstDecl(d) => declare_local_const(table, scope, arena, d, diags),
            Stmt::Assignment(_) => {}
            Stmt::NodeCall(call) => {
                for arg in &call.args {
                    if let Some(inline) = arg.inline_decl {
                        declare(
                            table,
                            scope,
                            arena.alloc_symbol(Symbol::BlockVariable(inline)),
                            diags,
                        );
                    }
                }
                if let Some(children) = &call.children {
                    let child_scope = table.open_scope(scope, ScopeKind::Block);
                    scopes.children.insert(node_key(call), child_scope);
                    build_stmt_list(children, arena, table, scopes, child_scope, diags);
                }
            }
        }
    }
}

fn declare_local_var<'a>(
    table: &mut SymbolTable<'a>,
    scope: ScopeId,
    arena: &'a AstArena<'a>,
    d: &'a BlackboardVarDeclStmt<'a>,
    diags: &mut DiagnosticBag,
) {
    declare(table, scope, arena.alloc_symbol(Symbol::LocalVariable(d)), diags);
}

fn declare_local_const<'a>(
    table: &mut SymbolTable<'a>,
    scope: ScopeId,
    arena: &'a AstArena<'a>,
    d: &'a LocalConstDeclStmt<'a>,
    diags: &mut DiagnosticBag,
) {
    declare(table, scope, arena.alloc_symbol(Symbol::LocalConst(d)), diags);
}

/// Inserts `symbol` into `scope`, reporting a redefinition error if the
/// name is already bound in the same scope, or a shadowing warning if it
/// hides a non-global outer declaration (spec.md §4.2 item 3).
fn declare<'a>(
    table: &mut SymbolTable<'a>,
    scope: ScopeId,
    symbol: &'a Symbol<'a>,
    diags: &mut DiagnosticBag,
) {
    let name = symbol.name();
    if name.is_empty() {
        // Parser already reported a missing-identifier error.
        return;
    }
    let ns = symbol.namespace();
    if let Some(prev) = table.lookup_local(scope, ns, name) {
        diags.emit(
            Diagnostic::error(
                Category::Resolution,
                error_codes::RESOLUTION_REDEFINITION,
                format!("'{name}' is already defined in this scope"),
                symbol.range(),
            )
            .with_secondary(prev.range(), "previous declaration here"),
        );
        return;
    }
    if scope != table.root() {
        for ancestor in table.non_global_ancestors(scope) {
            if let Some(shadowed) = table.lookup_local(ancestor, ns, name) {
                diags.emit(
                    Diagnostic::warning(
                        Category::Resolution,
                        error_codes::RESOLUTION_SHADOWING,
                        format!("'{name}' shadows an outer declaration"),
                        symbol.range(),
                    )
                    .with_secondary(shadowed.range(), "outer declaration here"),
                );
                break;
            }
        }
    }
    table.insert(scope, ns, name.to_string(), symbol);
}

/// A declaration byte range that precedes a use-site range (same file),
/// used by the resolver's before-declaration check.
pub fn declared_before(decl_range: ByteRange, use_range: ByteRange) -> bool {
    decl_range.start <= use_range.start
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    #[test]
    fn duplicate_global_reports_redefinition() {
        let arena = AstArena::new();
        let (program, mut diags) = parse_source("var x: int32; var x: int32;", &arena);
        let (_table, _scopes) = build(program, &arena, &mut diags);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::RESOLUTION_REDEFINITION));
    }

    #[test]
    fn shadowing_a_param_warns() {
        let arena = AstArena::new();
        let (program, mut diags) =
            parse_source("tree Main(in x: int32) { var x: int32 = 1; }", &arena);
        let (_table, _scopes) = build(program, &arena, &mut diags);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::RESOLUTION_SHADOWING));
    }
}
