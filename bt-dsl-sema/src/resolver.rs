//! Name resolver (spec.md §4.3): walks every identifier reference
//! (var-refs, node calls, type names) and sets its `resolved_*` cell,
//! searching the scope chain built by `symtab_builder`, then direct
//! imports' public declarations. Reports exactly one diagnostic per
//! unresolvable reference and keeps going (spec.md §7's "continue past
//! local errors" contract) rather than aborting the module.

use bt_dsl_ast::{
    AssignmentStmt, Decl, Expr, Namespace, NodeCallStmt, Program, ScopeId, Stmt, Symbol,
    SymbolTable, TreeDecl, TypeNode, VarRefExpr,
};
use bt_dsl_diagnostics::{error_codes, fuzzy, ByteRange, Category, Diagnostic, DiagnosticBag};

use crate::symtab_builder::{declared_before, ScopeMap};

/// One directly-imported module's table, searched for its public (non
/// `_`-prefixed) root-scope declarations (spec.md §4.3 item 2).
pub struct ImportedModule<'a> {
    pub file_id: String,
    pub table: &'a SymbolTable<'a>,
}

impl<'a> ImportedModule<'a> {
    fn lookup_public(&self, ns: Namespace, name: &str) -> Option<&'a Symbol<'a>> {
        let sym = self.table.lookup_local(self.table.root(), ns, name)?;
        if sym.is_private() {
            None
        } else {
            Some(sym)
        }
    }
}

pub fn resolve<'a>(
    program: &'a Program<'a>,
    table: &SymbolTable<'a>,
    scopes: &ScopeMap,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    let root = table.root();

    for decl in &program.items {
        match decl {
            Decl::GlobalVar(d) => {
                if let Some(tn) = d.type_ann {
                    resolve_type_node(tn, root, table, imports, diags);
                }
                if let Some(init) = d.init {
                    resolve_expr(init, root, table, imports, diags);
                }
            }
            Decl::GlobalConst(d) => {
                if let Some(tn) = d.type_ann {
                    resolve_type_node(tn, root, table, imports, diags);
                }
                resolve_expr(d.init, root, table, imports, diags);
            }
            Decl::TypeAlias(d) => resolve_type_node(d.aliased, root, table, imports, diags),
            Decl::ExternNode(d) => {
                for port in &d.ports {
                    resolve_type_node(port.type_ann, root, table, imports, diags);
                    if let Some(def) = port.default {
                        resolve_expr(def, root, table, imports, diags);
                    }
                }
            }
            Decl::ExternType(_) | Decl::Import(_) => {}
            Decl::Tree(tree) => resolve_tree(tree, root, table, scopes, imports, diags),
        }
    }
}

fn resolve_tree<'a>(
    tree: &'a TreeDecl<'a>,
    root: ScopeId,
    table: &SymbolTable<'a>,
    scopes: &ScopeMap,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    let params_scope = scopes.tree_params_scope(tree).unwrap_or(root);
    for p in &tree.params {
        resolve_type_node(p.type_ann, root, table, imports, diags);
        if let Some(def) = p.default {
            resolve_expr(def, params_scope, table, imports, diags);
        }
    }
    let body_scope = scopes.tree_body_scope(tree).unwrap_or(root);
    resolve_stmt_list(&tree.body, body_scope, table, scopes, imports, diags);
}

fn resolve_stmt_list<'a>(
    stmts: &[&'a Stmt<'a>],
    scope: ScopeId,
    table: &SymbolTable<'a>,
    scopes: &ScopeMap,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    for stmt in stmts {
        match stmt {
            Stmt::BlackboardVarDecl(d) => {
                if let Some(tn) = d.type_ann {
                    resolve_type_node(tn, scope, table, imports, diags);
                }
                if let Some(init) = d.init {
                    resolve_expr(init, scope, table, imports, diags);
                }
            }
            Stmt::LocalConstDecl(d) => {
                if let Some(tn) = d.type_ann {
                    resolve_type_node(tn, scope, table, imports, diags);
                }
                resolve_expr(d.init, scope, table, imports, diags);
            }
            Stmt::Assignment(a) => resolve_assignment(a, scope, table, imports, diags),
            Stmt::NodeCall(call) => resolve_node_call(call, scope, table, scopes, imports, diags),
        }
    }
}

fn resolve_assignment<'a>(
    a: &'a AssignmentStmt<'a>,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    resolve_expr(a.target, scope, table, imports, diags);
    resolve_expr(a.value, scope, table, imports, diags);
}

fn resolve_node_call<'a>(
    call: &'a NodeCallStmt<'a>,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    scopes: &ScopeMap,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    let root = table.root();
    let sym = lookup(root, Namespace::Node, &call.name, table, imports, diags, call.range);
    match sym {
        Some(s) => call.resolved_node.set(Some(s)),
        None => report_unknown(Namespace::Node, &call.name, call.range, root, table, diags),
    }

    for precondition in &call.preconditions {
        resolve_expr(precondition.expr, scope, table, imports, diags);
    }
    for arg in &call.args {
        if let Some(v) = arg.value {
            resolve_expr(v, scope, table, imports, diags);
        }
        // `out var x` introduces a new block-scope symbol rather than
        // referencing an existing one; the builder already bound it, so
        // there is nothing to resolve here, only to record the binding
        // for later passes (the symbol itself is looked up by the type
        // checker through the statement list, not through this cell).
        if let Some(inline) = arg.inline_decl {
            if let Some(sym) = table.lookup_local(scope, Namespace::Value, &inline.name) {
                inline.resolved_symbol.set(Some(sym));
            }
        }
    }

    if let Some(children) = &call.children {
        let child_scope = scopes.children_scope(call).unwrap_or(scope);
        resolve_stmt_list(children, child_scope, table, scopes, imports, diags);
    }
}

fn resolve_type_node<'a>(
    tn: &'a TypeNode<'a>,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    match tn {
        TypeNode::Primary(p) => {
            if let Some(size) = p.size {
                resolve_expr(size, scope, table, imports, diags);
                return;
            }
            if is_builtin_type_name(&p.name) {
                return;
            }
            let root = table.root();
            match lookup(root, Namespace::Type, &p.name, table, imports, diags, p.range) {
                Some(sym) => p.resolved_symbol.set(Some(sym)),
                None => report_unknown(Namespace::Type, &p.name, p.range, root, table, diags),
            }
        }
        TypeNode::StaticArray(a) => {
            resolve_type_node(a.elem, scope, table, imports, diags);
            resolve_expr(a.size, scope, table, imports, diags);
        }
        TypeNode::DynamicArray(a) => resolve_type_node(a.elem, scope, table, imports, diags),
        TypeNode::Infer(_) => {}
        TypeNode::Wrapper(w) => resolve_type_node(w.base, scope, table, imports, diags),
    }
}

/// Mirrors `TypeContext::lookup_builtin`'s name set; kept separate since
/// the resolver only needs to know *whether* a name is builtin, not the
/// interned type itself (that's realized later, lazily, by the type
/// checker).
fn is_builtin_type_name(name: &str) -> bool {
    matches!(
        name,
        "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64"
            | "float32" | "float64" | "bool" | "string"
    )
}

fn resolve_expr<'a>(
    expr: &'a Expr<'a>,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    match expr {
        Expr::VarRef(v) => resolve_var_ref(v, scope, table, imports, diags),
        Expr::Binary(e) => {
            resolve_expr(e.lhs, scope, table, imports, diags);
            resolve_expr(e.rhs, scope, table, imports, diags);
        }
        Expr::Unary(e) => resolve_expr(e.operand, scope, table, imports, diags),
        Expr::Cast(e) => {
            resolve_expr(e.operand, scope, table, imports, diags);
            resolve_type_node(e.target, scope, table, imports, diags);
        }
        Expr::Index(e) => {
            resolve_expr(e.base, scope, table, imports, diags);
            resolve_expr(e.index, scope, table, imports, diags);
        }
        Expr::ArrayLit(e) => {
            for el in &e.elements {
                resolve_expr(el, scope, table, imports, diags);
            }
        }
        Expr::ArrayRepeat(e) => {
            resolve_expr(e.value, scope, table, imports, diags);
            resolve_expr(e.count, scope, table, imports, diags);
        }
        Expr::VecMacro(e) => {
            for el in &e.elements {
                resolve_expr(el, scope, table, imports, diags);
            }
        }
        Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit(_) => {}
    }
}

fn resolve_var_ref<'a>(
    v: &'a VarRefExpr<'a>,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
) {
    match lookup(scope, Namespace::Value, &v.name, table, imports, diags, v.range) {
        Some(sym) => {
            if matches!(sym, Symbol::LocalVariable(_) | Symbol::BlockVariable(_))
                && !declared_before(sym.range(), v.range)
            {
                diags.emit(
                    Diagnostic::error(
                        Category::Resolution,
                        error_codes::RESOLUTION_FORWARD_REF,
                        format!("'{}' is used before its declaration", v.name),
                        v.range,
                    )
                    .with_secondary(sym.range(), "declared here"),
                );
            }
            v.resolved_symbol.set(Some(sym));
        }
        None => report_unknown(Namespace::Value, &v.name, v.range, scope, table, diags),
    }
}

/// Scope-chain lookup, falling back to direct imports' public
/// declarations (spec.md §4.3 item 2) when nothing local matches.
fn lookup<'a>(
    scope: ScopeId,
    ns: Namespace,
    name: &str,
    table: &SymbolTable<'a>,
    imports: &[ImportedModule<'a>],
    diags: &mut DiagnosticBag,
    use_range: ByteRange,
) -> Option<&'a Symbol<'a>> {
    if let Some(sym) = table.lookup_chain(scope, ns, name) {
        return Some(sym);
    }
    let mut matches: Vec<&'a Symbol<'a>> = Vec::new();
    for imp in imports {
        if let Some(sym) = imp.lookup_public(ns, name) {
            matches.push(sym);
        }
    }
    match matches.len() {
        0 => None,
        1 => Some(matches[0]),
        _ => {
            diags.emit(Diagnostic::error(
                Category::Resolution,
                error_codes::RESOLUTION_AMBIGUOUS,
                format!("'{name}' is defined by more than one imported module"),
                use_range,
            ));
            None
        }
    }
}

fn report_unknown<'a>(
    ns: Namespace,
    name: &str,
    range: ByteRange,
    scope: ScopeId,
    table: &SymbolTable<'a>,
    diags: &mut DiagnosticBag,
) {
    let candidates = table.names_in_scope(scope, ns);
    let suggestions = fuzzy::find_similar_names(name, &candidates, 1);
    let mut diag = Diagnostic::error(
        Category::Resolution,
        error_codes::RESOLUTION_UNKNOWN_NAME,
        format!("cannot find '{name}' in this scope"),
        range,
    );
    if let Some(best) = suggestions.first() {
        diag = diag.with_help(format!("did you mean '{best}'?"));
    }
    diags.emit(diag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    #[test]
    fn unknown_name_reports_with_suggestion() {
        let arena = AstArena::new();
        let (program, mut diags) =
            parse_source("var speed: int32; tree Main() { var x: int32 = spee; }", &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        resolve(program, &table, &scopes, &[], &mut diags);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::RESOLUTION_UNKNOWN_NAME));
    }

    #[test]
    fn forward_reference_to_local_var_is_an_error() {
        let arena = AstArena::new();
        let (program, mut diags) =
            parse_source("tree Main() { var y: int32 = x; var x: int32 = 1; }", &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        resolve(program, &table, &scopes, &[], &mut diags);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::RESOLUTION_FORWARD_REF));
    }

    #[test]
    fn global_const_forward_reference_is_allowed() {
        let arena = AstArena::new();
        let (program, mut diags) = parse_source(
            "tree Main() { var x: int32 = LIMIT; } const LIMIT: int32 = 10;",
            &arena,
        );
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        resolve(program, &table, &scopes, &[], &mut diags);
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::RESOLUTION_FORWARD_REF
                || d.code == error_codes::RESOLUTION_UNKNOWN_NAME));
    }
}
