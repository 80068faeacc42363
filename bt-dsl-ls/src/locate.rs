//! AST lookup helpers shared by every `*_json` method: finding the node
//! under a byte offset, picking the scope a position sits in, and walking
//! every reference to a resolved symbol for highlights.
//!
//! Grounded on `vex-lsp`'s per-feature-file layout (one module per LSP
//! method querying a shared document), generalized from the teacher's
//! line/column text scanning to direct `ByteRange` containment checks —
//! spec.md §6 positions are UTF-8 byte offsets, so there is no line/column
//! math to do until a result crosses back out as JSON.

use bt_dsl_ast::{
    Decl, Expr, NodeCallStmt, ParameterDecl, PrimaryTypeNode, Program, ScopeId, Stmt, Symbol,
    SymbolTable, TreeDecl, TypeNode,
};
use bt_dsl_diagnostics::ByteRange;
use bt_dsl_sema::ScopeMap;

/// What `find_at` landed on. Ranges for declaration-shaped hits are the
/// whole declaration's range (the AST has no separate name-only span);
/// callers that need a tighter range fall back to that.
pub enum Hit<'a> {
    VarRef(&'a bt_dsl_ast::VarRefExpr<'a>),
    NodeCall(&'a NodeCallStmt<'a>),
    TypeRef(&'a PrimaryTypeNode<'a>),
    Param(&'a ParameterDecl<'a>),
    Decl(&'a Decl<'a>),
}

impl<'a> Hit<'a> {
    pub fn range(&self) -> ByteRange {
        match self {
            Hit::VarRef(v) => v.range,
            Hit::NodeCall(c) => c.range,
            Hit::TypeRef(t) => t.range,
            Hit::Param(p) => p.range,
            Hit::Decl(d) => d.range(),
        }
    }
}

/// `range.contains` is half-open; a cursor resting right after the last
/// character of a token (the common case for a completion request) still
/// counts as "at" that token.
fn cursor_in(range: ByteRange, offset: u32) -> bool {
    range.start <= offset && offset <= range.end
}

pub fn find_at<'a>(program: &'a Program<'a>, offset: u32) -> Option<Hit<'a>> {
    for decl in &program.items {
        if !cursor_in(decl.range(), offset) {
            continue;
        }
        if let Some(hit) = find_in_decl(decl, offset) {
            return Some(hit);
        }
    }
    None
}

fn find_in_decl<'a>(decl: &'a Decl<'a>, offset: u32) -> Option<Hit<'a>> {
    match decl {
        Decl::GlobalVar(d) => {
            if let Some(tn) = d.type_ann {
                if let Some(h) = find_in_type(tn, offset) {
                    return Some(h);
                }
            }
            if let Some(init) = d.init {
                if let Some(h) = find_in_expr(init, offset) {
                    return Some(h);
                }
            }
            Some(Hit::Decl(decl))
        }
        Decl::GlobalConst(d) => {
            if let Some(tn) = d.type_ann {
                if let Some(h) = find_in_type(tn, offset) {
                    return Some(h);
                }
            }
            if let Some(h) = find_in_expr(d.init, offset) {
                return Some(h);
            }
            Some(Hit::Decl(decl))
        }
        Decl::TypeAlias(d) => find_in_type(d.aliased, offset).or(Some(Hit::Decl(decl))),
        Decl::ExternNode(d) => {
            for port in &d.ports {
                if port.type_ann.range().contains(offset) {
                    if let Some(h) = find_in_type(port.type_ann, offset) {
                        return Some(h);
                    }
                }
                if let Some(def) = port.default {
                    if def.range().contains(offset) {
                        if let Some(h) = find_in_expr(def, offset) {
                            return Some(h);
                        }
                    }
                }
            }
            Some(Hit::Decl(decl))
        }
        Decl::ExternType(_) | Decl::Import(_) => Some(Hit::Decl(decl)),
        Decl::Tree(tree) => find_in_tree(tree, offset).or(Some(Hit::Decl(decl))),
    }
}

fn find_in_tree<'a>(tree: &'a TreeDecl<'a>, offset: u32) -> Option<Hit<'a>> {
    for p in &tree.params {
        if p.range.contains(offset) {
            if let Some(h) = find_in_type(p.type_ann, offset) {
                return Some(h);
            }
            if let Some(def) = p.default {
                if def.range().contains(offset) {
                    if let Some(h) = find_in_expr(def, offset) {
                        return Some(h);
                    }
                }
            }
            return Some(Hit::Param(p));
        }
    }
    find_in_stmts(&tree.body, offset)
}

fn find_in_stmts<'a>(stmts: &[&'a Stmt<'a>], offset: u32) -> Option<Hit<'a>> {
    for stmt in stmts {
        if !stmt.range().contains(offset) {
            continue;
        }
        match stmt {
            Stmt::NodeCall(call) => {
                for arg in &call.args {
                    if let Some(value) = arg.value {
                        if value.range().contains(offset) {
                            if let Some(h) = find_in_expr(value, offset) {
                                return Some(h);
                            }
                        }
                    }
                }
                for pre in &call.preconditions {
                    if pre.expr.range().contains(offset) {
                        if let Some(h) = find_in_expr(pre.expr, offset) {
                            return Some(h);
                        }
                    }
                }
                if let Some(children) = &call.children {
                    if let Some(h) = find_in_stmts(children, offset) {
                        return Some(h);
                    }
                }
                return Some(Hit::NodeCall(call));
            }
            Stmt::Assignment(a) => {
                if a.target.range().contains(offset) {
                    return find_in_expr(a.target, offset);
                }
                if a.value.range().contains(offset) {
                    return find_in_expr(a.value, offset);
                }
            }
            Stmt::BlackboardVarDecl(d) => {
                if let Some(tn) = d.type_ann {
                    if tn.range().contains(offset) {
                        return find_in_type(tn, offset);
                    }
                }
                if let Some(init) = d.init {
                    if init.range().contains(offset) {
                        return find_in_expr(init, offset);
                    }
                }
            }
            Stmt::LocalConstDecl(d) => {
                if let Some(tn) = d.type_ann {
                    if tn.range().contains(offset) {
                        return find_in_type(tn, offset);
                    }
                }
                if d.init.range().contains(offset) {
                    return find_in_expr(d.init, offset);
                }
            }
        }
    }
    None
}

fn find_in_expr<'a>(expr: &'a Expr<'a>, offset: u32) -> Option<Hit<'a>> {
    match expr {
        Expr::VarRef(v) => Some(Hit::VarRef(v)),
        Expr::Binary(b) => {
            if b.lhs.range().contains(offset) {
                find_in_expr(b.lhs, offset)
            } else if b.rhs.range().contains(offset) {
                find_in_expr(b.rhs, offset)
            } else {
                None
            }
        }
        Expr::Unary(u) => find_in_expr(u.operand, offset),
        Expr::Cast(c) => {
            if c.operand.range().contains(offset) {
                find_in_expr(c.operand, offset)
            } else {
                find_in_type(c.target, offset)
            }
        }
        Expr::Index(i) => {
            if i.base.range().contains(offset) {
                find_in_expr(i.base, offset)
            } else {
                find_in_expr(i.index, offset)
            }
        }
        Expr::ArrayLit(a) => a
            .elements
            .iter()
            .find(|e| e.range().contains(offset))
            .and_then(|e| find_in_expr(e, offset)),
        Expr::ArrayRepeat(r) => {
            if r.value.range().contains(offset) {
                find_in_expr(r.value, offset)
            } else {
                find_in_expr(r.count, offset)
            }
        }
        Expr::VecMacro(v) => v
            .elements
            .iter()
            .find(|e| e.range().contains(offset))
            .and_then(|e| find_in_expr(e, offset)),
        Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit(_) => {
            None
        }
    }
}

fn find_in_type<'a>(tn: &'a TypeNode<'a>, offset: u32) -> Option<Hit<'a>> {
    match tn {
        TypeNode::Primary(p) => {
            if let Some(size) = p.size {
                if size.range().contains(offset) {
                    return find_in_expr(size, offset);
                }
            }
            Some(Hit::TypeRef(p))
        }
        TypeNode::StaticArray(a) => {
            if a.elem.range().contains(offset) {
                find_in_type(a.elem, offset)
            } else if a.size.range().contains(offset) {
                find_in_expr(a.size, offset)
            } else {
                None
            }
        }
        TypeNode::DynamicArray(a) => find_in_type(a.elem, offset),
        TypeNode::Wrapper(w) => find_in_type(w.base, offset),
        TypeNode::Infer(_) => None,
    }
}

/// Determines the scope a byte offset resolves names in: the innermost
/// children block or tree body/param list containing it, else the module
/// root (spec.md §4.3's "innermost open scope to the module root").
pub fn scope_at<'a>(
    program: &'a Program<'a>,
    scopes: &ScopeMap,
    table: &SymbolTable<'a>,
    offset: u32,
) -> ScopeId {
    for decl in &program.items {
        let Decl::Tree(tree) = decl else { continue };
        if !cursor_in(tree.range, offset) {
            continue;
        }
        if let Some(params_scope) = scopes.tree_params_scope(tree) {
            if tree.params.iter().any(|p| cursor_in(p.range, offset)) {
                return params_scope;
            }
        }
        let body_scope = scopes.tree_body_scope(tree).unwrap_or_else(|| table.root());
        return innermost_block_scope(&tree.body, scopes, body_scope, offset);
    }
    table.root()
}

fn innermost_block_scope(
    stmts: &[&Stmt<'_>],
    scopes: &ScopeMap,
    current: ScopeId,
    offset: u32,
) -> ScopeId {
    for stmt in stmts {
        if let Stmt::NodeCall(call) = stmt {
            if call.range.contains(offset) {
                if let (Some(children), Some(child_scope)) =
                    (&call.children, scopes.children_scope(call))
                {
                    return innermost_block_scope(children, scopes, child_scope, offset);
                }
                return current;
            }
        }
    }
    current
}

/// Every symbol visible at `scope`, from innermost to the root, across all
/// three namespaces (used by completion; callers filter by namespace or
/// prefix as needed).
pub fn visible_symbols<'a>(table: &SymbolTable<'a>, scope: ScopeId) -> Vec<&'a Symbol<'a>> {
    use bt_dsl_ast::Namespace;
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut current = Some(scope);
    while let Some(s) = current {
        for ns in [Namespace::Value, Namespace::Type, Namespace::Node] {
            for name in table.names_in_scope(s, ns) {
                if seen.insert((ns, name.clone())) {
                    if let Some(sym) = table.lookup_local(s, ns, &name) {
                        out.push(sym);
                    }
                }
            }
        }
        current = table.parent_of(s);
    }
    out
}
