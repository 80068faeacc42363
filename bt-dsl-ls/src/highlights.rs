//! `document_highlights_json` (spec.md §6): every occurrence, in the
//! current document, of the symbol under the cursor. Grounded on
//! `vex-lsp/src/backend/language_features/highlights.rs`'s "resolve the
//! symbol at the cursor, then re-walk the whole file comparing resolved
//! pointers" shape — BT-DSL symbols are arena-allocated, so "same symbol"
//! is exactly `std::ptr::eq`, same guarantee spec.md §4.1 gives types.

use bt_dsl_ast::{Decl, Expr, NodeCallStmt, Program, Stmt, Symbol, TreeDecl};
use bt_dsl_diagnostics::{ByteRange, SourceMap};

use crate::json::range_json;
use crate::locate::{self, Hit};

#[derive(Clone, Copy)]
enum Kind {
    Read,
    Write,
    Declaration,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Read => "read",
            Kind::Write => "write",
            Kind::Declaration => "declaration",
        }
    }
}

fn target_symbol<'a>(hit: &Hit<'a>) -> Option<&'a Symbol<'a>> {
    match hit {
        Hit::VarRef(v) => v.resolved_symbol.get(),
        Hit::NodeCall(c) => c.resolved_node.get(),
        Hit::TypeRef(t) => t.resolved_symbol.get(),
        Hit::Param(_) | Hit::Decl(_) => None,
    }
}

fn same(a: &Symbol<'_>, b: &Symbol<'_>) -> bool {
    std::ptr::eq(a, b)
}

pub fn document_highlights_json<'a>(program: &'a Program<'a>, map: &SourceMap, offset: u32) -> String {
    let Some(hit) = locate::find_at(program, offset) else {
        return serde_json::json!({ "items": [] }).to_string();
    };
    let Some(target) = target_symbol(&hit) else {
        return serde_json::json!({ "items": [] }).to_string();
    };

    let mut out: Vec<(ByteRange, Kind)> = Vec::new();
    out.push((target.range(), Kind::Declaration));

    for decl in &program.items {
        if let Decl::Tree(tree) = decl {
            walk_tree(tree, target, &mut out);
        }
    }

    out.sort_by_key(|(r, _)| r.start);
    out.dedup_by_key(|(r, _)| r.start);

    let items: Vec<serde_json::Value> = out
        .into_iter()
        .map(|(range, kind)| {
            serde_json::json!({
                "range": range_json(range, map),
                "kind": kind.as_str(),
            })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

fn walk_tree<'a>(tree: &'a TreeDecl<'a>, target: &'a Symbol<'a>, out: &mut Vec<(ByteRange, Kind)>) {
    walk_stmts(&tree.body, target, out);
}

fn walk_stmts<'a>(stmts: &[&'a Stmt<'a>], target: &'a Symbol<'a>, out: &mut Vec<(ByteRange, Kind)>) {
    for stmt in stmts {
        match stmt {
            Stmt::NodeCall(call) => walk_node_call(call, target, out),
            Stmt::Assignment(a) => {
                walk_expr(a.target, target, out, true);
                walk_expr(a.value, target, out, false);
            }
            Stmt::BlackboardVarDecl(d) => {
                if let Some(init) = d.init {
                    walk_expr(init, target, out, false);
                }
            }
            Stmt::LocalConstDecl(d) => walk_expr(d.init, target, out, false),
        }
    }
}

fn walk_node_call<'a>(call: &'a NodeCallStmt<'a>, target: &'a Symbol<'a>, out: &mut Vec<(ByteRange, Kind)>) {
    if let Some(sym) = call.resolved_node.get() {
        if same(sym, target) {
            out.push((call.range, Kind::Read));
        }
    }
    for arg in &call.args {
        if let Some(value) = arg.value {
            walk_expr(value, target, out, false);
        }
    }
    for pre in &call.preconditions {
        walk_expr(pre.expr, target, out, false);
    }
    if let Some(children) = &call.children {
        walk_stmts(children, target, out);
    }
}

fn walk_expr<'a>(expr: &'a Expr<'a>, target: &'a Symbol<'a>, out: &mut Vec<(ByteRange, Kind)>, as_write: bool) {
    match expr {
        Expr::VarRef(v) => {
            if let Some(sym) = v.resolved_symbol.get() {
                if same(sym, target) {
                    out.push((v.range, if as_write { Kind::Write } else { Kind::Read }));
                }
            }
        }
        Expr::Binary(b) => {
            walk_expr(b.lhs, target, out, false);
            walk_expr(b.rhs, target, out, false);
        }
        Expr::Unary(u) => walk_expr(u.operand, target, out, false),
        Expr::Cast(c) => walk_expr(c.operand, target, out, false),
        Expr::Index(i) => {
            walk_expr(i.base, target, out, as_write);
            walk_expr(i.index, target, out, false);
        }
        Expr::ArrayLit(a) => {
            for e in &a.elements {
                walk_expr(e, target, out, false);
            }
        }
        Expr::ArrayRepeat(r) => {
            walk_expr(r.value, target, out, false);
            walk_expr(r.count, target, out, false);
        }
        Expr::VecMacro(v) => {
            for e in &v.elements {
                walk_expr(e, target, out, false);
            }
        }
        Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::{AstArena, TypeContext};
    use bt_dsl_parser::parse_source;

    #[test]
    fn finds_read_and_write_of_same_variable() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let type_ctx = TypeContext::new(&type_arena);
        let src = "tree Main() { var x: int32 = 0; x = 1; var y: int32 = x; }\n";
        let (program, mut diags) = parse_source(src, &arena);
        bt_dsl_sema::analyze(program, &arena, &type_ctx, &[], &mut diags);
        let map = SourceMap::new(src);
        let offset = src.find("x = 1").unwrap() as u32;
        let json = document_highlights_json(program, &map, offset);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["items"].as_array().unwrap().len() >= 2);
    }
}
