//! `semantic_tokens_json` (spec.md §6): one entry per classifiable AST
//! leaf, sorted by start offset (the editor-host's renderer assumes
//! non-overlapping, position-sorted spans, same assumption `vex-lsp`'s
//! `semantic_tokens.rs` documents for its own `SemanticTokensBuilder`).
//! Token `type` strings follow the LSP standard token-type vocabulary
//! (`variable`, `parameter`, `function`, `type`, `number`, `string`,
//! `keyword`, `comment`) since spec.md §6 doesn't define its own.

use bt_dsl_ast::{
    Argument, Decl, Expr, NodeCallStmt, Precondition, Program, Stmt, TreeDecl, TypeNode,
};
use bt_dsl_diagnostics::{ByteRange, SourceMap};

use crate::json::range_json;

struct Token {
    range: ByteRange,
    ty: &'static str,
    modifiers: &'static [&'static str],
}

pub fn semantic_tokens_json(program: &Program<'_>, map: &SourceMap) -> String {
    let mut tokens: Vec<Token> = Vec::new();

    for decl in &program.items {
        walk_decl(decl, &mut tokens);
    }

    tokens.sort_by_key(|t| t.range.start);

    let items: Vec<serde_json::Value> = tokens
        .into_iter()
        .map(|t| {
            serde_json::json!({
                "range": range_json(t.range, map),
                "type": t.ty,
                "modifiers": t.modifiers,
            })
        })
        .collect();
    serde_json::json!({ "tokens": items }).to_string()
}

fn walk_decl(decl: &Decl<'_>, out: &mut Vec<Token>) {
    match decl {
        Decl::Import(_) => {}
        Decl::ExternType(d) => out.push(Token {
            range: d.range,
            ty: "type",
            modifiers: &["declaration"],
        }),
        Decl::TypeAlias(d) => {
            out.push(Token {
                range: d.range,
                ty: "type",
                modifiers: &["declaration"],
            });
            walk_type(d.aliased, out);
        }
        Decl::ExternNode(d) => {
            out.push(Token {
                range: d.range,
                ty: "function",
                modifiers: &["declaration"],
            });
            for port in &d.ports {
                walk_type(port.type_ann, out);
                if let Some(def) = port.default {
                    walk_expr(def, out);
                }
            }
        }
        Decl::GlobalVar(d) => {
            out.push(Token {
                range: d.range,
                ty: "variable",
                modifiers: &["declaration"],
            });
            if let Some(tn) = d.type_ann {
                walk_type(tn, out);
            }
            if let Some(init) = d.init {
                walk_expr(init, out);
            }
        }
        Decl::GlobalConst(d) => {
            out.push(Token {
                range: d.range,
                ty: "variable",
                modifiers: &["declaration", "readonly"],
            });
            if let Some(tn) = d.type_ann {
                walk_type(tn, out);
            }
            walk_expr(d.init, out);
        }
        Decl::Tree(tree) => walk_tree(tree, out),
    }
}

fn walk_tree(tree: &TreeDecl<'_>, out: &mut Vec<Token>) {
    out.push(Token {
        range: tree.range,
        ty: "function",
        modifiers: &["declaration"],
    });
    for p in &tree.params {
        out.push(Token {
            range: p.range,
            ty: "parameter",
            modifiers: &["declaration"],
        });
        walk_type(p.type_ann, out);
        if let Some(def) = p.default {
            walk_expr(def, out);
        }
    }
    walk_stmts(&tree.body, out);
}

fn walk_stmts(stmts: &[&Stmt<'_>], out: &mut Vec<Token>) {
    for stmt in stmts {
        match stmt {
            Stmt::NodeCall(call) => walk_node_call(call, out),
            Stmt::Assignment(a) => {
                walk_expr(a.target, out);
                walk_expr(a.value, out);
            }
            Stmt::BlackboardVarDecl(d) => {
                out.push(Token {
                    range: d.range,
                    ty: "variable",
                    modifiers: &["declaration"],
                });
                if let Some(tn) = d.type_ann {
                    walk_type(tn, out);
                }
                if let Some(init) = d.init {
                    walk_expr(init, out);
                }
            }
            Stmt::LocalConstDecl(d) => {
                out.push(Token {
                    range: d.range,
                    ty: "variable",
                    modifiers: &["declaration", "readonly"],
                });
                if let Some(tn) = d.type_ann {
                    walk_type(tn, out);
                }
                walk_expr(d.init, out);
            }
        }
    }
}

fn walk_node_call(call: &NodeCallStmt<'_>, out: &mut Vec<Token>) {
    out.push(Token {
        range: call.range,
        ty: "function",
        modifiers: &[],
    });
    for arg in &call.args {
        walk_argument(arg, out);
    }
    for pre in &call.preconditions {
        walk_precondition(pre, out);
    }
    if let Some(children) = &call.children {
        walk_stmts(children, out);
    }
}

fn walk_argument(arg: &Argument<'_>, out: &mut Vec<Token>) {
    if let Some(value) = arg.value {
        walk_expr(value, out);
    }
    if let Some(decl) = arg.inline_decl {
        out.push(Token {
            range: decl.range,
            ty: "variable",
            modifiers: &["declaration"],
        });
    }
}

fn walk_precondition(pre: &Precondition<'_>, out: &mut Vec<Token>) {
    walk_expr(pre.expr, out);
}

fn walk_expr(expr: &Expr<'_>, out: &mut Vec<Token>) {
    match expr {
        Expr::IntLit(e) => out.push(Token {
            range: e.range,
            ty: "number",
            modifiers: &[],
        }),
        Expr::FloatLit(e) => out.push(Token {
            range: e.range,
            ty: "number",
            modifiers: &[],
        }),
        Expr::StringLit(e) => out.push(Token {
            range: e.range,
            ty: "string",
            modifiers: &[],
        }),
        Expr::BoolLit(e) => out.push(Token {
            range: e.range,
            ty: "keyword",
            modifiers: &[],
        }),
        Expr::NullLit(e) => out.push(Token {
            range: e.range,
            ty: "keyword",
            modifiers: &[],
        }),
        Expr::VarRef(e) => out.push(Token {
            range: e.range,
            ty: "variable",
            modifiers: &[],
        }),
        Expr::Binary(b) => {
            walk_expr(b.lhs, out);
            walk_expr(b.rhs, out);
        }
        Expr::Unary(u) => walk_expr(u.operand, out),
        Expr::Cast(c) => {
            walk_expr(c.operand, out);
            walk_type(c.target, out);
        }
        Expr::Index(i) => {
            walk_expr(i.base, out);
            walk_expr(i.index, out);
        }
        Expr::ArrayLit(a) => {
            for e in &a.elements {
                walk_expr(e, out);
            }
        }
        Expr::ArrayRepeat(r) => {
            walk_expr(r.value, out);
            walk_expr(r.count, out);
        }
        Expr::VecMacro(v) => {
            for e in &v.elements {
                walk_expr(e, out);
            }
        }
    }
}

fn walk_type(tn: &TypeNode<'_>, out: &mut Vec<Token>) {
    match tn {
        TypeNode::Primary(p) => {
            out.push(Token {
                range: p.range,
                ty: "type",
                modifiers: &[],
            });
            if let Some(size) = p.size {
                walk_expr(size, out);
            }
        }
        TypeNode::StaticArray(a) => {
            walk_type(a.elem, out);
            walk_expr(a.size, out);
        }
        TypeNode::DynamicArray(a) => walk_type(a.elem, out),
        TypeNode::Wrapper(w) => walk_type(w.base, out),
        TypeNode::Infer(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    #[test]
    fn tokens_are_sorted_and_cover_tree_and_literal() {
        let arena = AstArena::new();
        let src = "tree Main() { var x: int32 = 42; }\n";
        let (program, _diags) = parse_source(src, &arena);
        let map = SourceMap::new(src);
        let json = semantic_tokens_json(program, &map);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let tokens = value["tokens"].as_array().unwrap();
        assert!(!tokens.is_empty());
        let starts: Vec<u64> = tokens
            .iter()
            .map(|t| t["range"]["startByte"].as_u64().unwrap())
            .collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
        assert!(tokens.iter().any(|t| t["type"] == "number"));
    }
}
