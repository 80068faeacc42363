//! Plain-text AST dump used by golden tests in downstream crates. Not
//! part of any spec surface; exists so pass tests can assert on parser
//! output without hand-building arena fixtures for every case.

use std::fmt::Write as _;

use crate::ast::{Decl, Expr, Program, Stmt};

pub fn dump_program(program: &Program) -> String {
    let mut out = String::new();
    for import in &program.imports {
        dump_decl(import, 0, &mut out);
    }
    for decl in &program.items {
        dump_decl(decl, 0, &mut out);
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_decl(decl: &Decl, depth: usize, out: &mut String) {
    indent(out, depth);
    match decl {
        Decl::Import(d) => {
            let _ = writeln!(out, "import {:?}", d.target);
        }
        Decl::ExternType(d) => {
            let _ = writeln!(out, "extern_type {}", d.name);
        }
        Decl::TypeAlias(d) => {
            let _ = writeln!(out, "type_alias {}", d.name);
        }
        Decl::ExternNode(d) => {
            let _ = writeln!(out, "extern_node {:?} {}", d.category, d.name);
        }
        Decl::GlobalVar(d) => {
            let _ = writeln!(out, "global_var {}", d.name);
        }
        Decl::GlobalConst(d) => {
            let _ = writeln!(out, "global_const {}", d.name);
        }
        Decl::Tree(d) => {
            let _ = writeln!(out, "tree {}", d.name);
            for stmt in &d.body {
                dump_stmt(stmt, depth + 1, out);
            }
        }
    }
}

fn dump_stmt(stmt: &Stmt, depth: usize, out: &mut String) {
    indent(out, depth);
    match stmt {
        Stmt::NodeCall(s) => {
            let _ = writeln!(out, "call {}", s.name);
            if let Some(children) = &s.children {
                for child in children {
                    dump_stmt(child, depth + 1, out);
                }
            }
        }
        Stmt::Assignment(s) => {
            let _ = writeln!(out, "assign {:?}", s.op);
        }
        Stmt::BlackboardVarDecl(s) => {
            let _ = writeln!(out, "var {}", s.name);
        }
        Stmt::LocalConstDecl(s) => {
            let _ = writeln!(out, "const {}", s.name);
        }
    }
}

pub fn dump_expr(expr: &Expr) -> String {
    match expr {
        Expr::IntLit(e) => format!("{}", e.value),
        Expr::FloatLit(e) => format!("{}", e.value),
        Expr::StringLit(e) => format!("{:?}", e.value),
        Expr::BoolLit(e) => format!("{}", e.value),
        Expr::NullLit(_) => "null".to_string(),
        Expr::VarRef(e) => e.name.clone(),
        Expr::Binary(e) => format!("({:?} ...)", e.op),
        Expr::Unary(e) => format!("({:?} ...)", e.op),
        Expr::Cast(_) => "(cast ...)".to_string(),
        Expr::Index(_) => "(index ...)".to_string(),
        Expr::ArrayLit(_) => "[...]".to_string(),
        Expr::ArrayRepeat(_) => "[...; n]".to_string(),
        Expr::VecMacro(_) => "vec![...]".to_string(),
    }
}
