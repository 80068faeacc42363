//! Tree-recursion checker (spec.md §4.9): bans self- and mutual recursion
//! among trees reachable from an entry module. Must run, and succeed,
//! before initialization-safety (spec.md §4.7's subtree-summary pass
//! "assumes an acyclic call graph").
//!
//! Grounded on `vex-compiler/src/linter/unreachable_code.rs`'s DFS
//! coloring over a call/control graph (white/gray/black, back edge on a
//! gray revisit) — the same coloring shape, re-targeted from basic
//! blocks to tree declarations. Call-graph edges are read directly off
//! the CFG built by [`crate::cfg`] rather than re-walking the AST, since
//! [`crate::cfg::build_tree_cfg`] already enumerates every node call
//! reachable from a tree's body in one linear scan of its blocks.

use std::collections::HashMap;

use bt_dsl_ast::{Decl, NodeCallStmt, Program, Symbol, TreeDecl};
use bt_dsl_diagnostics::{error_codes, Category, Diagnostic, DiagnosticBag};

use crate::cfg::{build_tree_cfg, Action};

/// One module's parsed program together with the file identifier used in
/// diagnostics and cross-module edge reporting.
pub struct RecursionModule<'a> {
    pub file_id: String,
    pub program: &'a Program<'a>,
}

type TreeKey = usize;

fn key_of<'a>(tree: &'a TreeDecl<'a>) -> TreeKey {
    tree as *const TreeDecl<'a> as usize
}

struct Node<'a> {
    file_id: String,
    tree: &'a TreeDecl<'a>,
}

struct CallEdge<'a> {
    to: TreeKey,
    call_site: &'a NodeCallStmt<'a>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Runs the checker over `entry` plus every other reachable module,
/// restricted to spec.md §4.9's visibility rule: all trees declared in
/// the entry module, plus any *public* tree in any other module passed
/// in. `others` is assumed already filtered to modules actually reachable
/// from `entry` by the import graph (the driver's job, not this pass's).
pub fn check<'a>(entry: &RecursionModule<'a>, others: &[RecursionModule<'a>], diags: &mut DiagnosticBag) {
    let mut nodes: HashMap<TreeKey, Node<'a>> = HashMap::new();
    let mut edges: HashMap<TreeKey, Vec<CallEdge<'a>>> = HashMap::new();

    for decl in &entry.program.items {
        if let Decl::Tree(t) = decl {
            nodes.insert(key_of(t), Node { file_id: entry.file_id.clone(), tree: t });
        }
    }
    for m in others {
        for decl in &m.program.items {
            if let Decl::Tree(t) = decl {
                if !decl.is_private() {
                    nodes.insert(key_of(t), Node { file_id: m.file_id.clone(), tree: t });
                }
            }
        }
    }

    for (key, node) in &nodes {
        let cfg = build_tree_cfg(node.tree);
        let mut out = Vec::new();
        for block in &cfg.blocks {
            for action in &block.actions {
                if let Action::NodeCall(call) = action {
                    if let Some(Symbol::Tree(target)) = call.resolved_node.get() {
                        let target_key = key_of(target);
                        if nodes.contains_key(&target_key) {
                            out.push(CallEdge { to: target_key, call_site: call });
                        }
                    }
                }
            }
        }
        edges.insert(*key, out);
    }

    let mut colors: HashMap<TreeKey, Color> = nodes.keys().map(|k| (*k, Color::White)).collect();
    let mut reported: Vec<(TreeKey, TreeKey)> = Vec::new();

    let mut keys: Vec<TreeKey> = nodes.keys().copied().collect();
    keys.sort_unstable();
    for start in keys {
        if colors[&start] == Color::White {
            let mut path: Vec<(TreeKey, Option<&'a NodeCallStmt<'a>>)> = Vec::new();
            visit(start, None, &nodes, &edges, &mut colors, &mut path, &mut reported, diags);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn visit<'a>(
    key: TreeKey,
    via: Option<&'a NodeCallStmt<'a>>,
    nodes: &HashMap<TreeKey, Node<'a>>,
    edges: &HashMap<TreeKey, Vec<CallEdge<'a>>>,
    colors: &mut HashMap<TreeKey, Color>,
    path: &mut Vec<(TreeKey, Option<&'a NodeCallStmt<'a>>)>,
    reported: &mut Vec<(TreeKey, TreeKey)>,
    diags: &mut DiagnosticBag,
) {
    colors.insert(key, Color::Gray);
    path.push((key, via));

    for edge in edges.get(&key).into_iter().flatten() {
        match colors.get(&edge.to).copied().unwrap_or(Color::Black) {
            Color::White => visit(edge.to, Some(edge.call_site), nodes, edges, colors, path, reported, diags),
            Color::Gray => {
                if !reported.contains(&(key, edge.to)) {
                    reported.push((key, edge.to));
                    report_cycle(nodes, path, key, edge, diags);
                }
            }
            Color::Black => {}
        }
    }

    path.pop();
    colors.insert(key, Color::Black);
}

fn report_cycle<'a>(
    nodes: &HashMap<TreeKey, Node<'a>>,
    path: &[(TreeKey, Option<&'a NodeCallStmt<'a>>)],
    closing_from: TreeKey,
    closing_edge: &CallEdge<'a>,
    diags: &mut DiagnosticBag,
) {
    let cycle_start = path.iter().position(|(k, _)| *k == closing_edge.to).unwrap_or(0);
    let cycle = &path[cycle_start..];

    let mut names: Vec<&str> = cycle.iter().map(|(k, _)| nodes[k].tree.name.as_str()).collect();
    names.push(nodes[&closing_edge.to].tree.name.as_str());
    let chain = names.join(" -> ");

    let closing_tree_name = &nodes[&closing_from].tree.name;
    let mut diag = Diagnostic::error(
        Category::Safety,
        error_codes::SAFETY_RECURSIVE_TREE,
        format!(
            "tree recursion is not allowed: {chain} (call from `{closing_tree_name}` closes the cycle)"
        ),
        closing_edge.call_site.range,
    );
    for (k, via) in cycle {
        if let Some(call) = via {
            diag = diag.with_secondary(call.range, format!("calls `{}` here", nodes[k].tree.name));
        }
    }
    diags.emit(diag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_diagnostics::DiagnosticBag;
    use bt_dsl_parser::parse_source;

    fn run_single_module(source: &str) -> DiagnosticBag {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (program, mut diags) = parse_source(source, &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let type_ctx = bt_dsl_ast::TypeContext::new(&type_arena);
        let mut ev = crate::const_eval::Evaluator::new();
        let mut checker = crate::type_checker::Checker::new(&type_ctx, &arena, &mut ev);
        checker.check_program(program, &mut diags);

        let module = RecursionModule { file_id: "main.bt".into(), program };
        check(&module, &[], &mut diags);
        diags
    }

    #[test]
    fn self_recursive_tree_is_rejected() {
        let diags = run_single_module("tree Main() { Main(); }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_RECURSIVE_TREE));
    }

    #[test]
    fn mutual_recursion_is_rejected() {
        let diags = run_single_module("tree A() { B(); } tree B() { A(); }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_RECURSIVE_TREE));
    }

    #[test]
    fn acyclic_calls_are_accepted() {
        let diags = run_single_module("tree Leaf() {} tree Main() { Leaf(); }");
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_RECURSIVE_TREE));
    }
}
