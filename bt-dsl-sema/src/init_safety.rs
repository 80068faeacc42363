//! Initialization-safety checker (spec.md §4.7): a forward may-not-
//! initialized analysis over each tree's CFG. Grounded on the same
//! `vex-compiler/src/borrow_checker` dataflow-over-CFG shape noted in
//! `bt-dsl-sema`'s `DESIGN.md` entry — per-block state, meet over
//! predecessors, a lattice with an uncertain middle value — generalized
//! from move-state tracking to the `{Uninit, Init, Unknown}` lattice
//! spec.md defines. Since BT-DSL's CFG is always a DAG (no loop
//! construct contributes back edges — see [`crate::cfg`]), the "explicit
//! worklist" spec.md §9 asks for degenerates to one pass over reverse
//! postorder; we still process edges rather than whole-block meets so
//! that the `out`-argument's success-only write (tagged via
//! `EdgeCond::OnCallSuccess` in `cfg.rs`) is applied on exactly the right
//! edge and nowhere else.

use std::collections::{HashMap, HashSet};

use bt_dsl_ast::{
    ArgDirection, Argument, AssignOp, Decl, Direction, Expr, GlobalVarDecl, NodeCallStmt,
    ParameterDecl, Program, Symbol, TreeDecl,
};
use bt_dsl_diagnostics::{error_codes, Category, Diagnostic, DiagnosticBag};

use crate::cfg::{build_tree_cfg, Action, Cfg, EdgeCond};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninit,
    Unknown,
    Init,
}

impl InitState {
    fn meet(self, other: Self) -> Self {
        use InitState::*;
        match (self, other) {
            (Uninit, _) | (_, Uninit) => Uninit,
            (Unknown, _) | (_, Unknown) => Unknown,
            (Init, Init) => Init,
        }
    }
}

type VarKey = usize;
type StateMap = HashMap<VarKey, InitState>;

fn var_key_of_symbol(sym: &Symbol) -> Option<VarKey> {
    match sym {
        Symbol::GlobalVariable(d) => Some(*d as *const _ as usize),
        Symbol::GlobalConst(d) => Some(*d as *const _ as usize),
        Symbol::Parameter(d) => Some(*d as *const _ as usize),
        Symbol::LocalVariable(d) => Some(*d as *const _ as usize),
        Symbol::BlockVariable(d) => Some(*d as *const _ as usize),
        Symbol::LocalConst(d) => Some(*d as *const _ as usize),
        _ => None,
    }
}

/// Per-tree call-graph summary (spec.md §4.7 "subtree summaries").
#[derive(Debug, Default, Clone)]
pub struct TreeSummary<'a> {
    pub requires_init: HashSet<VarKey>,
    pub guarantees_init: HashSet<VarKey>,
    pub guarantees_out_params: HashSet<String>,
    _marker: std::marker::PhantomData<&'a ()>,
}

fn global_default(globals: &HashMap<VarKey, &GlobalVarDecl<'_>>, key: VarKey, concrete_entry: bool) -> InitState {
    match globals.get(&key) {
        Some(d) if d.init.is_some() => InitState::Init,
        Some(_) => {
            if concrete_entry {
                InitState::Uninit
            } else {
                InitState::Unknown
            }
        }
        None => InitState::Init,
    }
}

fn default_state(sym: &Symbol, globals: &HashMap<VarKey, &GlobalVarDecl<'_>>, concrete_entry: bool) -> InitState {
    match sym {
        Symbol::GlobalVariable(d) => global_default(globals, *d as *const _ as usize, concrete_entry),
        Symbol::GlobalConst(_) | Symbol::LocalConst(_) => InitState::Init,
        Symbol::Parameter(p) => {
            if p.direction == Direction::Out {
                InitState::Uninit
            } else {
                InitState::Init
            }
        }
        Symbol::LocalVariable(_) | Symbol::BlockVariable(_) => InitState::Uninit,
        _ => InitState::Init,
    }
}

fn get_state(
    map: &StateMap,
    key: VarKey,
    sym: &Symbol,
    globals: &HashMap<VarKey, &GlobalVarDecl<'_>>,
    concrete_entry: bool,
) -> InitState {
    map.get(&key)
        .copied()
        .unwrap_or_else(|| default_state(sym, globals, concrete_entry))
}

/// Merges two predecessors' out-states at a join block. A key missing from
/// one side has never been touched along that particular path yet (no
/// declaration/assignment block lies between it and the join), so it
/// carries no information there and the other side's state passes through
/// unchanged — `meet(v, v) == v`.
fn meet_maps(a: &StateMap, b: &StateMap) -> StateMap {
    let mut out = a.clone();
    for (&k, &v) in b {
        let av = a.get(&k).copied().unwrap_or(v);
        out.insert(k, av.meet(v));
    }
    out
}

fn check_reads(
    expr: &Expr<'_>,
    state: &StateMap,
    globals: &HashMap<VarKey, &GlobalVarDecl<'_>>,
    concrete_entry: bool,
    diags: &mut DiagnosticBag,
) {
    match expr {
        Expr::VarRef(v) => {
            if let Some(sym) = v.resolved_symbol.get() {
                if let Some(key) = var_key_of_symbol(sym) {
                    let value = get_state(state, key, sym, globals, concrete_entry);
                    if value == InitState::Uninit {
                        diags.emit(Diagnostic::error(
                            Category::Safety,
                            error_codes::SAFETY_UNINITIALIZED,
                            format!("`{}` may be uninitialized here", v.name),
                            v.range,
                        ));
                    }
                }
            }
        }
        Expr::Binary(b) => {
            check_reads(b.lhs, state, globals, concrete_entry, diags);
            check_reads(b.rhs, state, globals, concrete_entry, diags);
        }
        Expr::Unary(u) => check_reads(u.operand, state, globals, concrete_entry, diags),
        Expr::Cast(c) => check_reads(c.operand, state, globals, concrete_entry, diags),
        Expr::Index(i) => {
            check_reads(i.base, state, globals, concrete_entry, diags);
            check_reads(i.index, state, globals, concrete_entry, diags);
        }
        Expr::ArrayLit(a) => {
            for e in &a.elements {
                check_reads(e, state, globals, concrete_entry, diags);
            }
        }
        Expr::ArrayRepeat(a) => {
            check_reads(a.value, state, globals, concrete_entry, diags);
            check_reads(a.count, state, globals, concrete_entry, diags);
        }
        Expr::VecMacro(v) => {
            for e in &v.elements {
                check_reads(e, state, globals, concrete_entry, diags);
            }
        }
        Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit(_) => {}
    }
}

/// Checks only the index subexpressions of an lvalue (`arr[i]`'s `i`, not
/// the `arr` root), used for plain-`=` assignment/`out`-argument targets
/// where the root variable is purely written, never read.
fn check_index_subreads(
    expr: &Expr<'_>,
    state: &StateMap,
    globals: &HashMap<VarKey, &GlobalVarDecl<'_>>,
    concrete_entry: bool,
    diags: &mut DiagnosticBag,
) {
    if let Expr::Index(i) = expr {
        check_reads(i.index, state, globals, concrete_entry, diags);
        check_index_subreads(i.base, state, globals, concrete_entry, diags);
    }
}

fn out_arg_target_key(arg: &Argument<'_>) -> Option<VarKey> {
    if let Some(inline) = arg.inline_decl {
        return Some(inline as *const _ as usize);
    }
    let v = arg.value?;
    let root = v.lvalue_root()?;
    root.resolved_symbol.get().and_then(var_key_of_symbol)
}

#[allow(clippy::too_many_arguments)]
fn block_transfer<'a>(
    cfg: &Cfg<'a>,
    block_id: usize,
    in_map: &StateMap,
    concrete_entry: bool,
    globals: &HashMap<VarKey, &GlobalVarDecl<'_>>,
    summaries: &HashMap<usize, TreeSummary<'a>>,
    diags: &mut DiagnosticBag,
) -> (StateMap, Vec<VarKey>, HashSet<VarKey>) {
    let mut state = in_map.clone();
    let mut success_extra = Vec::new();
    let mut requires = HashSet::new();

    for action in &cfg.blocks[block_id].actions {
        match action {
            Action::Precondition(p) => {
                check_reads(p.expr, &state, globals, concrete_entry, diags);
            }
            Action::Assignment(a) => {
                check_reads(a.value, &state, globals, concrete_entry, diags);
                if a.op == AssignOp::Assign {
                    check_index_subreads(a.target, &state, globals, concrete_entry, diags);
                } else {
                    check_reads(a.target, &state, globals, concrete_entry, diags);
                }
                if let Some(root) = a.target.lvalue_root() {
                    if let Some(sym) = root.resolved_symbol.get() {
                        if let Some(key) = var_key_of_symbol(sym) {
                            state.insert(key, InitState::Init);
                        }
                    }
                }
            }
            Action::BlackboardDecl(d) => {
                if let Some(init) = d.init {
                    check_reads(init, &state, globals, concrete_entry, diags);
                    state.insert(*d as *const _ as usize, InitState::Init);
                } else {
                    state.insert(*d as *const _ as usize, InitState::Uninit);
                }
            }
            Action::LocalConstDecl(d) => {
                check_reads(d.init, &state, globals, concrete_entry, diags);
                state.insert(*d as *const _ as usize, InitState::Init);
            }
            Action::NodeCall(call) => {
                handle_node_call(call, &mut state, globals, concrete_entry, summaries, &mut success_extra, &mut requires, diags);
            }
        }
    }

    (state, success_extra, requires)
}

#[allow(clippy::too_many_arguments)]
fn handle_node_call<'a>(
    call: &'a NodeCallStmt<'a>,
    state: &mut StateMap,
    globals: &HashMap<VarKey, &GlobalVarDecl<'_>>,
    concrete_entry: bool,
    summaries: &HashMap<usize, TreeSummary<'a>>,
    success_extra: &mut Vec<VarKey>,
    requires: &mut HashSet<VarKey>,
    diags: &mut DiagnosticBag,
) {
    for arg in &call.args {
        match arg.direction {
            ArgDirection::Value | ArgDirection::Ref | ArgDirection::Mut => {
                if let Some(v) = arg.value {
                    check_reads(v, state, globals, concrete_entry, diags);
                }
            }
            ArgDirection::Out => {
                if arg.inline_decl.is_none() {
                    if let Some(v) = arg.value {
                        check_index_subreads(v, state, globals, concrete_entry, diags);
                    }
                }
            }
        }
    }

    match call.resolved_node.get() {
        Some(Symbol::Tree(target)) => {
            let tkey = *target as *const _ as usize;
            if let Some(summary) = summaries.get(&tkey) {
                for &g in &summary.requires_init {
                    let cur = state
                        .get(&g)
                        .copied()
                        .unwrap_or_else(|| global_default(globals, g, concrete_entry));
                    match cur {
                        InitState::Uninit => {
                            let gname = globals.get(&g).map(|d| d.name.as_str()).unwrap_or("?");
                            diags.emit(Diagnostic::error(
                                Category::Safety,
                                error_codes::SAFETY_UNINITIALIZED,
                                format!(
                                    "calling `{}` requires `{}` to already be initialized",
                                    target.name, gname
                                ),
                                call.range,
                            ));
                        }
                        InitState::Unknown => {
                            requires.insert(g);
                        }
                        InitState::Init => {}
                    }
                }
                for g in &summary.guarantees_init {
                    state.insert(*g, InitState::Init);
                }
                for arg in &call.args {
                    if arg.direction == ArgDirection::Out && summary.guarantees_out_params.contains(&arg.port_name) {
                        if let Some(key) = out_arg_target_key(arg) {
                            success_extra.push(key);
                        }
                    }
                }
            }
            // No summary available (cross-module callee not yet analyzed
            // in this compilation): conservatively assume nothing is
            // guaranteed, matching spec.md §4.7's "summaries are
            // conservative (must-initialize only)".
        }
        _ => {
            for arg in &call.args {
                if arg.direction == ArgDirection::Out {
                    if let Some(key) = out_arg_target_key(arg) {
                        success_extra.push(key);
                    }
                }
            }
        }
    }
}

fn incoming_edges<'a>(cfg: &Cfg<'a>) -> Vec<Vec<(usize, EdgeCond<'a>)>> {
    let mut inc = vec![Vec::new(); cfg.blocks.len()];
    for (from, block) in cfg.blocks.iter().enumerate() {
        for edge in &block.succs {
            inc[edge.to].push((from, edge.cond));
        }
    }
    inc
}

fn analyze_tree<'a>(
    tree: &'a TreeDecl<'a>,
    cfg: &Cfg<'a>,
    concrete_entry: bool,
    globals: &HashMap<VarKey, &GlobalVarDecl<'a>>,
    summaries: &HashMap<usize, TreeSummary<'a>>,
    diags: &mut DiagnosticBag,
) -> TreeSummary<'a> {
    let incoming = incoming_edges(cfg);
    let order = cfg.reverse_postorder();
    let mut out_state: HashMap<usize, StateMap> = HashMap::new();
    let mut success_extra_by_block: HashMap<usize, Vec<VarKey>> = HashMap::new();
    let mut requires_init: HashSet<VarKey> = HashSet::new();

    for &b in &order {
        let in_map = if incoming[b].is_empty() {
            StateMap::new()
        } else {
            let mut acc: Option<StateMap> = None;
            for &(from, cond) in &incoming[b] {
                let Some(base) = out_state.get(&from) else {
                    continue;
                };
                let contribution = if let EdgeCond::OnCallSuccess = cond {
                    let mut m = base.clone();
                    if let Some(extra) = success_extra_by_block.get(&from) {
                        for &k in extra {
                            m.insert(k, InitState::Init);
                        }
                    }
                    m
                } else {
                    base.clone()
                };
                acc = Some(match acc {
                    None => contribution,
                    Some(prev) => meet_maps(&prev, &contribution, globals, concrete_entry, &sym_kinds),
                });
            }
            acc.unwrap_or_default()
        };

        let (out_map, extra, reqs) = block_transfer(cfg, b, &in_map, concrete_entry, globals, summaries, diags);
        requires_init.extend(reqs);
        out_state.insert(b, out_map);
        success_extra_by_block.insert(b, extra);
    }

    let success_state = out_state.get(&cfg.success_exit).cloned().unwrap_or_default();

    let mut guarantees_init = HashSet::new();
    for &key in globals.keys() {
        let v = success_state
            .get(&key)
            .copied()
            .unwrap_or_else(|| global_default(globals, key, concrete_entry));
        if v == InitState::Init {
            guarantees_init.insert(key);
        }
    }

    let mut guarantees_out_params = HashSet::new();
    for p in &tree.params {
        if p.direction == Direction::Out {
            let key = *p as *const ParameterDecl<'_> as usize;
            let v = success_state.get(&key).copied().unwrap_or(InitState::Uninit);
            if v == InitState::Init {
                guarantees_out_params.insert(p.name.clone());
            }
        }
    }

    TreeSummary {
        requires_init,
        guarantees_init,
        guarantees_out_params,
        _marker: std::marker::PhantomData,
    }
}

fn tree_key(tree: &TreeDecl<'_>) -> usize {
    tree as *const _ as usize
}

fn call_targets_in_set<'a>(tree: &'a TreeDecl<'a>, cfg: &Cfg<'a>, set: &HashSet<usize>) -> Vec<&'a TreeDecl<'a>> {
    let mut out = Vec::new();
    for block in &cfg.blocks {
        for action in &block.actions {
            if let Action::NodeCall(call) = action {
                if let Some(Symbol::Tree(target)) = call.resolved_node.get() {
                    if set.contains(&tree_key(target)) {
                        out.push(*target);
                    }
                }
            }
        }
    }
    let _ = tree;
    out
}

fn topo_order<'a>(trees: &[&'a TreeDecl<'a>], cfgs: &HashMap<usize, Cfg<'a>>) -> Vec<&'a TreeDecl<'a>> {
    let set: HashSet<usize> = trees.iter().map(|t| tree_key(t)).collect();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut order = Vec::new();
    for &t in trees {
        dfs_postorder(t, &set, cfgs, &mut visited, &mut order);
    }
    order
}

fn dfs_postorder<'a>(
    t: &'a TreeDecl<'a>,
    set: &HashSet<usize>,
    cfgs: &HashMap<usize, Cfg<'a>>,
    visited: &mut HashSet<usize>,
    order: &mut Vec<&'a TreeDecl<'a>>,
) {
    let key = tree_key(t);
    if !visited.insert(key) {
        return;
    }
    if let Some(cfg) = cfgs.get(&key) {
        for target in call_targets_in_set(t, cfg, set) {
            dfs_postorder(target, set, cfgs, visited, order);
        }
    }
    order.push(t);
}

/// Runs initialization-safety checking over every tree in `program`.
/// `entry_tree`, if given, is analyzed with no-initializer globals
/// starting `Uninit` rather than `Unknown` (spec.md §9's "verify the
/// entry-tree with concrete global initializers": unlike a subtree,
/// nothing could have set the entry tree's globals before it runs).
/// `external_summaries` lets a caller feed in summaries for trees defined
/// in other modules (imported subtrees); trees with no summary available
/// are treated conservatively — no guaranteed writes assumed for their
/// `out` ports (spec.md §4.7's "summaries are conservative"). Returns the
/// summaries computed for every tree in `program`, for a caller
/// (eventually `bt-dsl-driver`) to pass along when checking callers in
/// other modules.
pub fn check<'a>(
    program: &'a Program<'a>,
    entry_tree: Option<&'a TreeDecl<'a>>,
    external_summaries: &HashMap<usize, TreeSummary<'a>>,
    diags: &mut DiagnosticBag,
) -> HashMap<usize, TreeSummary<'a>> {
    let mut globals: HashMap<VarKey, &'a GlobalVarDecl<'a>> = HashMap::new();
    for decl in &program.items {
        if let Decl::GlobalVar(d) = decl {
            globals.insert(*d as *const _ as usize, d);
        }
    }

    let trees: Vec<&'a TreeDecl<'a>> = program
        .items
        .iter()
        .filter_map(|d| if let Decl::Tree(t) = d { Some(*t) } else { None })
        .collect();

    let cfgs: HashMap<usize, Cfg<'a>> = trees.iter().map(|t| (tree_key(t), build_tree_cfg(t))).collect();
    let order = topo_order(&trees, &cfgs);

    let mut summaries = external_summaries.clone();
    for tree in order {
        let key = tree_key(tree);
        let is_entry = entry_tree.map(tree_key) == Some(key);
        let cfg = &cfgs[&key];
        let summary = analyze_tree(tree, cfg, is_entry, &globals, &summaries, diags);
        summaries.insert(key, summary);
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    fn run(source: &str, entry_name: Option<&str>) -> DiagnosticBag {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (program, mut diags) = parse_source(source, &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let type_ctx = bt_dsl_ast::TypeContext::new(&type_arena);
        let mut ev = crate::const_eval::Evaluator::new();
        let mut checker = crate::type_checker::Checker::new(&type_ctx, &arena, &mut ev);
        checker.check_program(program, &mut diags);

        let entry_tree = entry_name.and_then(|n| {
            program.items.iter().find_map(|d| match d {
                Decl::Tree(t) if t.name == n => Some(*t),
                _ => None,
            })
        });
        check(program, entry_tree, &HashMap::new(), &mut diags);
        diags
    }

    #[test]
    fn reading_uninitialized_local_is_an_error() {
        let diags = run(
            "extern action Use(in x: int32); tree Main() { var x: int32; Use(x: x); }",
            Some("Main"),
        );
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_UNINITIALIZED));
    }

    #[test]
    fn initialized_local_is_accepted() {
        let diags = run(
            "extern action Use(in x: int32); tree Main() { var x: int32 = 1; Use(x: x); }",
            Some("Main"),
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_UNINITIALIZED));
    }

    #[test]
    fn out_argument_initializes_on_success_path() {
        let diags = run(
            "extern action Produce(out v: int32); extern action Use(in v: int32);\n\
             tree Main() { Produce(v: out var v); Use(v: v); }",
            Some("Main"),
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_UNINITIALIZED));
    }

    #[test]
    fn entry_tree_global_without_initializer_is_uninit() {
        let diags = run(
            "var g: int32; extern action Use(in v: int32); tree Main() { Use(v: g); }",
            Some("Main"),
        );
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_UNINITIALIZED));
    }

    #[test]
    fn non_entry_tree_global_without_initializer_is_unknown_not_an_error() {
        let diags = run(
            "var g: int32; extern action Use(in v: int32); tree Main() { Use(v: g); }",
            None,
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_UNINITIALIZED));
    }
}
