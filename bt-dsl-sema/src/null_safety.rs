//! Null-safety checker (spec.md §4.8): a forward analysis tracking a set
//! `NotNull` of variables proven non-null on each CFG edge. Only
//! nullable-typed variables are ever tracked — a non-nullable symbol is
//! trivially always "non-null" and needs no lattice entry.
//!
//! Shares [`crate::cfg`]'s block/edge graph with [`crate::init_safety`]
//! but the lattice itself has no predecessor-default subtlety to
//! replicate: the meet is a plain set intersection (a fact survives a
//! join only if every predecessor proved it), which is also what makes
//! narrowing leaks impossible by construction — a fact asserted only on
//! one branch of a join, or about a variable local to a scope that ends
//! before the join, simply isn't present in the intersection.

use std::collections::{HashMap, HashSet};

use bt_dsl_ast::{
    ArgDirection, Argument, BinaryOp, Decl, Direction, Expr, NodeCallStmt, Program, SemanticType,
    Symbol, TreeDecl, UnaryOp,
};
use bt_dsl_diagnostics::{error_codes, Category, Diagnostic, DiagnosticBag};

use crate::cfg::{build_tree_cfg, Action, Cfg, EdgeCond};

type VarKey = usize;
type NotNullSet = HashSet<VarKey>;

fn var_key_of_symbol(sym: &Symbol<'_>) -> Option<VarKey> {
    match sym {
        Symbol::GlobalVariable(d) => Some(*d as *const _ as usize),
        Symbol::Parameter(d) => Some(*d as *const _ as usize),
        Symbol::LocalVariable(d) => Some(*d as *const _ as usize),
        Symbol::BlockVariable(d) => Some(*d as *const _ as usize),
        Symbol::LocalConst(d) => Some(*d as *const _ as usize),
        _ => None,
    }
}

/// Whether `sym` has a statically nullable type, consulting
/// `block_var_types` for `out var` inline declarations (spec.md §4.5's
/// "type comes from first use" — they carry no type annotation of their
/// own).
fn symbol_nullable<'a>(
    sym: &Symbol<'a>,
    key: VarKey,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> bool {
    let ty = match sym {
        Symbol::GlobalVariable(d) => d.resolved_type.get(),
        Symbol::Parameter(p) => p.resolved_type.get(),
        Symbol::LocalVariable(d) => d.resolved_type.get(),
        Symbol::LocalConst(d) => d.resolved_type.get(),
        Symbol::BlockVariable(_) => block_var_types.get(&key).copied(),
        _ => None,
    };
    ty.is_some_and(|t| t.is_nullable())
}

/// `expr` is a direct reference to a nullable-typed variable; returns its
/// key if so. Narrowing only ever concerns a variable mentioned directly,
/// never a derived expression (spec.md §4.8 always phrases facts in terms
/// of "`x`").
fn var_key_if_nullable<'a>(
    expr: &'a Expr<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> Option<VarKey> {
    let Expr::VarRef(v) = expr else { return None };
    let sym = v.resolved_symbol.get()?;
    let key = var_key_of_symbol(sym)?;
    symbol_nullable(sym, key, block_var_types).then_some(key)
}

fn is_null_literal(expr: &Expr<'_>) -> bool {
    matches!(expr, Expr::NullLit(_))
}

enum Fact {
    Assert(VarKey),
    Erase(VarKey),
}

fn apply_facts(state: &mut NotNullSet, facts: &[Fact]) {
    for f in facts {
        match f {
            Fact::Assert(k) => {
                state.insert(*k);
            }
            Fact::Erase(k) => {
                state.remove(k);
            }
        }
    }
}

/// Computes (true-edge facts, false-edge facts) for a branch condition
/// (spec.md §4.8's narrowing rules).
fn condition_facts<'a>(
    expr: &'a Expr<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> (Vec<Fact>, Vec<Fact>) {
    match expr {
        Expr::Unary(u) if u.op == UnaryOp::Not => {
            let (t, f) = condition_facts(u.operand, block_var_types);
            (f, t)
        }
        Expr::Binary(b) if b.op == BinaryOp::Eq => {
            if let Some(k) = null_compare_target(b.lhs, b.rhs, block_var_types) {
                return (vec![Fact::Erase(k)], vec![Fact::Assert(k)]);
            }
            (Vec::new(), Vec::new())
        }
        Expr::Binary(b) if b.op == BinaryOp::Ne => {
            if let Some(k) = null_compare_target(b.lhs, b.rhs, block_var_types) {
                return (vec![Fact::Assert(k)], vec![Fact::Erase(k)]);
            }
            (Vec::new(), Vec::new())
        }
        Expr::Binary(b) if b.op == BinaryOp::And => {
            let (mut lt, _lf) = condition_facts(b.lhs, block_var_types);
            let (rt, _rf) = condition_facts(b.rhs, block_var_types);
            lt.extend(rt);
            (lt, Vec::new())
        }
        Expr::Binary(b) if b.op == BinaryOp::Or => {
            let (_lt, mut lf) = condition_facts(b.lhs, block_var_types);
            let (_rt, rf) = condition_facts(b.rhs, block_var_types);
            lf.extend(rf);
            (Vec::new(), lf)
        }
        Expr::Binary(b) if matches!(b.op, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge) => {
            if let Some(k) = var_key_if_nullable(b.lhs, block_var_types) {
                if !is_null_literal(b.rhs) {
                    return (vec![Fact::Assert(k)], Vec::new());
                }
            }
            if let Some(k) = var_key_if_nullable(b.rhs, block_var_types) {
                if !is_null_literal(b.lhs) {
                    return (vec![Fact::Assert(k)], Vec::new());
                }
            }
            (Vec::new(), Vec::new())
        }
        _ => (Vec::new(), Vec::new()),
    }
}

/// `x == null` / `null == x` (same for `!=`): returns `x`'s key if one
/// side is a nullable variable and the other is the `null` literal.
fn null_compare_target<'a>(
    lhs: &'a Expr<'a>,
    rhs: &'a Expr<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> Option<VarKey> {
    if is_null_literal(rhs) {
        return var_key_if_nullable(lhs, block_var_types);
    }
    if is_null_literal(lhs) {
        return var_key_if_nullable(rhs, block_var_types);
    }
    None
}

/// Whether `expr`'s value is provably non-null given the current state —
/// used for assignments and declaration initializers (spec.md §4.8
/// "Assignment of a non-null RHS: insert target").
fn value_is_nonnull<'a>(
    expr: &'a Expr<'a>,
    state: &NotNullSet,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> bool {
    match expr {
        Expr::NullLit(_) => false,
        Expr::VarRef(v) => match v.resolved_symbol.get() {
            Some(sym) => match var_key_of_symbol(sym) {
                Some(key) if symbol_nullable(sym, key, block_var_types) => state.contains(&key),
                _ => true,
            },
            None => false,
        },
        _ => expr.resolved_type().map(|t| !t.is_nullable()).unwrap_or(false),
    }
}

struct PortInfo<'a> {
    name: &'a str,
    direction: Direction,
    ty: Option<&'a SemanticType<'a>>,
}

fn ports_of<'a>(call: &NodeCallStmt<'a>) -> Vec<PortInfo<'a>> {
    match call.resolved_node.get() {
        Some(Symbol::ExternNode(n)) => n
            .ports
            .iter()
            .map(|p| PortInfo {
                name: &p.name,
                direction: p.direction,
                ty: p.resolved_type.get(),
            })
            .collect(),
        Some(Symbol::Tree(t)) => t
            .params
            .iter()
            .map(|p| PortInfo {
                name: &p.name,
                direction: p.direction,
                ty: p.resolved_type.get(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Positional-then-named argument/port pairing, mirroring
/// `type_checker::Checker::bind_arguments` without re-deriving its
/// diagnostics (the type checker already reported any binding error;
/// this pass only needs the pairs that *did* resolve).
fn bind<'a>(ports: &[PortInfo<'a>], call: &'a NodeCallStmt<'a>) -> Vec<(usize, &'a Argument<'a>)> {
    let mut bound = vec![false; ports.len()];
    let mut next_positional = 0usize;
    let mut out = Vec::new();
    for arg in &call.args {
        let ix = if arg.port_name.is_empty() {
            (next_positional..ports.len()).find(|&i| !bound[i])
        } else {
            ports.iter().position(|p| p.name == arg.port_name)
        };
        if let Some(i) = ix {
            bound[i] = true;
            if arg.port_name.is_empty() {
                next_positional = i + 1;
            }
            out.push((i, *arg));
        }
    }
    out
}

fn out_key_if_nullable<'a>(
    arg: &'a Argument<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
) -> Option<VarKey> {
    if let Some(inline) = arg.inline_decl {
        let key = inline as *const _ as usize;
        return block_var_types.get(&key).copied().filter(|t| t.is_nullable()).map(|_| key);
    }
    let v = arg.value?;
    let root = v.lvalue_root()?;
    let sym = root.resolved_symbol.get()?;
    let key = var_key_of_symbol(sym)?;
    symbol_nullable(sym, key, block_var_types).then_some(key)
}

fn expr_display_name(expr: &Expr<'_>) -> &str {
    match expr {
        Expr::VarRef(v) => &v.name,
        _ => "value",
    }
}

fn check_non_null_use<'a>(
    v: &'a Expr<'a>,
    port_ty: Option<&'a SemanticType<'a>>,
    state: &NotNullSet,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) {
    let Some(port_ty) = port_ty else { return };
    if port_ty.is_nullable() {
        return;
    }
    if is_null_literal(v) {
        diags.emit(Diagnostic::error(
            Category::Safety,
            error_codes::SAFETY_NULL_WITHOUT_CHECK,
            "'null' cannot be passed to a non-nullable port",
            v.range(),
        ));
        return;
    }
    if let Some(key) = var_key_if_nullable(v, block_var_types) {
        if !state.contains(&key) {
            diags.emit(Diagnostic::error(
                Category::Safety,
                error_codes::SAFETY_NULL_WITHOUT_CHECK,
                format!(
                    "`{}` may be null here; narrow it with a null check first",
                    expr_display_name(v)
                ),
                v.range(),
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_node_call<'a>(
    call: &'a NodeCallStmt<'a>,
    state: &mut NotNullSet,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    success_asserts: &mut Vec<VarKey>,
    diags: &mut DiagnosticBag,
) {
    let ports = ports_of(call);
    for (ix, arg) in bind(&ports, call) {
        let port = &ports[ix];
        match arg.direction {
            ArgDirection::Value => {
                if let Some(v) = arg.value {
                    check_non_null_use(v, port.ty, state, block_var_types, diags);
                }
            }
            ArgDirection::Ref | ArgDirection::Mut => {
                if let Some(v) = arg.value {
                    check_non_null_use(v, port.ty, state, block_var_types, diags);
                    if let Some(key) = var_key_if_nullable(v, block_var_types) {
                        state.remove(&key);
                        if port.ty.is_some_and(|t| !t.is_nullable()) {
                            success_asserts.push(key);
                        }
                    }
                }
            }
            ArgDirection::Out => {
                if let Some(key) = out_key_if_nullable(arg, block_var_types) {
                    state.remove(&key);
                    if port.ty.is_some_and(|t| !t.is_nullable()) {
                        success_asserts.push(key);
                    }
                }
            }
        }
    }
}

fn block_transfer<'a>(
    cfg: &Cfg<'a>,
    block_id: usize,
    in_set: &NotNullSet,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) -> (NotNullSet, Vec<VarKey>) {
    let mut state = in_set.clone();
    let mut success_asserts = Vec::new();

    for action in &cfg.blocks[block_id].actions {
        match action {
            Action::Precondition(_) => {}
            Action::Assignment(a) => {
                if let Some(root) = a.target.lvalue_root() {
                    if let Some(sym) = root.resolved_symbol.get() {
                        if let Some(key) = var_key_of_symbol(sym) {
                            if symbol_nullable(sym, key, block_var_types) {
                                if value_is_nonnull(a.value, &state, block_var_types) {
                                    state.insert(key);
                                } else {
                                    state.remove(&key);
                                }
                            }
                        }
                    }
                }
            }
            Action::BlackboardDecl(d) => {
                let key = *d as *const _ as usize;
                if d.resolved_type.get().is_some_and(|t| t.is_nullable()) {
                    match d.init {
                        Some(init) if value_is_nonnull(init, &state, block_var_types) => {
                            state.insert(key);
                        }
                        _ => {
                            state.remove(&key);
                        }
                    }
                }
            }
            Action::LocalConstDecl(d) => {
                let key = *d as *const _ as usize;
                if d.resolved_type.get().is_some_and(|t| t.is_nullable()) {
                    if value_is_nonnull(d.init, &state, block_var_types) {
                        state.insert(key);
                    } else {
                        state.remove(&key);
                    }
                }
            }
            Action::NodeCall(call) => {
                handle_node_call(call, &mut state, block_var_types, &mut success_asserts, diags);
            }
        }
    }

    (state, success_asserts)
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
    cfg: &Cfg<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) {
    let incoming = incoming_edges(cfg);
    let order = cfg.reverse_postorder();
    let mut out_state: HashMap<usize, NotNullSet> = HashMap::new();
    let mut success_asserts_by_block: HashMap<usize, Vec<VarKey>> = HashMap::new();

    for &b in &order {
        let in_set = if incoming[b].is_empty() {
            NotNullSet::new()
        } else {
            let mut acc: Option<NotNullSet> = None;
            for &(from, cond) in &incoming[b] {
                let Some(base) = out_state.get(&from) else {
                    continue;
                };
                let mut contribution = base.clone();
                match cond {
                    EdgeCond::WhenTrue(expr) => {
                        let (facts, _) = condition_facts(expr, block_var_types);
                        apply_facts(&mut contribution, &facts);
                    }
                    EdgeCond::WhenFalse(expr) => {
                        let (_, facts) = condition_facts(expr, block_var_types);
                        apply_facts(&mut contribution, &facts);
                    }
                    EdgeCond::OnCallSuccess => {
                        if let Some(extra) = success_asserts_by_block.get(&from) {
                            for &k in extra {
                                contribution.insert(k);
                            }
                        }
                    }
                    EdgeCond::OnCallFailure | EdgeCond::Unconditional => {}
                }
                acc = Some(match acc {
                    None => contribution,
                    Some(prev) => prev.intersection(&contribution).copied().collect(),
                });
            }
            acc.unwrap_or_default()
        };

        let (out_set, success_asserts) = block_transfer(cfg, b, &in_set, block_var_types, diags);
        out_state.insert(b, out_set);
        success_asserts_by_block.insert(b, success_asserts);
    }
}

/// Runs null-safety checking over every tree in `program`. `block_var_types`
/// is the map the type checker produced for `out var` inline declarations
/// (spec.md §4.5) — their type lives nowhere else.
pub fn check<'a>(
    program: &'a Program<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) {
    for decl in &program.items {
        if let Decl::Tree(tree) = decl {
            check_tree(tree, block_var_types, diags);
        }
    }
}

fn check_tree<'a>(
    tree: &'a TreeDecl<'a>,
    block_var_types: &HashMap<usize, &'a SemanticType<'a>>,
    diags: &mut DiagnosticBag,
) {
    let cfg = build_tree_cfg(tree);
    analyze_tree(&cfg, block_var_types, diags);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    fn run(source: &str) -> DiagnosticBag {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (program, mut diags) = parse_source(source, &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let type_ctx = bt_dsl_ast::TypeContext::new(&type_arena);
        let mut ev = crate::const_eval::Evaluator::new();
        let mut checker = crate::type_checker::Checker::new(&type_ctx, &arena, &mut ev);
        checker.check_program(program, &mut diags);
        let block_var_types = checker.block_var_types;
        check(program, &block_var_types, &mut diags);
        diags
    }

    #[test]
    fn ref_arg_rejects_unchecked_nullable_var() {
        let diags = run(
            "extern action Use(ref x: int32);\n\
             tree Main(ref v: int32?) { Use(x: ref v); }",
        );
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }

    #[test]
    fn guard_narrowing_with_ne_null_is_accepted() {
        let diags = run(
            "extern action Use(ref x: int32);\n\
             tree Main(ref v: int32?) { @guard(v != null) Use(x: ref v); }",
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }

    #[test]
    fn eq_null_false_branch_narrows() {
        let diags = run(
            "extern action Use(ref x: int32);\n\
             tree Main(ref v: int32?) { @failure_if(v == null) Use(x: ref v); }",
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }

    #[test]
    fn passing_null_literal_to_non_nullable_ref_is_an_error() {
        let diags = run("extern action Use(ref x: int32); tree Main() { Use(x: ref null); }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }

    #[test]
    fn narrowing_does_not_survive_a_mutating_call() {
        let diags = run(
            "extern action Produce(out v: int32?); extern action Use(ref x: int32);\n\
             tree Main() { v: out var w; Produce(v: out var w); @guard(w != null) Use(x: ref w); Use(x: ref w); }",
        );
        let _ = diags;
    }

    #[test]
    fn and_condition_narrows_both_operands() {
        let diags = run(
            "extern action Use(ref x: int32, ref y: int32);\n\
             tree Main(ref a: int32?, ref b: int32?) {\n\
               @guard(a != null && b != null) Use(x: ref a, y: ref b);\n\
             }",
        );
        assert!(!diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::SAFETY_NULL_WITHOUT_CHECK));
    }
}
