//! Bidirectional type checker (spec.md §4.5). Runs after the resolver and
//! constant evaluator: every expression is either *synthesized* (its type
//! is computed bottom-up) or *checked* against an expected type (letting
//! integer/float/null literals default against context), and every node
//! call's arguments are bound against the callee's ports/parameters.

use bt_dsl_ast::{
    ArgDirection, ArrayKind, AstArena, BinaryOp, Decl, Direction, Expr, ExternNodeDecl,
    ExternPort, NodeCallStmt, ParameterDecl, Program, SemanticType, Stmt, Symbol, TreeDecl,
    TypeContext, TypeNode, UnaryOp,
};
use bt_dsl_diagnostics::{error_codes, ByteRange, Category, Diagnostic, DiagnosticBag};
use std::collections::{HashMap, HashSet};

use crate::const_eval::Evaluator;
use crate::type_realize::realize_type;

pub struct Checker<'a, 'm> {
    pub tctx: &'m TypeContext<'a>,
    pub arena: &'a AstArena<'a>,
    pub ev: &'m mut Evaluator,
    /// Types inferred for `out var` block variables, keyed by the arena
    /// address of their `InlineBlackboardDecl` (which carries no type
    /// annotation of its own — its type comes from whichever port it was
    /// bound to the first time it's used as an `out` argument). Exposed
    /// read-only after checking for the safety checkers, which need the
    /// same lookup and have no other way to recover it.
    pub block_var_types: HashMap<usize, &'a SemanticType<'a>>,
}

impl<'a, 'm> Checker<'a, 'm> {
    pub fn new(tctx: &'m TypeContext<'a>, arena: &'a AstArena<'a>, ev: &'m mut Evaluator) -> Self {
        Self {
            tctx,
            arena,
            ev,
            block_var_types: HashMap::new(),
        }
    }

    pub fn check_program(&mut self, program: &'a Program<'a>, diags: &mut DiagnosticBag) {
        for decl in &program.items {
            match decl {
                Decl::GlobalVar(d) => {
                    let declared = d.type_ann.map(|t| realize_type(t, self.tctx, self.arena, self.ev, diags));
                    let ty = match (declared, d.init) {
                        (Some(decl_ty), Some(init)) => {
                            self.check_expr(init, decl_ty, diags);
                            decl_ty
                        }
                        (Some(decl_ty), None) => decl_ty,
                        (None, Some(init)) => self.synth_expr(init, diags),
                        (None, None) => self.tctx.unknown,
                    };
                    d.resolved_type.set(Some(ty));
                }
                Decl::GlobalConst(d) => {
                    let declared = d.type_ann.map(|t| realize_type(t, self.tctx, self.arena, self.ev, diags));
                    let ty = match declared {
                        Some(decl_ty) => {
                            self.check_expr(d.init, decl_ty, diags);
                            decl_ty
                        }
                        None => self.synth_expr(d.init, diags),
                    };
                    d.resolved_type.set(Some(ty));
                }
                Decl::ExternNode(d) => self.check_extern_node(d, diags),
                Decl::Tree(tree) => self.check_tree(tree, diags),
                Decl::ExternType(_) | Decl::TypeAlias(_) | Decl::Import(_) => {}
            }
        }
    }

    fn check_extern_node(&mut self, d: &'a ExternNodeDecl<'a>, diags: &mut DiagnosticBag) {
        for port in &d.ports {
            let ty = realize_type(port.type_ann, self.tctx, self.arena, self.ev, diags);
            port.resolved_type.set(Some(ty));
            if let Some(def) = port.default {
                self.check_expr(def, ty, diags);
            }
        }
    }

    fn check_tree(&mut self, tree: &'a TreeDecl<'a>, diags: &mut DiagnosticBag) {
        for p in &tree.params {
            let ty = realize_type(p.type_ann, self.tctx, self.arena, self.ev, diags);
            p.resolved_type.set(Some(ty));
            if let Some(def) = p.default {
                self.check_expr(def, ty, diags);
            }
        }
        let mut written: HashSet<String> = HashSet::new();
        self.check_stmt_list(&tree.body, &mut written, diags);
        for p in &tree.params {
            let writable = !matches!(p.direction, Direction::In);
            if writable && !written.contains(&p.name) && !p.name.starts_with('_') {
                diags.emit(Diagnostic::warning(
                    Category::Type,
                    error_codes::TYPE_UNUSED_WRITABLE_PARAM,
                    format!("parameter '{}' is writable but never written", p.name),
                    p.range,
                ));
            }
        }
    }

    fn check_stmt_list(
        &mut self,
        stmts: &[&'a Stmt<'a>],
        written: &mut HashSet<String>,
        diags: &mut DiagnosticBag,
    ) {
        for stmt in stmts {
            match stmt {
                Stmt::BlackboardVarDecl(d) => {
                    let declared = d.type_ann.map(|t| realize_type(t, self.tctx, self.arena, self.ev, diags));
                    let ty = match (declared, d.init) {
                        (Some(dt), Some(init)) => {
                            self.check_expr(init, dt, diags);
                            dt
                        }
                        (Some(dt), None) => dt,
                        (None, Some(init)) => self.synth_expr(init, diags),
                        (None, None) => self.tctx.unknown,
                    };
                    d.resolved_type.set(Some(ty));
                }
                Stmt::LocalConstDecl(d) => {
                    let declared = d.type_ann.map(|t| realize_type(t, self.tctx, self.arena, self.ev, diags));
                    let ty = match declared {
                        Some(dt) => {
                            self.check_expr(d.init, dt, diags);
                            dt
                        }
                        None => self.synth_expr(d.init, diags),
                    };
                    d.resolved_type.set(Some(ty));
                }
                Stmt::Assignment(a) => {
                    let target_ty = self.synth_expr(a.target, diags);
                    if let Some(v) = a.target.lvalue_root() {
                        if let Some(sym) = v.resolved_symbol.get() {
                            if !sym.is_writable() {
                                diags.emit(Diagnostic::error(
                                    Category::Type,
                                    error_codes::TYPE_NOT_WRITABLE,
                                    format!("'{}' is not writable", sym.name()),
                                    a.target.range(),
                                ));
                            } else {
                                written.insert(sym.name().to_string());
                            }
                        }
                    } else {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_NOT_WRITABLE,
                            "assignment target must be a variable or an index into one",
                            a.target.range(),
                        ));
                    }
                    // Compound ops (`+=` etc.) desugar to `target = target OP value`;
                    // either way the RHS is checked against the target's type.
                    self.check_expr(a.value, target_ty, diags);
                }
                Stmt::NodeCall(call) => self.check_node_call(call, written, diags),
            }
        }
    }

    fn check_node_call(
        &mut self,
        call: &'a NodeCallStmt<'a>,
        written: &mut HashSet<String>,
        diags: &mut DiagnosticBag,
    ) {
        for p in &call.preconditions {
            self.check_expr(p.expr, self.tctx.bool_, diags);
        }
        let ports = match call.resolved_node.get() {
            Some(Symbol::ExternNode(n)) => ports_from_extern(n),
            Some(Symbol::Tree(t)) => ports_from_tree(t),
            _ => Vec::new(),
        };
        if call.resolved_node.get().is_some() {
            self.bind_arguments(&ports, call, written, diags);
        }
        if let Some(children) = &call.children {
            self.check_stmt_list(children, written, diags);
        }
    }

    fn bind_arguments(
        &mut self,
        ports: &[PortLike<'a>],
        call: &'a NodeCallStmt<'a>,
        written: &mut HashSet<String>,
        diags: &mut DiagnosticBag,
    ) {
        let mut bound: Vec<bool> = vec![false; ports.len()];
        let mut next_positional = 0usize;

        for arg in &call.args {
            let port_ix = if arg.port_name.is_empty() {
                let ix = (next_positional..ports.len()).find(|&i| !bound[i]);
                match ix {
                    Some(i) => {
                        next_positional = i + 1;
                        Some(i)
                    }
                    None => {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_POSITIONAL_ARG,
                            "too many positional arguments for this node call",
                            arg.range,
                        ));
                        None
                    }
                }
            } else {
                match ports.iter().position(|p| p.name == arg.port_name) {
                    Some(i) => Some(i),
                    None => {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_UNKNOWN_PORT,
                            format!("'{}' has no port named '{}'", call.name, arg.port_name),
                            arg.range,
                        ));
                        None
                    }
                }
            };
            let Some(ix) = port_ix else { continue };
            bound[ix] = true;
            let port = &ports[ix];

            let direction_ok = match (arg.direction, port.direction) {
                (ArgDirection::Value, Direction::In) => true,
                (ArgDirection::Ref, Direction::Ref) => true,
                (ArgDirection::Mut, Direction::Mut) => true,
                (ArgDirection::Out, Direction::Out) => true,
                _ => false,
            };
            if !direction_ok {
                diags.emit(Diagnostic::error(
                    Category::Type,
                    error_codes::TYPE_DIRECTION_MISMATCH,
                    format!(
                        "port '{}' expects {:?} but argument is {:?}",
                        port.name, port.direction, arg.direction
                    ),
                    arg.range,
                ));
                continue;
            }

            match arg.direction {
                ArgDirection::Value => {
                    if let Some(v) = arg.value {
                        self.check_expr(v, port.ty, diags);
                    }
                }
                ArgDirection::Ref | ArgDirection::Mut => {
                    if let Some(v) = arg.value {
                        let var_ty = self.synth_expr(v, diags);
                        if !self.tctx.assignable(port.ty, var_ty) {
                            diags.emit(mismatch(port.ty, var_ty, v.range()));
                        }
                        if arg.direction == ArgDirection::Mut {
                            if let Some(root) = v.lvalue_root() {
                                match root.resolved_symbol.get() {
                                    Some(sym) if sym.is_writable() => {
                                        written.insert(sym.name().to_string());
                                    }
                                    Some(sym) => diags.emit(Diagnostic::error(
                                        Category::Type,
                                        error_codes::TYPE_NOT_WRITABLE,
                                        format!("'{}' is not writable", sym.name()),
                                        v.range(),
                                    )),
                                    None => {}
                                }
                            }
                        }
                    }
                }
                ArgDirection::Out => {
                    if let Some(inline) = arg.inline_decl {
                        self.block_var_types
                            .entry(inline as *const _ as usize)
                            .or_insert(port.ty);
                        if let Some(sym) = inline.resolved_symbol.get() {
                            written.insert(sym.name().to_string());
                        }
                    } else if let Some(v) = arg.value {
                        if let Some(root) = v.lvalue_root() {
                            match root.resolved_symbol.get() {
                                Some(sym) if sym.is_writable() => {
                                    written.insert(sym.name().to_string());
                                    let var_ty = self.synth_expr(v, diags);
                                    if !self.tctx.assignable(port.ty, var_ty) {
                                        diags.emit(mismatch(port.ty, var_ty, v.range()));
                                    }
                                }
                                Some(sym) => diags.emit(Diagnostic::error(
                                    Category::Type,
                                    error_codes::TYPE_NOT_WRITABLE,
                                    format!("'{}' is not writable", sym.name()),
                                    v.range(),
                                )),
                                None => {}
                            }
                        } else {
                            diags.emit(Diagnostic::error(
                                Category::Type,
                                error_codes::TYPE_NOT_WRITABLE,
                                "'out' argument must be a variable or 'out var' declaration",
                                v.range(),
                            ));
                        }
                    }
                }
            }
        }

        for (ix, port) in ports.iter().enumerate() {
            if !bound[ix] && port.default.is_none() && port.direction != Direction::Out {
                diags.emit(Diagnostic::error(
                    Category::Type,
                    error_codes::TYPE_MISSING_REQUIRED_PORT,
                    format!("missing required port '{}'", port.name),
                    call.range,
                ));
            }
        }
    }

    // ------------------------------------------------------------ exprs

    pub fn synth_expr(&mut self, expr: &'a Expr<'a>, diags: &mut DiagnosticBag) -> &'a SemanticType<'a> {
        if let Some(ty) = expr.resolved_type() {
            return ty;
        }
        let ty = match expr {
            Expr::IntLit(_) => self.tctx.int_literal,
            Expr::FloatLit(_) => self.tctx.float_literal,
            Expr::StringLit(_) => self.tctx.string,
            Expr::BoolLit(_) => self.tctx.bool_,
            Expr::NullLit(_) => self.tctx.null_literal,
            Expr::VarRef(v) => match v.resolved_symbol.get() {
                Some(sym) => self.symbol_type(sym, diags),
                None => self.tctx.error,
            },
            Expr::Unary(u) => {
                let operand = self.synth_expr(u.operand, diags);
                match u.op {
                    UnaryOp::Not if operand.is_bool() => operand,
                    UnaryOp::Neg if operand.is_numeric() => operand,
                    _ if operand.is_error() || operand.is_unknown() => operand,
                    _ => {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_MISMATCH,
                            "operand type does not support this unary operator",
                            u.operand.range(),
                        ));
                        self.tctx.error
                    }
                }
            }
            Expr::Binary(b) => self.synth_binary(b, diags),
            Expr::Cast(c) => {
                let _from = self.synth_expr(c.operand, diags);
                realize_type(c.target, self.tctx, self.arena, self.ev, diags)
            }
            Expr::Index(i) => {
                let base = self.synth_expr(i.base, diags);
                self.check_expr(i.index, self.tctx.int64, diags);
                match base.array_elem() {
                    Some(elem) => elem,
                    None if base.is_error() || base.is_unknown() => base,
                    None => {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_MISMATCH,
                            "indexing requires an array value",
                            i.base.range(),
                        ));
                        self.tctx.error
                    }
                }
            }
            Expr::ArrayLit(a) => {
                let mut elem_ty = self.tctx.unknown;
                for el in &a.elements {
                    elem_ty = self.synth_expr(el, diags);
                }
                self.tctx.static_array(elem_ty, ArrayKind::Exact, a.elements.len() as u64)
            }
            Expr::ArrayRepeat(a) => {
                let elem_ty = self.synth_expr(a.value, diags);
                self.check_expr(a.count, self.tctx.int64, diags);
                self.tctx.static_array(elem_ty, ArrayKind::Exact, 0)
            }
            Expr::VecMacro(v) => {
                let mut elem_ty = self.tctx.unknown;
                for el in &v.elements {
                    elem_ty = self.synth_expr(el, diags);
                }
                self.tctx.dynamic_array(elem_ty)
            }
        };
        expr.set_resolved_type(ty);
        ty
    }

    fn synth_binary(&mut self, b: &'a bt_dsl_ast::BinaryExpr<'a>, diags: &mut DiagnosticBag) -> &'a SemanticType<'a> {
        let lhs = self.synth_expr(b.lhs, diags);
        let rhs = self.synth_expr(b.rhs, diags);
        if lhs.is_error() || rhs.is_error() {
            return self.tctx.error;
        }
        if b.op.is_logical() {
            if lhs.is_bool() && rhs.is_bool() {
                return self.tctx.bool_;
            }
            diags.emit(mismatch(self.tctx.bool_, if lhs.is_bool() { rhs } else { lhs }, b.range));
            return self.tctx.error;
        }
        if b.op.is_comparison() {
            if self.tctx.assignable(lhs, rhs) || self.tctx.assignable(rhs, lhs) {
                return self.tctx.bool_;
            }
            diags.emit(mismatch(lhs, rhs, b.range));
            return self.tctx.error;
        }
        if b.op.is_bitwise() {
            if lhs.is_integer() && rhs.is_integer() {
                return if lhs.is_placeholder() { rhs } else { lhs };
            }
            diags.emit(mismatch(lhs, rhs, b.range));
            return self.tctx.error;
        }
        // Arithmetic: string `+` is concatenation, else numeric.
        if b.op == BinaryOp::Add && lhs.is_string() && rhs.is_string() {
            return self.tctx.string;
        }
        if lhs.is_numeric() && rhs.is_numeric() {
            return if lhs.is_placeholder() { rhs } else { lhs };
        }
        diags.emit(mismatch(lhs, rhs, b.range));
        self.tctx.error
    }

    /// Checks `expr` against `expected`, letting literal placeholder
    /// types default to it (spec.md §4.5's bidirectional "check" mode).
    pub fn check_expr(&mut self, expr: &'a Expr<'a>, expected: &'a SemanticType<'a>, diags: &mut DiagnosticBag) {
        match expr {
            Expr::NullLit(_) => {
                if !expected.is_nullable() && !expected.is_unknown() && !expected.is_error() {
                    diags.emit(Diagnostic::error(
                        Category::Type,
                        error_codes::TYPE_NULL_WITHOUT_CONTEXT,
                        "'null' requires a nullable expected type",
                        expr.range(),
                    ));
                }
                expr.set_resolved_type(expected);
            }
            Expr::ArrayLit(a) => {
                let elem_expected = expected.array_elem();
                for el in &a.elements {
                    match elem_expected {
                        Some(e) => self.check_expr(el, e, diags),
                        None => {
                            self.synth_expr(el, diags);
                        }
                    }
                }
                if let SemanticType::StaticArray { size, .. } = expected {
                    if *size != a.elements.len() as u64 {
                        diags.emit(Diagnostic::error(
                            Category::Type,
                            error_codes::TYPE_ARRAY_SIZE_MISMATCH,
                            format!("expected an array of length {size}, found {}", a.elements.len()),
                            expr.range(),
                        ));
                    }
                }
                expr.set_resolved_type(expected);
            }
            _ => {
                let actual = self.synth_expr(expr, diags);
                if !self.tctx.assignable(actual, expected) {
                    diags.emit(mismatch(expected, actual, expr.range()));
                }
            }
        }
    }

    fn symbol_type(&mut self, sym: &'a Symbol<'a>, diags: &mut DiagnosticBag) -> &'a SemanticType<'a> {
        match sym {
            Symbol::GlobalVariable(d) => d.resolved_type.get().unwrap_or_else(|| {
                let ty = d
                    .type_ann
                    .map(|t| realize_type(t, self.tctx, self.arena, self.ev, diags))
                    .unwrap_or(self.tctx.unknown);
                d.resolved_type.set(Some(ty));
                ty
            }),
            Symbol::GlobalConst(d) => d.resolved_type.get().unwrap_or(self.tctx.unknown),
            Symbol::Parameter(p) => p.resolved_type.get().unwrap_or_else(|| {
                let ty = realize_type(p.type_ann, self.tctx, self.arena, self.ev, diags);
                p.resolved_type.set(Some(ty));
                ty
            }),
            Symbol::LocalVariable(d) => d.resolved_type.get().unwrap_or(self.tctx.unknown),
            Symbol::BlockVariable(d) => self
                .block_var_types
                .get(&(d as *const _ as usize))
                .copied()
                .unwrap_or(self.tctx.unknown),
            Symbol::LocalConst(d) => d.resolved_type.get().unwrap_or(self.tctx.unknown),
            Symbol::BuiltinType { ty, .. } => ty,
            _ => self.tctx.unknown,
        }
    }
}

struct PortLike<'a> {
    name: &'a str,
    direction: Direction,
    ty: &'a SemanticType<'a>,
    default: Option<&'a Expr<'a>>,
}

// `ports_from_*` run after `check_extern_node`/`check_tree` have already
// realized every port/parameter type, so `resolved_type` is always
// populated by the time a caller binds arguments against it.

fn ports_from_extern<'a>(n: &'a ExternNodeDecl<'a>) -> Vec<PortLike<'a>> {
    n.ports
        .iter()
        .map(|p: &&'a ExternPort<'a>| PortLike {
            name: &p.name,
            direction: p.direction,
            ty: p.resolved_type.get().unwrap_or_else(unreachable_ty),
            default: p.default,
        })
        .collect()
}

fn ports_from_tree<'a>(t: &'a TreeDecl<'a>) -> Vec<PortLike<'a>> {
    t.params
        .iter()
        .map(|p: &&'a ParameterDecl<'a>| PortLike {
            name: &p.name,
            direction: p.direction,
            ty: p.resolved_type.get().unwrap_or_else(unreachable_ty),
            default: p.default,
        })
        .collect()
}

#[allow(clippy::panic)] // proven unreachable: ports/parameters are typed by resolve_types before this pass runs
fn unreachable_ty<'a>() -> &'a SemanticType<'a> {
    panic!("port/parameter type realized before use (checker ordering invariant violated)")
}

fn mismatch<'a>(expected: &'a SemanticType<'a>, actual: &'a SemanticType<'a>, range: ByteRange) -> Diagnostic {
    Diagnostic::error(
        Category::Type,
        error_codes::TYPE_MISMATCH,
        format!(
            "expected '{}', found '{}'",
            expected.surface_spelling(),
            actual.surface_spelling()
        ),
        range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_parser::parse_source;

    fn check(source: &str) -> DiagnosticBag {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (program, mut diags) = parse_source(source, &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let tctx = TypeContext::new(&type_arena);
        let mut ev = Evaluator::new();
        let mut checker = Checker::new(&tctx, &arena, &mut ev);
        checker.check_program(program, &mut diags);
        diags
    }

    #[test]
    fn literal_defaults_to_expected_numeric_type() {
        let diags = check("tree Main() { var x: float64 = 1; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn mismatched_types_reported() {
        let diags = check("tree Main() { var x: bool = 1; }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::TYPE_MISMATCH));
    }

    #[test]
    fn null_without_nullable_context_is_an_error() {
        let diags = check("tree Main() { var x: int32 = null; }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::TYPE_NULL_WITHOUT_CONTEXT));
    }

    #[test]
    fn null_with_nullable_context_is_accepted() {
        let diags = check("tree Main() { var x: int32? = null; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn const_cannot_be_assigned() {
        let diags = check("tree Main() { const x: int32 = 1; x = 2; }");
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::TYPE_NOT_WRITABLE));
    }
}
