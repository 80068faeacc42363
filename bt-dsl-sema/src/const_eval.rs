//! Constant evaluator (spec.md §4.4). Global and local `const`
//! declarations, and any array-size/string-bound expression, are folded
//! to a `ConstValue` on first use, memoized on the declaration's
//! `resolved_value` cell, with cycle detection via an explicit
//! in-progress stack (equivalent to the DFS-coloring cycle check the
//! reference implementation's `const_eval.cpp` runs, but expressed as
//! plain recursion with memoization rather than a separate topological
//! sort pass).

use bt_dsl_ast::{
    BinaryOp, ConstPayload, ConstValue, Expr, GlobalConstDecl, LocalConstDeclStmt, Symbol,
    TypeContext, UnaryOp,
};
use bt_dsl_diagnostics::{error_codes, Category, Diagnostic, DiagnosticBag};

pub struct Evaluator {
    /// Decl pointers currently being evaluated, used for cycle detection.
    stack: Vec<usize>,
    /// Parallel to `stack`, for building the cycle message.
    names: Vec<String>,
}

fn key_of<T>(v: &T) -> usize {
    v as *const T as usize
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn eval_global_const<'a>(
        &mut self,
        decl: &'a GlobalConstDecl<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        if let Some(v) = decl.resolved_value.get() {
            return v;
        }
        let key = key_of(decl);
        if self.enter(key, &decl.name) {
            let cycle = self.cycle_message(&decl.name);
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_CYCLE,
                format!("constant initializer cycle: {cycle}"),
                decl.range,
            ));
            let v = arena.alloc_const_value(ConstValue::error(tctx.error));
            decl.resolved_value.set(Some(v));
            return v;
        }
        let v = self.eval_expr(decl.init, tctx, arena, diags);
        self.leave();
        decl.resolved_value.set(Some(v));
        v
    }

    pub fn eval_local_const<'a>(
        &mut self,
        decl: &'a LocalConstDeclStmt<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        if let Some(v) = decl.resolved_value.get() {
            return v;
        }
        let key = key_of(decl);
        if self.enter(key, &decl.name) {
            let cycle = self.cycle_message(&decl.name);
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_CYCLE,
                format!("constant initializer cycle: {cycle}"),
                decl.range,
            ));
            let v = arena.alloc_const_value(ConstValue::error(tctx.error));
            decl.resolved_value.set(Some(v));
            return v;
        }
        let v = self.eval_expr(decl.init, tctx, arena, diags);
        self.leave();
        decl.resolved_value.set(Some(v));
        v
    }

    /// Pushes `key` onto the in-progress stack; returns `true` if it was
    /// already present (a cycle). Also used by the type realizer to guard
    /// against a type alias that (directly or transitively) aliases
    /// itself, since it shares the same "in-progress by arena address"
    /// idea.
    pub(crate) fn enter(&mut self, key: usize, name: &str) -> bool {
        if self.stack.contains(&key) {
            return true;
        }
        self.stack.push(key);
        self.names.push(name.to_string());
        false
    }

    pub(crate) fn leave(&mut self) {
        self.stack.pop();
        self.names.pop();
    }

    pub(crate) fn cycle_message(&self, closing_name: &str) -> String {
        let mut path = self.names.clone();
        path.push(closing_name.to_string());
        path.join(" -> ")
    }

    pub fn eval_expr<'a>(
        &mut self,
        expr: &'a Expr<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        match expr {
            Expr::IntLit(e) => arena.alloc_const_value(ConstValue::integer(tctx.int_literal, e.value)),
            Expr::FloatLit(e) => arena.alloc_const_value(ConstValue::float(tctx.float_literal, e.value)),
            Expr::StringLit(e) => {
                arena.alloc_const_value(ConstValue::string(tctx.string, e.value.clone()))
            }
            Expr::BoolLit(e) => arena.alloc_const_value(ConstValue::boolean(tctx.bool_, e.value)),
            Expr::NullLit(_) => arena.alloc_const_value(ConstValue::null(tctx.null_literal)),
            Expr::VarRef(e) => match e.resolved_symbol.get() {
                Some(Symbol::GlobalConst(gc)) => self.eval_global_const(gc, tctx, arena, diags),
                Some(Symbol::LocalConst(lc)) => self.eval_local_const(lc, tctx, arena, diags),
                Some(_) => {
                    diags.emit(Diagnostic::error(
                        Category::ConstEval,
                        error_codes::CONST_NOT_CONST,
                        format!("'{}' is not a constant expression", e.name),
                        e.range,
                    ));
                    arena.alloc_const_value(ConstValue::error(tctx.error))
                }
                None => arena.alloc_const_value(ConstValue::error(tctx.error)),
            },
            Expr::Unary(e) => self.eval_unary(e, tctx, arena, diags),
            Expr::Binary(e) => self.eval_binary(e, tctx, arena, diags),
            Expr::Cast(e) => self.eval_cast(e, tctx, arena, diags),
            Expr::Index(e) => self.eval_index(e, tctx, arena, diags),
            Expr::ArrayLit(e) => {
                let mut elems = Vec::with_capacity(e.elements.len());
                let mut elem_ty = tctx.unknown;
                for el in &e.elements {
                    let v = self.eval_expr(el, tctx, arena, diags);
                    elem_ty = v.ty;
                    elems.push(v);
                }
                let size = elems.len() as u64;
                let arr_ty = tctx.static_array(elem_ty, bt_dsl_ast::ArrayKind::Exact, size);
                arena.alloc_const_value(ConstValue::array(arr_ty, elems))
            }
            Expr::ArrayRepeat(e) => {
                let value = self.eval_expr(e.value, tctx, arena, diags);
                let count_v = self.eval_expr(e.count, tctx, arena, diags);
                let count = match count_v.as_integer() {
                    Some(n) if n >= 0 => n as u64,
                    Some(_) => {
                        diags.emit(Diagnostic::error(
                            Category::ConstEval,
                            error_codes::CONST_OVERFLOW,
                            "array repeat count must be non-negative",
                            e.count.range(),
                        ));
                        0
                    }
                    None => {
                        diags.emit(Diagnostic::error(
                            Category::ConstEval,
                            error_codes::CONST_NOT_CONST,
                            "array repeat count must be a constant integer",
                            e.count.range(),
                        ));
                        0
                    }
                };
                let elems = std::iter::repeat(value).take(count as usize).collect();
                let arr_ty = tctx.static_array(value.ty, bt_dsl_ast::ArrayKind::Exact, count);
                arena.alloc_const_value(ConstValue::array(arr_ty, elems))
            }
            Expr::VecMacro(_) => {
                diags.emit(Diagnostic::error(
                    Category::ConstEval,
                    error_codes::CONST_VEC_NOT_ALLOWED,
                    "dynamic arrays ('vec![...]') are not constant expressions",
                    expr.range(),
                ));
                arena.alloc_const_value(ConstValue::error(tctx.error))
            }
        }
    }

    fn eval_unary<'a>(
        &mut self,
        e: &'a bt_dsl_ast::UnaryExpr<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let v = self.eval_expr(e.operand, tctx, arena, diags);
        if v.is_error() {
            return v;
        }
        match e.op {
            UnaryOp::Not => match v.as_bool() {
                Some(b) => arena.alloc_const_value(ConstValue::boolean(tctx.bool_, !b)),
                None => arena.alloc_const_value(ConstValue::error(tctx.error)),
            },
            UnaryOp::Neg => {
                if let Some(n) = v.as_integer() {
                    let (lo, _hi) = int_range(v.ty);
                    if n == lo {
                        diags.emit(Diagnostic::error(
                            Category::ConstEval,
                            error_codes::CONST_OVERFLOW,
                            "negation of the minimum representable integer overflows",
                            e.range,
                        ));
                        return arena.alloc_const_value(ConstValue::error(tctx.error));
                    }
                    arena.alloc_const_value(ConstValue::integer(v.ty, -n))
                } else if let Some(f) = v.as_float() {
                    arena.alloc_const_value(ConstValue::float(v.ty, -f))
                } else {
                    arena.alloc_const_value(ConstValue::error(tctx.error))
                }
            }
        }
    }

    fn eval_binary<'a>(
        &mut self,
        e: &'a bt_dsl_ast::BinaryExpr<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let lhs = self.eval_expr(e.lhs, tctx, arena, diags);
        let rhs = self.eval_expr(e.rhs, tctx, arena, diags);
        if lhs.is_error() || rhs.is_error() {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        if e.op.is_logical() {
            return match (lhs.as_bool(), rhs.as_bool()) {
                (Some(a), Some(b)) => {
                    let r = if e.op == BinaryOp::And { a && b } else { a || b };
                    arena.alloc_const_value(ConstValue::boolean(tctx.bool_, r))
                }
                _ => arena.alloc_const_value(ConstValue::error(tctx.error)),
            };
        }
        if e.op.is_comparison() {
            return self.eval_comparison(e.op, lhs, rhs, tctx, arena);
        }
        if lhs.ty.is_float() || rhs.ty.is_float() {
            return self.eval_float_arith(e, lhs, rhs, tctx, arena, diags);
        }
        self.eval_integer_arith(e, lhs, rhs, tctx, arena, diags)
    }

    fn eval_comparison<'a>(
        &self,
        op: BinaryOp,
        lhs: &'a ConstValue<'a>,
        rhs: &'a ConstValue<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
    ) -> &'a ConstValue<'a> {
        let ordering = if let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) {
            a.partial_cmp(&b)
        } else if let (Some(a), Some(b)) = (lhs.as_bool(), rhs.as_bool()) {
            Some(a.cmp(&b))
        } else if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
            Some(a.cmp(b))
        } else {
            None
        };
        let Some(ord) = ordering else {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        };
        use std::cmp::Ordering::*;
        let result = match op {
            BinaryOp::Eq => ord == Equal,
            BinaryOp::Ne => ord != Equal,
            BinaryOp::Lt => ord == Less,
            BinaryOp::Le => ord != Greater,
            BinaryOp::Gt => ord == Greater,
            BinaryOp::Ge => ord != Less,
            _ => false,
        };
        arena.alloc_const_value(ConstValue::boolean(tctx.bool_, result))
    }

    fn eval_float_arith<'a>(
        &self,
        e: &'a bt_dsl_ast::BinaryExpr<'a>,
        lhs: &'a ConstValue<'a>,
        rhs: &'a ConstValue<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        };
        if matches!(e.op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_DIV_BY_ZERO,
                "division by zero in a constant expression",
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        let r = match e.op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => return arena.alloc_const_value(ConstValue::error(tctx.error)),
        };
        if !r.is_finite() {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_NON_FINITE,
                "constant floating-point expression produced a non-finite value",
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        let ty = if lhs.ty.is_placeholder() { rhs.ty } else { lhs.ty };
        arena.alloc_const_value(ConstValue::float(ty, r))
    }

    fn eval_integer_arith<'a>(
        &self,
        e: &'a bt_dsl_ast::BinaryExpr<'a>,
        lhs: &'a ConstValue<'a>,
        rhs: &'a ConstValue<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let (Some(a), Some(b)) = (lhs.as_integer(), rhs.as_integer()) else {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        };
        if matches!(e.op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_DIV_BY_ZERO,
                "division by zero in a constant expression",
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        let result_ty = if lhs.ty.is_placeholder() { rhs.ty } else { lhs.ty };
        let (lo, hi) = int_range(result_ty);
        let r = match e.op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            BinaryOp::BitAnd => Some(a & b),
            BinaryOp::BitOr => Some(a | b),
            BinaryOp::BitXor => Some(a ^ b),
            _ => None,
        };
        match r {
            Some(v) if v >= lo && v <= hi => arena.alloc_const_value(ConstValue::integer(result_ty, v)),
            _ => {
                diags.emit(Diagnostic::error(
                    Category::ConstEval,
                    error_codes::CONST_OVERFLOW,
                    "integer constant expression overflows",
                    e.range,
                ));
                arena.alloc_const_value(ConstValue::error(tctx.error))
            }
        }
    }

    fn eval_cast<'a>(
        &mut self,
        e: &'a bt_dsl_ast::CastExpr<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let v = self.eval_expr(e.operand, tctx, arena, diags);
        if v.is_error() {
            return v;
        }
        let target = crate::type_realize::realize_type(e.target, tctx, arena, self, diags);
        if target.is_error() {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        if target.is_extern() || matches!(target, bt_dsl_ast::SemanticType::DynamicArray(_)) || target.is_unknown()
        {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_UNSUPPORTED_CAST,
                format!("cast to '{}' is not supported in a constant expression", target.surface_spelling()),
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        if target.is_integer() {
            return self.cast_to_integer(v, target, tctx, arena, e.range, diags);
        }
        if target.is_float() {
            let f = match (v.as_float(), v.as_integer()) {
                (Some(f), _) => f,
                (None, Some(i)) => i as f64,
                _ => {
                    diags.emit(unsupported_cast(target, e.range));
                    return arena.alloc_const_value(ConstValue::error(tctx.error));
                }
            };
            let f = if matches!(target, bt_dsl_ast::SemanticType::Float32) {
                f as f32 as f64
            } else {
                f
            };
            return arena.alloc_const_value(ConstValue::float(target, f));
        }
        if target.is_string() {
            let s = match v.as_str() {
                Some(s) => s.to_string(),
                None => {
                    diags.emit(unsupported_cast(target, e.range));
                    return arena.alloc_const_value(ConstValue::error(tctx.error));
                }
            };
            if let bt_dsl_ast::SemanticType::BoundedString(n) = target {
                if s.len() as u32 > *n {
                    diags.emit(Diagnostic::error(
                        Category::ConstEval,
                        error_codes::CONST_CAST_OUT_OF_RANGE,
                        format!("string of length {} does not fit in string<{}>", s.len(), n),
                        e.range,
                    ));
                    return arena.alloc_const_value(ConstValue::error(tctx.error));
                }
            }
            return arena.alloc_const_value(ConstValue::string(target, s));
        }
        if target.is_bool() {
            return match v.as_bool() {
                Some(b) => arena.alloc_const_value(ConstValue::boolean(target, b)),
                None => {
                    diags.emit(unsupported_cast(target, e.range));
                    arena.alloc_const_value(ConstValue::error(tctx.error))
                }
            };
        }
        diags.emit(unsupported_cast(target, e.range));
        arena.alloc_const_value(ConstValue::error(tctx.error))
    }

    fn cast_to_integer<'a>(
        &self,
        v: &'a ConstValue<'a>,
        target: &'a bt_dsl_ast::SemanticType<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        range: bt_dsl_diagnostics::ByteRange,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let (lo, hi) = int_range(target);
        if let Some(i) = v.as_integer() {
            if i < lo || i > hi {
                diags.emit(Diagnostic::error(
                    Category::ConstEval,
                    error_codes::CONST_CAST_OUT_OF_RANGE,
                    format!("{i} does not fit in '{}'", target.surface_spelling()),
                    range,
                ));
                return arena.alloc_const_value(ConstValue::error(tctx.error));
            }
            return arena.alloc_const_value(ConstValue::integer(target, i));
        }
        if let Some(f) = v.as_float() {
            if !f.is_finite() || f.fract() != 0.0 {
                diags.emit(Diagnostic::error(
                    Category::ConstEval,
                    error_codes::CONST_CAST_OUT_OF_RANGE,
                    "float-to-integer cast in a constant expression requires an exactly representable integral value",
                    range,
                ));
                return arena.alloc_const_value(ConstValue::error(tctx.error));
            }
            let i = f as i128;
            if (i as f64) != f || i < lo || i > hi {
                diags.emit(Diagnostic::error(
                    Category::ConstEval,
                    error_codes::CONST_CAST_OUT_OF_RANGE,
                    format!("{f} does not fit exactly in '{}'", target.surface_spelling()),
                    range,
                ));
                return arena.alloc_const_value(ConstValue::error(tctx.error));
            }
            return arena.alloc_const_value(ConstValue::integer(target, i));
        }
        diags.emit(unsupported_cast(target, range));
        arena.alloc_const_value(ConstValue::error(tctx.error))
    }

    fn eval_index<'a>(
        &mut self,
        e: &'a bt_dsl_ast::IndexExpr<'a>,
        tctx: &TypeContext<'a>,
        arena: &'a bt_dsl_ast::AstArena<'a>,
        diags: &mut DiagnosticBag,
    ) -> &'a ConstValue<'a> {
        let base = self.eval_expr(e.base, tctx, arena, diags);
        let idx_v = self.eval_expr(e.index, tctx, arena, diags);
        if base.is_error() || idx_v.is_error() {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        let Some(elems) = base.as_array() else {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_NOT_CONST,
                "indexing is only constant over a constant array",
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        };
        let Some(idx) = idx_v.as_integer() else {
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        };
        if idx < 0 || idx as usize >= elems.len() {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_INDEX_OUT_OF_BOUNDS,
                format!("index {idx} out of bounds for array of length {}", elems.len()),
                e.range,
            ));
            return arena.alloc_const_value(ConstValue::error(tctx.error));
        }
        elems[idx as usize]
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported_cast(target: &bt_dsl_ast::SemanticType<'_>, range: bt_dsl_diagnostics::ByteRange) -> Diagnostic {
    Diagnostic::error(
        Category::ConstEval,
        error_codes::CONST_UNSUPPORTED_CAST,
        format!("cast to '{}' is not supported in a constant expression", target.surface_spelling()),
        range,
    )
}

/// `IntLiteral`-typed operands carry no explicit width; the reference
/// implementation evaluates them with `int64` range and headroom, so
/// overflow checks (including the min-negation boundary case) use the
/// same range until a cast narrows the value to a concrete type.
fn int_range(ty: &bt_dsl_ast::SemanticType<'_>) -> (i128, i128) {
    ty.integer_range().unwrap_or((i64::MIN as i128, i64::MAX as i128))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    fn eval_one<'a>(
        source: &str,
        arena: &'a AstArena<'a>,
        type_arena: &'a typed_arena::Arena<bt_dsl_ast::SemanticType<'a>>,
    ) -> (DiagnosticBag, Option<&'a ConstValue<'a>>) {
        let (program, mut diags) = parse_source(source, arena);
        let (table, scopes) = crate::symtab_builder::build(program, arena, &mut diags);
        let tctx = TypeContext::new(type_arena);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let mut ev = Evaluator::new();
        let mut last = None;
        for decl in &program.items {
            if let bt_dsl_ast::Decl::GlobalConst(gc) = decl {
                last = Some(ev.eval_global_const(gc, &tctx, arena, &mut diags));
            }
        }
        (diags, last)
    }

    #[test]
    fn min_negation_overflows() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (diags, _) = eval_one(
            "const MIN: int64 = -9223372036854775807 - 1; const X: int64 = -MIN;",
            &arena,
            &type_arena,
        );
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::CONST_OVERFLOW));
    }

    #[test]
    fn cycle_is_detected() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (diags, _) = eval_one("const A: int32 = B; const B: int32 = A;", &arena, &type_arena);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::CONST_CYCLE));
    }

    #[test]
    fn division_by_zero_reported() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (diags, _) = eval_one("const X: int32 = 1 / 0;", &arena, &type_arena);
        assert!(diags
            .diagnostics()
            .iter()
            .any(|d| d.code == error_codes::CONST_DIV_BY_ZERO));
    }

    #[test]
    fn exact_float_to_int_cast_accepted() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (diags, v) = eval_one("const X: int32 = 1.0 as int32;", &arena, &type_arena);
        assert!(!diags.has_errors());
        assert_eq!(v.unwrap().as_integer(), Some(1));
    }
}
