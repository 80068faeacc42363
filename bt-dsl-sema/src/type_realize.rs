//! Turns surface `TypeNode`s into interned `SemanticType`s (spec.md §4.1,
//! §4.4.5). Array sizes and `string<N>` bounds are constant expressions,
//! so this sits on top of the constant evaluator rather than before it;
//! the type checker calls this once per type annotation it encounters and
//! relies on the `resolved_type` cell for memoization.

use bt_dsl_ast::{AstArena, Expr, SemanticType, Symbol, TypeContext, TypeNode};
use bt_dsl_diagnostics::{error_codes, Category, Diagnostic, DiagnosticBag};

use crate::const_eval::Evaluator;

fn cached<'a>(tn: &'a TypeNode<'a>) -> Option<&'a SemanticType<'a>> {
    match tn {
        TypeNode::Primary(t) => t.resolved_type.get(),
        TypeNode::StaticArray(t) => t.resolved_type.get(),
        TypeNode::DynamicArray(t) => t.resolved_type.get(),
        TypeNode::Infer(_) => None,
        TypeNode::Wrapper(t) => t.resolved_type.get(),
    }
}

fn cache_set<'a>(tn: &'a TypeNode<'a>, ty: &'a SemanticType<'a>) {
    match tn {
        TypeNode::Primary(t) => t.resolved_type.set(Some(ty)),
        TypeNode::StaticArray(t) => t.resolved_type.set(Some(ty)),
        TypeNode::DynamicArray(t) => t.resolved_type.set(Some(ty)),
        TypeNode::Infer(_) => {}
        TypeNode::Wrapper(t) => t.resolved_type.set(Some(ty)),
    }
}

pub fn realize_type<'a>(
    tn: &'a TypeNode<'a>,
    tctx: &TypeContext<'a>,
    arena: &'a AstArena<'a>,
    ev: &mut Evaluator,
    diags: &mut DiagnosticBag,
) -> &'a SemanticType<'a> {
    if let Some(c) = cached(tn) {
        return c;
    }
    let ty = match tn {
        TypeNode::Infer(_) => tctx.unknown,
        TypeNode::Primary(p) => {
            if let Some(size_expr) = p.size {
                let n = eval_bound_u32(size_expr, tctx, arena, ev, diags);
                tctx.bounded_string(n)
            } else if let Some(builtin) = tctx.lookup_builtin(&p.name) {
                builtin
            } else {
                match p.resolved_symbol.get() {
                    Some(Symbol::Alias(alias)) => {
                        let key = alias as *const _ as usize;
                        if ev.enter(key, &alias.name) {
                            let cycle = ev.cycle_message(&alias.name);
                            diags.emit(Diagnostic::error(
                                Category::Resolution,
                                error_codes::RESOLUTION_UNKNOWN_NAME,
                                format!("type alias cycle: {cycle}"),
                                p.range,
                            ));
                            tctx.error
                        } else {
                            let r = realize_type(alias.aliased, tctx, arena, ev, diags);
                            ev.leave();
                            r
                        }
                    }
                    Some(Symbol::ExternType(et)) => tctx.extern_type(&et.name),
                    _ => tctx.error,
                }
            }
        }
        TypeNode::StaticArray(a) => {
            let elem = realize_type(a.elem, tctx, arena, ev, diags);
            let n = eval_bound_u64(a.size, tctx, arena, ev, diags);
            tctx.static_array(elem, a.kind, n)
        }
        TypeNode::DynamicArray(a) => {
            let elem = realize_type(a.elem, tctx, arena, ev, diags);
            tctx.dynamic_array(elem)
        }
        TypeNode::Wrapper(w) => {
            let base = realize_type(w.base, tctx, arena, ev, diags);
            if w.nullable {
                tctx.nullable(base)
            } else {
                base
            }
        }
    };
    cache_set(tn, ty);
    ty
}

fn eval_bound_u32<'a>(
    expr: &'a Expr<'a>,
    tctx: &TypeContext<'a>,
    arena: &'a AstArena<'a>,
    ev: &mut Evaluator,
    diags: &mut DiagnosticBag,
) -> u32 {
    let v = ev.eval_expr(expr, tctx, arena, diags);
    match v.as_integer() {
        Some(n) if (0..=u32::MAX as i128).contains(&n) => n as u32,
        Some(_) => {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_OVERFLOW,
                "string bound must be a non-negative value that fits in 32 bits",
                expr.range(),
            ));
            0
        }
        None => 0,
    }
}

fn eval_bound_u64<'a>(
    expr: &'a Expr<'a>,
    tctx: &TypeContext<'a>,
    arena: &'a AstArena<'a>,
    ev: &mut Evaluator,
    diags: &mut DiagnosticBag,
) -> u64 {
    let v = ev.eval_expr(expr, tctx, arena, diags);
    match v.as_integer() {
        Some(n) if (0..=u64::MAX as i128).contains(&n) => n as u64,
        Some(_) => {
            diags.emit(Diagnostic::error(
                Category::ConstEval,
                error_codes::CONST_OVERFLOW,
                "array size must be a non-negative value that fits in 64 bits",
                expr.range(),
            ));
            0
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_dsl_ast::AstArena;
    use bt_dsl_parser::parse_source;

    #[test]
    fn bounded_string_size_comes_from_const_eval() {
        let arena = AstArena::new();
        let type_arena = typed_arena::Arena::new();
        let (program, mut diags) =
            parse_source("const N: int32 = 4; tree Main() { var s: string<N>; }", &arena);
        let (table, scopes) = crate::symtab_builder::build(program, &arena, &mut diags);
        crate::resolver::resolve(program, &table, &scopes, &[], &mut diags);
        let tctx = TypeContext::new(&type_arena);
        let mut ev = Evaluator::new();
        for decl in &program.items {
            if let bt_dsl_ast::Decl::Tree(tree) = decl {
                for stmt in &tree.body {
                    if let bt_dsl_ast::Stmt::BlackboardVarDecl(d) = stmt {
                        let ty = realize_type(d.type_ann.unwrap(), &tctx, &arena, &mut ev, &mut diags);
                        assert!(matches!(ty, SemanticType::BoundedString(4)));
                    }
                }
            }
        }
        assert!(!diags.has_errors());
    }
}
