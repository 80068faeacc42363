use typed_arena::Arena;

use crate::ast::{
    Argument, BehaviorAttr, Decl, ExternPort, Expr, InlineBlackboardDecl, ParameterDecl,
    Precondition, Program, Stmt, TypeNode,
};
use crate::symbols::Symbol;
use crate::types::SemanticType;
use crate::values::ConstValue;

/// Owns every arena for one compilation. A compilation allocates exactly
/// one of these; every AST node, interned semantic type, symbol, and
/// evaluated constant it produces lives here for the lifetime of the
/// compilation (spec.md §3 "Lifecycles").
///
/// Mirrors `vex-ast`'s per-kind `typed_arena::Arena` pools, extended with
/// pools for the semantic layer (types, symbols, constant values) since
/// those need the same stable-address, pointer-equality guarantees as the
/// syntax tree itself.
pub struct AstArena<'a> {
    pub programs: Arena<Program<'a>>,
    pub decls: Arena<Decl<'a>>,
    pub stmts: Arena<Stmt<'a>>,
    pub exprs: Arena<Expr<'a>>,
    pub type_nodes: Arena<TypeNode<'a>>,
    pub args: Arena<Argument<'a>>,
    pub params: Arena<ParameterDecl<'a>>,
    pub extern_ports: Arena<ExternPort<'a>>,
    pub preconditions: Arena<Precondition<'a>>,
    pub behavior_attrs: Arena<BehaviorAttr>,
    pub inline_bb_decls: Arena<InlineBlackboardDecl<'a>>,
    pub semantic_types: Arena<SemanticType<'a>>,
    pub symbols: Arena<Symbol<'a>>,
    pub const_values: Arena<ConstValue<'a>>,
}

impl<'a> AstArena<'a> {
    pub fn new() -> Self {
        Self {
            programs: Arena::new(),
            decls: Arena::new(),
            stmts: Arena::new(),
            exprs: Arena::new(),
            type_nodes: Arena::new(),
            args: Arena::new(),
            params: Arena::new(),
            extern_ports: Arena::new(),
            preconditions: Arena::new(),
            behavior_attrs: Arena::new(),
            inline_bb_decls: Arena::new(),
            semantic_types: Arena::new(),
            symbols: Arena::new(),
            const_values: Arena::new(),
        }
    }

    pub fn alloc_program(&'a self, v: Program<'a>) -> &'a Program<'a> {
        self.programs.alloc(v)
    }
    pub fn alloc_decl(&'a self, v: Decl<'a>) -> &'a Decl<'a> {
        self.decls.alloc(v)
    }
    pub fn alloc_stmt(&'a self, v: Stmt<'a>) -> &'a Stmt<'a> {
        self.stmts.alloc(v)
    }
    pub fn alloc_expr(&'a self, v: Expr<'a>) -> &'a Expr<'a> {
        self.exprs.alloc(v)
    }
    pub fn alloc_type_node(&'a self, v: TypeNode<'a>) -> &'a TypeNode<'a> {
        self.type_nodes.alloc(v)
    }
    pub fn alloc_arg(&'a self, v: Argument<'a>) -> &'a Argument<'a> {
        self.args.alloc(v)
    }
    pub fn alloc_param(&'a self, v: ParameterDecl<'a>) -> &'a ParameterDecl<'a> {
        self.params.alloc(v)
    }
    pub fn alloc_extern_port(&'a self, v: ExternPort<'a>) -> &'a ExternPort<'a> {
        self.extern_ports.alloc(v)
    }
    pub fn alloc_precondition(&'a self, v: Precondition<'a>) -> &'a Precondition<'a> {
        self.preconditions.alloc(v)
    }
    pub fn alloc_behavior_attr(&'a self, v: BehaviorAttr) -> &'a BehaviorAttr {
        self.behavior_attrs.alloc(v)
    }
    pub fn alloc_inline_bb_decl(
        &'a self,
        v: InlineBlackboardDecl<'a>,
    ) -> &'a InlineBlackboardDecl<'a> {
        self.inline_bb_decls.alloc(v)
    }
    pub fn alloc_type(&'a self, v: SemanticType<'a>) -> &'a SemanticType<'a> {
        self.semantic_types.alloc(v)
    }
    pub fn alloc_symbol(&'a self, v: Symbol<'a>) -> &'a Symbol<'a> {
        self.symbols.alloc(v)
    }
    pub fn alloc_const_value(&'a self, v: ConstValue<'a>) -> &'a ConstValue<'a> {
        self.const_values.alloc(v)
    }
}

impl<'a> Default for AstArena<'a> {
    fn default() -> Self {
        Self::new()
    }
}
