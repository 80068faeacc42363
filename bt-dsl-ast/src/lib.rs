//! Arena-allocated AST, semantic type lattice, symbol tables, and
//! evaluated constant values shared by every later pass (spec.md §3).

pub mod arena;
pub mod ast;
pub mod debug_dump;
pub mod symbols;
pub mod types;
pub mod values;

pub use arena::AstArena;
pub use ast::*;
pub use symbols::{Namespace, ScopeId, ScopeKind, Symbol, SymbolTable};
pub use types::{SemanticType, TypeContext};
pub use values::{ConstPayload, ConstValue};

use bt_dsl_diagnostics::{DiagnosticBag, SourceMap};

/// One source file's full analysis state (spec.md §3 "Module"). Modules
/// never outlive the `AstArena` they borrow from.
pub struct Module<'a> {
    pub file_id: String,
    pub source: String,
    pub source_map: SourceMap,
    pub program: &'a Program<'a>,
    pub parse_diagnostics: DiagnosticBag,
    pub type_ctx: TypeContext<'a>,
    pub symbol_table: SymbolTable<'a>,
    /// Canonical paths of directly-imported modules, in import order
    /// (spec.md §4.3 resolves against *direct* imports only).
    pub direct_imports: Vec<String>,
}

impl<'a> Module<'a> {
    pub fn new(
        file_id: impl Into<String>,
        source: impl Into<String>,
        program: &'a Program<'a>,
        type_ctx: TypeContext<'a>,
    ) -> Self {
        let source = source.into();
        let source_map = SourceMap::new(&source);
        Self {
            file_id: file_id.into(),
            source,
            source_map,
            program,
            parse_diagnostics: DiagnosticBag::new(),
            type_ctx,
            symbol_table: SymbolTable::new(),
            direct_imports: Vec::new(),
        }
    }
}
