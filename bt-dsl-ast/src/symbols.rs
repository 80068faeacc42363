//! Symbol/Type/Node tables (spec.md §3, §4.2): three disjoint namespaces
//! with a scope chain. The symbol-table *builder* (the algorithm that
//! populates these) lives in `bt-dsl-sema`; this module only defines the
//! data shapes, since AST back-pointers need to borrow `&'a Symbol<'a>`.

use std::collections::HashMap;

use bt_dsl_diagnostics::ByteRange;

use crate::ast::{
    is_private_name, BlackboardVarDeclStmt, ExternNodeDecl, ExternTypeDecl, GlobalConstDecl,
    GlobalVarDecl, InlineBlackboardDecl, LocalConstDeclStmt, ParameterDecl, TreeDecl,
    TypeAliasDecl,
};
use crate::types::SemanticType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Value,
    Type,
    Node,
}

#[derive(Debug)]
pub enum Symbol<'a> {
    GlobalVariable(&'a GlobalVarDecl<'a>),
    GlobalConst(&'a GlobalConstDecl<'a>),
    Parameter(&'a ParameterDecl<'a>),
    LocalVariable(&'a BlackboardVarDeclStmt<'a>),
    BlockVariable(&'a InlineBlackboardDecl<'a>),
    LocalConst(&'a LocalConstDeclStmt<'a>),
    BuiltinType {
        name: &'static str,
        ty: &'a SemanticType<'a>,
    },
    ExternType(&'a ExternTypeDecl),
    Alias(&'a TypeAliasDecl<'a>),
    ExternNode(&'a ExternNodeDecl<'a>),
    Tree(&'a TreeDecl<'a>),
}

impl<'a> Symbol<'a> {
    pub fn name(&self) -> &str {
        match self {
            Symbol::GlobalVariable(d) => &d.name,
            Symbol::GlobalConst(d) => &d.name,
            Symbol::Parameter(d) => &d.name,
            Symbol::LocalVariable(d) => &d.name,
            Symbol::BlockVariable(d) => &d.name,
            Symbol::LocalConst(d) => &d.name,
            Symbol::BuiltinType { name, .. } => name,
            Symbol::ExternType(d) => &d.name,
            Symbol::Alias(d) => &d.name,
            Symbol::ExternNode(d) => &d.name,
            Symbol::Tree(d) => &d.name,
        }
    }

    pub fn range(&self) -> ByteRange {
        match self {
            Symbol::GlobalVariable(d) => d.range,
            Symbol::GlobalConst(d) => d.range,
            Symbol::Parameter(d) => d.range,
            Symbol::LocalVariable(d) => d.range,
            Symbol::BlockVariable(d) => d.range,
            Symbol::LocalConst(d) => d.range,
            Symbol::BuiltinType { .. } => ByteRange::empty_at(0),
            Symbol::ExternType(d) => d.range,
            Symbol::Alias(d) => d.range,
            Symbol::ExternNode(d) => d.range,
            Symbol::Tree(d) => d.range,
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            Symbol::GlobalVariable(_)
            | Symbol::GlobalConst(_)
            | Symbol::Parameter(_)
            | Symbol::LocalVariable(_)
            | Symbol::BlockVariable(_)
            | Symbol::LocalConst(_) => Namespace::Value,
            Symbol::BuiltinType { .. } | Symbol::ExternType(_) | Symbol::Alias(_) => {
                Namespace::Type
            }
            Symbol::ExternNode(_) | Symbol::Tree(_) => Namespace::Node,
        }
    }

    pub fn is_private(&self) -> bool {
        is_private_name(self.name())
    }

    pub fn is_const(&self) -> bool {
        matches!(
            self,
            Symbol::GlobalConst(_) | Symbol::LocalConst(_)
        )
    }

    /// Writability bit (spec.md §3): globals, locals, block vars, and
    /// `ref`/`mut`/`out` parameters are writable; everything else is not.
    pub fn is_writable(&self) -> bool {
        match self {
            Symbol::GlobalVariable(_) | Symbol::LocalVariable(_) | Symbol::BlockVariable(_) => {
                true
            }
            Symbol::Parameter(p) => !matches!(p.direction, crate::ast::Direction::In),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeKind {
    #[default]
    Root,
    TreeParams,
    Block,
}

pub type ScopeId = usize;

#[derive(Debug, Default)]
struct ScopeData<'a> {
    parent: Option<ScopeId>,
    kind: ScopeKind,
    values: HashMap<String, &'a Symbol<'a>>,
    types: HashMap<String, &'a Symbol<'a>>,
    nodes: HashMap<String, &'a Symbol<'a>>,
}

impl<'a> ScopeData<'a> {
    fn table(&self, ns: Namespace) -> &HashMap<String, &'a Symbol<'a>> {
        match ns {
            Namespace::Value => &self.values,
            Namespace::Type => &self.types,
            Namespace::Node => &self.nodes,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut HashMap<String, &'a Symbol<'a>> {
        match ns {
            Namespace::Value => &mut self.values,
            Namespace::Type => &mut self.types,
            Namespace::Node => &mut self.nodes,
        }
    }
}

/// A module's full scope chain: root scope (globals + imported publics)
/// plus one nested scope per tree-parameter list and per children block.
#[derive(Debug)]
pub struct SymbolTable<'a> {
    scopes: Vec<ScopeData<'a>>,
}

impl<'a> SymbolTable<'a> {
    pub fn new() -> Self {
        Self {
            scopes: vec![ScopeData {
                parent: None,
                kind: ScopeKind::Root,
                ..Default::default()
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    pub fn open_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(ScopeData {
            parent: Some(parent),
            kind,
            ..Default::default()
        });
        self.scopes.len() - 1
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    pub fn kind_of(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope].kind
    }

    /// Inserts `symbol` into `scope`'s namespace table. Returns the
    /// previously-bound symbol (if any), letting the caller decide
    /// whether that's a redefinition (same scope) or shadowing (would be
    /// reported by the builder, which also checks outer scopes).
    pub fn insert(
        &mut self,
        scope: ScopeId,
        ns: Namespace,
        name: String,
        symbol: &'a Symbol<'a>,
    ) -> Option<&'a Symbol<'a>> {
        self.scopes[scope].table_mut(ns).insert(name, symbol)
    }

    pub fn lookup_local(&self, scope: ScopeId, ns: Namespace, name: &str) -> Option<&'a Symbol<'a>> {
        self.scopes[scope].table(ns).get(name).copied()
    }

    /// Walks from `scope` up to (and including) the root, returning the
    /// first match (spec.md §4.3's "innermost open scope to the module
    /// root" rule).
    pub fn lookup_chain(&self, scope: ScopeId, ns: Namespace, name: &str) -> Option<&'a Symbol<'a>> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(sym) = self.lookup_local(s, ns, name) {
                return Some(sym);
            }
            current = self.scopes[s].parent;
        }
        None
    }

    /// All scopes strictly between `scope` and the root, excluding the
    /// root itself — used by shadowing detection ("shadowing a global is
    /// permitted" means the root is exempt).
    pub fn non_global_ancestors(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut current = self.scopes[scope].parent;
        while let Some(s) = current {
            if s == self.root() {
                break;
            }
            out.push(s);
            current = self.scopes[s].parent;
        }
        out
    }

    pub fn names_in_scope(&self, scope: ScopeId, ns: Namespace) -> Vec<String> {
        self.scopes[scope].table(ns).keys().cloned().collect()
    }
}

impl<'a> Default for SymbolTable<'a> {
    fn default() -> Self {
        Self::new()
    }
}
