//! Arena-allocated AST (spec.md §3). Every node carries a `ByteRange`.
//! Back-pointers set by later passes (resolved symbol, resolved type,
//! resolved node, evaluated const value) are `Cell<Option<&'a T>>`:
//! `&'a T` is `Copy`, so a `Cell` gives us the "monotonic single
//! assignment, null -> non-null" semantics spec.md §3 and §5 require
//! without needing `RefCell`'s runtime borrow bookkeeping.

use std::cell::Cell;

use bt_dsl_diagnostics::ByteRange;

use crate::symbols::Symbol;
use crate::types::SemanticType;
use crate::values::ConstValue;

pub type TypeCell<'a> = Cell<Option<&'a SemanticType<'a>>>;
pub type SymbolCell<'a> = Cell<Option<&'a Symbol<'a>>>;
pub type ConstCell<'a> = Cell<Option<&'a ConstValue<'a>>>;

#[derive(Debug)]
pub struct Program<'a> {
    /// `//!` comments at the top of the file, marker stripped.
    pub inner_docs: Vec<String>,
    pub imports: Vec<&'a Decl<'a>>,
    pub items: Vec<&'a Decl<'a>>,
}

// ---------------------------------------------------------------- imports

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `./foo.bt` or `../foo.bt` — must include an explicit extension.
    Relative(String),
    /// `some/pkg` — mapped to `bt-dsl-pkg://some/pkg`.
    Package(String),
}

#[derive(Debug)]
pub struct Import {
    pub target: ImportTarget,
    pub range: ByteRange,
}

// ----------------------------------------------------------- declarations

#[derive(Debug)]
pub enum Decl<'a> {
    Import(Import),
    ExternType(ExternTypeDecl),
    TypeAlias(TypeAliasDecl<'a>),
    ExternNode(ExternNodeDecl<'a>),
    GlobalVar(GlobalVarDecl<'a>),
    GlobalConst(GlobalConstDecl<'a>),
    Tree(TreeDecl<'a>),
}

impl<'a> Decl<'a> {
    pub fn range(&self) -> ByteRange {
        match self {
            Decl::Import(d) => d.range,
            Decl::ExternType(d) => d.range,
            Decl::TypeAlias(d) => d.range,
            Decl::ExternNode(d) => d.range,
            Decl::GlobalVar(d) => d.range,
            Decl::GlobalConst(d) => d.range,
            Decl::Tree(d) => d.range,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Import(_) => None,
            Decl::ExternType(d) => Some(&d.name),
            Decl::TypeAlias(d) => Some(&d.name),
            Decl::ExternNode(d) => Some(&d.name),
            Decl::GlobalVar(d) => Some(&d.name),
            Decl::GlobalConst(d) => Some(&d.name),
            Decl::Tree(d) => Some(&d.name),
        }
    }

    /// A name is private iff its first character is `_` (spec.md §3).
    pub fn is_private(&self) -> bool {
        self.name().map(is_private_name).unwrap_or(false)
    }
}

pub fn is_private_name(name: &str) -> bool {
    name.starts_with('_')
}

#[derive(Debug)]
pub struct ExternTypeDecl {
    pub name: String,
    pub docs: Vec<String>,
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct TypeAliasDecl<'a> {
    pub name: String,
    pub aliased: &'a TypeNode<'a>,
    pub docs: Vec<String>,
    pub range: ByteRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Action,
    Condition,
    Control,
    Decorator,
    Subtree,
}

#[derive(Debug)]
pub struct ExternNodeDecl<'a> {
    pub name: String,
    pub category: NodeCategory,
    /// `#[behavior(...)]` attribute, legal only on `control` nodes
    /// (spec.md §3's `BehaviorAttr`). `None` means the category's
    /// implicit default applies (control nodes always carry one by the
    /// time the resolver is done with them).
    pub behavior: Option<BehaviorAttr>,
    pub ports: Vec<&'a ExternPort<'a>>,
    pub docs: Vec<String>,
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct GlobalVarDecl<'a> {
    pub name: String,
    pub type_ann: Option<&'a TypeNode<'a>>,
    pub init: Option<&'a Expr<'a>>,
    pub docs: Vec<String>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug)]
pub struct GlobalConstDecl<'a> {
    pub name: String,
    pub type_ann: Option<&'a TypeNode<'a>>,
    pub init: &'a Expr<'a>,
    pub docs: Vec<String>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
    pub resolved_value: ConstCell<'a>,
}

#[derive(Debug)]
pub struct TreeDecl<'a> {
    pub name: String,
    pub params: Vec<&'a ParameterDecl<'a>>,
    pub body: Vec<&'a Stmt<'a>>,
    pub docs: Vec<String>,
    pub range: ByteRange,
}

// ------------------------------------------------------------- statements

#[derive(Debug)]
pub enum Stmt<'a> {
    NodeCall(NodeCallStmt<'a>),
    Assignment(AssignmentStmt<'a>),
    BlackboardVarDecl(BlackboardVarDeclStmt<'a>),
    LocalConstDecl(LocalConstDeclStmt<'a>),
}

impl<'a> Stmt<'a> {
    pub fn range(&self) -> ByteRange {
        match self {
            Stmt::NodeCall(s) => s.range,
            Stmt::Assignment(s) => s.range,
            Stmt::BlackboardVarDecl(s) => s.range,
            Stmt::LocalConstDecl(s) => s.range,
        }
    }
}

#[derive(Debug)]
pub struct NodeCallStmt<'a> {
    pub name: String,
    pub args: Vec<&'a Argument<'a>>,
    pub preconditions: Vec<&'a Precondition<'a>>,
    /// `Some` (possibly empty) when the call has an explicit `{ ... }`
    /// children block; `None` for a leaf call with no block.
    pub children: Option<Vec<&'a Stmt<'a>>>,
    pub range: ByteRange,
    pub resolved_node: SymbolCell<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
}

impl AssignOp {
    pub fn desugared_binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::RemAssign => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Debug)]
pub struct AssignmentStmt<'a> {
    pub target: &'a Expr<'a>,
    pub op: AssignOp,
    pub value: &'a Expr<'a>,
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct BlackboardVarDeclStmt<'a> {
    pub name: String,
    pub type_ann: Option<&'a TypeNode<'a>>,
    pub init: Option<&'a Expr<'a>>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug)]
pub struct LocalConstDeclStmt<'a> {
    pub name: String,
    pub type_ann: Option<&'a TypeNode<'a>>,
    pub init: &'a Expr<'a>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
    pub resolved_value: ConstCell<'a>,
}

// ------------------------------------------------------------ expressions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug)]
pub enum Expr<'a> {
    IntLit(IntLitExpr<'a>),
    FloatLit(FloatLitExpr<'a>),
    StringLit(StringLitExpr<'a>),
    BoolLit(BoolLitExpr<'a>),
    NullLit(NullLitExpr<'a>),
    VarRef(VarRefExpr<'a>),
    Binary(BinaryExpr<'a>),
    Unary(UnaryExpr<'a>),
    Cast(CastExpr<'a>),
    Index(IndexExpr<'a>),
    ArrayLit(ArrayLitExpr<'a>),
    ArrayRepeat(ArrayRepeatExpr<'a>),
    VecMacro(VecMacroExpr<'a>),
}

macro_rules! expr_common {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug)]
        pub struct $name<'a> {
            pub range: ByteRange,
            pub resolved_type: TypeCell<'a>,
            $(pub $field: $ty),*
        }
    };
}

expr_common!(IntLitExpr { text: String, value: i128 });
expr_common!(FloatLitExpr { text: String, value: f64 });
expr_common!(StringLitExpr { value: String });
expr_common!(BoolLitExpr { value: bool });
expr_common!(NullLitExpr {});
expr_common!(VarRefExpr { name: String, resolved_symbol: SymbolCell<'a> });
expr_common!(BinaryExpr { op: BinaryOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a> });
expr_common!(UnaryExpr { op: UnaryOp, operand: &'a Expr<'a> });
expr_common!(CastExpr { operand: &'a Expr<'a>, target: &'a TypeNode<'a> });
expr_common!(IndexExpr { base: &'a Expr<'a>, index: &'a Expr<'a> });
expr_common!(ArrayLitExpr { elements: Vec<&'a Expr<'a>> });
expr_common!(ArrayRepeatExpr { value: &'a Expr<'a>, count: &'a Expr<'a> });
expr_common!(VecMacroExpr { elements: Vec<&'a Expr<'a>> });

impl<'a> Expr<'a> {
    pub fn range(&self) -> ByteRange {
        match self {
            Expr::IntLit(e) => e.range,
            Expr::FloatLit(e) => e.range,
            Expr::StringLit(e) => e.range,
            Expr::BoolLit(e) => e.range,
            Expr::NullLit(e) => e.range,
            Expr::VarRef(e) => e.range,
            Expr::Binary(e) => e.range,
            Expr::Unary(e) => e.range,
            Expr::Cast(e) => e.range,
            Expr::Index(e) => e.range,
            Expr::ArrayLit(e) => e.range,
            Expr::ArrayRepeat(e) => e.range,
            Expr::VecMacro(e) => e.range,
        }
    }

    pub fn resolved_type(&self) -> Option<&'a SemanticType<'a>> {
        match self {
            Expr::IntLit(e) => e.resolved_type.get(),
            Expr::FloatLit(e) => e.resolved_type.get(),
            Expr::StringLit(e) => e.resolved_type.get(),
            Expr::BoolLit(e) => e.resolved_type.get(),
            Expr::NullLit(e) => e.resolved_type.get(),
            Expr::VarRef(e) => e.resolved_type.get(),
            Expr::Binary(e) => e.resolved_type.get(),
            Expr::Unary(e) => e.resolved_type.get(),
            Expr::Cast(e) => e.resolved_type.get(),
            Expr::Index(e) => e.resolved_type.get(),
            Expr::ArrayLit(e) => e.resolved_type.get(),
            Expr::ArrayRepeat(e) => e.resolved_type.get(),
            Expr::VecMacro(e) => e.resolved_type.get(),
        }
    }

    pub fn set_resolved_type(&self, ty: &'a SemanticType<'a>) {
        let cell = match self {
            Expr::IntLit(e) => &e.resolved_type,
            Expr::FloatLit(e) => &e.resolved_type,
            Expr::StringLit(e) => &e.resolved_type,
            Expr::BoolLit(e) => &e.resolved_type,
            Expr::NullLit(e) => &e.resolved_type,
            Expr::VarRef(e) => &e.resolved_type,
            Expr::Binary(e) => &e.resolved_type,
            Expr::Unary(e) => &e.resolved_type,
            Expr::Cast(e) => &e.resolved_type,
            Expr::Index(e) => &e.resolved_type,
            Expr::ArrayLit(e) => &e.resolved_type,
            Expr::ArrayRepeat(e) => &e.resolved_type,
            Expr::VecMacro(e) => &e.resolved_type,
        };
        cell.set(Some(ty));
    }

    /// Used by the lvalue check (spec.md §4.5): a writable lvalue is a
    /// var-ref or an index expression rooted at one.
    pub fn lvalue_root(&'a self) -> Option<&'a VarRefExpr<'a>> {
        match self {
            Expr::VarRef(v) => Some(v),
            Expr::Index(i) => i.base.lvalue_root(),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------- types

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Exact,
    Max,
}

#[derive(Debug)]
pub enum TypeNode<'a> {
    Primary(PrimaryTypeNode<'a>),
    StaticArray(StaticArrayTypeNode<'a>),
    DynamicArray(DynamicArrayTypeNode<'a>),
    Infer(InferTypeNode),
    Wrapper(WrapperTypeNode<'a>),
}

impl<'a> TypeNode<'a> {
    pub fn range(&self) -> ByteRange {
        match self {
            TypeNode::Primary(t) => t.range,
            TypeNode::StaticArray(t) => t.range,
            TypeNode::DynamicArray(t) => t.range,
            TypeNode::Infer(t) => t.range,
            TypeNode::Wrapper(t) => t.range,
        }
    }
}

#[derive(Debug)]
pub struct PrimaryTypeNode<'a> {
    pub name: String,
    /// Present only for `string<N>`; `N`'s source expression, evaluated
    /// to a concrete bound by the constant evaluator.
    pub size: Option<&'a Expr<'a>>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
    pub resolved_symbol: SymbolCell<'a>,
}

#[derive(Debug)]
pub struct StaticArrayTypeNode<'a> {
    pub elem: &'a TypeNode<'a>,
    pub kind: ArrayKind,
    pub size: &'a Expr<'a>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug)]
pub struct DynamicArrayTypeNode<'a> {
    pub elem: &'a TypeNode<'a>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug)]
pub struct InferTypeNode {
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct WrapperTypeNode<'a> {
    pub base: &'a TypeNode<'a>,
    pub nullable: bool,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

// ------------------------------------------------------------- supporting

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDirection {
    /// A bare value expression.
    Value,
    Ref,
    Mut,
    Out,
}

#[derive(Debug)]
pub struct Argument<'a> {
    pub port_name: String,
    pub direction: ArgDirection,
    pub value: Option<&'a Expr<'a>>,
    pub inline_decl: Option<&'a InlineBlackboardDecl<'a>>,
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct InlineBlackboardDecl<'a> {
    pub name: String,
    pub range: ByteRange,
    pub resolved_symbol: SymbolCell<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionKind {
    Guard,
    SuccessIf,
    FailureIf,
    SkipIf,
    RunWhile,
}

#[derive(Debug)]
pub struct Precondition<'a> {
    pub kind: PreconditionKind,
    pub expr: &'a Expr<'a>,
    pub range: ByteRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Ref,
    Mut,
    Out,
}

#[derive(Debug)]
pub struct ParameterDecl<'a> {
    pub name: String,
    pub direction: Direction,
    pub type_ann: &'a TypeNode<'a>,
    pub default: Option<&'a Expr<'a>>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug)]
pub struct ExternPort<'a> {
    pub name: String,
    pub direction: Direction,
    pub type_ann: &'a TypeNode<'a>,
    pub default: Option<&'a Expr<'a>>,
    pub range: ByteRange,
    pub resolved_type: TypeCell<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPolicy {
    All,
    Any,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPolicy {
    Chained,
    Isolated,
}

#[derive(Debug, Clone, Copy)]
pub struct BehaviorAttr {
    pub data_policy: DataPolicy,
    pub flow_policy: FlowPolicy,
}

impl BehaviorAttr {
    /// Built-in composite-node policies (BT.CPP-compatible defaults).
    pub fn sequence() -> Self {
        Self {
            data_policy: DataPolicy::All,
            flow_policy: FlowPolicy::Chained,
        }
    }
    pub fn fallback() -> Self {
        Self {
            data_policy: DataPolicy::Any,
            flow_policy: FlowPolicy::Chained,
        }
    }
    pub fn parallel() -> Self {
        Self {
            data_policy: DataPolicy::None,
            flow_policy: FlowPolicy::Isolated,
        }
    }
    pub fn decorator() -> Self {
        Self {
            data_policy: DataPolicy::All,
            flow_policy: FlowPolicy::Chained,
        }
    }
}
