//! Semantic type lattice and the type context that interns it
//! (spec.md §4.1). Interning guarantees pointer equality == structural
//! equality, which the type checker, const evaluator, and XML generator
//! all rely on.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::ast::ArrayKind;

#[derive(Debug)]
pub enum SemanticType<'a> {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    Str,
    BoundedString(u32),
    StaticArray {
        elem: &'a SemanticType<'a>,
        kind: ArrayKind,
        size: u64,
    },
    DynamicArray(&'a SemanticType<'a>),
    Nullable(&'a SemanticType<'a>),
    Extern(String),
    /// `{integer}` placeholder literal type.
    IntLiteral,
    /// `{float}` placeholder literal type.
    FloatLiteral,
    /// `{null}` placeholder literal type.
    NullLiteral,
    Unknown,
    Error,
}

impl<'a> SemanticType<'a> {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            SemanticType::Int8
                | SemanticType::Int16
                | SemanticType::Int32
                | SemanticType::Int64
                | SemanticType::UInt8
                | SemanticType::UInt16
                | SemanticType::UInt32
                | SemanticType::UInt64
                | SemanticType::IntLiteral
        )
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            SemanticType::Int8 | SemanticType::Int16 | SemanticType::Int32 | SemanticType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            SemanticType::Float32 | SemanticType::Float64 | SemanticType::FloatLiteral
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, SemanticType::Bool)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, SemanticType::Str | SemanticType::BoundedString(_))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, SemanticType::Nullable(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            SemanticType::StaticArray { .. } | SemanticType::DynamicArray(_)
        )
    }

    pub fn is_extern(&self) -> bool {
        matches!(self, SemanticType::Extern(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SemanticType::Error)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SemanticType::Unknown)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            SemanticType::IntLiteral | SemanticType::FloatLiteral | SemanticType::NullLiteral
        )
    }

    pub fn nullable_base(&self) -> Option<&'a SemanticType<'a>> {
        match self {
            SemanticType::Nullable(base) => Some(base),
            _ => None,
        }
    }

    pub fn array_elem(&self) -> Option<&'a SemanticType<'a>> {
        match self {
            SemanticType::StaticArray { elem, .. } => Some(elem),
            SemanticType::DynamicArray(elem) => Some(elem),
            _ => None,
        }
    }

    /// Integer range in the signed/unsigned sense used by the constant
    /// evaluator and literal-fit checking (spec.md §4.4, §4.5, §8).
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            SemanticType::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            SemanticType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            SemanticType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            SemanticType::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
            SemanticType::UInt8 => Some((0, u8::MAX as i128)),
            SemanticType::UInt16 => Some((0, u16::MAX as i128)),
            SemanticType::UInt32 => Some((0, u32::MAX as i128)),
            SemanticType::UInt64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// The surface-syntax spelling used in `TreeNodesModel` (spec.md §6).
    pub fn surface_spelling(&self) -> String {
        match self {
            SemanticType::Int8 => "int8".into(),
            SemanticType::Int16 => "int16".into(),
            SemanticType::Int32 => "int32".into(),
            SemanticType::Int64 => "int64".into(),
            SemanticType::UInt8 => "uint8".into(),
            SemanticType::UInt16 => "uint16".into(),
            SemanticType::UInt32 => "uint32".into(),
            SemanticType::UInt64 => "uint64".into(),
            SemanticType::Float32 => "float32".into(),
            SemanticType::Float64 => "float64".into(),
            SemanticType::Bool => "bool".into(),
            SemanticType::Str => "string".into(),
            SemanticType::BoundedString(n) => format!("string<{}>", n),
            SemanticType::StaticArray { elem, kind, size } => match kind {
                ArrayKind::Exact => format!("[{}; {}]", elem.surface_spelling(), size),
                ArrayKind::Max => format!("[{}; max {}]", elem.surface_spelling(), size),
            },
            SemanticType::DynamicArray(elem) => format!("vec<{}>", elem.surface_spelling()),
            SemanticType::Nullable(base) => format!("{}?", base.surface_spelling()),
            SemanticType::Extern(name) => name.clone(),
            SemanticType::IntLiteral => "{integer}".into(),
            SemanticType::FloatLiteral => "{float}".into(),
            SemanticType::NullLiteral => "{null}".into(),
            SemanticType::Unknown => "{unknown}".into(),
            SemanticType::Error => "{error}".into(),
        }
    }
}

/// Structural key used only to find-or-create an interned pointer; never
/// observed after interning (callers always compare `&'a SemanticType`
/// pointers, never keys).
#[derive(PartialEq, Eq, Hash, Clone)]
enum TypeKey {
    Simple(u8),
    BoundedString(u32),
    StaticArray(usize, u8, u64),
    DynamicArray(usize),
    Nullable(usize),
    Extern(String),
}

fn ptr_key(t: &SemanticType<'_>) -> usize {
    t as *const SemanticType<'_> as usize
}

pub struct TypeContext<'a> {
    arena: &'a typed_arena::Arena<SemanticType<'a>>,
    cache: RefCell<HashMap<TypeKey, &'a SemanticType<'a>>>,
    pub int8: &'a SemanticType<'a>,
    pub int16: &'a SemanticType<'a>,
    pub int32: &'a SemanticType<'a>,
    pub int64: &'a SemanticType<'a>,
    pub uint8: &'a SemanticType<'a>,
    pub uint16: &'a SemanticType<'a>,
    pub uint32: &'a SemanticType<'a>,
    pub uint64: &'a SemanticType<'a>,
    pub float32: &'a SemanticType<'a>,
    pub float64: &'a SemanticType<'a>,
    pub bool_: &'a SemanticType<'a>,
    pub string: &'a SemanticType<'a>,
    pub int_literal: &'a SemanticType<'a>,
    pub float_literal: &'a SemanticType<'a>,
    pub null_literal: &'a SemanticType<'a>,
    pub unknown: &'a SemanticType<'a>,
    pub error: &'a SemanticType<'a>,
}

impl<'a> TypeContext<'a> {
    pub fn new(arena: &'a typed_arena::Arena<SemanticType<'a>>) -> Self {
        let mut cache = HashMap::new();
        macro_rules! simple {
            ($tag:expr, $variant:expr) => {{
                let r = arena.alloc($variant);
                cache.insert(TypeKey::Simple($tag), &*r);
                r
            }};
        }
        let int8 = simple!(0, SemanticType::Int8);
        let int16 = simple!(1, SemanticType::Int16);
        let int32 = simple!(2, SemanticType::Int32);
        let int64 = simple!(3, SemanticType::Int64);
        let uint8 = simple!(4, SemanticType::UInt8);
        let uint16 = simple!(5, SemanticType::UInt16);
        let uint32 = simple!(6, SemanticType::UInt32);
        let uint64 = simple!(7, SemanticType::UInt64);
        let float32 = simple!(8, SemanticType::Float32);
        let float64 = simple!(9, SemanticType::Float64);
        let bool_ = simple!(10, SemanticType::Bool);
        let string = simple!(11, SemanticType::Str);
        let int_literal = simple!(12, SemanticType::IntLiteral);
        let float_literal = simple!(13, SemanticType::FloatLiteral);
        let null_literal = simple!(14, SemanticType::NullLiteral);
        let unknown = simple!(15, SemanticType::Unknown);
        let error = simple!(16, SemanticType::Error);
        Self {
            arena,
            cache: RefCell::new(cache),
            int8,
            int16,
            int32,
            int64,
            uint8,
            uint16,
            uint32,
            uint64,
            float32,
            float64,
            bool_,
            string,
            int_literal,
            float_literal,
            null_literal,
            unknown,
            error,
        }
    }

    pub fn lookup_builtin(&self, name: &str) -> Option<&'a SemanticType<'a>> {
        Some(match name {
            "int8" => self.int8,
            "int16" => self.int16,
            "int32" => self.int32,
            "int64" => self.int64,
            "uint8" => self.uint8,
            "uint16" => self.uint16,
            "uint32" => self.uint32,
            "uint64" => self.uint64,
            "float32" => self.float32,
            "float64" => self.float64,
            "bool" => self.bool_,
            "string" => self.string,
            _ => return None,
        })
    }

    pub fn nullable(&self, base: &'a SemanticType<'a>) -> &'a SemanticType<'a> {
        if let SemanticType::Nullable(_) = base {
            return base;
        }
        let key = TypeKey::Nullable(ptr_key(base));
        self.get_or_intern(key, || SemanticType::Nullable(base))
    }

    pub fn bounded_string(&self, n: u32) -> &'a SemanticType<'a> {
        let key = TypeKey::BoundedString(n);
        self.get_or_intern(key, || SemanticType::BoundedString(n))
    }

    pub fn static_array(
        &self,
        elem: &'a SemanticType<'a>,
        kind: ArrayKind,
        size: u64,
    ) -> &'a SemanticType<'a> {
        let key = TypeKey::StaticArray(
            ptr_key(elem),
            match kind {
                ArrayKind::Exact => 0,
                ArrayKind::Max => 1,
            },
            size,
        );
        self.get_or_intern(key, || SemanticType::StaticArray { elem, kind, size })
    }

    pub fn dynamic_array(&self, elem: &'a SemanticType<'a>) -> &'a SemanticType<'a> {
        let key = TypeKey::DynamicArray(ptr_key(elem));
        self.get_or_intern(key, || SemanticType::DynamicArray(elem))
    }

    pub fn extern_type(&self, name: &str) -> &'a SemanticType<'a> {
        let key = TypeKey::Extern(name.to_string());
        self.get_or_intern(key, || SemanticType::Extern(name.to_string()))
    }

    fn get_or_intern(
        &self,
        key: TypeKey,
        build: impl FnOnce() -> SemanticType<'a>,
    ) -> &'a SemanticType<'a> {
        if let Some(existing) = self.cache.borrow().get(&key) {
            return existing;
        }
        let allocated: &'a SemanticType<'a> = self.arena.alloc(build());
        self.cache.borrow_mut().insert(key, allocated);
        allocated
    }

    /// Assignability rule from spec.md §4.1, used for port/parameter
    /// binding and assignment RHS checking.
    pub fn assignable(&self, from: &'a SemanticType<'a>, to: &'a SemanticType<'a>) -> bool {
        if from.is_error() || to.is_error() {
            return true;
        }
        if from.is_unknown() || to.is_unknown() {
            return true;
        }
        if std::ptr::eq(from, to) {
            return true;
        }
        match to {
            SemanticType::Nullable(inner) => match from {
                SemanticType::NullLiteral => true,
                SemanticType::Nullable(from_inner) => self.assignable(from_inner, inner),
                _ => self.assignable(from, inner),
            },
            _ => match from {
                SemanticType::IntLiteral => to.is_integer() || to.is_float(),
                SemanticType::FloatLiteral => to.is_float(),
                SemanticType::NullLiteral => to.is_nullable(),
                SemanticType::StaticArray {
                    elem: e1,
                    kind: k1,
                    size: s1,
                } => matches!(to, SemanticType::StaticArray { elem: e2, kind: k2, size: s2 }
                    if k1 == k2 && s1 == s2 && self.assignable(e1, e2)),
                SemanticType::DynamicArray(e1) => {
                    matches!(to, SemanticType::DynamicArray(e2) if self.assignable(e1, e2))
                }
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_intern_to_same_pointer() {
        let arena = typed_arena::Arena::new();
        let ctx = TypeContext::new(&arena);
        assert!(std::ptr::eq(
            ctx.lookup_builtin("int32").unwrap(),
            ctx.lookup_builtin("int32").unwrap()
        ));
    }

    #[test]
    fn nullable_interns_same_pointer_for_same_base() {
        let arena = typed_arena::Arena::new();
        let ctx = TypeContext::new(&arena);
        let a = ctx.nullable(ctx.int32);
        let b = ctx.nullable(ctx.int32);
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn int_literal_assignable_to_any_integer_or_float() {
        let arena = typed_arena::Arena::new();
        let ctx = TypeContext::new(&arena);
        assert!(ctx.assignable(ctx.int_literal, ctx.int8));
        assert!(ctx.assignable(ctx.int_literal, ctx.float64));
        assert!(!ctx.assignable(ctx.float_literal, ctx.int32));
    }

    #[test]
    fn non_null_assignable_to_its_own_nullable() {
        let arena = typed_arena::Arena::new();
        let ctx = TypeContext::new(&arena);
        let nullable_i32 = ctx.nullable(ctx.int32);
        assert!(ctx.assignable(ctx.int32, nullable_i32));
        assert!(ctx.assignable(ctx.null_literal, nullable_i32));
        assert!(!ctx.assignable(nullable_i32, ctx.int32));
    }

    #[test]
    fn arrays_require_matching_kind_and_size() {
        let arena = typed_arena::Arena::new();
        let ctx = TypeContext::new(&arena);
        let a1 = ctx.static_array(ctx.int32, ArrayKind::Exact, 4);
        let a2 = ctx.static_array(ctx.int32, ArrayKind::Exact, 4);
        let a3 = ctx.static_array(ctx.int32, ArrayKind::Exact, 5);
        assert!(std::ptr::eq(a1, a2));
        assert!(ctx.assignable(a1, a2));
        assert!(!ctx.assignable(a1, a3));
    }
}
