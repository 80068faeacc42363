//! Evaluated constant values (spec.md §4.4). Stored in the arena so
//! `GlobalConstDecl::resolved_value` etc. can hold a stable `&'a` pointer.

use crate::types::SemanticType;

#[derive(Debug, Clone)]
pub enum ConstPayload<'a> {
    Integer(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(Vec<&'a ConstValue<'a>>),
    Null,
    /// The initializer failed to evaluate; the declaration is marked
    /// error and later passes treat reads of it as already reported.
    Error,
}

#[derive(Debug, Clone)]
pub struct ConstValue<'a> {
    pub ty: &'a SemanticType<'a>,
    pub payload: ConstPayload<'a>,
}

impl<'a> ConstValue<'a> {
    pub fn error(ty: &'a SemanticType<'a>) -> Self {
        Self {
            ty,
            payload: ConstPayload::Error,
        }
    }

    pub fn integer(ty: &'a SemanticType<'a>, v: i128) -> Self {
        Self {
            ty,
            payload: ConstPayload::Integer(v),
        }
    }

    pub fn float(ty: &'a SemanticType<'a>, v: f64) -> Self {
        Self {
            ty,
            payload: ConstPayload::Float(v),
        }
    }

    pub fn boolean(ty: &'a SemanticType<'a>, v: bool) -> Self {
        Self {
            ty,
            payload: ConstPayload::Bool(v),
        }
    }

    pub fn string(ty: &'a SemanticType<'a>, v: String) -> Self {
        Self {
            ty,
            payload: ConstPayload::Str(v),
        }
    }

    pub fn null(ty: &'a SemanticType<'a>) -> Self {
        Self {
            ty,
            payload: ConstPayload::Null,
        }
    }

    pub fn array(ty: &'a SemanticType<'a>, elems: Vec<&'a ConstValue<'a>>) -> Self {
        Self {
            ty,
            payload: ConstPayload::Array(elems),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ConstPayload::Error)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.payload, ConstPayload::Null)
    }

    pub fn as_integer(&self) -> Option<i128> {
        match &self.payload {
            ConstPayload::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &self.payload {
            ConstPayload::Float(v) => Some(*v),
            ConstPayload::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.payload {
            ConstPayload::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            ConstPayload::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[&'a ConstValue<'a>]> {
        match &self.payload {
            ConstPayload::Array(v) => Some(v),
            _ => None,
        }
    }
}
