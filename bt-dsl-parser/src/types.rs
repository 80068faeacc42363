//! Type-node parsing (spec.md §3's `TypeNode` kinds), grounded in the
//! reference frontend's `BuildType.cpp`.
//!
//! ```text
//! type            = base_type , ["?"] ;
//! base_type       = bounded_string | static_array | dynamic_array | infer | ident ;
//! bounded_string  = "string" , ["<" , int_literal , ">"] ;
//! static_array    = "[" , type , ";" , array_size , "]" ;
//! array_size      = ["<="] , expr ;
//! dynamic_array   = "vec" , "<" , type , ">" ;
//! infer           = "_" ;
//! ```

use bt_dsl_ast::{ArrayKind, AstArena, TypeNode};
use bt_dsl_lexer::Token;

use crate::Parser;

impl<'s, 't> Parser<'s, 't> {
    pub(crate) fn parse_type<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a TypeNode<'a> {
        let start = self.current_range();
        let base = self.parse_base_type(arena);
        if self.eat(&Token::Question) {
            let range = start.join(self.prev_range());
            arena.alloc_type_node(TypeNode::Wrapper(bt_dsl_ast::WrapperTypeNode {
                base,
                nullable: true,
                range,
                resolved_type: Default::default(),
            }))
        } else {
            base
        }
    }

    fn parse_base_type<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a TypeNode<'a> {
        let start = self.current_range();
        match self.peek() {
            Some(Token::LBracket) => {
                self.advance();
                let elem = self.parse_type(arena);
                self.expect(Token::Semicolon, "';' in array type");
                let kind = if self.eat(&Token::Le) {
                    ArrayKind::Max
                } else {
                    ArrayKind::Exact
                };
                let size = self.parse_expr(arena);
                self.expect(Token::RBracket, "']' closing array type");
                let range = start.join(self.prev_range());
                arena.alloc_type_node(TypeNode::StaticArray(bt_dsl_ast::StaticArrayTypeNode {
                    elem,
                    kind,
                    size,
                    range,
                    resolved_type: Default::default(),
                }))
            }
            Some(Token::Vec) if matches!(self.peek_at(1), Some(Token::Lt)) => {
                self.advance();
                self.advance();
                let elem = self.parse_type(arena);
                self.expect(Token::Gt, "'>' closing 'vec<...>'");
                let range = start.join(self.prev_range());
                arena.alloc_type_node(TypeNode::DynamicArray(bt_dsl_ast::DynamicArrayTypeNode {
                    elem,
                    range,
                    resolved_type: Default::default(),
                }))
            }
            Some(Token::Ident(name)) if name == "_" => {
                self.advance();
                let range = start.join(self.prev_range());
                arena.alloc_type_node(TypeNode::Infer(bt_dsl_ast::InferTypeNode { range }))
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                let size = if name == "string" && self.eat(&Token::Lt) {
                    let size_expr = self.parse_expr(arena);
                    self.expect(Token::Gt, "'>' closing 'string<N>'");
                    Some(size_expr)
                } else {
                    None
                };
                let range = start.join(self.prev_range());
                arena.alloc_type_node(TypeNode::Primary(bt_dsl_ast::PrimaryTypeNode {
                    name,
                    size,
                    range,
                    resolved_type: Default::default(),
                    resolved_symbol: Default::default(),
                }))
            }
            _ => {
                self.error("expected a type");
                let range = start.join(self.current_range());
                arena.alloc_type_node(TypeNode::Infer(bt_dsl_ast::InferTypeNode { range }))
            }
        }
    }
}
