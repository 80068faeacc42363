//! Expression parsing (spec.md §3's `Expr` kinds), grounded in the
//! reference frontend's `BuildExpr.cpp` precedence table:
//!
//! ```text
//! or > and > bitor > bitxor > bitand > equality > comparison
//!     > additive > multiplicative > cast > unary > primary
//! ```
//! `equality`/`comparison` are non-chaining (exactly two operands); every
//! other binary level is left-associative.

use bt_dsl_ast::{AstArena, BinaryOp, Expr, TypeCell, UnaryOp};
use bt_dsl_lexer::Token;

use crate::Parser;

type AllocExpr<'a> = &'a Expr<'a>;

impl<'s, 't> Parser<'s, 't> {
    pub(crate) fn parse_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        self.parse_or_expr(arena)
    }

    fn parse_or_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_and_expr(arena);
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and_expr(arena);
            lhs = self.alloc_binary(arena, BinaryOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_and_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_bitor_expr(arena);
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_bitor_expr(arena);
            lhs = self.alloc_binary(arena, BinaryOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_bitor_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_bitxor_expr(arena);
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_bitxor_expr(arena);
            lhs = self.alloc_binary(arena, BinaryOp::BitOr, lhs, rhs);
        }
        lhs
    }

    fn parse_bitxor_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_bitand_expr(arena);
        while self.eat(&Token::Caret) {
            let rhs = self.parse_bitand_expr(arena);
            lhs = self.alloc_binary(arena, BinaryOp::BitXor, lhs, rhs);
        }
        lhs
    }

    fn parse_bitand_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_equality_expr(arena);
        while self.eat(&Token::Amp) {
            let rhs = self.parse_equality_expr(arena);
            lhs = self.alloc_binary(arena, BinaryOp::BitAnd, lhs, rhs);
        }
        lhs
    }

    fn parse_equality_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let lhs = self.parse_comparison_expr(arena);
        let op = match self.peek() {
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_comparison_expr(arena);
                self.alloc_binary(arena, op, lhs, rhs)
            }
            None => lhs,
        }
    }

    fn parse_comparison_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let lhs = self.parse_additive_expr(arena);
        let op = match self.peek() {
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_additive_expr(arena);
                self.alloc_binary(arena, op, lhs, rhs)
            }
            None => lhs,
        }
    }

    fn parse_additive_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_multiplicative_expr(arena);
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative_expr(arena);
            lhs = self.alloc_binary(arena, op, lhs, rhs);
        }
        lhs
    }

    fn parse_multiplicative_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let mut lhs = self.parse_cast_expr(arena);
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_cast_expr(arena);
            lhs = self.alloc_binary(arena, op, lhs, rhs);
        }
        lhs
    }

    fn parse_cast_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let start = self.current_range();
        let mut operand = self.parse_unary_expr(arena);
        while self.eat(&Token::As) {
            let target = self.parse_type(arena);
            let range = start.join(self.prev_range());
            operand = arena.alloc_expr(Expr::Cast(bt_dsl_ast::CastExpr {
                range,
                resolved_type: TypeCell::default(),
                operand,
                target,
            }));
        }
        operand
    }

    fn parse_unary_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let start = self.current_range();
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary_expr(arena);
                let range = start.join(self.prev_range());
                arena.alloc_expr(Expr::Unary(bt_dsl_ast::UnaryExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    op,
                    operand,
                }))
            }
            None => self.parse_primary_expr(arena),
        }
    }

    fn parse_primary_expr<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let start = self.current_range();
        let mut base = self.parse_primary_base(arena);
        while self.eat(&Token::LBracket) {
            let index = self.parse_expr(arena);
            self.expect(Token::RBracket, "']' closing index expression");
            let range = start.join(self.prev_range());
            base = arena.alloc_expr(Expr::Index(bt_dsl_ast::IndexExpr {
                range,
                resolved_type: TypeCell::default(),
                base,
                index,
            }));
        }
        base
    }

    fn parse_primary_base<'a>(&mut self, arena: &'a AstArena<'a>) -> AllocExpr<'a> {
        let start = self.current_range();
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr(arena);
                self.expect(Token::RParen, "')' closing parenthesized expression");
                inner
            }
            Some(Token::IntLiteral(raw)) => {
                let raw = raw.clone();
                self.advance();
                let range = self.prev_range();
                let text = self.text(range).to_string();
                let value = parse_int_literal(&raw).unwrap_or_else(|| {
                    self.error("integer literal out of range");
                    0
                });
                arena.alloc_expr(Expr::IntLit(bt_dsl_ast::IntLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    text,
                    value,
                }))
            }
            Some(Token::FloatLiteral(value)) => {
                let value = *value;
                self.advance();
                let range = self.prev_range();
                let text = self.text(range).to_string();
                arena.alloc_expr(Expr::FloatLit(bt_dsl_ast::FloatLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    text,
                    value,
                }))
            }
            Some(Token::StringLiteral(value)) => {
                let value = value.clone();
                self.advance();
                let range = self.prev_range();
                arena.alloc_expr(Expr::StringLit(bt_dsl_ast::StringLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    value,
                }))
            }
            Some(Token::True) | Some(Token::False) => {
                let value = matches!(self.peek(), Some(Token::True));
                self.advance();
                let range = self.prev_range();
                arena.alloc_expr(Expr::BoolLit(bt_dsl_ast::BoolLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    value,
                }))
            }
            Some(Token::Null) => {
                self.advance();
                let range = self.prev_range();
                arena.alloc_expr(Expr::NullLit(bt_dsl_ast::NullLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                }))
            }
            Some(Token::Vec) if matches!(self.peek_at(1), Some(Token::Bang)) => {
                self.advance();
                self.advance();
                let elements = self.parse_array_literal_body(arena);
                let range = start.join(self.prev_range());
                arena.alloc_expr(Expr::VecMacro(bt_dsl_ast::VecMacroExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    elements,
                }))
            }
            Some(Token::LBracket) => {
                self.advance();
                if self.eat(&Token::RBracket) {
                    let range = start.join(self.prev_range());
                    return arena.alloc_expr(Expr::ArrayLit(bt_dsl_ast::ArrayLitExpr {
                        range,
                        resolved_type: TypeCell::default(),
                        elements: Vec::new(),
                    }));
                }
                let first = self.parse_expr(arena);
                if self.eat(&Token::Semicolon) {
                    let count = self.parse_expr(arena);
                    self.expect(Token::RBracket, "']' closing array-repeat literal");
                    let range = start.join(self.prev_range());
                    return arena.alloc_expr(Expr::ArrayRepeat(bt_dsl_ast::ArrayRepeatExpr {
                        range,
                        resolved_type: TypeCell::default(),
                        value: first,
                        count,
                    }));
                }
                let mut elements = vec![first];
                while self.eat(&Token::Comma) {
                    if self.check(&Token::RBracket) {
                        break;
                    }
                    elements.push(self.parse_expr(arena));
                }
                self.expect(Token::RBracket, "']' closing array literal");
                let range = start.join(self.prev_range());
                arena.alloc_expr(Expr::ArrayLit(bt_dsl_ast::ArrayLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    elements,
                }))
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                let range = self.prev_range();
                arena.alloc_expr(Expr::VarRef(bt_dsl_ast::VarRefExpr {
                    range,
                    resolved_type: TypeCell::default(),
                    name,
                    resolved_symbol: Default::default(),
                }))
            }
            _ => {
                self.error("expected an expression");
                let range = self.current_range();
                arena.alloc_expr(Expr::NullLit(bt_dsl_ast::NullLitExpr {
                    range,
                    resolved_type: TypeCell::default(),
                }))
            }
        }
    }

    /// Shared by `vec![...]`: same comma/empty shape as an array literal,
    /// but repeat-init (`[v; n]`) is not legal inside the macro.
    fn parse_array_literal_body<'a>(&mut self, arena: &'a AstArena<'a>) -> Vec<&'a Expr<'a>> {
        self.expect(Token::LBracket, "'[' opening 'vec!' literal");
        let mut elements = Vec::new();
        if !self.check(&Token::RBracket) {
            elements.push(self.parse_expr(arena));
            while self.eat(&Token::Comma) {
                if self.check(&Token::RBracket) {
                    break;
                }
                elements.push(self.parse_expr(arena));
            }
        }
        self.expect(Token::RBracket, "']' closing 'vec!' literal");
        elements
    }

    fn alloc_binary<'a>(
        &self,
        arena: &'a AstArena<'a>,
        op: BinaryOp,
        lhs: &'a Expr<'a>,
        rhs: &'a Expr<'a>,
    ) -> &'a Expr<'a> {
        let range = lhs.range().join(rhs.range());
        arena.alloc_expr(Expr::Binary(bt_dsl_ast::BinaryExpr {
            range,
            resolved_type: TypeCell::default(),
            op,
            lhs,
            rhs,
        }))
    }
}

/// Parses `0x`/`0b`/`0o`-prefixed or plain-decimal integer text (spec.md §6).
fn parse_int_literal(raw: &str) -> Option<i128> {
    let (digits, radix) = if let Some(rest) = raw.strip_prefix("0x").or(raw.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = raw.strip_prefix("0b").or(raw.strip_prefix("0B")) {
        (rest, 2)
    } else if let Some(rest) = raw.strip_prefix("0o").or(raw.strip_prefix("0O")) {
        (rest, 8)
    } else {
        (raw, 10)
    };
    i128::from_str_radix(digits, radix).ok()
}
