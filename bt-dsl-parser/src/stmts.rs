//! Statement parsing (spec.md §3's `Stmt` kinds: node call, assignment,
//! blackboard var decl, local const decl), grounded in the reference
//! frontend's `BuildStmt.cpp`.
//!
//! ```text
//! stmt       = precondition* , node_call
//!            | "var" , ident , [":" type] , ["=" expr] , ";"
//!            | "const" , ident , [":" type] , "=" , expr , ";"
//!            | lvalue , assign_op , expr , ";" ;
//! node_call  = ident , ["(" , arg_list , ")"] , ("{" stmt* "}" | ";") ;
//! argument   = [ident ":"] , ("ref" | "mut" | "out" ["var"])? , (expr | ident) ;
//! ```

use bt_dsl_ast::{
    ArgDirection, AssignOp, AstArena, BlackboardVarDeclStmt, InlineBlackboardDecl,
    LocalConstDeclStmt, NodeCallStmt, Precondition, PreconditionKind, Stmt,
};
use bt_dsl_lexer::Token;

use crate::Parser;

const STMT_SYNC: &[Token] = &[
    Token::Semicolon,
    Token::RBrace,
    Token::Var,
    Token::Const,
    Token::At,
];

impl<'s, 't> Parser<'s, 't> {
    pub(crate) fn parse_stmt<'a>(&mut self, arena: &'a AstArena<'a>) -> Option<&'a Stmt<'a>> {
        let stmt = match self.peek() {
            Some(Token::At) => Some(self.parse_node_call_stmt(arena)),
            Some(Token::Var) => Some(self.parse_blackboard_decl(arena)),
            Some(Token::Const) => Some(self.parse_local_const_decl(arena)),
            Some(Token::Ident(_)) => {
                if matches!(
                    self.peek_at(1),
                    Some(Token::LParen) | Some(Token::LBrace) | Some(Token::Semicolon)
                ) {
                    Some(self.parse_node_call_stmt(arena))
                } else {
                    Some(self.parse_assignment_stmt(arena))
                }
            }
            _ => {
                self.error("expected a statement");
                None
            }
        };
        if stmt.is_none() {
            self.advance();
            self.synchronize_to(STMT_SYNC);
        }
        stmt
    }

    fn parse_precondition_list<'a>(&mut self, arena: &'a AstArena<'a>) -> Vec<&'a Precondition<'a>> {
        let mut out = Vec::new();
        while self.eat(&Token::At) {
            let start = self.prev_range();
            let kind = match self.peek() {
                Some(Token::Guard) => PreconditionKind::Guard,
                Some(Token::SuccessIf) => PreconditionKind::SuccessIf,
                Some(Token::FailureIf) => PreconditionKind::FailureIf,
                Some(Token::SkipIf) => PreconditionKind::SkipIf,
                Some(Token::RunWhile) => PreconditionKind::RunWhile,
                _ => {
                    self.error("expected a precondition kind (guard/success_if/failure_if/skip_if/run_while)");
                    PreconditionKind::Guard
                }
            };
            self.advance();
            self.expect(Token::LParen, "'(' after precondition kind");
            let expr = self.parse_expr(arena);
            self.expect(Token::RParen, "')' closing precondition");
            let range = start.join(self.prev_range());
            out.push(arena.alloc_precondition(Precondition { kind, expr, range }));
        }
        out
    }

    fn parse_node_call_stmt<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a Stmt<'a> {
        let start = self.current_range();
        let preconditions = self.parse_precondition_list(arena);
        let name = self.ident_text("a node or tree name").unwrap_or_default();

        let args = if self.eat(&Token::LParen) {
            let mut args = Vec::new();
            if !self.check(&Token::RParen) {
                args.push(self.parse_argument(arena));
                while self.eat(&Token::Comma) {
                    if self.check(&Token::RParen) {
                        break;
                    }
                    args.push(self.parse_argument(arena));
                }
            }
            self.expect(Token::RParen, "')' closing argument list");
            args
        } else {
            Vec::new()
        };

        let children = if self.eat(&Token::LBrace) {
            let mut stmts = Vec::new();
            while !self.check(&Token::RBrace) && !self.is_at_end() {
                if let Some(stmt) = self.parse_stmt(arena) {
                    stmts.push(stmt);
                }
            }
            self.expect(Token::RBrace, "'}' closing children block");
            Some(stmts)
        } else {
            self.expect(Token::Semicolon, "';' after node call");
            None
        };

        let range = start.join(self.prev_range());
        arena.alloc_stmt(Stmt::NodeCall(NodeCallStmt {
            name,
            args,
            preconditions,
            children,
            range,
            resolved_node: Default::default(),
        }))
    }

    fn parse_argument<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a bt_dsl_ast::Argument<'a> {
        let start = self.current_range();
        let port_name = if matches!(self.peek(), Some(Token::Ident(_)))
            && matches!(self.peek_at(1), Some(Token::Colon))
        {
            let name = self.ident_text("a port name").unwrap_or_default();
            self.advance(); // ':'
            name
        } else {
            String::new()
        };

        let (direction, value, inline_decl) = match self.peek() {
            Some(Token::Ref) => {
                self.advance();
                (ArgDirection::Ref, Some(self.parse_expr(arena)), None)
            }
            Some(Token::Mut) => {
                self.advance();
                (ArgDirection::Mut, Some(self.parse_expr(arena)), None)
            }
            Some(Token::Out) => {
                self.advance();
                if self.eat(&Token::Var) {
                    let decl_start = self.prev_range();
                    let name = self.ident_text("a new blackboard variable name").unwrap_or_default();
                    let decl_range = decl_start.join(self.prev_range());
                    let decl = arena.alloc_inline_bb_decl(InlineBlackboardDecl {
                        name,
                        range: decl_range,
                        resolved_symbol: Default::default(),
                    });
                    (ArgDirection::Out, None, Some(decl))
                } else {
                    (ArgDirection::Out, Some(self.parse_expr(arena)), None)
                }
            }
            _ => (ArgDirection::Value, Some(self.parse_expr(arena)), None),
        };

        let range = start.join(self.prev_range());
        arena.alloc_arg(bt_dsl_ast::Argument {
            port_name,
            direction,
            value,
            inline_decl,
            range,
        })
    }

    fn parse_blackboard_decl<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a Stmt<'a> {
        let start = self.current_range();
        self.advance(); // 'var'
        let name = self.ident_text("a variable name").unwrap_or_default();
        let type_ann = if self.eat(&Token::Colon) {
            Some(self.parse_type(arena))
        } else {
            None
        };
        let init = if self.eat(&Token::Eq) {
            Some(self.parse_expr(arena))
        } else {
            None
        };
        self.expect(Token::Semicolon, "';' after variable declaration");
        let range = start.join(self.prev_range());
        arena.alloc_stmt(Stmt::BlackboardVarDecl(BlackboardVarDeclStmt {
            name,
            type_ann,
            init,
            range,
            resolved_type: Default::default(),
        }))
    }

    fn parse_local_const_decl<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a Stmt<'a> {
        let start = self.current_range();
        self.advance(); // 'const'
        let name = self.ident_text("a constant name").unwrap_or_default();
        let type_ann = if self.eat(&Token::Colon) {
            Some(self.parse_type(arena))
        } else {
            None
        };
        self.expect(Token::Eq, "'=' in const declaration");
        let init = self.parse_expr(arena);
        self.expect(Token::Semicolon, "';' after const declaration");
        let range = start.join(self.prev_range());
        arena.alloc_stmt(Stmt::LocalConstDecl(LocalConstDeclStmt {
            name,
            type_ann,
            init,
            range,
            resolved_type: Default::default(),
            resolved_value: Default::default(),
        }))
    }

    fn parse_assignment_stmt<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a Stmt<'a> {
        let start = self.current_range();
        let target = self.parse_expr(arena);
        let op = match self.peek() {
            Some(Token::Eq) => AssignOp::Assign,
            Some(Token::PlusEq) => AssignOp::AddAssign,
            Some(Token::MinusEq) => AssignOp::SubAssign,
            Some(Token::StarEq) => AssignOp::MulAssign,
            Some(Token::SlashEq) => AssignOp::DivAssign,
            Some(Token::PercentEq) => AssignOp::RemAssign,
            _ => {
                self.error("expected an assignment operator");
                AssignOp::Assign
            }
        };
        self.advance();
        let value = self.parse_expr(arena);
        self.expect(Token::Semicolon, "';' after assignment");
        let range = start.join(self.prev_range());
        arena.alloc_stmt(Stmt::Assignment(bt_dsl_ast::AssignmentStmt {
            target,
            op,
            value,
            range,
        }))
    }
}
