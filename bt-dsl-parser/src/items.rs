//! Top-level declaration parsing (spec.md §3's `Decl` kinds) and program
//! assembly, grounded in the reference frontend's `AstBuilder.cpp`.
//!
//! ```text
//! program          = item* ;
//! item             = import_decl | extern_type_decl | type_alias_decl
//!                  | extern_node_decl | global_var_decl | global_const_decl
//!                  | tree_decl ;
//! import_decl      = "import" , string_literal , ";" ;
//! extern_type_decl = "extern" , "type" , ident , ";" ;
//! type_alias_decl  = "type" , ident , "=" , type , ";" ;
//! extern_node_decl = [behavior_attr] , "extern" , category , ident ,
//!                    "(" , port_list , ")" , ";" ;
//! behavior_attr    = "#" , "[" , "behavior" , "(" , ident , ["," ident] , ")" , "]" ;
//! global_var_decl  = "var" , ident , [":" type] , ["=" expr] , ";" ;
//! global_const_decl= "const" , ident , [":" type] , "=" , expr , ";" ;
//! tree_decl        = "tree" , ident , "(" , param_list , ")" , "{" , stmt* , "}" ;
//! port | param      = [direction] , ident , ":" , type , ["=" expr] ;
//! ```

use bt_dsl_ast::{
    AstArena, BehaviorAttr, Decl, Direction, DataPolicy, ExternNodeDecl, ExternPort, ExternTypeDecl,
    FlowPolicy, GlobalConstDecl, GlobalVarDecl, Import, ImportTarget, NodeCategory, ParameterDecl,
    Program, TreeDecl, TypeAliasDecl,
};
use bt_dsl_diagnostics::{error_codes, Category};
use bt_dsl_lexer::Token;

use crate::Parser;

const ITEM_SYNC: &[Token] = &[
    Token::Import,
    Token::Extern,
    Token::Type,
    Token::Var,
    Token::Const,
    Token::Tree,
];

impl<'s, 't> Parser<'s, 't> {
    pub(crate) fn parse_program<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a Program<'a> {
        let mut inner_docs = Vec::new();
        while let Some(Token::DocModule(text)) = self.peek() {
            inner_docs.push(text.clone());
            self.advance();
        }

        let mut imports = Vec::new();
        let mut items = Vec::new();

        while !self.is_at_end() {
            if let Some(Token::DocModule(text)) = self.peek() {
                inner_docs.push(text.clone());
                self.advance();
                continue;
            }

            let docs = self.take_docs();
            let behavior = self.parse_behavior_attr();

            match self.peek() {
                Some(Token::Import) => imports.push(self.parse_import_decl(arena, behavior)),
                Some(Token::Extern) => items.push(self.parse_extern_decl(arena, docs, behavior)),
                Some(Token::Type) => items.push(self.parse_type_alias_decl(arena, docs, behavior)),
                Some(Token::Var) => items.push(self.parse_global_var_decl(arena, docs, behavior)),
                Some(Token::Const) => items.push(self.parse_global_const_decl(arena, docs, behavior)),
                Some(Token::Tree) => items.push(self.parse_tree_decl(arena, docs, behavior)),
                _ => {
                    self.error("expected a top-level declaration");
                    self.advance();
                    self.synchronize_to(ITEM_SYNC);
                }
            }
        }

        arena.alloc_program(Program {
            inner_docs,
            imports,
            items,
        })
    }

    fn reject_stray_behavior_attr(&mut self, behavior: Option<BehaviorAttr>) {
        if behavior.is_some() {
            self.error("'#[behavior(...)]' is only allowed on 'extern control' declarations");
        }
    }

    fn parse_behavior_attr(&mut self) -> Option<BehaviorAttr> {
        if !self.check(&Token::Hash) {
            return None;
        }
        self.advance();
        self.expect(Token::LBracket, "'[' after '#'");
        match self.peek() {
            Some(Token::Ident(name)) if name == "behavior" => {
                self.advance();
            }
            _ => self.error("expected 'behavior'"),
        }
        self.expect(Token::LParen, "'(' after 'behavior'");
        let data_policy = match self.ident_text("a data policy (All/Any/None)").as_deref() {
            Some("All") => DataPolicy::All,
            Some("Any") => DataPolicy::Any,
            Some("None") => DataPolicy::None,
            Some(_) => {
                self.error("unknown data policy, expected All/Any/None");
                DataPolicy::All
            }
            None => DataPolicy::All,
        };
        let flow_policy = if self.eat(&Token::Comma) {
            match self.ident_text("a flow policy (Chained/Isolated)").as_deref() {
                Some("Chained") => FlowPolicy::Chained,
                Some("Isolated") => FlowPolicy::Isolated,
                Some(_) => {
                    self.error("unknown flow policy, expected Chained/Isolated");
                    FlowPolicy::Chained
                }
                None => FlowPolicy::Chained,
            }
        } else {
            FlowPolicy::Chained
        };
        self.expect(Token::RParen, "')' closing 'behavior(...)'");
        self.expect(Token::RBracket, "']' closing '#[...]'");
        Some(BehaviorAttr {
            data_policy,
            flow_policy,
        })
    }

    fn parse_import_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        self.reject_stray_behavior_attr(behavior);
        let start = self.current_range();
        self.advance(); // 'import'
        let target = match self.peek() {
            Some(Token::StringLiteral(raw)) => {
                let raw = raw.clone();
                self.advance();
                self.classify_import(&raw, self.prev_range())
            }
            _ => {
                self.error("expected a quoted import path");
                ImportTarget::Package(String::new())
            }
        };
        self.expect(Token::Semicolon, "';' after import");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::Import(Import { target, range }))
    }

    fn classify_import(&mut self, raw: &str, range: bt_dsl_diagnostics::ByteRange) -> ImportTarget {
        if raw.starts_with('/') {
            self.diagnostics.emit(bt_dsl_diagnostics::Diagnostic::error(
                Category::Import,
                error_codes::IMPORT_ABSOLUTE_PATH,
                "import paths must be relative ('./'/'../') or a bare package spec",
                range,
            ));
            return ImportTarget::Relative(raw.to_string());
        }
        if raw.starts_with("./") || raw.starts_with("../") {
            if !raw.rsplit('/').next().is_some_and(|last| last.contains('.')) {
                self.diagnostics.emit(bt_dsl_diagnostics::Diagnostic::error(
                    Category::Import,
                    error_codes::IMPORT_MISSING_EXTENSION,
                    "relative import paths must include an explicit extension",
                    range,
                ));
            }
            return ImportTarget::Relative(raw.to_string());
        }
        ImportTarget::Package(raw.to_string())
    }

    fn parse_extern_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        docs: Vec<String>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        let start = self.current_range();
        self.advance(); // 'extern'

        if self.check(&Token::Type) {
            self.reject_stray_behavior_attr(behavior);
            self.advance();
            let name = self.ident_text("an extern type name").unwrap_or_default();
            self.expect(Token::Semicolon, "';' after extern type");
            let range = start.join(self.prev_range());
            return arena.alloc_decl(Decl::ExternType(ExternTypeDecl { name, docs, range }));
        }

        let category = match self.peek() {
            Some(Token::Action) => NodeCategory::Action,
            Some(Token::Condition) => NodeCategory::Condition,
            Some(Token::Control) => NodeCategory::Control,
            Some(Token::Decorator) => NodeCategory::Decorator,
            Some(Token::Subtree) => NodeCategory::Subtree,
            _ => {
                self.error("expected action/condition/control/decorator/subtree");
                NodeCategory::Action
            }
        };
        self.advance();
        let name = self.ident_text("an extern node name").unwrap_or_default();
        self.expect(Token::LParen, "'(' after extern node name");
        let mut ports = Vec::new();
        if !self.check(&Token::RParen) {
            ports.push(self.parse_extern_port(arena));
            while self.eat(&Token::Comma) {
                if self.check(&Token::RParen) {
                    break;
                }
                ports.push(self.parse_extern_port(arena));
            }
        }
        self.expect(Token::RParen, "')' closing port list");
        self.expect(Token::Semicolon, "';' after extern node declaration");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::ExternNode(ExternNodeDecl {
            name,
            category,
            behavior,
            ports,
            docs,
            range,
        }))
    }

    fn parse_direction(&mut self) -> Direction {
        match self.peek() {
            Some(Token::In) => {
                self.advance();
                Direction::In
            }
            Some(Token::Out) => {
                self.advance();
                Direction::Out
            }
            Some(Token::Ref) => {
                self.advance();
                Direction::Ref
            }
            Some(Token::Mut) => {
                self.advance();
                Direction::Mut
            }
            _ => Direction::In,
        }
    }

    fn parse_extern_port<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a ExternPort<'a> {
        let start = self.current_range();
        let direction = self.parse_direction();
        let name = self.ident_text("a port name").unwrap_or_default();
        self.expect(Token::Colon, "':' in port declaration");
        let type_ann = self.parse_type(arena);
        let default = if self.eat(&Token::Eq) {
            let expr = self.parse_expr(arena);
            if direction != Direction::In {
                self.error("default value is not allowed for ref/mut/out ports");
            }
            Some(expr)
        } else {
            None
        };
        let range = start.join(self.prev_range());
        arena.alloc_extern_port(ExternPort {
            name,
            direction,
            type_ann,
            default,
            range,
            resolved_type: Default::default(),
        })
    }

    fn parse_param_decl<'a>(&mut self, arena: &'a AstArena<'a>) -> &'a ParameterDecl<'a> {
        let start = self.current_range();
        let direction = self.parse_direction();
        let name = self.ident_text("a parameter name").unwrap_or_default();
        self.expect(Token::Colon, "':' in parameter declaration");
        let type_ann = self.parse_type(arena);
        let default = if self.eat(&Token::Eq) {
            let expr = self.parse_expr(arena);
            if direction != Direction::In {
                self.error("default value is not allowed for ref/mut/out parameters");
            }
            Some(expr)
        } else {
            None
        };
        let range = start.join(self.prev_range());
        arena.alloc_param(ParameterDecl {
            name,
            direction,
            type_ann,
            default,
            range,
            resolved_type: Default::default(),
        })
    }

    fn parse_type_alias_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        docs: Vec<String>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        self.reject_stray_behavior_attr(behavior);
        let start = self.current_range();
        self.advance(); // 'type'
        let name = self.ident_text("a type alias name").unwrap_or_default();
        self.expect(Token::Eq, "'=' in type alias");
        let aliased = self.parse_type(arena);
        self.expect(Token::Semicolon, "';' after type alias");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::TypeAlias(TypeAliasDecl {
            name,
            aliased,
            docs,
            range,
        }))
    }

    fn parse_global_var_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        docs: Vec<String>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        self.reject_stray_behavior_attr(behavior);
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
        self.expect(Token::Semicolon, "';' after global variable declaration");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::GlobalVar(GlobalVarDecl {
            name,
            type_ann,
            init,
            docs,
            range,
            resolved_type: Default::default(),
        }))
    }

    fn parse_global_const_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        docs: Vec<String>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        self.reject_stray_behavior_attr(behavior);
        let start = self.current_range();
        self.advance(); // 'const'
        let name = self.ident_text("a constant name").unwrap_or_default();
        let type_ann = if self.eat(&Token::Colon) {
            Some(self.parse_type(arena))
        } else {
            None
        };
        self.expect(Token::Eq, "'=' in global const declaration");
        let init = self.parse_expr(arena);
        self.expect(Token::Semicolon, "';' after global const declaration");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::GlobalConst(GlobalConstDecl {
            name,
            type_ann,
            init,
            docs,
            range,
            resolved_type: Default::default(),
            resolved_value: Default::default(),
        }))
    }

    fn parse_tree_decl<'a>(
        &mut self,
        arena: &'a AstArena<'a>,
        docs: Vec<String>,
        behavior: Option<BehaviorAttr>,
    ) -> &'a Decl<'a> {
        self.reject_stray_behavior_attr(behavior);
        let start = self.current_range();
        self.advance(); // 'tree'
        let name = self.ident_text("a tree name").unwrap_or_default();
        self.expect(Token::LParen, "'(' after tree name");
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            params.push(self.parse_param_decl(arena));
            while self.eat(&Token::Comma) {
                if self.check(&Token::RParen) {
                    break;
                }
                params.push(self.parse_param_decl(arena));
            }
        }
        self.expect(Token::RParen, "')' closing parameter list");
        self.expect(Token::LBrace, "'{' opening tree body");
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            if let Some(stmt) = self.parse_stmt(arena) {
                body.push(stmt);
            }
        }
        self.expect(Token::RBrace, "'}' closing tree body");
        let range = start.join(self.prev_range());
        arena.alloc_decl(Decl::Tree(TreeDecl {
            name,
            params,
            body,
            docs,
            range,
        }))
    }
}
