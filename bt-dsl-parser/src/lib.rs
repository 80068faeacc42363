//! Hand-written recursive-descent parser for BT-DSL source text. Consumes
//! `bt-dsl-lexer::Token`s and produces `bt-dsl-ast` nodes directly in the
//! caller's arena (spec.md §3's AST kinds).
//!
//! Grounded in the reference frontend's grammar
//! (`lib/syntax/{lexer,BuildType,BuildExpr,BuildStmt,AstBuilder}.cpp`), but
//! hand-rolled rather than built on a parser-generator table: the BT-DSL
//! grammar is small enough that a table buys little, and the teacher crate
//! shows the same cursor-over-a-token-slice shape this module uses.

mod exprs;
mod items;
mod stmts;
mod types;

use bt_dsl_ast::AstArena;
use bt_dsl_ast::Program;
use bt_dsl_diagnostics::{error_codes, ByteRange, Category, Diagnostic, DiagnosticBag};
use bt_dsl_lexer::{tokenize, LexError, Token, TokenSpan};

/// Tokenizes and parses `source` into a `Program` allocated in `arena`.
/// Always returns a `Program` (possibly near-empty on heavy syntax
/// errors) alongside whatever diagnostics were collected, matching the
/// "continue past errors" contract every later pass follows.
pub fn parse_source<'a>(source: &str, arena: &'a AstArena<'a>) -> (&'a Program<'a>, DiagnosticBag) {
    let (tokens, lex_errors) = tokenize(source);
    let mut parser = Parser::new(source, &tokens);
    for err in lex_errors {
        let LexError::InvalidToken(range) = err;
        parser.diagnostics.emit(Diagnostic::error(
            Category::Parse,
            error_codes::PARSE_MALFORMED,
            "invalid token",
            ByteRange::new(range.start, range.end),
        ));
    }
    let program = parser.parse_program(arena);
    (program, parser.diagnostics)
}

pub(crate) struct Parser<'s, 't> {
    source: &'s str,
    tokens: &'t [TokenSpan],
    pos: usize,
    diagnostics: DiagnosticBag,
}

impl<'s, 't> Parser<'s, 't> {
    fn new(source: &'s str, tokens: &'t [TokenSpan]) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            diagnostics: DiagnosticBag::new(),
        }
    }

    pub(crate) fn text(&self, range: ByteRange) -> &'s str {
        &self.source[range.start as usize..range.end as usize]
    }

    pub(crate) fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    pub(crate) fn current_range(&self) -> ByteRange {
        self.tokens
            .get(self.pos)
            .map(|t| ByteRange::new(t.range.start, t.range.end))
            .unwrap_or_else(|| {
                let end = self.source.len() as u32;
                ByteRange::new(end, end)
            })
    }

    pub(crate) fn prev_range(&self) -> ByteRange {
        if self.pos == 0 {
            return self.current_range();
        }
        let t = &self.tokens[self.pos - 1];
        ByteRange::new(t.range.start, t.range.end)
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn advance(&mut self) -> Option<&'t TokenSpan> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes `token` or reports a parse error anchored at the current
    /// position, returning whether it was present.
    pub(crate) fn expect(&mut self, token: Token, what: &str) -> bool {
        if self.eat(&token) {
            true
        } else {
            self.error(format!("expected {what}"));
            false
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.emit(Diagnostic::error(
            Category::Parse,
            error_codes::PARSE_MALFORMED,
            message,
            self.current_range(),
        ));
    }

    /// Skips tokens until one of `sync` is found (or EOF), used to resume
    /// parsing after a malformed declaration/statement instead of
    /// aborting the whole file.
    pub(crate) fn synchronize_to(&mut self, sync: &[Token]) {
        while let Some(tok) = self.peek() {
            if sync.contains(tok) {
                return;
            }
            self.advance();
        }
    }

    /// Collects a run of `///` doc-lines immediately before the cursor.
    pub(crate) fn take_docs(&mut self) -> Vec<String> {
        let mut docs = Vec::new();
        while let Some(Token::DocLine(text)) = self.peek() {
            docs.push(text.clone());
            self.advance();
        }
        docs
    }

    pub(crate) fn ident_text(&mut self, what: &str) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => {
                self.error(format!("expected {what}"));
                None
            }
        }
    }
}
