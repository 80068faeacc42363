//! Tokenizer for BT-DSL source text. Upstream collaborator to the parser
//! (spec.md §1): its only contract is accurate byte ranges. Keyword and
//! operator inventory is grounded in `lexer.cpp`/`keywords.hpp` of the
//! reference frontend; this version uses `logos` to declare tokens
//! directly rather than a hand-rolled character scanner.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ------------------------------------------------------------ keywords
    #[token("import")]
    Import,
    #[token("extern")]
    Extern,
    #[token("type")]
    Type,
    #[token("var")]
    Var,
    #[token("const")]
    Const,
    #[token("tree")]
    Tree,

    #[token("in")]
    In,
    #[token("out")]
    Out,
    #[token("ref")]
    Ref,
    #[token("mut")]
    Mut,

    #[token("action")]
    Action,
    #[token("condition")]
    Condition,
    #[token("control")]
    Control,
    #[token("decorator")]
    Decorator,
    #[token("subtree")]
    Subtree,

    #[token("guard")]
    Guard,
    #[token("success_if")]
    SuccessIf,
    #[token("failure_if")]
    FailureIf,
    #[token("skip_if")]
    SkipIf,
    #[token("run_while")]
    RunWhile,

    #[token("as")]
    As,
    #[token("vec")]
    Vec,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ------------------------------------------------------------- trivia
    #[regex(r"///[^\n]*", |lex| lex.slice()[3..].trim_start_matches(' ').to_string(), priority = 10)]
    DocLine(String),
    #[regex(r"//![^\n]*", |lex| lex.slice()[3..].trim_start_matches(' ').to_string(), priority = 10)]
    DocModule(String),
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,

    // ----------------------------------------------------------- literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| lex.slice().to_string())]
    #[regex(r"0[bB][01]+", |lex| lex.slice().to_string())]
    #[regex(r"0[oO][0-7]+", |lex| lex.slice().to_string())]
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    IntLiteral(String),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse().ok())]
    FloatLiteral(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    StringLiteral(String),

    // -------------------------------------------------------- punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("#")]
    Hash,

    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,

    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
}

impl Token {
    /// True for tokens the parser should never see in its main grammar
    /// walk (doc comments are attached to the next declaration instead).
    pub fn is_doc(&self) -> bool {
        matches!(self, Token::DocLine(_) | Token::DocModule(_))
    }
}

fn unescape(literal: &str) -> Option<String> {
    let inner = literal.get(1..literal.len().saturating_sub(1))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'u' => {
                if chars.next() != Some('{') {
                    return None;
                }
                let mut hex = String::new();
                for h in chars.by_ref() {
                    if h == '}' {
                        break;
                    }
                    hex.push(h);
                }
                if hex.is_empty() || hex.len() > 6 {
                    return None;
                }
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub range: std::ops::Range<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("invalid token at {0:?}")]
    InvalidToken(std::ops::Range<u32>),
}

/// Tokenizes `source`, dropping non-doc comments and reporting invalid
/// byte sequences as errors without stopping the scan (the parser later
/// decides what to do with a short token list).
pub fn tokenize(source: &str) -> (Vec<TokenSpan>, Vec<LexError>) {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let range = span.start as u32..span.end as u32;
        match result {
            Ok(token) => tokens.push(TokenSpan { token, range }),
            Err(()) => errors.push(LexError::InvalidToken(range)),
        }
    }
    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).0.into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("tree Main() { }"),
            vec![
                Token::Tree,
                Token::Ident("Main".into()),
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn integer_bases() {
        assert_eq!(
            kinds("0x1A 0b101 0o17 42"),
            vec![
                Token::IntLiteral("0x1A".into()),
                Token::IntLiteral("0b101".into()),
                Token::IntLiteral("0o17".into()),
                Token::IntLiteral("42".into()),
            ]
        );
    }

    #[test]
    fn float_literal_with_exponent() {
        assert_eq!(kinds("1.5e10"), vec![Token::FloatLiteral(1.5e10)]);
    }

    #[test]
    fn string_escape_unicode() {
        assert_eq!(
            kinds(r#""a\u{41}b""#),
            vec![Token::StringLiteral("aAb".into())]
        );
    }

    #[test]
    fn doc_line_strips_marker_and_one_space() {
        assert_eq!(
            kinds("/// hello"),
            vec![Token::DocLine("hello".into())]
        );
    }

    #[test]
    fn precondition_keywords() {
        assert_eq!(
            kinds("@guard(ok)"),
            vec![
                Token::At,
                Token::Guard,
                Token::LParen,
                Token::Ident("ok".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn behavior_attribute_tokens() {
        assert_eq!(
            kinds("#[behavior(All, Chained)]"),
            vec![
                Token::Hash,
                Token::LBracket,
                Token::Ident("behavior".into()),
                Token::LParen,
                Token::Ident("All".into()),
                Token::Comma,
                Token::Ident("Chained".into()),
                Token::RParen,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn unterminated_string_reported_as_error_not_panic() {
        let (tokens, errors) = tokenize("\"unterminated");
        assert!(tokens.is_empty());
        assert_eq!(errors.len(), 1);
    }
}
