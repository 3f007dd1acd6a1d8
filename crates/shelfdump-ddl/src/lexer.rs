//! Lexer for `SHOW CREATE TABLE` output using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types for the CREATE TABLE subset.
///
/// Keywords are not separate tokens: MySQL keywords are case-insensitive and
/// most of them are also legal bare identifiers, so the parser matches
/// [`Token::Word`] values with [`Token::is_keyword`].
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Backtick-quoted identifier, unquoted
    #[regex(r"`([^`]|``)*`", |lex| unquote_identifier(lex.slice()))]
    QuotedIdent(String),

    // Bare word: keyword, type name, or unquoted identifier
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Word(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    // String literals keep their quotes; they are only ever re-emitted verbatim
    #[regex(r"'([^'\\]|\\.|'')*'", |lex| lex.slice().to_string())]
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    StringLit(String),

    // Block comment, including versioned `/*!50100 ... */` annotations
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| lex.slice().to_string())]
    Comment(String),

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,

    // Any other single character (operators inside defaults and checks)
    #[regex(r"[^ \t\r\n\f`'\x22(),=.;A-Za-z0-9_$]", |lex| lex.slice().to_string())]
    Symbol(String),
}

impl Token {
    /// Check whether this token is the given keyword, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    /// The identifier carried by this token, quoted or bare.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Token::QuotedIdent(name) | Token::Word(name) => Some(name),
            _ => None,
        }
    }
}

fn unquote_identifier(raw: &str) -> String {
    raw[1..raw.len() - 1].replace("``", "`")
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize a definition into spanned tokens.
///
/// Unlike a best-effort lexer this fails on the first byte that starts no
/// valid token (an unterminated quote or comment), reporting its position.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span: Span = lexer.span().into();
        match result {
            Ok(token) => tokens.push(SpannedToken { token, span }),
            Err(()) => {
                return Err(ParseError::new(
                    format!("unrecognized input {:?}", lexer.slice()),
                    span,
                )
                .with_hint("check for an unterminated quote or comment"));
            }
        }
    }

    Ok(tokens)
}
