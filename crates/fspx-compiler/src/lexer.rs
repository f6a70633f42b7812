//! Lexer for the FSP source language.
//!
//! Produces span-based tokens; text is sliced from the source only when
//! needed. Consecutive unknown characters coalesce into single `Garbage`
//! tokens so malformed input stays manageable.

use logos::Logos;

use crate::diagnostics::Span;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"/\*(?:[^*]|\*[^/])*\*/")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Tok {
    #[token("const")]
    ConstKwd,
    #[token("range")]
    RangeKwd,
    #[token("set")]
    SetKwd,
    #[token("property")]
    PropertyKwd,
    #[token("progress")]
    ProgressKwd,
    #[token("menu")]
    MenuKwd,
    #[token("if")]
    IfKwd,
    #[token("then")]
    ThenKwd,
    #[token("else")]
    ElseKwd,
    #[token("when")]
    WhenKwd,
    #[token("forall")]
    ForallKwd,
    #[token("END")]
    EndKwd,
    #[token("STOP")]
    StopKwd,
    #[token("ERROR")]
    ErrorKwd,

    #[regex("[a-z][A-Za-z0-9_]*")]
    LowerId,
    #[regex("[A-Z][A-Za-z0-9_]*")]
    UpperId,
    #[regex("[0-9]+")]
    Int,

    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token(",")]
    Comma,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("||")]
    OrOr,
    #[token("|")]
    Or,
    #[token("&&")]
    AndAnd,
    #[token("&")]
    And,
    #[token("^")]
    Caret,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=")]
    Eq,
    #[token("!")]
    Not,
    #[token("<=")]
    Le,
    #[token("<<")]
    Shl,
    #[token("<")]
    Lt,
    #[token(">=")]
    Ge,
    #[token(">>")]
    Shr,
    #[token(">")]
    Gt,
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
    #[token("@")]
    At,
    #[token("\\")]
    Backslash,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// Coalesced run of unrecognized characters.
    Garbage,
    /// Virtual end-of-input token.
    Eof,
}

/// Token: kind plus source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: Tok,
    pub span: Span,
}

impl Token {
    pub fn new(kind: Tok, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Tokenizes the source, coalescing lexer errors into `Garbage` tokens.
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(source);
    let mut error_start: Option<usize> = None;

    loop {
        match lexer.next() {
            Some(Ok(kind)) => {
                if let Some(start) = error_start.take() {
                    let end = lexer.span().start;
                    tokens.push(Token::new(
                        Tok::Garbage,
                        Span::new(start as u32, end as u32),
                    ));
                }
                let span = lexer.span();
                tokens.push(Token::new(
                    kind,
                    Span::new(span.start as u32, span.end as u32),
                ));
            }
            Some(Err(())) => {
                if error_start.is_none() {
                    error_start = Some(lexer.span().start);
                }
            }
            None => {
                if let Some(start) = error_start.take() {
                    tokens.push(Token::new(
                        Tok::Garbage,
                        Span::new(start as u32, source.len() as u32),
                    ));
                }
                break;
            }
        }
    }

    tokens
}

/// Retrieves the text slice for a token.
#[inline]
pub fn token_text<'s>(source: &'s str, token: &Token) -> &'s str {
    &source[token.span.start as usize..token.span.end as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(
            kinds("const range STOP stopgap ENDED"),
            vec![
                Tok::ConstKwd,
                Tok::RangeKwd,
                Tok::StopKwd,
                Tok::LowerId,
                Tok::UpperId
            ]
        );
    }

    #[test]
    fn compound_operators_win_over_singles() {
        assert_eq!(
            kinds("-> .. :: || << >= =="),
            vec![
                Tok::Arrow,
                Tok::DotDot,
                Tok::ColonColon,
                Tok::OrOr,
                Tok::Shl,
                Tok::Ge,
                Tok::EqEq
            ]
        );
        assert_eq!(kinds(". : | < > ="), vec![
            Tok::Dot,
            Tok::Colon,
            Tok::Or,
            Tok::Lt,
            Tok::Gt,
            Tok::Eq
        ]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a /* block */ b // line\nc"),
            vec![Tok::LowerId, Tok::LowerId, Tok::LowerId]
        );
    }

    #[test]
    fn process_definition_shape() {
        let source = "P = (a -> b -> STOP).";
        assert_eq!(
            kinds(source),
            vec![
                Tok::UpperId,
                Tok::Eq,
                Tok::LParen,
                Tok::LowerId,
                Tok::Arrow,
                Tok::LowerId,
                Tok::Arrow,
                Tok::StopKwd,
                Tok::RParen,
                Tok::Dot
            ]
        );
    }

    #[test]
    fn garbage_coalesces() {
        let tokens = lex("a ### b");
        let garbage: Vec<_> = tokens.iter().filter(|t| t.kind == Tok::Garbage).collect();
        assert_eq!(garbage.len(), 1);
        assert_eq!(garbage[0].span, Span::new(2, 5));
    }
}
