//! Tokenizer for the policy subset.
//!
//! Every token carries its byte span so that the parser can capture the
//! source text of conditions it does not interpret.

use crate::error::AuthzError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Number(String),
    DoubleColon,
    EqEq,
    AndAnd,
    OrOr,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    /// Any other operator character (`.`, `<`, `!`, ...).
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name == word)
    }
}

/// Human readable token description for error messages.
pub(crate) fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Str(value) => format!("string \"{value}\""),
        TokenKind::Number(value) => format!("number {value}"),
        TokenKind::DoubleColon => "'::'".to_string(),
        TokenKind::EqEq => "'=='".to_string(),
        TokenKind::AndAnd => "'&&'".to_string(),
        TokenKind::OrOr => "'||'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Semicolon => "';'".to_string(),
        TokenKind::Symbol(ch) => format!("'{ch}'"),
    }
}

/// Split policy text into tokens. `//` comments run to the end of the line
/// and are dropped; a `//` inside a string literal is part of the string.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, AuthzError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '/' && source[start..].starts_with("//") {
            while let Some(&(_, c)) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }

        if ch == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = None;
            while let Some((idx, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = Some(idx + 1);
                        break;
                    }
                    '\\' => {
                        let Some((_, escaped)) = chars.next() else {
                            break;
                        };
                        value.push(match escaped {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '0' => '\0',
                            other => other,
                        });
                    }
                    other => value.push(other),
                }
            }
            let Some(end) = closed else {
                return Err(AuthzError::PolicyParse(format!(
                    "unterminated string literal at byte {start}"
                )));
            };
            tokens.push(Token {
                kind: TokenKind::Str(value),
                start,
                end,
            });
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut end = start;
            while let Some(&(idx, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    end = idx + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..end].to_string()),
                start,
                end,
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let mut end = start;
            while let Some(&(idx, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = idx + 1;
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number(source[start..end].to_string()),
                start,
                end,
            });
            continue;
        }

        chars.next();
        let next = chars.peek().map(|&(_, c)| c);
        let (kind, width) = match (ch, next) {
            (':', Some(':')) => (TokenKind::DoubleColon, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            (c, _) if c.is_ascii_punctuation() => (TokenKind::Symbol(c), 1),
            (c, _) => {
                return Err(AuthzError::PolicyParse(format!(
                    "unexpected character '{c}' at byte {start}"
                )));
            }
        };
        if width == 2 {
            chars.next();
        }
        tokens.push(Token {
            kind,
            start,
            end: start + width,
        });
    }

    Ok(tokens)
}
