//! Tokenizer for rule conditions.

use std::fmt;

use crate::error::{AlertError, Result};

/// A token kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::True => f.write_str("'true'"),
            Self::False => f.write_str("'false'"),
            Self::And => f.write_str("'and'"),
            Self::Or => f.write_str("'or'"),
            Self::Not => f.write_str("'not'"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::EqEq => f.write_str("'=='"),
            Self::Ne => f.write_str("'!='"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::Percent => f.write_str("'%'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// A token and its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

fn error(pos: usize, reason: impl Into<String>) -> AlertError {
    AlertError::ParseError {
        position: pos,
        reason: reason.into(),
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

/// Splits `src` into tokens. The last token is always [`TokenKind::Eof`].
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let two = bytes.get(i + 1).copied();
        let kind = match (c, two) {
            (b'<', Some(b'=')) => {
                i += 2;
                TokenKind::Le
            }
            (b'>', Some(b'=')) => {
                i += 2;
                TokenKind::Ge
            }
            (b'=', Some(b'=')) => {
                i += 2;
                TokenKind::EqEq
            }
            (b'!', Some(b'=')) => {
                i += 2;
                TokenKind::Ne
            }
            (b'&', Some(b'&')) => {
                i += 2;
                TokenKind::And
            }
            (b'|', Some(b'|')) => {
                i += 2;
                TokenKind::Or
            }
            (b'=', _) => return Err(error(start, "unexpected '=', use '==' to compare")),
            (b'&' | b'|', _) => {
                return Err(error(start, format!("unexpected '{}'", char::from(c))));
            }
            (b'<', _) => {
                i += 1;
                TokenKind::Lt
            }
            (b'>', _) => {
                i += 1;
                TokenKind::Gt
            }
            (b'!', _) => {
                i += 1;
                TokenKind::Not
            }
            (b'+', _) => {
                i += 1;
                TokenKind::Plus
            }
            (b'-', _) => {
                i += 1;
                TokenKind::Minus
            }
            (b'*', _) => {
                i += 1;
                TokenKind::Star
            }
            (b'/', _) => {
                i += 1;
                TokenKind::Slash
            }
            (b'%', _) => {
                i += 1;
                TokenKind::Percent
            }
            (b'(', _) => {
                i += 1;
                TokenKind::LParen
            }
            (b')', _) => {
                i += 1;
                TokenKind::RParen
            }
            (b'[', _) => {
                i += 1;
                TokenKind::LBracket
            }
            (b']', _) => {
                i += 1;
                TokenKind::RBracket
            }
            (b'"' | b'\'', _) => {
                let (value, end) = lex_string(src, start)?;
                i = end;
                TokenKind::Str(value)
            }
            (b'0'..=b'9' | b'.', _) => {
                let (value, end) = lex_number(src, start)?;
                i = end;
                TokenKind::Number(value)
            }
            (b'a'..=b'z' | b'A'..=b'Z' | b'_', _) => {
                let mut end = i + 1;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || matches!(bytes[end], b'_' | b'.'))
                {
                    end += 1;
                }
                let word = &src[start..end];
                i = end;
                keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
            }
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(error(start, format!("unexpected character '{ch}'")));
            }
        };

        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: src.len(),
    });
    Ok(tokens)
}

fn lex_string(src: &str, start: usize) -> Result<(String, usize)> {
    let mut chars = src[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(error(start, "expected string"));
    };

    let mut value = String::new();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    '\\' | '\'' | '"' => value.push(escaped),
                    other => {
                        return Err(error(
                            start + offset,
                            format!("unknown escape '\\{other}'"),
                        ));
                    }
                }
            }
            c if c == quote => return Ok((value, start + offset + c.len_utf8())),
            c => value.push(c),
        }
    }

    Err(error(start, "unterminated string"))
}

fn lex_number(src: &str, start: usize) -> Result<(f64, usize)> {
    let bytes = src.as_bytes();
    let mut end = start;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            end = exp;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text = &src[start..end];
    text.parse::<f64>()
        .map(|value| (value, end))
        .map_err(|_| error(start, format!("invalid number '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn comparison_with_index() {
        assert_eq!(
            kinds(r#"metrics["cpu"] > 90"#),
            vec![
                TokenKind::Ident("metrics".to_string()),
                TokenKind::LBracket,
                TokenKind::Str("cpu".to_string()),
                TokenKind::RBracket,
                TokenKind::Gt,
                TokenKind::Number(90.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn symbolic_and_word_operators() {
        assert_eq!(
            kinds("a && b || !c and d or not e"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::And,
                TokenKind::Ident("b".to_string()),
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Ident("c".to_string()),
                TokenKind::And,
                TokenKind::Ident("d".to_string()),
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Ident("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dotted_identifiers() {
        assert_eq!(
            kinds("temperatures.core"),
            vec![TokenKind::Ident("temperatures.core".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 2E-2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(0.02),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![
                TokenKind::Str("it's".to_string()),
                TokenKind::Str("a\"b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_equals_is_rejected() {
        let err = tokenize("cpu = 90").unwrap_err();
        assert!(matches!(err, AlertError::ParseError { position: 4, .. }));
    }

    #[test]
    fn unterminated_string() {
        assert!(tokenize(r#"metrics["cpu] > 1"#).is_err());
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("cpu > 90 ; rm").unwrap_err();
        assert!(matches!(err, AlertError::ParseError { position: 9, .. }));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("ab >= 3").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.pos).collect();
        assert_eq!(positions, vec![0, 3, 6, 7]);
    }
}
