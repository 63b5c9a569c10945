//! TQL tokenizer.
//!
//! Keywords are not reserved at this level: words are emitted as
//! [`TokenKind::Word`] and the parser matches them case-insensitively where
//! the grammar expects a keyword, so fields may be named `type` or `parent`.

use crate::datetime::PeriodUnit;
use crate::types::{Location, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Field names and keywords.
    Word(String),
    /// `@name` or `@name.sub`, without the `@`.
    Metadata(String),
    String(String),
    Integer(i64),
    Float(f64),
    /// A `NOW()` offset such as `3d`.
    Period(i64, PeriodUnit),
    Equal,
    NotEqual,
    Lesser,
    LesserOrEqual,
    Greater,
    GreaterOrEqual,
    Plus,
    Minus,
    LeftParen,
    RightParen,
    Comma,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{w}'"),
            TokenKind::Metadata(m) => write!(f, "'@{m}'"),
            TokenKind::String(s) => write!(f, "string \"{s}\""),
            TokenKind::Integer(n) => write!(f, "'{n}'"),
            TokenKind::Float(n) => write!(f, "'{n}'"),
            TokenKind::Period(n, unit) => write!(f, "'{n}{}'", unit.suffix()),
            TokenKind::Equal => write!(f, "'='"),
            TokenKind::NotEqual => write!(f, "'!='"),
            TokenKind::Lesser => write!(f, "'<'"),
            TokenKind::LesserOrEqual => write!(f, "'<='"),
            TokenKind::Greater => write!(f, "'>'"),
            TokenKind::GreaterOrEqual => write!(f, "'>='"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Eof => write!(f, "end of query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    /// Whether this token is the given keyword (case-insensitive).
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

struct Cursor<'a> {
    chars: Vec<(usize, char)>,
    input: &'a str,
    i: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().collect(),
            input,
            i: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).map(|(_, c)| *c)
    }

    fn location(&self) -> Location {
        Location {
            offset: self.chars.get(self.i).map_or(self.input.len(), |(o, _)| *o),
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn error(message: impl Into<String>, location: Location) -> SyntaxError {
    SyntaxError {
        message: message.into(),
        location,
    }
}

/// Split a TQL query into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut cursor = Cursor::new(input);
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        if c.is_whitespace() {
            cursor.bump();
            continue;
        }

        let location = cursor.location();
        let kind = match c {
            '\'' | '"' => lex_string(&mut cursor, c, location)?,
            '@' => {
                cursor.bump();
                let name = cursor.take_while(|c| is_word_char(c) || c == '.');
                if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
                    return Err(error("Expected a metadata name after '@'", location));
                }
                TokenKind::Metadata(name.to_lowercase())
            }
            '0'..='9' => lex_number(&mut cursor, location)?,
            '=' => {
                cursor.bump();
                TokenKind::Equal
            }
            '!' => {
                cursor.bump();
                if cursor.peek() != Some('=') {
                    return Err(error("Expected '=' after '!'", location));
                }
                cursor.bump();
                TokenKind::NotEqual
            }
            '<' | '>' => {
                cursor.bump();
                let or_equal = cursor.peek() == Some('=');
                if or_equal {
                    cursor.bump();
                }
                match (c, or_equal) {
                    ('<', false) => TokenKind::Lesser,
                    ('<', true) => TokenKind::LesserOrEqual,
                    ('>', false) => TokenKind::Greater,
                    _ => TokenKind::GreaterOrEqual,
                }
            }
            '+' => {
                cursor.bump();
                TokenKind::Plus
            }
            '-' => {
                cursor.bump();
                TokenKind::Minus
            }
            '(' => {
                cursor.bump();
                TokenKind::LeftParen
            }
            ')' => {
                cursor.bump();
                TokenKind::RightParen
            }
            ',' => {
                cursor.bump();
                TokenKind::Comma
            }
            c if is_word_char(c) => TokenKind::Word(cursor.take_while(is_word_char)),
            other => {
                return Err(error(format!("Unexpected character '{other}'"), location));
            }
        };
        tokens.push(Token { kind, location });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        location: cursor.location(),
    });
    Ok(tokens)
}

fn lex_string(cursor: &mut Cursor<'_>, quote: char, location: Location) -> Result<TokenKind, SyntaxError> {
    cursor.bump();
    let mut value = String::new();
    loop {
        match cursor.bump() {
            None => return Err(error("Unterminated string", location)),
            Some('\\') => match cursor.bump() {
                Some(escaped) => value.push(escaped),
                None => return Err(error("Unterminated string", location)),
            },
            Some(c) if c == quote => break,
            Some(c) => value.push(c),
        }
    }
    Ok(TokenKind::String(value))
}

fn lex_number(cursor: &mut Cursor<'_>, location: Location) -> Result<TokenKind, SyntaxError> {
    let mut digits = cursor.take_while(|c| c.is_ascii_digit());
    let is_float = cursor.peek() == Some('.') && cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit());
    if is_float {
        cursor.bump();
        digits.push('.');
        digits.push_str(&cursor.take_while(|c| c.is_ascii_digit()));
        let value = digits
            .parse::<f64>()
            .map_err(|_| error(format!("Invalid number '{digits}'"), location))?;
        return Ok(TokenKind::Float(value));
    }

    let value = digits
        .parse::<i64>()
        .map_err(|_| error(format!("Number '{digits}' is too large"), location))?;

    // `3d`, `2w`, ...: a period, but only when the suffix ends the word.
    if let Some(unit) = cursor.peek().and_then(PeriodUnit::from_suffix) {
        if !cursor.peek_at(1).is_some_and(is_word_char) {
            cursor.bump();
            return Ok(TokenKind::Period(value, unit));
        }
    }
    if cursor.peek().is_some_and(is_word_char) {
        return Err(error(format!("Unexpected character after number '{digits}'"), cursor.location()));
    }
    Ok(TokenKind::Integer(value))
}
