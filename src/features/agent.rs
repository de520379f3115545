//! User-agent descriptor parsing
//!
//! Agent descriptors are serialized Python literals such as
//! `{'browser': 'Chrome', 'os': 'Android', 'browser_version': '112.0'}`.
//! The parser accepts the literal subset those dumps use: dicts, lists,
//! tuples, quoted strings, numbers, `None`, `True` and `False`.

use super::types::CategoryValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A parsed literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Dict(BTreeMap<String, Literal>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Str(s) => f.write_str(s),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Literal::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Position-tagged parse failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: &'static str,
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

/// Maximum nesting accepted before giving up
const MAX_DEPTH: usize = 32;

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    fn err<T>(&self, message: &'static str) -> Result<T, LiteralError> {
        Err(LiteralError { offset: self.pos, message })
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            self.err("unexpected character")
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Literal, LiteralError> {
        if depth > MAX_DEPTH {
            return self.err("nesting too deep");
        }
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_dict(depth),
            Some(b'[') => self.parse_seq(b']', depth),
            Some(b'(') => self.parse_seq(b')', depth),
            Some(b'\'' | b'"') => self.parse_str().map(Literal::Str),
            Some(b'-' | b'+' | b'0'..=b'9' | b'.') => self.parse_number(),
            Some(b'A'..=b'Z' | b'a'..=b'z') => self.parse_keyword(),
            Some(_) => self.err("unexpected character"),
            None => self.err("unexpected end of input"),
        }
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Literal, LiteralError> {
        self.pos += 1;
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Dict(map));
            }
            let key = match self.parse_value(depth + 1)? {
                Literal::Str(s) => s,
                Literal::Dict(_) | Literal::List(_) => return self.err("unhashable dict key"),
                other => other.to_string(),
            };
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            // Python keeps the last value for a repeated key
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return self.err("expected ',' or '}'"),
            }
        }
    }

    fn parse_seq(&mut self, close: u8, depth: usize) -> Result<Literal, LiteralError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Literal::List(items));
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return self.err("expected ',' or closing bracket"),
            }
        }
    }

    fn parse_str(&mut self) -> Result<String, LiteralError> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return self.err("unterminated string"),
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = match self.peek() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => b'\0',
                        Some(c @ (b'\\' | b'\'' | b'"')) => c,
                        Some(_) => {
                            // unknown escapes are kept verbatim, as Python does
                            out.push(b'\\');
                            continue;
                        }
                        None => return self.err("unterminated string"),
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).or_else(|_| self.err("invalid utf-8 in string"))
    }

    fn parse_number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'-' | b'+' | b'0'..=b'9' | b'.' | b'e' | b'E' | b'_')
        ) {
            self.pos += 1;
        }
        let text: String = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .replace('_', "");

        if let Ok(v) = text.parse::<i64>() {
            return Ok(Literal::Int(v));
        }
        match text.parse::<f64>() {
            Ok(v) => Ok(Literal::Float(v)),
            Err(_) => {
                self.pos = start;
                self.err("invalid number")
            }
        }
    }

    fn parse_keyword(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"None" => Ok(Literal::None),
            b"True" => Ok(Literal::Bool(true)),
            b"False" => Ok(Literal::Bool(false)),
            _ => {
                self.pos = start;
                self.err("names are not literals")
            }
        }
    }
}

/// Parse a complete Python-style literal
pub fn parse_literal(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value(0)?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return parser.err("trailing characters");
    }
    Ok(value)
}

/// Category value of one descriptor field; a literal `None` is missing
fn field_value(value: &Literal) -> Option<CategoryValue> {
    match value {
        Literal::None => None,
        Literal::Int(v) => Some(CategoryValue::Int(*v)),
        Literal::Str(s) => Some(CategoryValue::Text(s.clone())),
        other => Some(CategoryValue::Text(other.to_string())),
    }
}

/// Extract `(browser, os)` from a serialized agent descriptor
///
/// An absent key falls back to `"unknown"` on its own, a key holding `None`
/// stays missing. Anything that is not a well-formed dict literal yields
/// `"unknown"` for both fields.
pub fn parse_user_agent(raw: &str) -> (Option<CategoryValue>, Option<CategoryValue>) {
    match parse_literal(raw) {
        Ok(Literal::Dict(map)) => {
            let field = |name: &str| match map.get(name) {
                Some(value) => field_value(value),
                None => Some(CategoryValue::unknown()),
            };
            (field("browser"), field("os"))
        }
        _ => (Some(CategoryValue::unknown()), Some(CategoryValue::unknown())),
    }
}
