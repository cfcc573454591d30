//! Parser for the literal sub-grammar the board prints.
//!
//! Every remote program ends in a `print(...)` of a literal, and this
//! module turns that text back into host values. The grammar is exactly
//! what MicroPython's `repr` emits for simple data: `None`, booleans,
//! integers, floats, strings, byte strings, tuples, lists and dicts —
//! nothing else. Anything outside the grammar is rejected rather than
//! evaluated.
//!
//! The inverse direction lives here too: [`quote_str`] and [`quote_bytes`]
//! render host values as literals for embedding into generated programs.

use crate::error::{Error, Result};

/// A parsed literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Integer accessor used by stat-tuple readers.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            other => Err(Error::Literal(format!("expected int, got {other:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(Error::Literal(format!("expected str, got {other:?}"))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::Bytes(b) => Ok(b),
            other => Err(Error::Literal(format!("expected bytes, got {other:?}"))),
        }
    }

    /// Items of a tuple or list.
    pub fn items(&self) -> Result<&[Value]> {
        match self {
            Self::Tuple(v) | Self::List(v) => Ok(v),
            other => Err(Error::Literal(format!("expected sequence, got {other:?}"))),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Parse a complete literal; trailing whitespace is allowed, anything
/// else after the value is an error.
pub fn parse(text: &str) -> Result<Value> {
    let mut p = Parser {
        input: text.as_bytes(),
        pos: 0,
    };
    p.skip_ws();
    let value = p.value()?;
    p.skip_ws();
    if p.pos != p.input.len() {
        return Err(p.error("trailing data after literal"));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> Error {
        Error::Literal(format!("{msg} at offset {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.input[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'N') => {
                if self.eat("None") {
                    Ok(Value::None)
                } else {
                    Err(self.error("bad keyword"))
                }
            }
            Some(b'T') => {
                if self.eat("True") {
                    Ok(Value::Bool(true))
                } else {
                    Err(self.error("bad keyword"))
                }
            }
            Some(b'F') => {
                if self.eat("False") {
                    Ok(Value::Bool(false))
                } else {
                    Err(self.error("bad keyword"))
                }
            }
            Some(b'\'' | b'"') => self.string().map(Value::Str),
            Some(b'b') => {
                self.pos += 1;
                if matches!(self.peek(), Some(b'\'' | b'"')) {
                    self.byte_string().map(Value::Bytes)
                } else {
                    Err(self.error("bad bytes literal"))
                }
            }
            Some(b'(') => self.sequence(b')').map(Value::Tuple),
            Some(b'[') => self.sequence(b']').map(Value::List),
            Some(b'{') => self.dict(),
            Some(b'-' | b'+' | b'0'..=b'9') => self.number(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn sequence(&mut self, close: u8) -> Result<Vec<Value>> {
        self.pos += 1; // opener
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => {}
                _ => return Err(self.error("expected ',' or closer")),
            }
        }
    }

    fn dict(&mut self) -> Result<Value> {
        self.pos += 1; // '{'
        let mut pairs = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Value::Dict(pairs));
            }
            let key = self.value()?;
            self.skip_ws();
            if self.bump() != Some(b':') {
                return Err(self.error("expected ':' in dict"));
            }
            self.skip_ws();
            let value = self.value()?;
            pairs.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'-' | b'+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])?;
        if is_float {
            text.parse()
                .map(Value::Float)
                .map_err(|_| self.error("bad float"))
        } else {
            text.parse()
                .map(Value::Int)
                .map_err(|_| self.error("bad int"))
        }
    }

    /// Decode the escape sequence after a backslash. Returns a scalar that
    /// is a Unicode code point for strings and a raw byte value for byte
    /// strings (where values up to 0xff are legal).
    fn escape(&mut self) -> Result<u32> {
        match self.bump() {
            None => Err(self.error("dangling backslash")),
            Some(b'\\') => Ok(u32::from(b'\\')),
            Some(b'\'') => Ok(u32::from(b'\'')),
            Some(b'"') => Ok(u32::from(b'"')),
            Some(b'a') => Ok(0x07),
            Some(b'b') => Ok(0x08),
            Some(b'f') => Ok(0x0c),
            Some(b'n') => Ok(u32::from(b'\n')),
            Some(b'r') => Ok(u32::from(b'\r')),
            Some(b't') => Ok(u32::from(b'\t')),
            Some(b'v') => Ok(0x0b),
            Some(b'x') => self.hex_escape(2),
            Some(b'u') => self.hex_escape(4),
            Some(b'U') => self.hex_escape(8),
            Some(c @ b'0'..=b'7') => {
                let mut value = u32::from(c - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                Ok(value)
            }
            Some(_) => Err(self.error("unknown escape")),
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| (c as char).to_digit(16))
                .ok_or_else(|| self.error("bad hex escape"))?;
            value = value * 16 + d;
        }
        Ok(value)
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().unwrap_or(b'\'');
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some(b'\\') => {
                    let scalar = self.escape()?;
                    out.push(char::from_u32(scalar).unwrap_or('\u{fffd}'));
                }
                Some(c) if c < 0x80 => out.push(c as char),
                Some(c) => {
                    // multi-byte UTF-8: re-scan from the lead byte
                    let start = self.pos - 1;
                    let len = utf8_len(c);
                    let end = start + len;
                    let chunk = self
                        .input
                        .get(start..end)
                        .ok_or_else(|| self.error("truncated UTF-8"))?;
                    out.push_str(std::str::from_utf8(chunk)?);
                    self.pos = end;
                }
            }
        }
    }

    fn byte_string(&mut self) -> Result<Vec<u8>> {
        let quote = self.bump().unwrap_or(b'\'');
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated bytes")),
                Some(c) if c == quote => return Ok(out),
                Some(b'\\') => {
                    let scalar = self.escape()?;
                    if scalar > 0xff {
                        return Err(self.error("escape out of range for bytes"));
                    }
                    out.push(scalar as u8);
                }
                Some(c) => out.push(c),
            }
        }
    }
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

// ── Quoting (codegen side) ───────────────────────────────────

/// Render a string as a single-quoted literal the board parses back to
/// the same text.
pub fn quote_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (c as u32) == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_ascii() => out.push(c),
            c if (c as u32) <= 0xffff => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out.push('\'');
    out
}

/// Render bytes as a `b'...'` literal.
pub fn quote_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 3);
    out.push_str("b'");
    for &b in data {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

// ── Tests ────────────────────────────────────────────────────
