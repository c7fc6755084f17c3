//! Lexical tokeniser.
//!
//! The input is a preprocessed text stream: `# LINENO "FILENAME"` linemarks
//! appear at column 0 and keep the lexer's idea of the current file and
//! line in sync with the original source. Directives whose filename starts
//! with `<` are internal preprocessor files and are ignored.
//!
//! The lexer exposes exactly one token of lookahead through [`Lexer::scan`]
//! and [`Lexer::peek_kind`]; the peek slot is part of the lexer state.

use crate::errors::{CompileError, Result};
use crate::types::{LitVal, Type};
use std::io::Write;

/// Maximum length of an identifier or string literal.
const TEXTLEN: usize = 511;

/// Characters that may appear inside a numeric literal.
const NUMCHARS: &[u8] = b"0123456789ABCDEFabcdef.x";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    // Binary operators in ascending precedence order
    Amper,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Lshift,
    Rshift,
    Plus,
    Minus,
    Star,
    Slash,

    // Other operators
    Assign,
    Invert,
    LogNot,
    LogAnd,
    LogOr,

    // Built-in type keywords
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Flt32,
    Flt64,

    // Other keywords
    If,
    Else,
    False,
    For,
    Printf,
    True,
    While,

    // Structural tokens
    NumLit,
    StrLit,
    Semi,
    Ident,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
}

impl TokenKind {
    /// The display name used in diagnostics and the token dump.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Eof => "EOF",
            TokenKind::Amper => "&",
            TokenKind::Or => "|",
            TokenKind::Xor => "^",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::Lshift => "<<",
            TokenKind::Rshift => ">>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Assign => "=",
            TokenKind::Invert => "~",
            TokenKind::LogNot => "!",
            TokenKind::LogAnd => "&&",
            TokenKind::LogOr => "||",
            TokenKind::Void => "void",
            TokenKind::Bool => "bool",
            TokenKind::Int8 => "int8",
            TokenKind::Int16 => "int16",
            TokenKind::Int32 => "int32",
            TokenKind::Int64 => "int64",
            TokenKind::Uint8 => "uint8",
            TokenKind::Uint16 => "uint16",
            TokenKind::Uint32 => "uint32",
            TokenKind::Uint64 => "uint64",
            TokenKind::Flt32 => "flt32",
            TokenKind::Flt64 => "flt64",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::Printf => "printf",
            TokenKind::True => "true",
            TokenKind::While => "while",
            TokenKind::NumLit => "numlit",
            TokenKind::StrLit => "strlit",
            TokenKind::Semi => ";",
            TokenKind::Ident => "ident",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
        }
    }

    /// The built-in type named by this token, if it is a type keyword.
    pub fn type_keyword(self) -> Option<Type> {
        match self {
            TokenKind::Void => Some(Type::Void),
            TokenKind::Bool => Some(Type::Bool),
            TokenKind::Int8 => Some(Type::Int8),
            TokenKind::Int16 => Some(Type::Int16),
            TokenKind::Int32 => Some(Type::Int32),
            TokenKind::Int64 => Some(Type::Int64),
            TokenKind::Uint8 => Some(Type::Uint8),
            TokenKind::Uint16 => Some(Type::Uint16),
            TokenKind::Uint32 => Some(Type::Uint32),
            TokenKind::Uint64 => Some(Type::Uint64),
            TokenKind::Flt32 => Some(Type::Flt32),
            TokenKind::Flt64 => Some(Type::Flt64),
            _ => None,
        }
    }
}

/// One scanned token. `text` is owned by the token and moves into the AST
/// node that consumes it.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Option<String>,
    pub num: LitVal,
}

impl Token {
    fn new(kind: TokenKind) -> Token {
        Token {
            kind,
            text: None,
            num: LitVal::default(),
        }
    }
}

impl Default for Token {
    fn default() -> Token {
        Token::new(TokenKind::Eof)
    }
}

/// Keywords sorted by first letter; the leading byte allows early exit
/// during lookup.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("bool", TokenKind::Bool),
    ("else", TokenKind::Else),
    ("false", TokenKind::False),
    ("flt32", TokenKind::Flt32),
    ("flt64", TokenKind::Flt64),
    ("for", TokenKind::For),
    ("if", TokenKind::If),
    ("int8", TokenKind::Int8),
    ("int16", TokenKind::Int16),
    ("int32", TokenKind::Int32),
    ("int64", TokenKind::Int64),
    ("printf", TokenKind::Printf),
    ("true", TokenKind::True),
    ("uint8", TokenKind::Uint8),
    ("uint16", TokenKind::Uint16),
    ("uint32", TokenKind::Uint32),
    ("uint64", TokenKind::Uint64),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
];

fn keyword(text: &str) -> Option<TokenKind> {
    let first = *text.as_bytes().first()?;
    for (kw, kind) in KEYWORDS {
        let lead = kw.as_bytes()[0];
        if lead < first {
            continue;
        }
        if lead > first {
            return None;
        }
        if *kw == text {
            return Some(*kind);
        }
    }
    None
}

/// The tokeniser. Works over the whole preprocessed source as bytes; the
/// language is ASCII-only.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    filename: String,
    line: u32,
    at_line_start: bool,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, filename: &str) -> Lexer<'a> {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            filename: filename.to_string(),
            line: 1,
            at_line_start: true,
            peeked: None,
        }
    }

    /// Current file name, as maintained by linemarks.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Current line number.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Build a fatal error at the current position.
    pub fn fatal(&self, message: impl Into<String>) -> CompileError {
        CompileError::fatal(self.filename.clone(), self.line, message)
    }

    /// Return the next token, consuming the peek slot if one is present.
    pub fn scan(&mut self) -> Result<Token> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.scan_token()
    }

    /// Look at the next token's kind without consuming it.
    pub fn peek_kind(&mut self) -> Result<TokenKind> {
        if self.peeked.is_none() {
            let tok = self.scan_token()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.as_ref().map_or(TokenKind::Eof, |t| t.kind))
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.src.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.at_line_start = true;
        } else {
            self.at_line_start = false;
        }
        Some(b)
    }

    /// Consume the byte if it matches.
    fn eat(&mut self, expected: u8) -> bool {
        if self.peek_byte() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and linemark directives; return the first
    /// significant byte, consumed.
    fn skip(&mut self) -> Result<Option<u8>> {
        loop {
            match self.peek_byte() {
                None => return Ok(None),
                Some(b'#') if self.at_line_start => self.linemark()?,
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(_) => return Ok(self.bump()),
            }
        }
    }

    /// Consume a `# LINENO "FILENAME"` directive at column 0.
    fn linemark(&mut self) -> Result<()> {
        self.bump(); // '#'
        while matches!(self.peek_byte(), Some(b' ') | Some(b'\t')) {
            self.bump();
        }

        let mut digits = String::new();
        while let Some(b) = self.peek_byte() {
            if !b.is_ascii_digit() {
                break;
            }
            digits.push(b as char);
            self.bump();
        }
        let lineno: u32 = digits
            .parse()
            .map_err(|_| self.fatal("Expecting pre-processor line number"))?;

        while matches!(self.peek_byte(), Some(b' ') | Some(b'\t')) {
            self.bump();
        }
        if !self.eat(b'"') {
            return Err(self.fatal("Expecting pre-processor file name"));
        }
        let mut name = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(self.fatal("Expecting pre-processor file name"));
                }
                Some(b'"') => break,
                Some(b) => name.push(b as char),
            }
        }

        // Filenames starting with '<' are internal preprocessor files;
        // their line number update is suppressed.
        if !name.starts_with('<') {
            if name != self.filename {
                self.filename = name;
            }
            self.line = lineno;
        }

        // Skip to the end of the directive line. Its newline belongs to
        // the directive and must not bump the line counter.
        while let Some(b) = self.src.get(self.pos).copied() {
            self.pos += 1;
            if b == b'\n' {
                break;
            }
        }
        self.at_line_start = true;
        Ok(())
    }

    fn scan_token(&mut self) -> Result<Token> {
        let c = match self.skip()? {
            None => return Ok(Token::new(TokenKind::Eof)),
            Some(c) => c,
        };

        let tok = match c {
            b'+' => Token::new(TokenKind::Plus),
            b'-' => {
                // A minus directly before a digit is part of the literal.
                if self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                    let first = self.bump().unwrap_or(b'0');
                    let num = self.scan_numlit(first, true)?;
                    let mut t = Token::new(TokenKind::NumLit);
                    t.num = num;
                    t
                } else {
                    Token::new(TokenKind::Minus)
                }
            }
            b'*' => Token::new(TokenKind::Star),
            b'/' => Token::new(TokenKind::Slash),
            b';' => Token::new(TokenKind::Semi),
            b'{' => Token::new(TokenKind::LBrace),
            b'}' => Token::new(TokenKind::RBrace),
            b'(' => Token::new(TokenKind::LParen),
            b')' => Token::new(TokenKind::RParen),
            b'~' => Token::new(TokenKind::Invert),
            b'^' => Token::new(TokenKind::Xor),
            b',' => Token::new(TokenKind::Comma),
            b'=' => {
                if self.eat(b'=') {
                    Token::new(TokenKind::Eq)
                } else {
                    Token::new(TokenKind::Assign)
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    Token::new(TokenKind::Ne)
                } else {
                    Token::new(TokenKind::LogNot)
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    Token::new(TokenKind::Le)
                } else if self.eat(b'<') {
                    Token::new(TokenKind::Lshift)
                } else {
                    Token::new(TokenKind::Lt)
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::new(TokenKind::Ge)
                } else if self.eat(b'>') {
                    Token::new(TokenKind::Rshift)
                } else {
                    Token::new(TokenKind::Gt)
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    Token::new(TokenKind::LogAnd)
                } else {
                    Token::new(TokenKind::Amper)
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    Token::new(TokenKind::LogOr)
                } else {
                    Token::new(TokenKind::Or)
                }
            }
            b'\'' => {
                let value = self.scanch()?;
                if !self.eat(b'\'') {
                    return Err(self.fatal("Expected '\\'' at end of char literal"));
                }
                let mut t = Token::new(TokenKind::NumLit);
                t.num = LitVal::Char(value);
                t
            }
            b'"' => {
                let text = self.scan_str()?;
                let mut t = Token::new(TokenKind::StrLit);
                t.text = Some(text);
                t
            }
            b if b.is_ascii_digit() => {
                let num = self.scan_numlit(b, false)?;
                let mut t = Token::new(TokenKind::NumLit);
                t.num = num;
                t
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let text = self.scan_ident(b)?;
                match keyword(&text) {
                    Some(kind) => Token::new(kind),
                    None => {
                        let mut t = Token::new(TokenKind::Ident);
                        t.text = Some(text);
                        t
                    }
                }
            }
            b => {
                return Err(self.fatal(format!("Unrecognised character: {}", b as char)));
            }
        };

        Ok(tok)
    }

    /// Scan a numeric literal whose first digit has been consumed.
    fn scan_numlit(&mut self, first: u8, is_negative: bool) -> Result<LitVal> {
        let mut text = String::new();
        text.push(first as char);
        while let Some(b) = self.peek_byte() {
            if !NUMCHARS.contains(&b) {
                break;
            }
            text.push(b as char);
            self.bump();
        }

        // A leading minus flips the literal to signed; the magnitude is
        // read as decimal digits only.
        if is_negative {
            let mut mag: u64 = 0;
            for b in text.bytes() {
                if !b.is_ascii_digit() {
                    break;
                }
                mag = mag
                    .wrapping_mul(10)
                    .wrapping_add((b - b'0') as u64);
            }
            return Ok(LitVal::Int((mag as i64).wrapping_neg()));
        }

        if text.contains('.') {
            let value: f64 = text
                .parse()
                .map_err(|_| self.fatal(format!("invalid numeric literal {}", text)))?;
            return Ok(LitVal::Flt(value));
        }

        // Radix from the prefix: 0x is hex, a bare leading 0 is octal.
        let bytes = text.as_bytes();
        let (radix, start) = if bytes[0] == b'0' && bytes.get(1) == Some(&b'x') {
            (16u64, 2)
        } else if bytes[0] == b'0' {
            (8u64, 1)
        } else {
            (10u64, 0)
        };

        let mut value: u64 = 0;
        for b in &bytes[start..] {
            let digit = match (*b as char).to_digit(radix as u32) {
                Some(d) => d as u64,
                None => break,
            };
            value = value.wrapping_mul(radix).wrapping_add(digit);
        }
        Ok(LitVal::Uint(value))
    }

    /// Read one logical character from a character or string literal,
    /// interpreting backslash escapes.
    fn scanch(&mut self) -> Result<u8> {
        let c = self
            .bump()
            .ok_or_else(|| self.fatal("unexpected end of input in literal"))?;
        if c != b'\\' {
            return Ok(c);
        }

        let e = self
            .bump()
            .ok_or_else(|| self.fatal("unexpected end of input in literal"))?;
        match e {
            b'a' => Ok(0x07),
            b'b' => Ok(0x08),
            b'f' => Ok(0x0c),
            b'n' => Ok(b'\n'),
            b'r' => Ok(b'\r'),
            b't' => Ok(b'\t'),
            b'v' => Ok(0x0b),
            b'\\' => Ok(b'\\'),
            b'"' => Ok(b'"'),
            b'\'' => Ok(b'\''),
            b'0'..=b'7' => {
                // Up to three octal digits.
                let mut value = (e - b'0') as u32;
                let mut count = 1;
                while count < 3 {
                    match self.peek_byte() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.bump();
                            count += 1;
                        }
                        _ => break,
                    }
                }
                Ok(value as u8)
            }
            b'x' => self.hexchar(),
            _ => Err(self.fatal(format!("unknown escape sequence {}", e as char))),
        }
    }

    /// Read the hex digits of a `\xHH` escape.
    fn hexchar(&mut self) -> Result<u8> {
        let mut value: u32 = 0;
        let mut seen = false;
        while let Some(b) = self.peek_byte() {
            let digit = match (b as char).to_digit(16) {
                Some(d) => d,
                None => break,
            };
            value = value.saturating_mul(16).saturating_add(digit);
            seen = true;
            self.bump();
        }
        if !seen {
            return Err(self.fatal("missing digits after '\\x'"));
        }
        if value > 255 {
            return Err(self.fatal("value out of range after '\\x'"));
        }
        Ok(value as u8)
    }

    /// Scan a string literal body; the opening quote has been consumed.
    fn scan_str(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        loop {
            match self.peek_byte() {
                None => return Err(self.fatal("unterminated string literal")),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    if buf.len() >= TEXTLEN {
                        return Err(self.fatal("String literal too long"));
                    }
                    buf.push(self.scanch()?);
                }
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Scan an identifier whose first byte has been consumed.
    fn scan_ident(&mut self, first: u8) -> Result<String> {
        let mut text = String::new();
        text.push(first as char);
        while let Some(b) = self.peek_byte() {
            if !b.is_ascii_alphanumeric() && b != b'_' {
                break;
            }
            if text.len() >= TEXTLEN {
                return Err(self.fatal("Identifier too long"));
            }
            text.push(b as char);
            self.bump();
        }
        Ok(text)
    }
}

/// Write every token in `source` to the debug sink, one per line as
/// `<name> [payload]`.
pub fn dump_tokens(source: &str, filename: &str, out: &mut dyn Write) -> Result<()> {
    let mut lex = Lexer::new(source, filename);
    loop {
        let tok = lex.scan()?;
        if tok.kind == TokenKind::Eof {
            return Ok(());
        }
        write!(out, "{}", tok.kind.name())?;
        match tok.kind {
            TokenKind::StrLit => {
                write!(out, " \"{}\"", tok.text.as_deref().unwrap_or(""))?;
            }
            TokenKind::Ident => {
                write!(out, " {}", tok.text.as_deref().unwrap_or(""))?;
            }
            TokenKind::NumLit => match tok.num {
                LitVal::Char(c) => write!(out, " '{}'", c as char)?,
                LitVal::Flt(f) => write!(out, " {}", f)?,
                v => write!(out, " {}", v.as_i64())?,
            },
            _ => {}
        }
        writeln!(out)?;
    }
}
