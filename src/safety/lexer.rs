//! Literal-aware token stream for SQL text.
//!
//! Wraps the `sqlparser` tokenizer (PostgreSQL dialect) so that keywords
//! inside string literals, quoted identifiers, and comments are never seen
//! as keywords. Whitespace and comments are dropped; every remaining token
//! keeps the byte offset where it starts in the source text.

use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

use crate::error::{Result, WardenError};

/// A significant token of a SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Lexeme {
    /// An identifier or keyword.
    Word {
        /// Source text (without quotes for quoted identifiers).
        text: String,
        /// Whether the word was a quoted identifier (never a keyword).
        quoted: bool,
    },
    /// String literal of any flavor.
    Literal,
    /// Numeric literal.
    Number,
    LParen,
    RParen,
    Period,
    Comma,
    /// Statement terminator (`;`).
    Terminator,
    /// Any other operator or punctuation.
    Symbol,
}

impl Lexeme {
    /// Returns true if this is the unquoted keyword `keyword` (any case).
    pub fn is_keyword(&self, keyword: &str) -> bool {
        match self {
            Self::Word { text, quoted } => !quoted && text.eq_ignore_ascii_case(keyword),
            _ => false,
        }
    }

    /// Returns the word text if this is a word.
    pub fn word(&self) -> Option<&str> {
        match self {
            Self::Word { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Returns the identifier as the database sees it: unquoted names fold
    /// to lowercase, quoted names keep their case.
    pub fn identifier(&self) -> Option<String> {
        match self {
            Self::Word { text, quoted: true } => Some(text.clone()),
            Self::Word {
                text,
                quoted: false,
            } => Some(text.to_ascii_lowercase()),
            _ => None,
        }
    }
}

/// A lexeme with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub lexeme: Lexeme,
    pub offset: usize,
}

/// Tokenizes `sql`, dropping whitespace and comments.
///
/// Fails when the text cannot be tokenized, e.g. an unterminated string
/// literal or quoted identifier.
pub(crate) fn lex(sql: &str) -> Result<Vec<Spanned>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| WardenError::parse(format!("could not tokenize SQL: {e}")))?;

    let mut cursor = OffsetCursor::new(sql);
    let mut lexemes = Vec::with_capacity(tokens.len());

    for token in tokens {
        let lexeme = match token.token {
            Token::Whitespace(_) | Token::EOF => continue,
            Token::Word(word) => Lexeme::Word {
                text: word.value,
                quoted: word.quote_style.is_some(),
            },
            Token::SingleQuotedString(_)
            | Token::DoubleQuotedString(_)
            | Token::DollarQuotedString(_)
            | Token::NationalStringLiteral(_)
            | Token::EscapedStringLiteral(_)
            | Token::HexStringLiteral(_) => Lexeme::Literal,
            Token::Number(..) => Lexeme::Number,
            Token::LParen => Lexeme::LParen,
            Token::RParen => Lexeme::RParen,
            Token::Period => Lexeme::Period,
            Token::Comma => Lexeme::Comma,
            Token::SemiColon => Lexeme::Terminator,
            _ => Lexeme::Symbol,
        };
        let offset = cursor.seek(token.location);
        lexemes.push(Spanned { lexeme, offset });
    }

    Ok(lexemes)
}

/// Converts tokenizer locations (1-based line and column, counted in chars)
/// into byte offsets with a single forward pass.
struct OffsetCursor<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: u64,
    column: u64,
    len: usize,
}

impl<'a> OffsetCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            line: 1,
            column: 1,
            len: text.len(),
        }
    }

    fn seek(&mut self, location: Location) -> usize {
        while let Some(&(index, ch)) = self.chars.peek() {
            if (self.line, self.column) >= (location.line, location.column) {
                return index;
            }
            self.chars.next();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.len
    }
}
