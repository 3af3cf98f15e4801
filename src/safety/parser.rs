//! Single-statement SQL parsing.
//!
//! Extracts just enough structure to classify a statement: its kind, the
//! target table, whether a top-level WHERE or row limit is present, and the
//! columns it references. Nothing is executed.

use std::collections::BTreeSet;

use crate::error::{Result, WardenError};

use super::lexer::{lex, Lexeme, Spanned};
use super::{ParsedStatement, StatementKind};

/// Words that are never collected as column references.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CROSS", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FIRST", "FOR",
    "FROM", "FULL", "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT", "INTO",
    "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "NATURAL", "NEXT", "NOT", "NULL", "NULLS", "OFFSET",
    "ON", "ONLY", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "RETURNING", "RIGHT", "ROW",
    "ROWS", "SELECT", "SET", "SOME", "THEN", "TRUE", "UNION", "UPDATE", "USING", "VALUES",
    "WHEN", "WHERE", "WITH",
];

/// Keywords after which a table name follows.
const TABLE_POSITION_KEYWORDS: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "USING"];

fn is_structural(lexeme: &Lexeme) -> bool {
    STRUCTURAL_KEYWORDS.iter().any(|kw| lexeme.is_keyword(kw))
}

/// Parses a single SQL statement.
///
/// Fails with [`WardenError::Parse`] when the text is empty, contains only
/// comments, cannot be tokenized, or holds more than one statement (a
/// terminator followed by anything other than whitespace or comments).
pub fn parse(raw_sql: &str) -> Result<ParsedStatement> {
    if raw_sql.trim().is_empty() {
        return Err(WardenError::parse("empty statement"));
    }

    let spans = lex(raw_sql)?;
    let (lexemes, body_len) = split_terminator(raw_sql, spans)?;

    let Some(first) = lexemes.first() else {
        return Err(WardenError::parse("statement contains no SQL"));
    };

    let kind = first
        .word()
        .filter(|_| !matches!(first, Lexeme::Word { quoted: true, .. }))
        .map(StatementKind::from_keyword)
        .unwrap_or(StatementKind::Other);

    let has_where_clause = has_top_level_keyword(&lexemes, &["WHERE"]);
    let has_row_limit = has_bounding_limit(&lexemes);
    let creates_table =
        kind == StatementKind::Select && has_top_level_keyword(&lexemes, &["INTO"]);
    let target_table = target_table(kind, &lexemes);
    let referenced_columns = referenced_columns(&lexemes);

    Ok(ParsedStatement {
        kind,
        target_table,
        has_where_clause,
        has_row_limit,
        creates_table,
        referenced_columns,
        raw_text: raw_sql.to_string(),
        body_len,
        lexemes,
    })
}

/// Removes an optional trailing terminator, rejecting anything after it.
///
/// Returns the significant lexemes and the byte length of the statement body.
fn split_terminator(raw_sql: &str, spans: Vec<Spanned>) -> Result<(Vec<Lexeme>, usize)> {
    let terminator = spans
        .iter()
        .position(|span| span.lexeme == Lexeme::Terminator);

    match terminator {
        Some(index) if index + 1 < spans.len() => Err(WardenError::parse(
            "multiple statements are not allowed; submit exactly one statement",
        )),
        Some(index) => {
            let body_len = spans[index].offset;
            let lexemes = spans
                .into_iter()
                .take(index)
                .map(|span| span.lexeme)
                .collect();
            Ok((lexemes, body_len))
        }
        None => Ok((
            spans.into_iter().map(|span| span.lexeme).collect(),
            raw_sql.len(),
        )),
    }
}

/// Returns true if any of `keywords` appears outside parentheses.
pub(crate) fn has_top_level_keyword(lexemes: &[Lexeme], keywords: &[&str]) -> bool {
    let mut depth: usize = 0;
    for lexeme in lexemes {
        match lexeme {
            Lexeme::LParen => depth += 1,
            Lexeme::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && keywords.iter().any(|kw| lexeme.is_keyword(kw)) => return true,
            _ => {}
        }
    }
    false
}

/// Returns true if a top-level LIMIT or FETCH caps the rows returned.
fn has_bounding_limit(lexemes: &[Lexeme]) -> bool {
    let mut depth: usize = 0;
    for (index, lexeme) in lexemes.iter().enumerate() {
        match lexeme {
            Lexeme::LParen => depth += 1,
            Lexeme::RParen => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ if lexeme.is_keyword("FETCH") => return true,
            _ if lexeme.is_keyword("LIMIT") => {
                let unbounded = lexemes
                    .get(index + 1)
                    .is_some_and(|next| next.is_keyword("ALL") || next.is_keyword("NULL"));
                if !unbounded {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Finds the target table for the statement kind.
///
/// `FROM <table>` for SELECT and DELETE, `INTO <table>` for INSERT and
/// `UPDATE [ONLY] <table>` for UPDATE. Only top-level clauses count.
fn target_table(kind: StatementKind, lexemes: &[Lexeme]) -> Option<String> {
    let anchor = match kind {
        StatementKind::Select | StatementKind::Delete => "FROM",
        StatementKind::Insert => "INTO",
        StatementKind::Update => "UPDATE",
        StatementKind::Other => return None,
    };

    let mut depth: usize = 0;
    for (index, lexeme) in lexemes.iter().enumerate() {
        match lexeme {
            Lexeme::LParen => depth += 1,
            Lexeme::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && lexeme.is_keyword(anchor) => {
                let mut start = index + 1;
                if lexemes.get(start).is_some_and(|l| l.is_keyword("ONLY")) {
                    start += 1;
                }
                return qualified_name(&lexemes[start..]).map(|(name, _)| name);
            }
            _ => {}
        }
    }
    None
}

/// Reads a possibly schema-qualified name (`a`, `a.b`) from the front of
/// `lexemes`. Returns the dotted name and how many lexemes it spans.
fn qualified_name(lexemes: &[Lexeme]) -> Option<(String, usize)> {
    let first = lexemes.first()?;
    if is_structural(first) {
        return None;
    }
    let mut parts = vec![first.identifier()?];
    let mut consumed = 1;

    while lexemes.get(consumed) == Some(&Lexeme::Period) {
        match lexemes.get(consumed + 1).and_then(Lexeme::identifier) {
            Some(part) => {
                parts.push(part);
                consumed += 2;
            }
            None => break,
        }
    }

    Some((parts.join("."), consumed))
}

/// Collects column names the statement refers to.
///
/// Skips keywords, table names (and their aliases), function names, column
/// aliases introduced with `AS`, and qualifiers of dotted names.
fn referenced_columns(lexemes: &[Lexeme]) -> BTreeSet<String> {
    let mut columns = BTreeSet::new();
    let mut index = 0;

    while index < lexemes.len() {
        let lexeme = &lexemes[index];

        if TABLE_POSITION_KEYWORDS.iter().any(|kw| lexeme.is_keyword(kw)) {
            index += 1;
            if lexemes.get(index).is_some_and(|l| l.is_keyword("ONLY")) {
                index += 1;
            }
            if let Some((_, consumed)) = qualified_name(&lexemes[index..]) {
                index += consumed;
                index += alias_len(&lexemes[index..]);
            }
            continue;
        }

        if lexeme.is_keyword("AS") {
            index += 2;
            continue;
        }

        if lexeme.word().is_none() || is_structural(lexeme) {
            index += 1;
            continue;
        }

        let next = lexemes.get(index + 1);
        if next == Some(&Lexeme::LParen) {
            // function call
            index += 1;
            continue;
        }
        if next == Some(&Lexeme::Period) {
            // qualifier; the column is the word after the dot
            index += 2;
            continue;
        }

        if let Some(name) = lexeme.identifier() {
            columns.insert(name);
        }
        index += 1;
    }

    columns
}

/// Length of a table alias (`[AS] name`) at the front of `lexemes`, if any.
fn alias_len(lexemes: &[Lexeme]) -> usize {
    match lexemes.first() {
        Some(l) if l.is_keyword("AS") => 2,
        Some(l) if l.word().is_some() && !is_structural(l) => 1,
        _ => 0,
    }
}
