//! Response parsing for model outputs.
//!
//! Models are asked for `SQL:` / `EXPLANATION:` / `WARNINGS:` sections but
//! frequently wrap them in markdown or answer with a bare code block, so
//! both shapes are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Explanation used when the model gives none.
pub const DEFAULT_EXPLANATION: &str = "SQL query generated";

/// A statement produced by a model, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSql {
    /// SQL text with the trailing terminator removed.
    pub sql: String,
    pub explanation: String,
    /// Concerns the model raised itself. Informational only.
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Sql,
    Explanation,
    Warnings,
}

impl Section {
    fn header(line: &str) -> Option<(Self, &str)> {
        [
            ("SQL:", Self::Sql),
            ("EXPLANATION:", Self::Explanation),
            ("WARNINGS:", Self::Warnings),
        ]
        .into_iter()
        .find_map(|(label, section)| {
            let head = line.get(..label.len())?;
            head.eq_ignore_ascii_case(label)
                .then(|| (section, line[label.len()..].trim()))
        })
    }
}

#[derive(Default)]
struct Sections {
    sql: Vec<String>,
    explanation: Vec<String>,
    warnings: Vec<String>,
}

impl Sections {
    fn push(&mut self, section: Section, text: &str) {
        if text.is_empty() {
            return;
        }
        let target = match section {
            Section::Sql => &mut self.sql,
            Section::Explanation => &mut self.explanation,
            Section::Warnings => &mut self.warnings,
        };
        target.push(text.to_string());
    }
}

/// Parses a model response into SQL, explanation and warnings.
///
/// Fails with a generation error when no SQL can be found.
pub fn parse_llm_response(response: &str) -> Result<GeneratedSql> {
    let sections = split_sections(response);

    // SQL lines stay on separate lines so a `--` comment ends where it did.
    let sql = match sections.sql.join("\n") {
        sql if !sql.trim().is_empty() => sql,
        _ => extract_code_block(response, "sql")
            .or_else(|| extract_code_block(response, ""))
            .unwrap_or_default(),
    };
    let sql = strip_terminator(&sql);
    if sql.is_empty() {
        return Err(WardenError::generation(
            "Model response did not contain a SQL statement",
        ));
    }

    let explanation = match sections.explanation.join(" ") {
        text if text.is_empty() => DEFAULT_EXPLANATION.to_string(),
        text => text,
    };

    Ok(GeneratedSql {
        sql,
        explanation,
        warnings: parse_warnings(&sections.warnings),
    })
}

fn split_sections(response: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current = None;

    for line in response.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if let Some((section, rest)) = Section::header(trimmed) {
            current = Some(section);
            sections.push(section, rest);
        } else if let Some(section) = current {
            let text = if section == Section::Sql { line.trim_end() } else { trimmed };
            sections.push(section, text);
        }
    }

    sections
}

fn parse_warnings(lines: &[String]) -> Vec<String> {
    let is_none = |s: &str| {
        let s = s.trim_end_matches('.');
        s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("n/a")
    };

    lines
        .iter()
        .map(|line| line.trim_start_matches(&['-', '*', ' '][..]).trim())
        .filter(|line| !line.is_empty() && !is_none(line))
        .map(str::to_string)
        .collect()
}

/// Drops one trailing terminator. Anything more is left for the statement
/// parser to reject.
fn strip_terminator(sql: &str) -> String {
    let sql = sql.trim();
    sql.strip_suffix(';').unwrap_or(sql).trim_end().to_string()
}

/// Extracts the first markdown code block with the given language tag.
///
/// An empty `lang` matches only blocks without a tag.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let fence = format!("```{lang}");
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(&fence) {
        let start = search_from + found;
        let after_fence = start + fence.len();
        let newline = text[after_fence..].find('\n')? + after_fence;
        search_from = newline;

        if lang.is_empty() && !text[after_fence..newline].trim().is_empty() {
            // A tagged block; the closing fence of this one must be skipped too.
            let close = text[newline..].find("```")? + newline;
            search_from = close + 3;
            continue;
        }

        let content_start = newline + 1;
        let end = text[content_start..].find("```")?;
        return Some(text[content_start..content_start + end].trim().to_string());
    }

    None
}
