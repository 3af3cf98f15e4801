//! Statement parsing and risk classification.
//!
//! Generated SQL is untrusted. Before anything reaches the database it is
//! parsed into a [`ParsedStatement`] and run through the rule set to produce
//! a [`ClassificationResult`]. Both steps are pure and deterministic.

mod classifier;
mod lexer;
mod parser;

pub use classifier::{classify, Classifier};
pub use lexer::Lexeme;
pub use parser::parse;
pub(crate) use parser::has_top_level_keyword;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Keywords rejected outright when no list is configured.
pub const DEFAULT_DANGEROUS_KEYWORDS: &[&str] = &[
    "DROP TABLE",
    "DROP DATABASE",
    "TRUNCATE",
    "ALTER TABLE",
    "CREATE TABLE",
    "GRANT",
    "REVOKE",
];

/// Row limit injected into unbounded SELECTs when none is configured.
pub const DEFAULT_ROW_LIMIT: u32 = 1000;

/// The kind of statement, determined by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Anything else. Never auto-approved; always rejected by the classifier.
    Other,
}

impl StatementKind {
    /// Maps a leading keyword (any case) to a statement kind.
    pub fn from_keyword(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Returns true for statements that modify data.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Coarse classification of how dangerous executing a statement is.
///
/// Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Raises the level by one step, saturating at `High`.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    /// Returns the level as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single SQL statement broken down for classification.
///
/// Created fresh per validation request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedStatement {
    /// Statement kind from the leading keyword.
    pub kind: StatementKind,
    /// Best-effort target table; `None` when it could not be determined.
    pub target_table: Option<String>,
    /// Whether a top-level WHERE keyword is present outside literals and comments.
    pub has_where_clause: bool,
    /// Whether a top-level LIMIT or FETCH clause bounds the result.
    /// `LIMIT ALL` and `LIMIT NULL` do not.
    pub has_row_limit: bool,
    /// Whether a SELECT writes its rows into a new table (`SELECT ... INTO t`).
    pub creates_table: bool,
    /// Column names referenced by the statement (best-effort).
    pub referenced_columns: BTreeSet<String>,
    /// The original SQL text, untouched.
    pub raw_text: String,
    /// Byte length of the executable part of `raw_text` (up to the terminator).
    #[serde(skip)]
    pub(crate) body_len: usize,
    /// Significant tokens (no whitespace or comments), terminator excluded.
    #[serde(skip)]
    pub(crate) lexemes: Vec<Lexeme>,
}

impl ParsedStatement {
    /// Returns the statement text that is sent to the database: the raw text
    /// without surrounding whitespace, the trailing terminator, or anything
    /// after it.
    pub fn statement_text(&self) -> &str {
        self.raw_text[..self.body_len].trim()
    }

    /// Returns the significant tokens of the statement.
    pub fn lexemes(&self) -> &[Lexeme] {
        &self.lexemes
    }
}

/// A denylisted keyword phrase, matched as a run of whole tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerousKeyword {
    phrase: String,
    words: Vec<String>,
}

impl DangerousKeyword {
    /// Builds a keyword from a phrase such as `"DROP TABLE"`.
    pub fn new(phrase: &str) -> Result<Self> {
        let words: Vec<String> = phrase
            .split_whitespace()
            .map(|w| w.to_ascii_uppercase())
            .collect();
        if words.is_empty() {
            return Err(WardenError::config("dangerous keyword must not be empty"));
        }
        Ok(Self {
            phrase: words.join(" "),
            words,
        })
    }

    /// The normalized phrase (uppercase, single spaces).
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Returns true if the words appear as consecutive unquoted tokens.
    pub fn matches(&self, lexemes: &[Lexeme]) -> bool {
        lexemes.windows(self.words.len()).any(|window| {
            window
                .iter()
                .zip(&self.words)
                .all(|(lexeme, word)| lexeme.is_keyword(word))
        })
    }
}

/// Policy the classifier evaluates statements against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    dangerous_keywords: Vec<DangerousKeyword>,
    default_row_limit: u32,
}

impl RuleSet {
    /// Creates a rule set, rejecting empty keywords and a zero row limit.
    ///
    /// Duplicate keywords are dropped; the first occurrence keeps its position.
    pub fn new<I, S>(dangerous_keywords: I, default_row_limit: u32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if default_row_limit == 0 {
            return Err(WardenError::config("default_row_limit must be positive"));
        }

        let mut keywords: Vec<DangerousKeyword> = Vec::new();
        for phrase in dangerous_keywords {
            let keyword = DangerousKeyword::new(phrase.as_ref())?;
            if !keywords.iter().any(|k| k.phrase == keyword.phrase) {
                keywords.push(keyword);
            }
        }

        Ok(Self {
            dangerous_keywords: keywords,
            default_row_limit,
        })
    }

    /// The configured denylist, in configuration order.
    pub fn dangerous_keywords(&self) -> &[DangerousKeyword] {
        &self.dangerous_keywords
    }

    /// Row limit to inject into unbounded SELECTs.
    pub fn default_row_limit(&self) -> u32 {
        self.default_row_limit
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            dangerous_keywords: DEFAULT_DANGEROUS_KEYWORDS
                .iter()
                .map(|phrase| DangerousKeyword {
                    phrase: (*phrase).to_string(),
                    words: phrase.split(' ').map(String::from).collect(),
                })
                .collect(),
            default_row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

/// Outcome of classifying a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Statement kind the result applies to.
    pub kind: StatementKind,
    /// Assigned risk level.
    pub risk_level: RiskLevel,
    /// Human-readable warnings, in rule order.
    pub warnings: Vec<String>,
    /// Policy rejections. Non-empty means the statement never executes.
    pub errors: Vec<String>,
    /// Row limit the execution adapter must inject before running a SELECT.
    pub row_limit: Option<u32>,
    /// Whether a human decision is needed before execution.
    pub requires_approval: bool,
}

impl ClassificationResult {
    /// Returns true if the statement was rejected by policy.
    pub fn is_blocked(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if the statement may run without a human decision.
    pub fn is_auto_executable(&self) -> bool {
        !self.is_blocked() && !self.requires_approval
    }
}
