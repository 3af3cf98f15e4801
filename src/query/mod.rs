//! Statement execution.
//!
//! Runs statements the approval gate has cleared, applying the row limit
//! from classification and bounding each call with a deadline.

pub mod executor;

pub use executor::{ExecuteOptions, QueryExecutor};

use crate::safety::{has_top_level_keyword, parse};

/// Appends a row limit to a SELECT.
///
/// The clause goes on its own line so a trailing line comment in `sql`
/// cannot swallow it. A statement that already carries an unbounded
/// `LIMIT ALL`/`LIMIT NULL` is wrapped in a subquery instead.
pub fn with_row_limit(sql: &str, limit: u32) -> String {
    let sql = sql.trim_end();
    let has_limit_clause =
        parse(sql).is_ok_and(|stmt| has_top_level_keyword(stmt.lexemes(), &["LIMIT"]));
    if has_limit_clause {
        format!("SELECT * FROM (\n{sql}\n) AS bounded\nLIMIT {limit}")
    } else {
        format!("{sql}\nLIMIT {limit}")
    }
}
