//! Risk classification of parsed statements.
//!
//! Rules are evaluated in a fixed order. The first rule that produces an
//! error stops further error collection, but later rules still contribute
//! warnings so the caller sees the full picture.

use crate::db::Schema;

use super::{ClassificationResult, ParsedStatement, RiskLevel, RuleSet, StatementKind};

/// Evaluates statements against a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: RuleSet,
}

impl Classifier {
    /// Creates a classifier for the given rules.
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// The rules this classifier evaluates.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classifies a statement without schema knowledge.
    pub fn classify(&self, stmt: &ParsedStatement) -> ClassificationResult {
        Evaluation::new(stmt, &self.rules).finish()
    }

    /// Classifies a statement, additionally checking the target table and
    /// referenced columns against a schema snapshot.
    ///
    /// An empty snapshot adds nothing. A target table missing from the
    /// snapshot is treated like an undeterminable one and escalates risk;
    /// unknown columns only produce warnings.
    pub fn classify_against(&self, stmt: &ParsedStatement, schema: &Schema) -> ClassificationResult {
        let mut evaluation = Evaluation::new(stmt, &self.rules);
        if !schema.is_empty() {
            evaluation.check_schema(stmt, schema);
        }
        evaluation.finish()
    }
}

/// Classifies `stmt` against `rules`.
///
/// Pure and deterministic: the same inputs always yield an identical result.
pub fn classify(stmt: &ParsedStatement, rules: &RuleSet) -> ClassificationResult {
    Evaluation::new(stmt, rules).finish()
}

/// Accumulates rule outcomes for one statement.
struct Evaluation {
    kind: StatementKind,
    warnings: Vec<String>,
    error: Option<String>,
    row_limit: Option<u32>,
    table_unresolved: bool,
}

impl Evaluation {
    fn new(stmt: &ParsedStatement, rules: &RuleSet) -> Self {
        let mut evaluation = Self {
            kind: stmt.kind,
            warnings: Vec::new(),
            error: None,
            row_limit: None,
            table_unresolved: stmt.target_table.is_none(),
        };

        evaluation.check_dangerous_keywords(stmt, rules);
        evaluation.check_kind();
        evaluation.check_select_into(stmt);
        evaluation.check_where_clause(stmt);
        evaluation.check_row_limit(stmt, rules);

        if evaluation.table_unresolved && stmt.kind != StatementKind::Other {
            evaluation.warn("Target table could not be determined - review the statement carefully");
        }

        evaluation
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Records an error unless an earlier rule already rejected the statement.
    fn reject(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    fn check_dangerous_keywords(&mut self, stmt: &ParsedStatement, rules: &RuleSet) {
        let found: Vec<&str> = rules
            .dangerous_keywords()
            .iter()
            .filter(|keyword| keyword.matches(stmt.lexemes()))
            .map(|keyword| keyword.phrase())
            .collect();

        if !found.is_empty() {
            self.reject(format!("Dangerous operation detected: {}", found.join(", ")));
        }
    }

    fn check_kind(&mut self) {
        if self.kind == StatementKind::Other {
            self.reject("Unsupported statement type: only SELECT, INSERT, UPDATE and DELETE are allowed");
        }
    }

    fn check_select_into(&mut self, stmt: &ParsedStatement) {
        if stmt.creates_table {
            self.reject("SELECT INTO creates a new table and is not allowed");
        }
    }

    fn check_where_clause(&mut self, stmt: &ParsedStatement) {
        match (stmt.kind, stmt.has_where_clause) {
            (StatementKind::Update | StatementKind::Delete, false) => {
                self.reject(format!(
                    "{} without WHERE clause would affect every row in the table",
                    stmt.kind
                ));
            }
            (StatementKind::Update, true) => {
                self.warn("UPDATE will modify existing rows - verify the WHERE condition");
            }
            (StatementKind::Delete, true) => {
                self.warn("DELETE will permanently remove rows - verify the WHERE condition");
            }
            (StatementKind::Insert, _) => {
                self.warn("INSERT operation - new rows will be added");
            }
            _ => {}
        }
    }

    fn check_row_limit(&mut self, stmt: &ParsedStatement, rules: &RuleSet) {
        if stmt.kind == StatementKind::Select && !stmt.has_row_limit && !stmt.creates_table {
            let limit = rules.default_row_limit();
            self.warn(format!(
                "No LIMIT specified - results will be capped at {limit} rows"
            ));
            self.row_limit = Some(limit);
        }
    }

    fn check_schema(&mut self, stmt: &ParsedStatement, schema: &Schema) {
        if let Some(table) = &stmt.target_table {
            if schema.table(table).is_none() {
                self.table_unresolved = true;
                self.warn(format!("Table '{table}' does not exist in the current schema"));
            }
        }

        for column in &stmt.referenced_columns {
            if !schema.has_column(column) {
                self.warn(format!("Column '{column}' was not found in any table"));
            }
        }
    }

    fn finish(self) -> ClassificationResult {
        let risk_level = match (&self.error, self.kind) {
            (Some(_), _) => RiskLevel::High,
            (None, StatementKind::Select | StatementKind::Insert) => RiskLevel::Low,
            (None, StatementKind::Update) => RiskLevel::Medium,
            (None, StatementKind::Delete | StatementKind::Other) => RiskLevel::High,
        };
        let risk_level = if self.table_unresolved {
            risk_level.escalate()
        } else {
            risk_level
        };

        let errors: Vec<String> = self.error.into_iter().collect();
        let requires_approval = errors.is_empty() && risk_level != RiskLevel::Low;

        ClassificationResult {
            kind: self.kind,
            risk_level,
            warnings: self.warnings,
            errors,
            row_limit: self.row_limit,
            requires_approval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::sample_schema;
    use crate::safety::{parse, DEFAULT_ROW_LIMIT};
    use pretty_assertions::assert_eq;

    fn classify_sql(sql: &str) -> ClassificationResult {
        classify(&parse(sql).unwrap(), &RuleSet::default())
    }

    #[test]
    fn test_scenario_select_with_where_is_low_risk() {
        let result = classify_sql("SELECT * FROM products WHERE price > 1000");
        assert_eq!(result.kind, StatementKind::Select);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(!result.requires_approval);
        assert!(result.errors.is_empty());
        assert_eq!(result.row_limit, Some(DEFAULT_ROW_LIMIT));
        assert!(result.is_auto_executable());
    }

    #[test]
    fn test_scenario_delete_without_where_is_rejected() {
        let result = classify_sql("DELETE FROM products");
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(
            result.errors,
            vec!["DELETE without WHERE clause would affect every row in the table".to_string()]
        );
        assert!(!result.requires_approval);
        assert!(result.is_blocked());
    }

    #[test]
    fn test_scenario_drop_table_is_rejected() {
        let result = classify_sql("DROP TABLE products");
        assert_eq!(result.kind, StatementKind::Other);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(
            result.errors,
            vec!["Dangerous operation detected: DROP TABLE".to_string()]
        );
        assert!(!result.requires_approval);
    }

    #[test]
    fn test_scenario_update_with_where_needs_approval() {
        let result = classify_sql("UPDATE products SET price = 2500 WHERE product_id = 5");
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(result.requires_approval);
        assert!(result.errors.is_empty());
        assert_eq!(result.row_limit, None);
    }

    #[test]
    fn test_update_without_where_is_rejected() {
        let result = classify_sql("update products set price = 0");
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.errors[0].starts_with("UPDATE without WHERE clause"));
    }

    #[test]
    fn test_where_only_in_literal_does_not_count() {
        let result = classify_sql("DELETE FROM notes -- where id = 1");
        assert!(result.is_blocked());

        let result = classify_sql("UPDATE notes SET body = 'WHERE id = 1'");
        assert!(result.is_blocked());
    }

    #[test]
    fn test_delete_with_where_is_high_and_needs_approval() {
        let result = classify_sql("DELETE FROM orders WHERE order_id = 7");
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.requires_approval);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_insert_is_low_risk_with_warning() {
        let result = classify_sql("INSERT INTO products (name, price) VALUES ('Pen', 2)");
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(!result.requires_approval);
        assert_eq!(
            result.warnings,
            vec!["INSERT operation - new rows will be added".to_string()]
        );
    }

    #[test]
    fn test_select_with_limit_has_no_row_limit_flag() {
        let result = classify_sql("SELECT name FROM products LIMIT 5");
        assert_eq!(result.row_limit, None);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_select_into_is_rejected() {
        let result = classify_sql("SELECT * INTO products_backup FROM products");
        assert_eq!(result.kind, StatementKind::Select);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(
            result.errors,
            vec!["SELECT INTO creates a new table and is not allowed".to_string()]
        );
        assert!(!result.requires_approval);
        assert_eq!(result.row_limit, None);
    }

    #[test]
    fn test_limit_all_gets_default_row_limit() {
        let result = classify_sql("SELECT * FROM products LIMIT ALL");
        assert_eq!(result.row_limit, Some(DEFAULT_ROW_LIMIT));
        assert!(result.warnings.iter().any(|w| w.starts_with("No LIMIT")));
    }

    #[test]
    fn test_undeterminable_table_escalates_risk() {
        let result = classify_sql("SELECT 1");
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(result.requires_approval);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("could not be determined")));

        let result = classify_sql("UPDATE (SELECT 1) SET a = 1 WHERE b = 2");
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_dangerous_keywords_any_case_and_spacing() {
        for sql in [
            "drop table products",
            "DROP\n\tTABLE products",
            "Truncate products",
            "SELECT * FROM users; ",
            "GRANT SELECT ON products TO bob",
            "alter   table products add column x int",
        ] {
            let result = classify_sql(sql);
            if sql.starts_with("SELECT") {
                assert!(result.errors.is_empty(), "SQL: {sql}");
            } else {
                assert!(!result.errors.is_empty(), "SQL: {sql}");
            }
        }
    }

    #[test]
    fn test_dangerous_keyword_is_whole_token_only() {
        let result = classify_sql("SELECT * FROM granted_roles WHERE revoked_at IS NULL");
        assert!(result.errors.is_empty());

        let result = classify_sql("SELECT 'drop table x' FROM audit WHERE id = 1");
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_dangerous_keyword_inside_write_is_rejected() {
        let result = classify_sql("UPDATE t SET a = 1 WHERE b IN (SELECT 1) AND grant IS NULL");
        assert_eq!(
            result.errors,
            vec!["Dangerous operation detected: GRANT".to_string()]
        );
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_first_error_short_circuits_but_warnings_accumulate() {
        let rules = RuleSet::new(["TRUNCATE", "DELETE"], 50).unwrap();
        let stmt = parse("DELETE FROM products").unwrap();
        let result = classify(&stmt, &rules);
        assert_eq!(
            result.errors,
            vec!["Dangerous operation detected: DELETE".to_string()]
        );

        let stmt = parse("SELECT * FROM t WHERE x = 1 AND truncate = 2").unwrap();
        let result = classify(&stmt, &rules);
        assert_eq!(result.errors.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("capped at 50 rows")));
        assert_eq!(result.row_limit, Some(50));
    }

    #[test]
    fn test_custom_rules_are_respected() {
        let rules = RuleSet::new(["VACUUM"], 10).unwrap();
        let stmt = parse("DROP TABLE products").unwrap();
        let result = classify(&stmt, &rules);
        // Still rejected as an unsupported kind even though DROP is not denylisted.
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Unsupported statement type"));
    }

    #[test]
    fn test_classify_is_idempotent() {
        let rules = RuleSet::default();
        for sql in [
            "SELECT * FROM products",
            "DELETE FROM products",
            "UPDATE products SET price = 1 WHERE product_id = 2",
            "DROP TABLE products",
            "INSERT INTO products (name) VALUES ('x')",
        ] {
            let stmt = parse(sql).unwrap();
            assert_eq!(classify(&stmt, &rules), classify(&stmt, &rules), "SQL: {sql}");
        }
    }

    #[test]
    fn test_low_risk_never_requires_approval() {
        let rules = RuleSet::default();
        for sql in [
            "SELECT * FROM products",
            "SELECT name FROM products WHERE price < 5 LIMIT 3",
            "INSERT INTO orders (product_id) VALUES (1)",
            "SELECT 1",
            "DELETE FROM products",
            "UPDATE products SET price = 1 WHERE product_id = 1",
        ] {
            let result = classify(&parse(sql).unwrap(), &rules);
            if result.risk_level == RiskLevel::Low {
                assert!(!result.requires_approval, "SQL: {sql}");
            }
            if result.is_blocked() {
                assert!(!result.requires_approval, "SQL: {sql}");
                assert_eq!(result.risk_level, RiskLevel::High, "SQL: {sql}");
            }
        }
    }

    #[test]
    fn test_classify_against_schema_known_table() {
        let classifier = Classifier::default();
        let stmt = parse("SELECT name, price FROM products WHERE category = 'x' LIMIT 3").unwrap();
        let result = classifier.classify_against(&stmt, &sample_schema());
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_classify_against_schema_unknown_table_escalates() {
        let classifier = Classifier::default();
        let stmt = parse("SELECT * FROM customers LIMIT 3").unwrap();
        let result = classifier.classify_against(&stmt, &sample_schema());
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(result.requires_approval);
        assert_eq!(
            result.warnings,
            vec!["Table 'customers' does not exist in the current schema".to_string()]
        );
    }

    #[test]
    fn test_classify_against_schema_unknown_column_only_warns() {
        let classifier = Classifier::default();
        let stmt = parse("SELECT discount FROM products LIMIT 3").unwrap();
        let result = classifier.classify_against(&stmt, &sample_schema());
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(
            result.warnings,
            vec!["Column 'discount' was not found in any table".to_string()]
        );
    }

    #[test]
    fn test_classify_against_empty_schema_matches_plain_classify() {
        let classifier = Classifier::default();
        let stmt = parse("SELECT * FROM customers").unwrap();
        assert_eq!(
            classifier.classify_against(&stmt, &Schema::new()),
            classifier.classify(&stmt)
        );
    }
}
