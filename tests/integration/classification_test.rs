//! Parser and classifier behavior through the public API.

use pretty_assertions::assert_eq;
use sql_warden::error::WardenError;
use sql_warden::safety::{classify, parse, RiskLevel, RuleSet, StatementKind};

fn check(sql: &str) -> sql_warden::safety::ClassificationResult {
    classify(&parse(sql).unwrap(), &RuleSet::default())
}

#[test]
fn test_select_with_where_is_low_risk() {
    let stmt = parse("SELECT * FROM products WHERE price > 1000").unwrap();
    assert_eq!(stmt.kind, StatementKind::Select);
    assert!(stmt.has_where_clause);
    assert_eq!(stmt.target_table.as_deref(), Some("products"));

    let result = classify(&stmt, &RuleSet::default());
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(!result.requires_approval);
    assert!(result.errors.is_empty());
}

#[test]
fn test_delete_without_where_is_rejected() {
    let result = check("DELETE FROM products");
    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result.is_blocked());
    assert!(!result.requires_approval);
}

#[test]
fn test_drop_table_is_rejected() {
    let result = check("DROP TABLE products");
    assert!(result.is_blocked());
    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result.errors[0].starts_with("Dangerous operation detected"));
}

#[test]
fn test_update_with_where_needs_approval() {
    let result = check("UPDATE products SET price = 2500 WHERE product_id = 5");
    assert_eq!(result.kind, StatementKind::Update);
    assert_eq!(result.risk_level, RiskLevel::Medium);
    assert!(result.requires_approval);
    assert!(result.errors.is_empty());
}

#[test]
fn test_multiple_statements_never_parse() {
    let inputs = [
        "SELECT 1; SELECT 2",
        "SELECT * FROM products;DROP TABLE products",
        "UPDATE products SET price = 1 WHERE product_id = 1; DELETE FROM orders",
        "select 1 ;\n select 2 ;",
        "SELECT ';' AS semi; SELECT 2",
    ];
    for sql in inputs {
        assert!(
            matches!(parse(sql), Err(WardenError::Parse(_))),
            "accepted multi-statement input: {sql}"
        );
    }
}

#[test]
fn test_trailing_terminator_and_comment_are_one_statement() {
    let stmt = parse("SELECT 1; -- done\n").unwrap();
    assert_eq!(stmt.statement_text(), "SELECT 1");
}

#[test]
fn test_blank_input_is_parse_error() {
    for sql in ["", "   ", "\n\t", "-- just a comment"] {
        assert!(matches!(parse(sql), Err(WardenError::Parse(_))), "accepted {sql:?}");
    }
}

#[test]
fn test_denylist_ignores_case_and_spacing() {
    for sql in [
        "drop table products",
        "DROP   TABLE products",
        "Drop\n\tTable products",
        "truncate orders",
        "ALTER TABLE products ADD COLUMN sku text",
        "grant select on products to public",
    ] {
        assert!(check(sql).is_blocked(), "not blocked: {sql}");
    }
}

#[test]
fn test_keywords_in_literals_and_identifiers_do_not_match() {
    let result = check("SELECT * FROM orders WHERE note = 'drop table orders' LIMIT 5");
    assert!(result.errors.is_empty());

    let result = check("SELECT overdue, truncated FROM invoices LIMIT 5");
    assert!(result.errors.is_empty());

    // "where" inside a comment or string is not a WHERE clause.
    let result = check("DELETE FROM orders -- where order_id = 1");
    assert!(result.is_blocked());
    let result = check("UPDATE orders SET note = 'where' ");
    assert!(result.is_blocked());
}

#[test]
fn test_missing_row_limit_is_flagged() {
    let result = check("SELECT name FROM products");
    assert_eq!(result.row_limit, Some(1000));
    assert!(result.warnings.iter().any(|w| w.contains("No LIMIT")));

    let result = check("SELECT name FROM products LIMIT 10");
    assert_eq!(result.row_limit, None);
}

#[test]
fn test_unknown_statement_kinds_are_rejected() {
    for sql in ["VACUUM products", "WITH x AS (SELECT 1) SELECT * FROM x", "EXPLAIN SELECT 1"] {
        let result = check(sql);
        assert!(result.is_blocked(), "not blocked: {sql}");
        assert_eq!(result.kind, StatementKind::Other);
    }
}

#[test]
fn test_classification_is_deterministic() {
    let rules = RuleSet::new(["DROP TABLE", "TRUNCATE", "COPY"], 50).unwrap();
    for sql in [
        "SELECT * FROM products",
        "DELETE FROM orders WHERE order_id = 1",
        "INSERT INTO products (name) VALUES ('x')",
        "COPY products TO '/tmp/out'",
    ] {
        let stmt = parse(sql).unwrap();
        assert_eq!(classify(&stmt, &rules), classify(&stmt, &rules));
    }
}

#[test]
fn test_low_risk_never_requires_approval() {
    for sql in [
        "SELECT 1",
        "SELECT * FROM products WHERE price > 5 LIMIT 3",
        "INSERT INTO orders (product_id) VALUES (1)",
    ] {
        let result = check(sql);
        if result.risk_level == RiskLevel::Low {
            assert!(!result.requires_approval, "{sql}");
        }
    }
}

#[test]
fn test_select_into_is_never_auto_approved() {
    use sql_warden::approval::{ApprovalGate, ApprovalState};

    for sql in [
        "SELECT * INTO products_backup FROM products",
        "select name, price into temp cheap from products where price < 5",
    ] {
        let stmt = parse(sql).unwrap();
        let result = classify(&stmt, &RuleSet::default());
        assert_eq!(result.kind, StatementKind::Select);
        assert!(result.is_blocked(), "not blocked: {sql}");
        assert_eq!(result.risk_level, RiskLevel::High);

        let request = ApprovalGate::default().propose(stmt, result);
        assert_eq!(request.state, ApprovalState::Rejected, "{sql}");
    }

    // INTO inside a subquery or after INSERT is not a SELECT INTO.
    assert!(!check("INSERT INTO orders (product_id) SELECT product_id FROM products").is_blocked());
}

#[test]
fn test_limit_all_is_not_a_row_limit() {
    for sql in [
        "SELECT * FROM products LIMIT ALL",
        "SELECT * FROM products LIMIT NULL",
        "SELECT * FROM products LIMIT ALL OFFSET 10",
    ] {
        let result = check(sql);
        assert_eq!(result.row_limit, Some(1000), "{sql}");
    }
    assert_eq!(check("SELECT * FROM products LIMIT 50 OFFSET 10").row_limit, None);
}
