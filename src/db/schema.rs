//! Schema snapshot types.
//!
//! A [`Schema`] is an immutable picture of the database's tables, columns and
//! foreign keys. The catalog replaces it wholesale on refresh.

use serde::{Deserialize, Serialize};

/// Table and column metadata for one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables in introspection order.
    pub tables: Vec<Table>,

    /// Foreign key relationships between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the snapshot holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by name, ignoring case.
    ///
    /// A schema-qualified name (`public.users`) matches on its last segment.
    pub fn table(&self, name: &str) -> Option<&Table> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(bare))
    }

    /// Returns true if any table has a column with this name (ignoring case).
    pub fn has_column(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table.column(name).is_some())
    }

    /// Formats the schema for inclusion in a model prompt.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::from("Database Schema:\n\n");

        for table in &self.tables {
            out.push_str(&format!("Table: {}\n", table.name));
            for column in &table.columns {
                out.push_str(&self.format_column(table, column));
            }
            out.push('\n');
        }

        if !self.foreign_keys.is_empty() {
            out.push_str("Foreign Keys:\n");
            for fk in &self.foreign_keys {
                out.push_str(&format!(
                    "  - {}.{} -> {}.{}\n",
                    fk.from_table,
                    fk.from_columns.join(", "),
                    fk.to_table,
                    fk.to_columns.join(", ")
                ));
            }
        }

        out
    }

    fn format_column(&self, table: &Table, column: &Column) -> String {
        let mut annotations: Vec<String> = Vec::new();
        if table.primary_key.contains(&column.name) {
            annotations.push("PK".to_string());
        }
        annotations.push(if column.is_nullable { "NULL" } else { "NOT NULL" }.to_string());
        if let Some(default) = &column.default {
            annotations.push(format!("DEFAULT {default}"));
        }
        annotations.extend(
            self.foreign_keys
                .iter()
                .filter(|fk| fk.from_table == table.name && fk.from_columns.contains(&column.name))
                .map(|fk| {
                    format!(
                        "FK -> {}.{}",
                        fk.to_table,
                        fk.to_columns.first().map(String::as_str).unwrap_or("")
                    )
                }),
        );

        format!(
            "  - {}: {} ({})\n",
            column.name,
            column.data_type,
            annotations.join(", ")
        )
    }
}

/// A database table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// A column in a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type (e.g., "integer", "varchar(255)").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a nullable column with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }
}

/// A foreign key relationship between tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}

/// A small shop schema (`products`, `orders`) served by the mock database.
pub fn sample_schema() -> Schema {
    Schema {
        tables: vec![
            Table::new("products")
                .with_column(Column::new("product_id", "integer").nullable(false))
                .with_column(Column::new("name", "varchar(100)").nullable(false))
                .with_column(Column::new("price", "numeric(10,2)").nullable(false))
                .with_column(Column::new("category", "varchar(50)"))
                .with_primary_key(["product_id"]),
            Table::new("orders")
                .with_column(Column::new("order_id", "integer").nullable(false))
                .with_column(Column::new("product_id", "integer").nullable(false))
                .with_column(
                    Column::new("created_at", "timestamp")
                        .nullable(false)
                        .with_default("now()"),
                )
                .with_primary_key(["order_id"]),
        ],
        foreign_keys: vec![ForeignKey::new(
            "orders",
            vec!["product_id".to_string()],
            "products",
            vec!["product_id".to_string()],
        )],
    }
}
