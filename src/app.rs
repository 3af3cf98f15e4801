//! Command runner for the `warden` binary.
//!
//! Wires the configured collaborators into a [`QueryService`] and drives one
//! subcommand through it. Output goes to a caller-supplied writer so the
//! runner can be exercised without a terminal.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::approval::{ApprovalState, Decision};
use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::{self, sample_schema, DatabaseClient, MockDatabaseClient, QueryResult, Schema, Table};
use crate::error::{Result, WardenError};
use crate::llm::{create_client, LlmSqlGenerator};
use crate::query::ExecuteOptions;
use crate::safety::ClassificationResult;
use crate::service::{Proposal, QueryService};

/// How a command ended, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The classifier rejected the statement.
    Rejected,
    /// The user declined to approve the statement.
    Declined,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Rejected => 2,
            Self::Declined => 3,
        }
    }
}

/// Asks the user whether to approve a proposal.
pub trait Confirm {
    fn confirm(&mut self, proposal: &Proposal) -> bool;
}

impl<F: FnMut(&Proposal) -> bool> Confirm for F {
    fn confirm(&mut self, proposal: &Proposal) -> bool {
        self(proposal)
    }
}

#[derive(Serialize)]
struct Report<'a> {
    proposal: &'a Proposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a QueryResult>,
}

pub struct App {
    service: QueryService,
    json: bool,
}

impl App {
    pub fn new(service: QueryService, json: bool) -> Self {
        Self { service, json }
    }

    /// Loads configuration, connects to the database and loads the schema.
    ///
    /// A model client is only created for `ask`, so other commands work
    /// without API keys.
    pub async fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = cli.config_path();
        info!("Loading config from: {}", config_path.display());
        let config = Config::load_from_file(&config_path)?;

        let db: Arc<dyn DatabaseClient> = if cli.mock_db {
            info!("Using mock database");
            Arc::new(MockDatabaseClient::with_schema(sample_schema()))
        } else {
            let connection = cli.resolve_connection(&config)?;
            info!("Connection: {}", connection.display_string());
            db::connect(&connection).await?
        };

        let mut service = QueryService::new(db, &config.safety)?;
        if matches!(cli.command, Command::Ask { .. }) {
            let provider = cli.llm_provider(&config)?;
            let client = create_client(provider, Some(config.llm.model.as_str()))?;
            info!(%provider, "Model client ready");
            service = service.with_generator(Arc::new(LlmSqlGenerator::new(client)));
        }

        if !matches!(cli.command, Command::Health) {
            service.refresh_schema().await?;
        }
        Ok(Self::new(service, cli.json))
    }

    pub fn service(&self) -> &QueryService {
        &self.service
    }

    /// Runs one command.
    pub async fn run(
        &self,
        command: &Command,
        out: &mut dyn Write,
        confirm: &mut dyn Confirm,
    ) -> Result<ExitStatus> {
        match command {
            Command::Ask {
                question,
                operation,
                yes,
            } => {
                let proposal = self.service.propose(question, *operation).await?;
                self.settle(proposal, *yes, out, confirm).await
            }
            Command::Run { sql, yes } => {
                let proposal = self.service.propose_sql(sql)?;
                self.settle(proposal, *yes, out, confirm).await
            }
            Command::Check { sql } => {
                let classification = self.service.validate(sql)?;
                if self.json {
                    emit(out, &to_json(&classification)?)?;
                } else {
                    emit(out, &render_classification(&classification))?;
                }
                Ok(if classification.is_blocked() {
                    ExitStatus::Rejected
                } else {
                    ExitStatus::Success
                })
            }
            Command::Schema { table } => {
                let text = match table {
                    Some(name) => {
                        let table = self.service.table(name)?;
                        if self.json {
                            to_json(&table)?
                        } else {
                            render_table(&self.service.schema(), table)
                        }
                    }
                    None if self.json => to_json(self.service.schema().as_ref())?,
                    None => self.service.schema().format_for_llm(),
                };
                emit(out, &text)?;
                Ok(ExitStatus::Success)
            }
            Command::Health => {
                self.service.health().await?;
                let text = if self.json {
                    r#"{"status":"ok"}"#.to_string()
                } else {
                    "OK: database is reachable".to_string()
                };
                emit(out, &text)?;
                Ok(ExitStatus::Success)
            }
        }
    }

    /// Takes a proposal through the decision and, if approved, execution.
    async fn settle(
        &self,
        proposal: Proposal,
        yes: bool,
        out: &mut dyn Write,
        confirm: &mut dyn Confirm,
    ) -> Result<ExitStatus> {
        if !self.json {
            emit(out, &render_proposal(&proposal))?;
        }

        let status = match proposal.state {
            ApprovalState::Rejected => ExitStatus::Rejected,
            ApprovalState::Proposed if !(yes || confirm.confirm(&proposal)) => {
                self.service.decide(proposal.statement_id, Decision::Reject)?;
                ExitStatus::Declined
            }
            ApprovalState::Proposed => {
                self.service.decide(proposal.statement_id, Decision::Approve)?;
                ExitStatus::Success
            }
            _ => ExitStatus::Success,
        };

        if status != ExitStatus::Success {
            if self.json {
                emit(out, &to_json(&Report { proposal: &proposal, result: None })?)?;
            } else if status == ExitStatus::Declined {
                emit(out, "Statement rejected; nothing was executed.")?;
            }
            return Ok(status);
        }

        let result = self
            .service
            .execute(proposal.statement_id, ExecuteOptions::default())
            .await?;
        if self.json {
            emit(
                out,
                &to_json(&Report {
                    proposal: &proposal,
                    result: Some(&result),
                })?,
            )?;
        } else {
            emit(out, &render_result(&result))?;
        }
        Ok(ExitStatus::Success)
    }
}

fn emit(out: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(out, "{text}").map_err(|e| WardenError::internal(format!("Failed to write output: {e}")))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| WardenError::internal(format!("Failed to serialize output: {e}")))
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(heading);
    out.push_str(":\n");
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

/// Renders a classification for the terminal.
pub fn render_classification(classification: &ClassificationResult) -> String {
    let mut out = format!(
        "Kind: {}\nRisk: {}\n",
        classification.kind, classification.risk_level
    );
    if let Some(limit) = classification.row_limit {
        out.push_str(&format!("Row limit: {limit}\n"));
    }
    push_list(&mut out, "Warnings", &classification.warnings);
    push_list(&mut out, "Errors", &classification.errors);

    let verdict = if classification.is_blocked() {
        "rejected"
    } else if classification.requires_approval {
        "requires approval"
    } else {
        "allowed"
    };
    out.push_str(&format!("Verdict: {verdict}"));
    out
}

/// Renders a proposal for the terminal.
pub fn render_proposal(proposal: &Proposal) -> String {
    let sql: String = proposal
        .sql
        .lines()
        .map(|line| format!("  {line}\n"))
        .collect();
    format!(
        "SQL:\n{sql}Explanation: {}\n{}\nState: {}",
        proposal.explanation,
        render_classification(&proposal.classification),
        proposal.state
    )
}

/// Renders rows as an aligned table followed by a summary line.
pub fn render_result(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return result.summary();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|value| value.to_string()).collect())
        .collect();
    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .filter_map(|row| row.get(i).map(|cell| cell.chars().count()))
                .chain(std::iter::once(column.name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = line(result.columns.iter().map(|c| c.name.as_str()).collect());
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out.push_str(&result.summary());
    out
}

/// Renders one table with the foreign keys that touch it.
pub fn render_table(schema: &Schema, table: Table) -> String {
    let foreign_keys = schema
        .foreign_keys
        .iter()
        .filter(|fk| fk.from_table == table.name || fk.to_table == table.name)
        .cloned()
        .collect();
    Schema {
        tables: vec![table],
        foreign_keys,
    }
    .format_for_llm()
}
