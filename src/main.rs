//! warden - natural-language SQL behind a validation and approval gate.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use sql_warden::app::App;
use sql_warden::cli::Cli;
use sql_warden::logging;
use sql_warden::service::Proposal;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init(cli.log_file);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let app = App::from_cli(&cli)
        .await
        .context("Failed to start")?;

    let mut stdout = io::stdout().lock();
    let mut prompt = prompt_for_approval;
    let status = app
        .run(&cli.command, &mut stdout, &mut prompt)
        .await
        .with_context(|| format!("{} failed", command_name(&cli)))?;

    if let Err(e) = app.service().close().await {
        error!("Failed to close database connection: {e}");
    }
    Ok(status.code())
}

fn command_name(cli: &Cli) -> &'static str {
    use sql_warden::cli::Command;
    match cli.command {
        Command::Ask { .. } => "ask",
        Command::Run { .. } => "run",
        Command::Check { .. } => "check",
        Command::Schema { .. } => "schema",
        Command::Health => "health",
    }
}

/// Reads a yes/no answer from stdin. Anything but `y`/`yes` declines.
fn prompt_for_approval(_proposal: &Proposal) -> bool {
    eprint!("Approve? [y/N] ");
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
