//! `ledger-quickstart` binary.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use quickstart_cli::{Overrides, Quickstart, QuickstartConfig, logging};
use quickstart_ledger::MemoryLedgerService;
use tokio_util::sync::CancellationToken;

/// Provision a ledger, create a table, insert a document and query it back.
#[derive(Debug, Parser)]
#[command(name = "ledger-quickstart", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ledger name.
    #[arg(long, value_name = "NAME")]
    ledger: Option<String>,

    /// Table name.
    #[arg(long, value_name = "NAME")]
    table: Option<String>,

    /// Wait between ledger status polls, e.g. `15s` or `500ms`.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    /// Status polls before the in-memory ledger turns active.
    #[arg(long, value_name = "N")]
    activation_polls: Option<u32>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            ledger_name: self.ledger.clone(),
            table_name: self.table.clone(),
            poll_interval: self.poll_interval,
            activation_polls: self.activation_polls,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = QuickstartConfig::load(cli.config.as_deref())?.with_overrides(cli.overrides())?;
    let service = MemoryLedgerService::with_config(config.service.clone());
    let quickstart = Quickstart::with_service(config, service);

    let cancel = CancellationToken::new();
    let signal = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let report = quickstart.run(&cancel).await;
    signal.abort();
    let report = report?;

    println!("{report}");
    if report.is_success() {
        tracing::info!("quickstart completed");
    } else {
        tracing::warn!("quickstart finished with failures");
    }
    Ok(report.is_success())
}
