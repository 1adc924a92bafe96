//! Command-line interface for quark
//!
//! ```bash
//! # One report, pretty-printed
//! quark report 600519 --pretty
//!
//! # Several codes share one service (and one cache)
//! quark report 600519 000001 300750
//!
//! # Effective configuration after QUARK_* overrides
//! quark config
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quark_report::{ReportConfig, ReportError, ReportService};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "quark")]
#[command(about = "Four-dimension A-share stock reports", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn,quark_report=info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch reports and print them as JSON, one document per line
    Report {
        /// Six-digit security codes
        #[arg(required = true)]
        codes: Vec<String>,

        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Error document printed for a code that produced no report
#[derive(Debug, Serialize)]
struct Failure<'a> {
    code: &'a str,
    error: &'static str,
    message: String,
}

fn render_error<'a>(code: &'a str, err: &ReportError) -> Failure<'a> {
    Failure {
        code,
        error: err.code(),
        message: err.to_string(),
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    quark_utils::init_tracing_with(&cli.log);

    let config = ReportConfig::from_env()?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Report { codes, pretty } => {
            let service = ReportService::eastmoney(config)?;
            info!(count = codes.len(), "Fetching reports");

            let results =
                futures::future::join_all(codes.iter().map(|code| service.get_report(code))).await;

            let mut failed = 0_usize;
            for (code, result) in codes.iter().zip(results) {
                match result {
                    Ok(report) => println!("{}", to_json(&*report, pretty)?),
                    Err(err) => {
                        failed += 1;
                        println!("{}", to_json(&render_error(code, &err), pretty)?);
                    }
                }
            }

            let stats = service.cache_stats();
            info!(
                failed,
                misses = stats.misses,
                coalesced = stats.coalesced,
                "Done"
            );

            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
