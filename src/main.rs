//! CLI entry point for the ratings rollup.
//!
//! Provides subcommands for loading a month of raw ratings into the shared
//! store, aggregating a month into its published artifact, and serving the
//! published artifacts over HTTP.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ratings_rollup::config::{Period, StoreConfig};
use ratings_rollup::error::{ErrorKind, PipelineError};
use ratings_rollup::infra::{PostgresStore, S3ArtifactStore};
use ratings_rollup::output::LocalArtifactStore;
use ratings_rollup::services::ArtifactPublisher;
use ratings_rollup::{delivery, ingest, pipeline};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ratings_rollup")]
#[command(about = "Monthly product rating rollup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one month of a raw ratings CSV into the shared store
    Ingest {
        /// Month to load (1-12)
        #[arg(default_value_t = Period::default())]
        period: Period,

        /// Raw ratings CSV
        #[arg(short, long, default_value = "/data/ratings_beauty.csv")]
        input: PathBuf,
    },
    /// Aggregate one month into its published artifact
    Aggregate {
        /// Month to aggregate (1-12)
        #[arg(default_value_t = Period::default())]
        period: Period,

        /// Directory holding the published artifacts
        #[arg(short = 'd', long, default_value = "/output")]
        output_dir: PathBuf,

        /// Optional: publish to this S3 bucket instead of the output directory
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix used with --s3-bucket
        #[arg(long, default_value = "aggregates")]
        s3_prefix: String,
    },
    /// Serve published artifacts over HTTP
    Serve {
        /// Directory holding the published artifacts
        #[arg(short = 'd', long, default_value = "/output")]
        output_dir: PathBuf,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:5000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(e.kind()));
        }
    };

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<PipelineError>() {
            Some(pipeline_err) => {
                let kind = pipeline_err.kind();
                error!(kind = kind.as_str(), error = %pipeline_err, "Run failed");
                ExitCode::from(kind.exit_code())
            }
            None => {
                error!(error = %e, "Run failed");
                ExitCode::FAILURE
            }
        },
    }
}

/// Exit status for a command line clap refused to parse.
///
/// Help and version requests succeed. Anything else, including an
/// out-of-range period, is a configuration error.
fn usage_exit_code(kind: clap::error::ErrorKind) -> u8 {
    match kind {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => ErrorKind::Config.exit_code(),
    }
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_logging() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/ratings_rollup.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ratings_rollup.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()?;

    Ok(file_guard)
}

async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { period, input } => {
            let config = StoreConfig::from_env()?;
            let store = PostgresStore::connect(&config).await?;
            let report = ingest::ingest_file(&input, period, &store).await?;
            info!(
                rows_read = report.rows_read,
                rows_loaded = report.rows_loaded,
                table = %period.table_name(),
                "Data successfully sent to store"
            );
        }
        Commands::Aggregate {
            period,
            output_dir,
            s3_bucket,
            s3_prefix,
        } => {
            let config = StoreConfig::from_env()?;
            let store = PostgresStore::connect(&config).await?;

            let publisher: Box<dyn ArtifactPublisher> = match s3_bucket {
                Some(bucket) => {
                    info!(bucket = %bucket, prefix = %s3_prefix, "Publishing to S3");
                    Box::new(S3ArtifactStore::from_env(&bucket, &s3_prefix).await)
                }
                None => Box::new(LocalArtifactStore::new(output_dir)),
            };

            pipeline::run(period, &store, publisher.as_ref()).await?;
        }
        Commands::Serve { output_dir, addr } => {
            delivery::serve(addr, LocalArtifactStore::new(output_dir)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_exit_code(args: &[&str]) -> Option<u8> {
        Cli::try_parse_from(args)
            .err()
            .map(|e| usage_exit_code(e.kind()))
    }

    #[test]
    fn test_out_of_range_period_is_config_error() {
        let code = parse_exit_code(&["ratings_rollup", "aggregate", "13"]);
        assert_eq!(code, Some(64));
        assert_ne!(code, Some(ErrorKind::StoreUnavailable.exit_code()));
    }

    #[test]
    fn test_unknown_flag_is_config_error() {
        assert_eq!(
            parse_exit_code(&["ratings_rollup", "ingest", "--bogus"]),
            Some(ErrorKind::Config.exit_code())
        );
    }

    #[test]
    fn test_help_exits_successfully() {
        assert_eq!(parse_exit_code(&["ratings_rollup", "--help"]), Some(0));
    }

    #[test]
    fn test_valid_period_parses() {
        let cli = Cli::try_parse_from(["ratings_rollup", "aggregate", "7"]).unwrap();
        match cli.command {
            Commands::Aggregate { period, .. } => assert_eq!(period.get(), 7),
            _ => panic!("expected aggregate"),
        }
    }
}
