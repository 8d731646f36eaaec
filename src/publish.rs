use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use kodo_publish::{Config, KodoClient, Publisher, Report};

#[derive(Parser, Debug)]
#[command(
    name = "publish",
    version = env!("CARGO_PKG_VERSION"),
    about = "Publish a build output directory to a Qiniu Kodo bucket",
    long_about = "Walks the build output directory and uploads every file to a Kodo bucket, \
                  keeping relative paths as object keys. Files are uploaded one at a time; \
                  a failed file is reported and the rest still upload. Exits non-zero if any file failed.",
    after_help = "Examples:\n  \
                  publish                                 # Upload ./dist\n  \
                  publish ./build                         # Upload another directory\n  \
                  publish --prefix site/v2                # Namespace keys under site/v2/\n  \
                  publish --dry-run                       # Show keys without uploading\n\n\
                  Configuration (.env):\n  \
                  QINIU_ACCESS_KEY=...\n  \
                  QINIU_SECRET_KEY=...\n  \
                  QINIU_BUCKET=my-bucket\n  \
                  QINIU_PREFIX=static                     # optional\n  \
                  QINIU_UPLOAD_HOST=https://upload.qiniup.com   # optional\n  \
                  QINIU_TOKEN_TTL=3600                    # optional, seconds"
)]
struct Cli {
    /// Directory to publish
    #[arg(default_value = "dist/")]
    path: PathBuf,

    /// Key prefix (overrides QINIU_PREFIX for this run)
    #[arg(long)]
    prefix: Option<String>,

    /// Show the keys that would be uploaded without uploading
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    // Logs go to stderr; stdout carries one line per file
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    info!("Kodo publish v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env()?;
    if let Some(prefix) = cli.prefix {
        config = config.with_prefix(prefix)?;
    }

    info!(
        "Target: kodo://{}/{} via {}",
        config.bucket, config.prefix, config.upload_host
    );

    let client = KodoClient::new(config.upload_host.clone())
        .context("Failed to build HTTP client")?;
    let publisher = Publisher::new(config, client);

    if cli.dry_run {
        println!(
            "{}",
            style("🔍 DRY RUN MODE - No files will be uploaded")
                .yellow()
                .bold()
        );

        let mut stdout = std::io::stdout().lock();
        let report = publisher
            .dry_run(&cli.path, &mut stdout)
            .with_context(|| format!("Cannot publish {}", cli.path.display()))?;

        return Ok(exit_code(&report));
    }

    let mut stdout = std::io::stdout().lock();
    let report = publisher
        .publish(&cli.path, &mut stdout)
        .await
        .with_context(|| format!("Cannot publish {}", cli.path.display()))?;

    Ok(exit_code(&report))
}

fn exit_code(report: &Report) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        error!("{} of {} file(s) failed", report.failed, report.total());
        ExitCode::FAILURE
    }
}
