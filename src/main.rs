//! Command-line entry point for waymirror.
//!
//! Thin glue over the engine: parse arguments, load credentials from the
//! environment, build the supervisor, wire up Ctrl-C, run. Exit code 0 on
//! queue exhaustion or signal-induced shutdown, 1 on fatal errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use waymirror::{ArchiveCredentials, CrawlSupervisor, MirrorConfig, OffPeakWindow};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror web-archive captures for offline browsing")]
struct Args {
    /// Selections file: one `TIMESTAMP|URL` per line, `#` for comments
    selections: PathBuf,

    /// Output directory for snapshot trees
    #[arg(long, default_value = "archived_pages")]
    output_dir: PathBuf,

    /// Upstream archive host
    #[arg(long, default_value = "web.archive.org")]
    archive_host: String,

    /// Per-asset size ceiling in megabytes; larger assets are recorded in
    /// skipped_assets.json instead of downloaded
    #[arg(long, default_value_t = 50.0)]
    max_asset_size_mb: f64,

    /// Milliseconds between successive asset downloads
    #[arg(long, default_value_t = 1000)]
    asset_delay_ms: u64,

    /// Seconds between pages
    #[arg(long, default_value_t = 5)]
    page_delay_secs: u64,

    /// Do not fetch assets hosted on third-party domains
    #[arg(long)]
    skip_external_assets: bool,

    /// Disable pacing (asset and page gaps) only; the off-peak gate is
    /// governed separately by --off-peak / --ignore-schedule
    #[arg(long)]
    no_delay: bool,

    /// Only crawl inside this local-time window, e.g. `01:00-08:30`; the
    /// window may span midnight
    #[arg(long, value_name = "HH:MM-HH:MM")]
    off_peak: Option<String>,

    /// Run regardless of a configured off-peak window
    #[arg(long)]
    ignore_schedule: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let creds = ArchiveCredentials::from_env()?;

    let off_peak = args
        .off_peak
        .as_deref()
        .map(OffPeakWindow::parse)
        .transpose()?;

    let config = MirrorConfig::builder()
        .output_dir(args.output_dir)
        .archive_host(args.archive_host)
        .max_asset_size_mb(args.max_asset_size_mb)
        .asset_delay_ms(args.asset_delay_ms)
        .page_delay_secs(args.page_delay_secs)
        .fetch_external_assets(!args.skip_external_assets)
        .no_delay(args.no_delay)
        .off_peak(off_peak)
        .ignore_schedule(args.ignore_schedule)
        .build();

    let supervisor = CrawlSupervisor::new(config, &creds).await?;

    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received; finishing the current unit");
            let _ = shutdown.send(true);
        }
    });

    supervisor.run(&args.selections).await?;
    Ok(())
}
