use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use listing_crawler::config::{load_targets, AppSettings};
use listing_crawler::driver::BrowserLauncher;
use listing_crawler::images::ImageDownloader;
use listing_crawler::{
    CategoryCrawler, CrawlOrchestrator, CrawlerOptions, JsonDatasetSink, RecordExtractor,
};

#[derive(Debug, Parser)]
#[command(name = "listing_crawler", about = "Crawl product category listings into JSON datasets")]
struct Cli {
    /// Download product images next to the dataset
    #[arg(long, default_value_t = false)]
    save_images: bool,

    /// Log every extracted product
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Settings file (TOML)
    #[arg(long, value_name = "FILE", default_value = "crawler.toml")]
    config: PathBuf,

    /// Category → listing URL map, overrides `targets_path`
    #[arg(long, value_name = "FILE")]
    targets: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose {
        tracing::debug!("Verbose logging enabled");
    }

    let settings = AppSettings::load(Some(cli.config.as_path())).context("loading settings")?;
    let targets_path = cli.targets.clone().unwrap_or_else(|| settings.targets_path.clone());
    let targets = load_targets(&targets_path)
        .with_context(|| format!("reading targets from {}", targets_path.display()))?;

    let mut sys = System::new_all();
    sys.refresh_all();
    let pid = Pid::from(std::process::id() as usize);

    let start = Instant::now();
    tracing::info!(categories = targets.len(), "Starting crawl");

    let extractor = Arc::new(RecordExtractor::new(&settings.selectors)?);
    let mut crawler = CategoryCrawler::new(
        extractor,
        CrawlerOptions {
            timings: settings.timings.clone(),
            page_param: settings.selectors.page_param.clone(),
            max_pages: settings.max_pages_per_category,
        },
    );
    if cli.save_images {
        crawler = crawler.with_images(Arc::new(ImageDownloader::new(
            &settings.image_dir,
            settings.timings.image_timeout(),
        )?));
    }

    let launcher = BrowserLauncher::new(
        settings.browser.clone(),
        settings.timings.clone(),
        settings.selectors.clone(),
    );
    let sink = JsonDatasetSink::new(&settings.output_dir, &settings.history_dir);
    let orchestrator = CrawlOrchestrator::new(launcher, crawler).with_sink(Arc::new(sink));

    let report = orchestrator.run(&targets).await?;

    sys.refresh_processes();
    let memory = sys.process(pid).map(|p| p.memory()).unwrap_or(0);

    tracing::info!(
        records = report.total_records(),
        missing = report.missing.len(),
        total_duration = ?start.elapsed(),
        max_memory_mb = memory as f64 / (1024.0 * 1024.0),
        "Crawl completed"
    );
    Ok(())
}
