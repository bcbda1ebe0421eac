use clap::Parser;
use tracing_subscriber::EnvFilter;

use vtsaggregator::cli::{Args, Config};
use vtsaggregator::logsink::LogSink;
use vtsaggregator::scrape::Scraper;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // ── 1. Console logging ───────────────────────────────────────
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // ── 2. Validate configuration ────────────────────────────────
    let sink = LogSink::new(args.log_dir.clone());
    let config = match Config::from_args(args, &sink) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let plot = config.plot;
    let plot_zones = config.plot_zones.clone();

    // ── 3. Run the scrape loop ───────────────────────────────────
    let mut scraper = match Scraper::new(config, sink) {
        Ok(scraper) => scraper,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    scraper.run().await;

    // ── 4. Dump recorded plot points for an external plotter ─────
    if plot {
        if let Some(recorder) = scraper.plots() {
            println!(
                "{}",
                serde_json::to_string_pretty(&recorder.to_json(&plot_zones))
                    .unwrap_or_default()
            );
        }
    }
}
