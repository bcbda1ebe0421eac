use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{AggregatorError, Result};
use crate::logsink::LogSink;

// ─── Command line ────────────────────────────────────────────────

/// A monitoring tool for aggregating stats from the Nginx Vhost Traffic
/// Status plugin.
///
/// The plugin exports monotonically increasing counters; meaningful
/// monitoring values are obtained by comparing counters between
/// consecutive scraping intervals. The aggregated metrics are written to
/// the --milliseconds file at each interval and persistent state is saved
/// to the --checkpoint file so the tool can be restarted without losing
/// data points.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// A URL or a file. A URL should point to an nginx vhost traffic
    /// status end-point that provides monitoring metrics as JSON and
    /// should probably end with /format/json. A file path can be provided
    /// instead of a URL when testing.
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Checkpoint file to save backend metrics.
    #[arg(long, value_name = "PATH")]
    pub checkpoint: PathBuf,

    /// Write millisecond json to the given target file. The target file is
    /// replaced atomically so it can be served as a static file safely.
    #[arg(long, value_name = "PATH")]
    pub milliseconds: PathBuf,

    /// Scraping interval in seconds.
    #[arg(long, default_value_t = 60, allow_negative_numbers = true)]
    pub interval: i64,

    /// How many seconds after interval start all processing must be
    /// finished. Defaults to min(10.0, interval / 2).
    #[arg(long, value_name = "SECONDS")]
    pub late_margin: Option<f64>,

    /// Comma separated latency percentiles to monitor, as percentages.
    #[arg(long, default_value = "0,1,5,10,50,90,95,99,100")]
    pub latency_percentiles: String,

    /// Comma separated monitoring zones, e.g. MISS for cache miss
    /// statistics. Defaults to monitoring all zones.
    #[arg(long, default_value = "")]
    pub zones: String,

    /// Comma separated zones to print in verbose mode.
    #[arg(long, value_name = "ZONES")]
    pub verbose_zones: Option<String>,

    /// Timeout for fetching statistics from backends.
    #[arg(long, default_value_t = 2.0, value_name = "SECONDS")]
    pub timeout: f64,

    /// Do not validate HTTPS certificates.
    #[arg(long)]
    pub insecure: bool,

    /// Write logs of errors and exceptions to {dir}/vtsaggregator.log.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log raw json snapshots to files named {dir}/{host}-{step}.json.
    #[arg(long, value_name = "DIR")]
    pub stat_dir: Option<PathBuf>,

    /// No sleeping. The given URLs are a sequence of json dumps, one
    /// consumed per interval.
    #[arg(long)]
    pub test_mode: bool,

    /// Evaluate monitoring for the given number of intervals, then stop.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub test_limit: i64,

    /// Record plot points and dump them as JSON on exit.
    #[arg(long)]
    pub plot: bool,

    /// Record plot points for the given comma separated zones only.
    #[arg(long, default_value = "")]
    pub plot_zones: String,

    /// Print verbose stats on stdout.
    #[arg(long)]
    pub verbose: bool,
}

// ─── Validated configuration ─────────────────────────────────────

/// Validated runtime configuration. All configuration errors are raised
/// here, before the scrape loop starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub urls: Vec<String>,
    pub checkpoint: PathBuf,
    pub milliseconds: PathBuf,
    pub interval: u64,
    pub late_margin: f64,
    /// Fractions in [0, 1].
    pub latency_percentiles: Vec<f64>,
    /// Empty means all zones found in each snapshot.
    pub zones: Vec<String>,
    pub verbose_zones: Vec<String>,
    pub timeout: f64,
    pub insecure: bool,
    pub stat_dir: Option<PathBuf>,
    pub test_mode: bool,
    pub test_limit: i64,
    pub plot: bool,
    pub plot_zones: Vec<String>,
    pub verbose: bool,
}

impl Config {
    pub fn from_args(args: Args, sink: &LogSink) -> Result<Self> {
        if args.interval <= 0 {
            return Err(AggregatorError::Config(
                "--interval value must be a positive integer".to_owned(),
            ));
        }
        let interval = args.interval as u64;

        let late_margin = args
            .late_margin
            .unwrap_or_else(|| f64::min(10.0, interval as f64 / 2.0));
        if late_margin <= 0.0 || late_margin > interval as f64 / 2.0 {
            return Err(AggregatorError::Config(
                "--late-margin value must be a positive float not greater than interval/2"
                    .to_owned(),
            ));
        }

        let mut seen = BTreeSet::new();
        for url in &args.urls {
            if !seen.insert(url.clone()) {
                return Err(AggregatorError::Config(format!(
                    "Duplicate URL {url} given"
                )));
            }
        }

        let latency_percentiles = parse_percentiles(&args.latency_percentiles)?;
        if latency_percentiles.is_empty() {
            sink.warning("No latency percentiles computed");
        }

        let verbose_zones = match &args.verbose_zones {
            None => vec!["total".to_owned()],
            Some(zones) => split_csv(zones),
        };

        Ok(Self {
            urls: args.urls,
            checkpoint: args.checkpoint,
            milliseconds: args.milliseconds,
            interval,
            late_margin,
            latency_percentiles,
            zones: split_csv(&args.zones),
            verbose_zones,
            timeout: args.timeout,
            insecure: args.insecure,
            stat_dir: args.stat_dir,
            test_mode: args.test_mode,
            test_limit: args.test_limit,
            plot: args.plot,
            plot_zones: split_csv(&args.plot_zones),
            verbose: args.verbose,
        })
    }
}

fn parse_percentiles(csv: &str) -> Result<Vec<f64>> {
    let mut percentiles = Vec::new();
    for part in split_csv(csv) {
        let percentage: f64 = part.parse().map_err(|_| {
            AggregatorError::Config(format!("Invalid percentile value: {part}"))
        })?;
        let p = percentage / 100.0;
        if !(0.0..=1.0).contains(&p) {
            return Err(AggregatorError::Config(format!(
                "Invalid percentile value: {part}"
            )));
        }
        percentiles.push(p);
    }
    Ok(percentiles)
}

fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────
