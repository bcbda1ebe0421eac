use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};

use crate::aggregate::{ingest, project, zones};
use crate::checkpoint;
use crate::cli::Config;
use crate::error::{AggregatorError, Result};
use crate::fetch::Fetcher;
use crate::logsink::LogSink;
use crate::plot::PlotRecorder;
use crate::snapshot;
use crate::tsdb::{SeriesKey, Store};

/// Every sleep overshoots the tick boundary by this much so a slightly
/// fast clock cannot wake the loop just before its scheduled time.
const CLOCK_DRIFT_MARGIN: f64 = 0.1;

// ─── Scraper ─────────────────────────────────────────────────────

/// The single driver task: paces the intervals, fetches the backends, and
/// runs the per-tick pipeline (parse → aggregate → project → persist).
pub struct Scraper {
    config: Config,
    sink: LogSink,
    fetcher: Fetcher,
    store: Store,
    plots: Option<PlotRecorder>,
}

impl Scraper {
    pub fn new(config: Config, sink: LogSink) -> Result<Self> {
        let fetcher = Fetcher::new(config.timeout, config.insecure)?;
        let store = checkpoint::load(&config.checkpoint, &sink);
        let plots = config.plot.then(PlotRecorder::new);
        Ok(Self {
            config,
            sink,
            fetcher,
            store,
            plots,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn plots(&self) -> Option<&PlotRecorder> {
        self.plots.as_ref()
    }

    /// Run until `--test-limit` steps have passed (forever when negative)
    /// or, in test mode, until the snapshot sequence is exhausted.
    ///
    /// Errors inside a tick are logged and the loop continues; the
    /// periodic nature of the loop is the recovery mechanism.
    pub async fn run(&mut self) {
        let now = now_unix();
        let interval = self.config.interval as f64;
        let mut t_next = if self.config.test_mode {
            now + interval
        } else {
            next_interval_start(now, self.config.interval)
        };

        let mut step: i64 = 0;
        while self.config.test_limit < 0 || step < self.config.test_limit {
            let mut t = now_unix();
            if self.config.test_mode {
                // No sleeping in test mode.
                t = t_next;
            }
            if t < t_next {
                let wait = t_next + CLOCK_DRIFT_MARGIN - t;
                tokio::time::sleep(std::time::Duration::from_secs_f64(wait)).await;
                continue;
            }

            let t_deadline = t_next + self.config.late_margin;
            if t < t_deadline {
                let urls: Vec<String> = if self.config.test_mode {
                    let Some(url) = self.config.urls.get(step as usize) else {
                        tracing::info!("No more test data. Stopping.");
                        break;
                    };
                    vec![url.clone()]
                } else {
                    self.config.urls.clone()
                };

                let mut payloads = self.fetcher.fetch_all(&urls, &self.sink).await;
                let t_end = now_unix();
                self.write_stat_files(&payloads, step);
                if !self.config.test_mode && t_end >= t_deadline {
                    self.sink.warning(&format!(
                        "Scraping was late by {} seconds. Results are not counted.",
                        t_end - t_deadline
                    ));
                    payloads.clear();
                }

                self.run_tick(t_next, payloads);
                if let Err(e) = checkpoint::save(&self.config.checkpoint, &self.store) {
                    self.sink.exception(&e, "Unable to write checkpoint");
                }
                if self.config.verbose {
                    let t_done = now_unix();
                    println!("Fetch duration: {:.3}s", t_end - t);
                    println!("Aggregate and save duration: {:.3}s", t_done - t_end);
                }
            } else {
                self.sink
                    .warning(&format!("Missed an interval: time_t {}", t));
            }

            t_next += interval;
            step += 1;
        }
    }

    /// One tick: decode and aggregate every payload, write the metrics
    /// document, and advance `t_prev`.
    ///
    /// All series updated in one tick carry the same timestamp: the
    /// scheduled tick time, or in test mode the snapshot's own `nowMsec`.
    pub fn run_tick(&mut self, t_scheduled: f64, payloads: Vec<(String, Vec<u8>)>) {
        let mut t_cur: Option<f64> = (!self.config.test_mode).then_some(t_scheduled);
        let mut output = Map::new();

        for (backend, raw) in &payloads {
            let parsed = match snapshot::decode(backend, raw) {
                Ok(parsed) => parsed,
                Err(e @ AggregatorError::InvalidUtf8 { .. }) => {
                    self.sink.error(&e.to_string());
                    continue;
                }
                Err(e) => {
                    self.sink.exception(&e, &format!("Undecodable data from {backend}"));
                    continue;
                }
            };

            if t_cur.is_none() {
                // In test mode, take the tick timestamp from the snapshot.
                match parsed.now_msec {
                    Some(now_msec) => t_cur = Some(now_msec / 1000.0),
                    None => {
                        self.sink
                            .error(&format!("nowMsec is not defined for {backend}"));
                        continue;
                    }
                }
            }
            let Some(t) = t_cur else { continue };

            let zone_names: Vec<String> = if self.config.zones.is_empty() {
                match parsed.zone_names() {
                    Some(names) => names,
                    None => {
                        let e = AggregatorError::MissingServerZones {
                            backend: backend.clone(),
                        };
                        self.sink.exception(&e, &e.to_string());
                        continue;
                    }
                }
            } else {
                self.config.zones.clone()
            };

            let mut updated: Vec<SeriesKey> = Vec::new();
            for zone in &zone_names {
                let result = parsed.zone(zone).and_then(|stats| {
                    ingest::parse_zone(&mut self.store, &mut updated, t, backend, zone, &stats)
                });
                if let Err(e) = result {
                    self.sink.exception(&e, &format!("Parse error on zone {zone}"));
                }
            }

            let status_zones = zones::aggregate_zones(&mut self.store, &mut updated);
            let metrics = project::backend_metrics(
                &mut self.store,
                t,
                backend,
                &updated,
                &status_zones,
                self.config.interval,
                &self.config.latency_percentiles,
                &self.sink,
            );

            if self.config.verbose {
                print_backend_metrics(&self.config.verbose_zones, &metrics);
            }

            output.insert(backend.clone(), json!({ "t": t, "metrics": metrics }));
        }

        if let (Some(plots), Some(t)) = (&mut self.plots, t_cur) {
            plots.record(
                &self.store,
                t,
                &self.config.latency_percentiles,
                self.config.interval,
                &self.sink,
            );
        }

        // Write milliseconds stats into a json file for a monitor client.
        match serde_json::to_vec(&Value::Object(output)) {
            Ok(body) => {
                if let Err(e) = checkpoint::atomic_write(&self.config.milliseconds, &body) {
                    self.sink.exception(&e, "Unable to write milliseconds output");
                }
            }
            Err(e) => self.sink.exception(&e, "Unable to encode milliseconds output"),
        }

        match t_cur {
            // Advance only after a completed aggregate phase, so a restart
            // resumes with a consistent (store, t_prev) pair.
            Some(t) => self.store.set_t_prev(t),
            None => self
                .sink
                .error("No timestamp resolved for this tick, nothing aggregated"),
        }
    }

    /// Persist the raw snapshots under `--stat-dir` for offline replay.
    fn write_stat_files(&self, payloads: &[(String, Vec<u8>)], step: i64) {
        let Some(dir) = &self.config.stat_dir else {
            return;
        };
        for (backend, data) in payloads {
            let dest = dir.join(format!("{}-{:06}.json", backend_host(backend), step));
            if let Err(e) = std::fs::write(&dest, data) {
                self.sink
                    .error(&format!("Unable to write to stats dir: {e}"));
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn print_backend_metrics(verbose_zones: &[String], metrics: &Map<String, Value>) {
    let mut zone_names: Vec<String> = verbose_zones.to_vec();
    if zone_names.iter().any(|zone| zone == "*") {
        zone_names = metrics.keys().cloned().collect();
        zone_names.sort();
    }
    for zone in &zone_names {
        if let Some(stats) = metrics.get(zone) {
            println!("zone {}:", zone);
            println!(
                "{}",
                serde_json::to_string_pretty(stats).unwrap_or_default()
            );
        }
    }
}

/// Host part of a backend identifier, for stat-dir file names.
fn backend_host(backend: &str) -> String {
    reqwest::Url::parse(backend)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| "nohostname".to_owned())
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// First wall-clock second at or after `now` (rounded) that is an integer
/// multiple of the interval.
fn next_interval_start(now: f64, interval: u64) -> f64 {
    let rounded = now.round() as i64;
    let interval = interval as i64;
    let remainder = rounded.rem_euclid(interval);
    let aligned = if remainder == 0 {
        rounded
    } else {
        rounded + interval - remainder
    };
    aligned as f64
}

// ─── Tests ───────────────────────────────────────────────────────
