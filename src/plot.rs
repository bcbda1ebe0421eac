use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::logsink::LogSink;
use crate::tsdb::{Labels, SeriesKey, Store, Unit};

// ─── Plot recorder ───────────────────────────────────────────────

/// Passive per-interval recorder backing the `--plot` option.
///
/// The core never draws anything: it records one point per tick for every
/// plottable series (latency percentiles per histogram, per-second rates
/// for byte and request counters) and exposes them read-only. A JSON dump
/// of the recording is printed on exit for an external plotting tool.
#[derive(Debug, Default)]
pub struct PlotRecorder {
    percentile_points: BTreeMap<SeriesKey, PlotSeries<Option<Vec<(f64, f64)>>>>,
    rate_points: BTreeMap<SeriesKey, PlotSeries<f64>>,
}

/// The recorded points of one plottable series.
#[derive(Debug, Clone)]
pub struct PlotSeries<T> {
    pub labels: Labels,
    pub points: Vec<(f64, T)>,
}

impl PlotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture one point per plottable series at `t_cur`. Called once per
    /// tick, after aggregation.
    pub fn record(
        &mut self,
        store: &Store,
        t_cur: f64,
        percentiles: &[f64],
        interval: u64,
        sink: &LogSink,
    ) {
        let interval_f = interval as f64;

        for (key, histogram) in store.histograms() {
            let values = match histogram.percentiles(store.series_map(), percentiles, interval_f)
            {
                Ok(values) => values,
                Err(e) => {
                    sink.error(&format!("Bad data: {}", e));
                    None
                }
            };
            self.percentile_points
                .entry(key.clone())
                .or_insert_with(|| PlotSeries {
                    labels: histogram.labels().clone(),
                    points: Vec::new(),
                })
                .points
                .push((t_cur, values));
        }

        for (key, ts) in store.series_map() {
            let labels = ts.labels();
            if labels.le.is_some() {
                // Bucket series are covered by their histogram.
                continue;
            }
            let plottable =
                labels.direction.is_some() || labels.unit == Some(Unit::Requests);
            if !plottable {
                continue;
            }
            let Some(diff) = ts.diff(interval_f) else {
                continue;
            };
            self.rate_points
                .entry(key.clone())
                .or_insert_with(|| PlotSeries {
                    labels: labels.clone(),
                    points: Vec::new(),
                })
                .points
                .push((t_cur, diff / interval_f));
        }
    }

    /// Recorded percentile points, one entry per histogram.
    pub fn percentile_series(
        &self,
    ) -> impl Iterator<Item = &PlotSeries<Option<Vec<(f64, f64)>>>> {
        self.percentile_points.values()
    }

    /// Recorded rate points, one entry per byte or request counter series.
    pub fn rate_series(&self) -> impl Iterator<Item = &PlotSeries<f64>> {
        self.rate_points.values()
    }

    /// Dump the recording as a JSON document, keeping only the given zones
    /// (empty = all). Series are labeled without their `backend` and `unit`
    /// attributes, which only add noise to a plot legend.
    pub fn to_json(&self, plot_zones: &[String]) -> Value {
        let keep = |labels: &Labels| {
            plot_zones.is_empty() || plot_zones.iter().any(|zone| *zone == labels.zone)
        };

        let mut histograms = Map::new();
        for series in self.percentile_series() {
            if !keep(&series.labels) {
                continue;
            }
            let points: Vec<Value> = series
                .points
                .iter()
                .map(|(t, values)| {
                    let values = values.as_ref().map(|values| {
                        let mut map = Map::new();
                        for (p, latency) in values {
                            map.insert(format!("{}", p), Value::from(*latency));
                        }
                        Value::Object(map)
                    });
                    Value::from(vec![Value::from(*t), values.unwrap_or(Value::Null)])
                })
                .collect();
            histograms.insert(plot_label(&series.labels), Value::from(points));
        }

        let mut bytes = Map::new();
        let mut requests = Map::new();
        for series in self.rate_series() {
            if !keep(&series.labels) {
                continue;
            }
            let points: Vec<Value> = series
                .points
                .iter()
                .map(|(t, rate)| Value::from(vec![Value::from(*t), Value::from(*rate)]))
                .collect();
            let target = if series.labels.direction.is_some() {
                &mut bytes
            } else {
                &mut requests
            };
            target.insert(plot_label(&series.labels), Value::from(points));
        }

        let mut document = Map::new();
        document.insert("histogram".to_owned(), Value::Object(histograms));
        document.insert("bytes".to_owned(), Value::Object(bytes));
        document.insert("requests".to_owned(), Value::Object(requests));
        Value::Object(document)
    }
}

/// Legend label: `attr=value` pairs sorted by attribute, without the
/// backend and unit attributes.
fn plot_label(labels: &Labels) -> String {
    let mut pairs: Vec<(&str, String)> = vec![
        ("name", labels.name.clone()),
        ("zone", labels.zone.clone()),
    ];
    if let Some(direction) = labels.direction {
        pairs.push(("direction", direction.as_str().to_owned()));
    }
    if let Some(le) = labels.le {
        pairs.push(("le", format!("{}", le)));
    }
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(attr, value)| format!("{}={}", attr, value))
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Tests ───────────────────────────────────────────────────────
