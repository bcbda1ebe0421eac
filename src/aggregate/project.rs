use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::logsink::LogSink;
use crate::tsdb::{Direction, Labels, SeriesKey, Store, Unit};

use super::{output_zone_name, CACHE_ZONES, HTTP_REQUEST_METHODS};

// ─── Metrics projector ───────────────────────────────────────────

/// Build one backend's per-zone metrics document from the series updated in
/// this tick.
///
/// Counter anomalies surface as JSON nulls, never as errors. Rate fields
/// are emitted only when a previous tick exists; the top-N sub-documents
/// encode their ranking in insertion order.
pub fn backend_metrics(
    store: &mut Store,
    t_cur: f64,
    backend: &str,
    updated: &[SeriesKey],
    status_code_zones: &BTreeSet<String>,
    interval: u64,
    percentiles: &[f64],
    sink: &LogSink,
) -> Map<String, Value> {
    let interval_f = interval as f64;
    let t_prev = store.t_prev();
    let rate_postfix = format!("rate{}s", interval);

    // Unique zones among the updated series.
    let mut zones: BTreeSet<String> = BTreeSet::new();
    for key in updated {
        if let Some(ts) = store.series(key) {
            zones.insert(ts.labels().zone.clone());
        }
    }

    // Per-interval request totals for the top-N sub-documents.
    let mut status_code_stats: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut method_stats: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut protocol_stats: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut cache_stats: BTreeMap<String, Option<f64>> = BTreeMap::new();

    let mut document = Map::new();
    for zone in &zones {
        let bytes = store.diff_resync(
            &Labels::new("bytes", backend, zone)
                .with_direction(Direction::Out)
                .with_unit(Unit::Bytes),
            interval_f,
        );
        let bytes_in = store.diff_resync(
            &Labels::new("bytes", backend, zone)
                .with_direction(Direction::In)
                .with_unit(Unit::Bytes),
            interval_f,
        );
        let count = store.diff_resync(
            &Labels::new("requests_total", backend, zone).with_unit(Unit::Requests),
            interval_f,
        );
        let sum_s = store.diff_resync(
            &Labels::new("response_duration_sum", backend, zone).with_unit(Unit::Seconds),
            interval_f,
        );

        let mut stats = Map::new();
        // Data uploaded to clients.
        stats.insert("bytes".to_owned(), json_count(bytes));
        // Data uploaded to server.
        stats.insert("bytes_in".to_owned(), json_count(bytes_in));
        stats.insert("count".to_owned(), json_count(count));

        if status_code_zones.contains(zone) {
            status_code_stats.insert(zone.clone(), count);
        }
        if HTTP_REQUEST_METHODS.contains(&zone.as_str()) {
            method_stats.insert(zone.clone(), count);
        }
        if zone.starts_with("HTTP/") {
            protocol_stats.insert(zone.clone(), count);
        }
        if CACHE_ZONES.contains(&zone.as_str()) {
            cache_stats.insert(zone.clone(), count);
        }

        // Duration sum and average, in whole milliseconds.
        let mut sum_ms: Option<f64> = None;
        let mut avg_ms: Option<f64> = None;
        if let Some(sum) = sum_s {
            sum_ms = Some((sum * 1000.0).round());
            if let Some(count) = count {
                avg_ms = Some((sum * 1000.0 / count.max(1.0)).round());
            }
        }
        stats.insert("sum".to_owned(), json_count(sum_ms));
        stats.insert("avg".to_owned(), json_count(avg_ms));

        if t_prev >= 0.0 && t_cur > t_prev {
            let rate_sources: [(&str, Option<f64>); 4] = [
                ("bytes", bytes),
                ("bytes_in", bytes_in),
                ("count", count),
                ("sum", sum_ms),
            ];
            for (name, value) in rate_sources {
                let rate_name = format!("{}:{}", name, rate_postfix);
                let rate = value.map(|v| {
                    let rate = v / (t_cur - t_prev);
                    // Two decimals, truncated toward zero.
                    (rate * 100.0).trunc() / 100.0
                });
                stats.insert(rate_name, rate.map(json_f64).unwrap_or(Value::Null));
            }
        }

        document.insert(output_zone_name(zone).to_owned(), Value::Object(stats));
    }

    // Latency percentiles per histogram, in whole milliseconds.
    for (_, histogram) in store.histograms() {
        if histogram.labels().backend != backend {
            continue;
        }
        let zone = &histogram.labels().zone;
        if !zones.contains(zone) {
            continue;
        }
        let values = match histogram.percentiles(store.series_map(), percentiles, interval_f) {
            Ok(Some(values)) => values,
            Ok(None) => continue,
            Err(e) => {
                sink.error(&format!("Bad data: {}", e));
                continue;
            }
        };
        if values.is_empty() {
            continue;
        }
        let Some(Value::Object(stats)) = document.get_mut(output_zone_name(zone)) else {
            continue;
        };
        for (p, latency_s) in values {
            stats.insert(percentile_key(p), json_count(Some((latency_s / 0.001).round())));
        }
    }

    document.insert("top-status".to_owned(), top_order(status_code_stats));
    document.insert("top-request_type".to_owned(), top_order(method_stats));
    document.insert("top-protocol".to_owned(), top_order(protocol_stats));
    document.insert("top-cache".to_owned(), top_order(cache_stats));
    document
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Output key for a percentile in `[0, 1]`: `p{:02}` of the percentage,
/// with the extremes renamed.
fn percentile_key(p: f64) -> String {
    if p == 0.0 {
        "min".to_owned()
    } else if p == 1.0 {
        "max".to_owned()
    } else {
        format!("p{:02}", (100.0 * p).round() as i64)
    }
}

/// Order a count mapping by value descending; nulls sort as zero but keep
/// their key. The insertion order of the result encodes the ranking.
fn top_order(stats: BTreeMap<String, Option<f64>>) -> Value {
    let mut entries: Vec<(String, Option<f64>)> = stats.into_iter().collect();
    // Stable sort: ties keep the alphabetical order of the BTreeMap.
    entries.sort_by(|a, b| {
        let a = a.1.unwrap_or(0.0);
        let b = b.1.unwrap_or(0.0);
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });

    let mut map = Map::new();
    for (zone, count) in entries {
        map.insert(zone, json_count(count));
    }
    Value::Object(map)
}

/// Counter diffs of integer counters are integral; emit them as JSON
/// integers, keeping genuine floats as-is.
fn json_count(value: Option<f64>) -> Value {
    match value {
        None => Value::Null,
        Some(v) if v.fract() == 0.0 && v.abs() < crate::tsdb::OVERFLOW_LIMIT => {
            Value::from(v as i64)
        }
        Some(v) => json_f64(v),
    }
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ingest, zones};
    use crate::snapshot::{RequestBuckets, ZoneStats};

    fn zone_stats(
        requests: f64,
        msec_sum: f64,
        in_bytes: f64,
        out_bytes: f64,
        counters: [f64; 3],
    ) -> ZoneStats {
        ZoneStats {
            request_counter: requests,
            request_msec_counter: msec_sum,
            in_bytes,
            out_bytes,
            request_buckets: RequestBuckets {
                msecs: vec![1.0, 10.0, 100.0],
                counters: counters.to_vec(),
            },
        }
    }

    fn run_tick(store: &mut Store, t: f64, zone: &str, stats: &ZoneStats) -> Map<String, Value> {
        let sink = LogSink::new(None);
        let mut updated = Vec::new();
        ingest::parse_zone(store, &mut updated, t, "b", zone, stats).unwrap();
        let status_zones = zones::aggregate_zones(store, &mut updated);
        let document = backend_metrics(
            store,
            t,
            "b",
            &updated,
            &status_zones,
            60,
            &[0.0, 0.5, 0.99, 1.0],
            &sink,
        );
        store.set_t_prev(t);
        document
    }

    #[test]
    fn first_tick_produces_nulls_without_rates() {
        let mut store = Store::new();
        let stats = zone_stats(100.0, 5000.0, 1000.0, 2000.0, [10.0, 50.0, 100.0]);
        let document = run_tick(&mut store, 60.0, "200", &stats);

        let zone = document["200"].as_object().unwrap();
        for field in ["bytes", "bytes_in", "count", "sum", "avg"] {
            assert!(zone[field].is_null(), "{field} should be null");
        }
        assert!(zone.keys().all(|k| !k.contains(":rate")));
        assert!(!zone.contains_key("p50"));
        assert_eq!(document["top-status"]["200"], Value::Null);
    }

    #[test]
    fn second_tick_produces_counts_rates_and_percentiles() {
        let mut store = Store::new();
        let first = zone_stats(100.0, 5000.0, 1000.0, 2000.0, [10.0, 50.0, 100.0]);
        run_tick(&mut store, 60.0, "200", &first);
        let second = zone_stats(200.0, 15000.0, 3000.0, 6000.0, [20.0, 100.0, 200.0]);
        let document = run_tick(&mut store, 120.0, "200", &second);

        let zone = document["200"].as_object().unwrap();
        assert_eq!(zone["count"], Value::from(100));
        assert_eq!(zone["bytes"], Value::from(4000));
        assert_eq!(zone["bytes_in"], Value::from(2000));
        assert_eq!(zone["sum"], Value::from(10000));
        assert_eq!(zone["avg"], Value::from(100));

        // Truncated, not rounded, to two decimals.
        assert_eq!(zone["count:rate60s"], Value::from(1.66));
        assert_eq!(zone["sum:rate60s"], Value::from(166.66));
        assert_eq!(zone["bytes:rate60s"], Value::from(66.66));

        assert_eq!(zone["min"], Value::from(0));
        assert_eq!(zone["p50"], Value::from(10));
        assert_eq!(zone["p99"], Value::from(98));
        assert_eq!(zone["max"], Value::from(100));

        // Aggregated zones see the same counts.
        assert_eq!(document["2xx"]["count"], Value::from(100));
        assert_eq!(document["total"]["count"], Value::from(100));
        assert_eq!(document["total"]["p50"], Value::from(10));
        assert_eq!(document["top-status"]["200"], Value::from(100));
        assert_eq!(document["top-status"]["2xx"], Value::from(100));
    }

    #[test]
    fn counter_reset_yields_nulls_and_resynchronizes() {
        let mut store = Store::new();
        let first = zone_stats(100.0, 5000.0, 1000.0, 2000.0, [10.0, 50.0, 100.0]);
        run_tick(&mut store, 60.0, "200", &first);
        let second = zone_stats(200.0, 15000.0, 3000.0, 6000.0, [20.0, 100.0, 200.0]);
        run_tick(&mut store, 120.0, "200", &second);
        // nginx restarted: every counter fell back.
        let reset = zone_stats(50.0, 4000.0, 500.0, 1000.0, [5.0, 20.0, 50.0]);
        let document = run_tick(&mut store, 180.0, "200", &reset);

        let zone = document["200"].as_object().unwrap();
        assert!(zone["count"].is_null());
        assert!(zone["bytes"].is_null());
        assert_eq!(zone["count:rate60s"], Value::Null);
        assert!(!zone.contains_key("p50"));

        // The resync dropped the older samples, so the next interval works.
        let recovered = zone_stats(80.0, 7000.0, 800.0, 1600.0, [8.0, 30.0, 80.0]);
        let document = run_tick(&mut store, 240.0, "200", &recovered);
        assert_eq!(document["200"]["count"], Value::from(30));
    }

    #[test]
    fn top_documents_rank_by_count_descending() {
        let stats = BTreeMap::from([
            ("200".to_owned(), Some(10.0)),
            ("404".to_owned(), Some(25.0)),
            ("500".to_owned(), None),
            ("301".to_owned(), Some(25.0)),
        ]);
        let Value::Object(map) = top_order(stats) else {
            panic!("expected an object");
        };
        let keys: Vec<&String> = map.keys().collect();
        // 301 before 404: equal counts keep alphabetical order.
        assert_eq!(keys, ["301", "404", "200", "500"]);
        assert_eq!(map["500"], Value::Null);
    }

    #[test]
    fn percentile_keys_rename_the_extremes() {
        assert_eq!(percentile_key(0.0), "min");
        assert_eq!(percentile_key(1.0), "max");
        assert_eq!(percentile_key(0.05), "p05");
        assert_eq!(percentile_key(0.5), "p50");
        assert_eq!(percentile_key(0.99), "p99");
    }

    #[test]
    fn cache_zones_appear_under_their_output_names() {
        let mut store = Store::new();
        let first = zone_stats(10.0, 100.0, 10.0, 10.0, [1.0, 2.0, 10.0]);
        run_tick(&mut store, 60.0, "MISS", &first);
        let second = zone_stats(14.0, 140.0, 20.0, 20.0, [2.0, 3.0, 14.0]);
        let document = run_tick(&mut store, 120.0, "MISS", &second);

        assert!(document.contains_key("cache_miss"));
        assert!(!document.contains_key("MISS"));
        assert_eq!(document["cache_miss"]["count"], Value::from(4));
        assert_eq!(document["top-cache"]["MISS"], Value::from(4));
    }
}
