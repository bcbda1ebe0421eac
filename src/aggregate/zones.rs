use std::collections::BTreeSet;

use crate::tsdb::{Labels, SeriesKey, Store};

use super::CACHE_OTHER_ZONES;

// ─── Zone aggregator ─────────────────────────────────────────────

/// Derive the summary zones from the series updated in this tick.
///
/// Status-code zones (integers in `[100, 600)`) are summed into `total`
/// and into their class zone `<d>xx`, with the exception of 503, which
/// stays out of `5xx`. The miscellaneous cache states are summed into
/// `cache_other`. Synthesized series inherit every other label of their
/// source (including `le`), so aggregate histograms materialize as well.
///
/// The touched aggregate series are appended to `updated`; the returned
/// set holds the observed status-code zones plus their class names.
pub fn aggregate_zones(store: &mut Store, updated: &mut Vec<SeriesKey>) -> BTreeSet<String> {
    let mut aggregated: BTreeSet<SeriesKey> = BTreeSet::new();
    let mut status_code_zones: BTreeSet<String> = BTreeSet::new();

    let source_keys: Vec<SeriesKey> = updated.clone();
    for key in &source_keys {
        let Some(source) = store.series(key) else {
            continue;
        };
        let labels = source.labels().clone();
        let Some((t, value)) = source.latest() else {
            continue;
        };
        let zone = labels.zone.clone();

        if CACHE_OTHER_ZONES.contains(&zone.as_str()) {
            let mut cache_other = labels;
            cache_other.zone = "cache_other".to_owned();
            merge_into(store, &cache_other, t, value, &mut aggregated);
            continue;
        }

        let Ok(status_code) = zone.parse::<i64>() else {
            continue;
        };
        if !(100..600).contains(&status_code) {
            continue;
        }

        // Total of all requests, summed across every response code.
        let mut total = labels.clone();
        total.zone = "total".to_owned();
        merge_into(store, &total, t, value, &mut aggregated);

        status_code_zones.insert(zone.clone());
        if zone == "503" {
            // Milliseconds does not count status code 503 into 5xx.
            continue;
        }
        let class_zone = format!("{}xx", status_code / 100);
        status_code_zones.insert(class_zone.clone());

        let mut class = labels;
        class.zone = class_zone;
        merge_into(store, &class, t, value, &mut aggregated);
    }

    updated.extend(aggregated);
    status_code_zones
}

fn merge_into(
    store: &mut Store,
    labels: &Labels,
    t: f64,
    value: f64,
    aggregated: &mut BTreeSet<SeriesKey>,
) {
    store.get_or_create(labels).merge_sample(t, value);
    aggregated.insert(labels.key());
}

// ─── Tests ───────────────────────────────────────────────────────
