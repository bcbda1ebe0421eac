use std::collections::BTreeMap;

use super::series::SerializedSeries;
use super::{Histogram, Labels, SeriesKey, TimeSeries};

// ─── Store ───────────────────────────────────────────────────────

/// Keyed collection of every known time series and histogram, plus the
/// timestamp of the previous completed tick.
///
/// Series are created lazily on first observation of their label set and
/// persist for the lifetime of the process and across restarts via the
/// checkpoint.
#[derive(Debug)]
pub struct Store {
    series: BTreeMap<SeriesKey, TimeSeries>,
    histograms: BTreeMap<SeriesKey, Histogram>,
    t_prev: f64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            series: BTreeMap::new(),
            histograms: BTreeMap::new(),
            t_prev: -1.0,
        }
    }

    /// Timestamp of the previous tick; `-1.0` until the first tick
    /// completes.
    pub fn t_prev(&self) -> f64 {
        self.t_prev
    }

    pub fn set_t_prev(&mut self, t: f64) {
        self.t_prev = t;
    }

    /// Look up or lazily create the series for a label set. A label set
    /// carrying `le` also gets its histogram created or extended.
    pub fn get_or_create(&mut self, labels: &Labels) -> &mut TimeSeries {
        self.ensure_histogram(labels);
        self.series
            .entry(labels.key())
            .or_insert_with(|| TimeSeries::new(labels.clone()))
    }

    fn ensure_histogram(&mut self, labels: &Labels) {
        let Some(le) = labels.le else {
            return;
        };
        let reduced = labels.histogram_labels();
        self.histograms
            .entry(reduced.key())
            .or_insert_with(|| Histogram::new(reduced))
            .insert(labels.key(), le);
    }

    pub fn series(&self, key: &SeriesKey) -> Option<&TimeSeries> {
        self.series.get(key)
    }

    /// The full series index, for histogram percentile walks and the plot
    /// recorder.
    pub fn series_map(&self) -> &BTreeMap<SeriesKey, TimeSeries> {
        &self.series
    }

    pub fn histograms(&self) -> impl Iterator<Item = (&SeriesKey, &Histogram)> {
        self.histograms.iter()
    }

    /// Read-only counter diff; `None` for unknown series.
    pub fn diff(&self, labels: &Labels, interval: f64) -> Option<f64> {
        self.series.get(&labels.key())?.diff(interval)
    }

    /// Counter diff that resynchronizes the series after a reset;
    /// `None` for unknown series.
    pub fn diff_resync(&mut self, labels: &Labels, interval: f64) -> Option<f64> {
        self.series.get_mut(&labels.key())?.diff_resync(interval)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Dump every series for the checkpoint.
    pub fn export(&self) -> Vec<SerializedSeries> {
        self.series.values().map(TimeSeries::serialize).collect()
    }

    /// Rebuild a store from checkpoint data, re-indexing histograms.
    pub fn from_serialized(timeseries: Vec<SerializedSeries>, t_prev: f64) -> Self {
        let mut store = Self::new();
        for serialized in timeseries {
            let ts = TimeSeries::deserialize(serialized);
            store.ensure_histogram(ts.labels());
            store.series.insert(ts.labels().key(), ts);
        }
        store.t_prev = t_prev;
        store
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::Unit;

    #[test]
    fn creates_series_lazily() {
        let mut store = Store::new();
        let labels = Labels::new("requests_total", "b", "200").with_unit(Unit::Requests);
        assert!(store.series(&labels.key()).is_none());

        store.get_or_create(&labels).append(60.0, 10.0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.series(&labels.key()).unwrap().latest(), Some((60.0, 10.0)));
    }

    #[test]
    fn le_series_are_indexed_under_their_histogram() {
        let mut store = Store::new();
        for le in [0.001, 0.01] {
            let labels = Labels::new("response_duration", "b", "200")
                .with_unit(Unit::Seconds)
                .with_le(le);
            store.get_or_create(&labels);
        }

        let histograms: Vec<_> = store.histograms().collect();
        assert_eq!(histograms.len(), 1);
        let (_, histogram) = histograms[0];
        assert_eq!(histogram.len(), 2);
        assert_eq!(histogram.labels().le, None);
        // Every member shares all non-le labels with the histogram key.
        for member in histogram.members() {
            let member_labels = store.series(member).unwrap().labels();
            assert_eq!(member_labels.histogram_labels(), *histogram.labels());
        }
    }

    #[test]
    fn diff_of_unknown_series_is_none() {
        let mut store = Store::new();
        let labels = Labels::new("bytes", "b", "200").with_unit(Unit::Bytes);
        assert_eq!(store.diff(&labels, 60.0), None);
        assert_eq!(store.diff_resync(&labels, 60.0), None);
    }

    #[test]
    fn export_restore_round_trip() {
        let mut store = Store::new();
        let plain = Labels::new("requests_total", "b", "200").with_unit(Unit::Requests);
        let bucket = Labels::new("response_duration", "b", "200")
            .with_unit(Unit::Seconds)
            .with_le(0.5);
        store.get_or_create(&plain).append(60.0, 1.0);
        store.get_or_create(&bucket).append(60.0, 2.0);
        store.set_t_prev(60.0);

        let restored = Store::from_serialized(store.export(), store.t_prev());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.t_prev(), 60.0);
        assert_eq!(restored.histograms().count(), 1);
        assert_eq!(
            restored.series(&plain.key()).unwrap().latest(),
            Some((60.0, 1.0))
        );
    }
}
