use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Labels, OVERFLOW_LIMIT};

/// Counter differences only ever need the two most recent samples.
const MAX_SAMPLES: usize = 2;

/// A counter diff spanning more than this many intervals is too stale to be
/// an accurate per-interval value.
const MAX_DIFF_INTERVALS: f64 = 2.5;

// ─── TimeSeries ──────────────────────────────────────────────────

/// One labeled counter: the last two `(t, value)` samples, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    labels: Labels,
    data: VecDeque<(f64, f64)>,
}

/// Checkpoint representation of one series: the flat key dict plus the
/// retained samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedSeries {
    pub key_dict: Labels,
    pub data: Vec<(f64, f64)>,
}

impl TimeSeries {
    pub fn new(labels: Labels) -> Self {
        Self {
            labels,
            data: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn latest(&self) -> Option<(f64, f64)> {
        self.data.back().copied()
    }

    /// Store `(t, value)`, dropping the oldest sample beyond the cap.
    /// Values at or above 2^52 are reduced into `[0, 2^52)` so they stay
    /// exactly representable across a JSON boundary.
    pub fn append(&mut self, t: f64, mut value: f64) {
        if value >= OVERFLOW_LIMIT {
            value %= OVERFLOW_LIMIT;
        }
        self.data.push_back((t, value));
        if self.data.len() > MAX_SAMPLES {
            self.data.pop_front();
        }
    }

    /// Keep only the latest sample. Used to resynchronize after a counter
    /// reset.
    pub fn drop_all_but_latest(&mut self) {
        if self.data.len() > 1 {
            let latest = self.data.pop_back();
            self.data.clear();
            if let Some(sample) = latest {
                self.data.push_back(sample);
            }
        }
    }

    /// Merge one sample of a sibling series into this one.
    ///
    /// A sample older than our latest is dropped, a newer one is appended,
    /// and a same-timestamp sample sums the counters in place.
    pub fn merge_sample(&mut self, t: f64, value: f64) {
        let t_latest = match self.data.back() {
            // A new point in time.
            None => {
                self.append(t, value);
                return;
            }
            Some(&(t_latest, _)) => t_latest,
        };
        if t > t_latest {
            self.append(t, value);
        } else if t == t_latest {
            if let Some(latest) = self.data.back_mut() {
                latest.1 += value;
            }
        }
        // An old point in time: drop.
    }

    /// Merge the most recent sample of `other`; no-op when `other` is empty.
    pub fn merge_latest(&mut self, other: &TimeSeries) {
        if let Some((t, value)) = other.latest() {
            self.merge_sample(t, value);
        }
    }

    /// Counter difference between the two stored samples.
    ///
    /// `None` when fewer than two samples exist, when the samples are more
    /// than 2.5 intervals apart, or when the counter went backwards.
    pub fn diff(&self, interval: f64) -> Option<f64> {
        let (d, _) = self.compute_diff(interval)?;
        d
    }

    /// Like [`diff`](Self::diff), but a negative difference (counter reset
    /// or overflow) also drops the older sample so the next interval starts
    /// from the latest value.
    pub fn diff_resync(&mut self, interval: f64) -> Option<f64> {
        let (d, negative) = self.compute_diff(interval)?;
        if negative {
            self.drop_all_but_latest();
        }
        d
    }

    fn compute_diff(&self, interval: f64) -> Option<(Option<f64>, bool)> {
        if self.data.len() < 2 {
            return None;
        }
        let (t_prev, v_prev) = self.data[0];
        let (t_cur, v_cur) = self.data[1];
        if t_cur - t_prev > MAX_DIFF_INTERVALS * interval {
            // Too much time between the samples for an accurate diff.
            return Some((None, false));
        }
        let d = v_cur - v_prev;
        if d < 0.0 {
            return Some((None, true));
        }
        Some((Some(d), false))
    }

    pub fn serialize(&self) -> SerializedSeries {
        SerializedSeries {
            key_dict: self.labels.clone(),
            data: self.data.iter().copied().collect(),
        }
    }

    pub fn deserialize(serialized: SerializedSeries) -> Self {
        let mut ts = Self::new(serialized.key_dict);
        for (t, value) in serialized.data {
            ts.append(t, value);
        }
        ts
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> TimeSeries {
        TimeSeries::new(Labels::new("requests_total", "b", "200"))
    }

    #[test]
    fn keeps_at_most_two_samples() {
        let mut ts = series();
        ts.append(1.0, 10.0);
        ts.append(2.0, 20.0);
        ts.append(3.0, 30.0);
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.latest(), Some((3.0, 30.0)));
        assert_eq!(ts.diff(60.0), Some(10.0));
    }

    #[test]
    fn reduces_values_beyond_json_safe_range() {
        let mut ts = series();
        ts.append(1.0, OVERFLOW_LIMIT + 7.0);
        assert_eq!(ts.latest(), Some((1.0, 7.0)));

        let mut ts = series();
        ts.append(1.0, OVERFLOW_LIMIT * 2.0 + 0.5);
        assert_eq!(ts.latest(), Some((1.0, 0.5)));
    }

    #[test]
    fn diff_requires_two_samples() {
        let mut ts = series();
        assert_eq!(ts.diff(60.0), None);
        ts.append(60.0, 100.0);
        assert_eq!(ts.diff(60.0), None);
    }

    #[test]
    fn diff_rejects_stale_sample_pairs() {
        let mut ts = series();
        ts.append(0.0, 100.0);
        ts.append(151.0, 200.0);
        // 151 s > 2.5 * 60 s
        assert_eq!(ts.diff(60.0), None);

        let mut ts = series();
        ts.append(0.0, 100.0);
        ts.append(150.0, 200.0);
        assert_eq!(ts.diff(60.0), Some(100.0));
    }

    #[test]
    fn negative_diff_resyncs_only_in_mutable_mode() {
        let mut ts = series();
        ts.append(60.0, 100.0);
        ts.append(120.0, 40.0);

        assert_eq!(ts.diff(60.0), None);
        assert_eq!(ts.len(), 2);

        assert_eq!(ts.diff_resync(60.0), None);
        assert_eq!(ts.len(), 1);
        assert_eq!(ts.latest(), Some((120.0, 40.0)));
    }

    #[test]
    fn merge_adopts_drops_appends_and_sums() {
        let mut target = series();

        // Empty target adopts the sample.
        target.merge_sample(60.0, 5.0);
        assert_eq!(target.latest(), Some((60.0, 5.0)));

        // Older samples are dropped.
        target.merge_sample(30.0, 99.0);
        assert_eq!(target.latest(), Some((60.0, 5.0)));

        // Same timestamp sums the counters.
        target.merge_sample(60.0, 7.0);
        assert_eq!(target.latest(), Some((60.0, 12.0)));

        // Newer samples are appended.
        target.merge_sample(120.0, 3.0);
        assert_eq!(target.len(), 2);
        assert_eq!(target.diff(60.0), None); // 3 - 12 < 0
    }

    #[test]
    fn same_timestamp_merge_is_commutative_and_associative() {
        let mut a = series();
        a.append(60.0, 1.0);
        let mut b = series();
        b.append(60.0, 2.0);
        let mut c = series();
        c.append(60.0, 4.0);

        let mut ab_c = series();
        ab_c.merge_latest(&a);
        ab_c.merge_latest(&b);
        ab_c.merge_latest(&c);

        let mut c_ba = series();
        c_ba.merge_latest(&c);
        c_ba.merge_latest(&b);
        c_ba.merge_latest(&a);

        assert_eq!(ab_c.latest(), Some((60.0, 7.0)));
        assert_eq!(ab_c.latest(), c_ba.latest());
    }

    #[test]
    fn serialize_round_trip_is_identity() {
        let mut ts = TimeSeries::new(
            Labels::new("response_duration", "b", "200")
                .with_unit(crate::tsdb::Unit::Seconds)
                .with_le(0.01),
        );
        ts.append(60.0, 10.0);
        ts.append(120.0, 20.0);

        let json = serde_json::to_string(&ts.serialize()).unwrap();
        let back: SerializedSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(TimeSeries::deserialize(back), ts);
    }
}
