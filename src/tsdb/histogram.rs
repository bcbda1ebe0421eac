use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AggregatorError, Result};

use super::{BucketBound, Labels, SeriesKey, TimeSeries};

// ─── Histogram ───────────────────────────────────────────────────

/// Index over the bucket series of one cumulative latency distribution.
///
/// All member series share every label except `le`; `labels` is that shared
/// reduced set. `les` orders the members by bucket upper bound for the
/// percentile walk.
#[derive(Debug, Clone)]
pub struct Histogram {
    labels: Labels,
    members: BTreeSet<SeriesKey>,
    les: BTreeMap<BucketBound, SeriesKey>,
}

impl Histogram {
    pub fn new(labels: Labels) -> Self {
        debug_assert!(labels.le.is_none());
        Self {
            labels,
            members: BTreeSet::new(),
            les: BTreeMap::new(),
        }
    }

    /// The shared labels of this bucket family (no `le`).
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Register one bucket series; duplicates are a no-op.
    pub fn insert(&mut self, key: SeriesKey, le: f64) {
        if !self.members.insert(key.clone()) {
            return;
        }
        self.les.insert(BucketBound(le), key);
    }

    pub fn members(&self) -> impl Iterator<Item = &SeriesKey> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Interpolated latency percentiles for the last monitoring interval.
    ///
    /// Walks the buckets in ascending `le` order, taking each bucket's
    /// counter diff as its per-interval cumulative count.
    ///
    /// Returns `Ok(None)` when any bucket diff is unavailable, `Ok(Some([]))`
    /// when no request fell into the interval, and
    /// `Err(DecreasingBucketCounts)` on non-monotone cumulative counts
    /// (corrupt input; the caller logs it and treats the histogram as
    /// unavailable).
    pub fn percentiles(
        &self,
        series: &BTreeMap<SeriesKey, TimeSeries>,
        percentiles: &[f64],
        interval: f64,
    ) -> Result<Option<Vec<(f64, f64)>>> {
        let mut counts: Vec<(f64, f64)> = Vec::with_capacity(self.les.len());
        for (&BucketBound(le), key) in &self.les {
            // Members are inserted together with their series, so a miss
            // means the store was tampered with; treat it as no data.
            let Some(ts) = series.get(key) else {
                return Ok(None);
            };
            let Some(count) = ts.diff(interval) else {
                return Ok(None);
            };
            if let Some(&(_, prev_count)) = counts.last() {
                if count < prev_count {
                    return Err(AggregatorError::DecreasingBucketCounts {
                        le,
                        key: key.to_string(),
                    });
                }
            }
            counts.push((le, count));
        }

        // The highest bucket of the cumulative distribution is the total
        // number of requests during the interval.
        let Some(&(_, num_requests)) = counts.last() else {
            return Ok(None);
        };
        if num_requests == 0.0 {
            return Ok(Some(Vec::new()));
        }

        let mut values = Vec::with_capacity(percentiles.len());
        for &p in percentiles {
            let target = (p * num_requests).floor().max(1.0);
            // target <= num_requests, so the last bucket always matches.
            let i = counts
                .iter()
                .position(|&(_, count)| count >= target)
                .unwrap_or(counts.len() - 1);
            let (low_le, low_count) = if i == 0 { (0.0, 0.0) } else { counts[i - 1] };
            let (high_le, high_count) = counts[i];
            // Strict: counts are monotone and low_count < target <= high_count.
            let fraction = (target - low_count) / (high_count - low_count);
            values.push((p, low_le + fraction * (high_le - low_le)));
        }
        Ok(Some(values))
    }
}

// ─── Tests ───────────────────────────────────────────────────────
