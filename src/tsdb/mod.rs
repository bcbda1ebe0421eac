pub mod histogram;
pub mod series;
pub mod store;

pub use histogram::Histogram;
pub use series::TimeSeries;
pub use store::Store;

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Shared constants ────────────────────────────────────────────

/// Counter values are kept below 2^52 so they survive a JSON boundary
/// (JavaScript number precision).
pub const OVERFLOW_LIMIT: f64 = (1u64 << 52) as f64;

/// Separator between `attr=value` pairs in a canonical series key.
const KEY_SEPARATOR: char = '\u{1f}';

// ─── Label model ─────────────────────────────────────────────────

/// Traffic direction of a byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Measurement unit of a counter (SI base units on ingest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "bytes")]
    Bytes,
    #[serde(rename = "requests")]
    Requests,
    #[serde(rename = "s")]
    Seconds,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Requests => "requests",
            Self::Seconds => "s",
        }
    }
}

/// The label set identifying one time series.
///
/// `name`, `backend` and `zone` are present on every series; `le` marks a
/// histogram bucket and carries the bucket's upper bound in seconds.
/// Serialized as the flat `key_dict` of the checkpoint format, with the
/// optional attributes omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Labels {
    pub name: String,
    pub backend: String,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,
}

impl Labels {
    pub fn new(name: &str, backend: &str, zone: &str) -> Self {
        Self {
            name: name.to_owned(),
            backend: backend.to_owned(),
            zone: zone.to_owned(),
            direction: None,
            unit: None,
            le: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_le(mut self, le: f64) -> Self {
        self.le = Some(le);
        self
    }

    /// Canonical identity: `attr=value` pairs sorted by attribute name.
    pub fn key(&self) -> SeriesKey {
        let mut pairs: Vec<(&str, String)> = vec![
            ("backend", self.backend.clone()),
            ("name", self.name.clone()),
            ("zone", self.zone.clone()),
        ];
        if let Some(direction) = self.direction {
            pairs.push(("direction", direction.as_str().to_owned()));
        }
        if let Some(unit) = self.unit {
            pairs.push(("unit", unit.as_str().to_owned()));
        }
        if let Some(le) = self.le {
            // Shortest-roundtrip float formatting keeps this deterministic.
            pairs.push(("le", format!("{}", le)));
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let encoded = pairs
            .iter()
            .map(|(attr, value)| format!("{}={}", attr, value))
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string());
        SeriesKey(encoded)
    }

    /// The same labels with `le` removed: identity of the histogram this
    /// bucket series belongs to.
    pub fn histogram_labels(&self) -> Labels {
        let mut reduced = self.clone();
        reduced.le = None;
        reduced
    }
}

// ─── Canonical keys ──────────────────────────────────────────────

/// Canonical, ordered form of a label set. The primary index of the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for pair in self.0.split(KEY_SEPARATOR) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", pair)?;
            first = false;
        }
        Ok(())
    }
}

/// Histogram bucket upper bound, ordered by `f64::total_cmp` so it can key
/// a `BTreeMap`. Bounds come from the wire as non-negative millisecond
/// integers divided by 1000, so total ordering equals numeric ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketBound(pub f64);

impl Eq for BucketBound {}

impl PartialOrd for BucketBound {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BucketBound {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────
