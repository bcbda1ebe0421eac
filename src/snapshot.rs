use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AggregatorError, Result};

/// Callback wrapper emitted when the vts endpoint is queried in JSONP mode.
const JSONP_PREFIX: &str = "ngx_http_vhost_traffic_status_jsonp_callback(";

// ─── Snapshot model ──────────────────────────────────────────────

/// One decoded vts document. Only the fields the aggregator consumes are
/// modeled; zones stay as raw JSON so that one malformed zone cannot take
/// down the rest of the backend.
#[derive(Debug, Deserialize)]
pub struct VtsSnapshot {
    /// Server-side timestamp, used as the tick timestamp in test mode.
    #[serde(rename = "nowMsec")]
    pub now_msec: Option<f64>,
    #[serde(rename = "serverZones")]
    pub server_zones: Option<Map<String, Value>>,
}

/// Per-zone cumulative counters. All values are monotonically increasing
/// except across overflows and nginx restarts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStats {
    pub request_counter: f64,
    /// Cumulative request processing time in milliseconds.
    pub request_msec_counter: f64,
    pub in_bytes: f64,
    pub out_bytes: f64,
    pub request_buckets: RequestBuckets,
}

/// Cumulative latency distribution: bucket upper edges in milliseconds and
/// the cumulative request count at or below each edge.
#[derive(Debug, Deserialize)]
pub struct RequestBuckets {
    pub msecs: Vec<f64>,
    pub counters: Vec<f64>,
}

impl VtsSnapshot {
    /// Zone names in document order, or `None` when `serverZones` is
    /// missing entirely.
    pub fn zone_names(&self) -> Option<Vec<String>> {
        self.server_zones
            .as_ref()
            .map(|zones| zones.keys().cloned().collect())
    }

    /// Extract and decode one zone's counters.
    pub fn zone(&self, zone: &str) -> Result<ZoneStats> {
        let value = self
            .server_zones
            .as_ref()
            .and_then(|zones| zones.get(zone))
            .ok_or_else(|| AggregatorError::ZoneMissing {
                zone: zone.to_owned(),
            })?;
        serde_json::from_value(value.clone()).map_err(|source| AggregatorError::ZoneParse {
            zone: zone.to_owned(),
            source,
        })
    }
}

// ─── Decoding ────────────────────────────────────────────────────

/// Remove the JSONP wrapper, if both halves are present.
pub fn strip_jsonp(data: &str) -> &str {
    if data.starts_with(JSONP_PREFIX) && data.ends_with(')') {
        &data[JSONP_PREFIX.len()..data.len() - 1]
    } else {
        data
    }
}

/// Decode one backend payload into a snapshot.
pub fn decode(backend: &str, raw: &[u8]) -> Result<VtsSnapshot> {
    let text = std::str::from_utf8(raw).map_err(|_| AggregatorError::InvalidUtf8 {
        backend: backend.to_owned(),
    })?;
    let text = strip_jsonp(text);
    serde_json::from_str(text).map_err(|source| AggregatorError::Json {
        backend: backend.to_owned(),
        source,
    })
}

// ─── Tests ───────────────────────────────────────────────────────
