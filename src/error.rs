use thiserror::Error;

/// Everything that can go wrong while scraping and aggregating.
///
/// Only `Config` is fatal: it is raised before the loop starts and turns
/// into a non-zero exit. Every other variant is logged through the sink and
/// the affected backend, zone, or series is skipped for the current tick.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request failed for URL {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP status != 200 for URL {url}: {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid UTF-8 from backend {backend}")]
    InvalidUtf8 { backend: String },

    #[error(
        "JSON from URL {backend} is not valid. A wrong URL was probably \
         given. A valid URL should probably end with /format/json: {source}"
    )]
    Json {
        backend: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serverZones is not defined for {backend}")]
    MissingServerZones { backend: String },

    #[error("zone {zone} not present in snapshot")]
    ZoneMissing { zone: String },

    #[error("parse error on zone {zone}: {source}")]
    ZoneParse {
        zone: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("bucket size mismatch in zone {zone}")]
    BucketSizeMismatch { zone: String },

    #[error("decreasing counter counts at le {le} for {key}")]
    DecreasingBucketCounts { le: f64, key: String },

    #[error("checkpoint {path} invalid: {reason}")]
    Checkpoint { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
