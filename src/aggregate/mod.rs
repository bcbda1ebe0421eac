pub mod ingest;
pub mod project;
pub mod zones;

// ─── Zone name tables ────────────────────────────────────────────

/// Cache states folded into the synthetic `cache_other` zone.
pub const CACHE_OTHER_ZONES: [&str; 5] =
    ["EXPIRED", "REVALIDATED", "SCARCE", "STALE", "UPDATING"];

/// All cache outcome zones, as named in nginx src/http/ngx_http_cache.h.
pub const CACHE_ZONES: [&str; 9] = [
    "BYPASS",
    "HIT",
    "MISS",
    "NO_CACHE",
    "EXPIRED",
    "REVALIDATED",
    "SCARCE",
    "STALE",
    "UPDATING",
];

// Note: 'PURGE' is not part of the HTTP standard, but it is used by some
// caching systems like pagespeed.
pub const HTTP_REQUEST_METHODS: [&str; 10] = [
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PURGE",
    "TRACE", "PUT",
];

/// Zone name as it appears in the output document.
pub fn output_zone_name(zone: &str) -> &str {
    match zone {
        "BYPASS" => "cache_none",
        "MISS" => "cache_miss",
        "HIT" => "cache_hit",
        "NO_CACHE" => "cache_no_cache",
        other => other,
    }
}
