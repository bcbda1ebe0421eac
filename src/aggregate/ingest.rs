use crate::error::{AggregatorError, Result};
use crate::snapshot::ZoneStats;
use crate::tsdb::{Direction, Labels, SeriesKey, Store, Unit};

// ─── Zone parser ─────────────────────────────────────────────────

/// Materialize one zone's counters as data points at `t_cur`, all in SI
/// base units, and record the touched series in `updated`.
///
/// The bucket edge and counter arrays must have the same length; on a
/// mismatch the zone is rejected before any data point is committed.
pub fn parse_zone(
    store: &mut Store,
    updated: &mut Vec<SeriesKey>,
    t_cur: f64,
    backend: &str,
    zone: &str,
    stats: &ZoneStats,
) -> Result<()> {
    let buckets = &stats.request_buckets;
    if buckets.msecs.len() != buckets.counters.len() {
        return Err(AggregatorError::BucketSizeMismatch {
            zone: zone.to_owned(),
        });
    }

    // Cumulative latency histogram, bucket edges converted to seconds.
    for (msecs, counter) in buckets.msecs.iter().zip(&buckets.counters) {
        let labels = Labels::new("response_duration", backend, zone)
            .with_unit(Unit::Seconds)
            .with_le(msecs / 1000.0);
        create_data_point(store, updated, &labels, t_cur, *counter);
    }

    // Sum of response durations, in seconds.
    create_data_point(
        store,
        updated,
        &Labels::new("response_duration_sum", backend, zone).with_unit(Unit::Seconds),
        t_cur,
        stats.request_msec_counter / 1000.0,
    );

    // Request bytes (data to server).
    create_data_point(
        store,
        updated,
        &Labels::new("bytes", backend, zone)
            .with_direction(Direction::In)
            .with_unit(Unit::Bytes),
        t_cur,
        stats.in_bytes,
    );
    // Response bytes (data to clients).
    create_data_point(
        store,
        updated,
        &Labels::new("bytes", backend, zone)
            .with_direction(Direction::Out)
            .with_unit(Unit::Bytes),
        t_cur,
        stats.out_bytes,
    );

    // Total number of requests in.
    create_data_point(
        store,
        updated,
        &Labels::new("requests_total", backend, zone).with_unit(Unit::Requests),
        t_cur,
        stats.request_counter,
    );

    Ok(())
}

fn create_data_point(
    store: &mut Store,
    updated: &mut Vec<SeriesKey>,
    labels: &Labels,
    t: f64,
    value: f64,
) {
    store.get_or_create(labels).append(t, value);
    updated.push(labels.key());
}

// ─── Tests ───────────────────────────────────────────────────────
