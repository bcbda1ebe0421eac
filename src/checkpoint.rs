use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AggregatorError, Result};
use crate::logsink::LogSink;
use crate::tsdb::series::SerializedSeries;
use crate::tsdb::Store;

// ─── Checkpoint document ─────────────────────────────────────────

/// On-disk shape of the persistent state: every known series plus the
/// previous tick timestamp. Unknown keys anywhere in the document fail
/// validation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointDoc {
    pub timeseries: Vec<SerializedSeries>,
    pub t_prev: f64,
}

// ─── Load / save ─────────────────────────────────────────────────

/// Restore the store from a checkpoint file.
///
/// A missing file is normal on first start. Any read, parse, or validation
/// failure is logged and an empty store is returned; the loop repopulates
/// it within two ticks.
pub fn load(path: &Path, sink: &LogSink) -> Store {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            sink.warning(&format!("Checkpoint {} does not exist", path.display()));
            return Store::new();
        }
        Err(e) => {
            sink.exception(&e, &format!("Unable to read {}", path.display()));
            return Store::new();
        }
    };

    match serde_json::from_str::<CheckpointDoc>(&raw) {
        Ok(doc) => Store::from_serialized(doc.timeseries, doc.t_prev),
        Err(e) => {
            let error = AggregatorError::Checkpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            };
            sink.exception(&error, &format!("Checkpoint {} invalid", path.display()));
            Store::new()
        }
    }
}

/// Write the checkpoint atomically so a crash never leaves invalid data on
/// disk.
pub fn save(path: &Path, store: &Store) -> Result<()> {
    let doc = CheckpointDoc {
        timeseries: store.export(),
        t_prev: store.t_prev(),
    };
    let body = serde_json::to_vec(&doc).map_err(|e| AggregatorError::Checkpoint {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    atomic_write(path, &body)
}

/// Replace `path` through a temp file in the same directory plus a rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::{Labels, Unit};

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        let sink = LogSink::new(None);

        let mut store = Store::new();
        let labels = Labels::new("requests_total", "b", "200").with_unit(Unit::Requests);
        let ts = store.get_or_create(&labels);
        ts.append(60.0, 100.0);
        ts.append(120.0, 200.0);
        let bucket = Labels::new("response_duration", "b", "200")
            .with_unit(Unit::Seconds)
            .with_le(0.01);
        store.get_or_create(&bucket).append(120.0, 50.0);
        store.set_t_prev(120.0);

        save(&path, &store).unwrap();
        let restored = load(&path, &sink);

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.t_prev(), 120.0);
        assert_eq!(restored.histograms().count(), 1);
        assert_eq!(
            restored.series(&labels.key()).unwrap().diff(60.0),
            Some(100.0)
        );
        // The temp file was renamed away.
        assert!(!dir.path().join("checkpoint.tmp").exists());
    }

    #[test]
    fn missing_file_yields_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load(&dir.path().join("nope"), &LogSink::new(None));
        assert!(store.is_empty());
        assert_eq!(store.t_prev(), -1.0);
    }

    #[test]
    fn invalid_documents_yield_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(None);
        let path = dir.path().join("checkpoint");

        for bad in [
            "not json at all",
            // t_prev missing
            r#"{"timeseries": []}"#,
            // unknown top-level key
            r#"{"timeseries": [], "t_prev": 1.0, "extra": true}"#,
            // unknown key_dict attribute
            r#"{"timeseries": [{"key_dict": {"name": "a", "backend": "b",
                "zone": "c", "gauge": 1}, "data": []}], "t_prev": 1.0}"#,
            // non-numeric sample
            r#"{"timeseries": [{"key_dict": {"name": "a", "backend": "b",
                "zone": "c"}, "data": [["x", 1.0]]}], "t_prev": 1.0}"#,
            // le must be a number
            r#"{"timeseries": [{"key_dict": {"name": "a", "backend": "b",
                "zone": "c", "le": "0.1"}, "data": []}], "t_prev": 1.0}"#,
        ] {
            fs::write(&path, bad).unwrap();
            let store = load(&path, &sink);
            assert!(store.is_empty(), "accepted invalid checkpoint: {bad}");
        }
    }

    #[test]
    fn integer_le_and_long_data_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        // le as a JSON integer, three samples: the oldest is dropped.
        fs::write(
            &path,
            r#"{"timeseries": [{"key_dict": {"name": "a", "backend": "b",
                "zone": "c", "le": 1, "unit": "s"},
                "data": [[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]}],
                "t_prev": 3.0}"#,
        )
        .unwrap();

        let store = load(&path, &LogSink::new(None));
        assert_eq!(store.len(), 1);
        let (_, ts) = store.series_map().iter().next().unwrap();
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.latest(), Some((3.0, 3.0)));
        assert_eq!(ts.labels().le, Some(1.0));
    }
}
