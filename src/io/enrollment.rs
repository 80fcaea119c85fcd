//! Enrollment store - loads the enrolled passenger list at session start
//!
//! The store is a JSON array of `{name, seat, embedding}` records. A record
//! that fails to parse is skipped and logged; the session continues with the
//! remaining valid records. A missing or unreadable file degrades to the
//! empty set, which makes every detection unauthorized rather than crashing.

use crate::domain::types::{EnrolledPassenger, SeatId};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct EnrollmentRecord {
    name: String,
    seat: String,
    embedding: Vec<f64>,
}

/// Load enrolled passengers from a JSON file.
///
/// Embedding dimensions must agree across records; the first valid record
/// sets the expected length and mismatched records are skipped.
pub fn load_enrollment<P: AsRef<Path>>(path: P, metrics: &Metrics) -> Vec<EnrolledPassenger> {
    let path = path.as_ref();

    let records = match read_records(path) {
        Ok(records) => records,
        Err(e) => {
            error!(path = %path.display(), error = %e, "enrollment_load_failed");
            return Vec::new();
        }
    };

    let mut enrolled: Vec<EnrolledPassenger> = Vec::with_capacity(records.len());
    let mut expected_dim: Option<usize> = None;

    for (idx, value) in records.into_iter().enumerate() {
        let record: EnrollmentRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(index = %idx, error = %e, "enrollment_record_malformed");
                metrics.record_enrollment_skipped();
                continue;
            }
        };

        if record.name.is_empty() || record.seat.is_empty() || record.embedding.is_empty() {
            warn!(index = %idx, name = %record.name, "enrollment_record_incomplete");
            metrics.record_enrollment_skipped();
            continue;
        }

        match expected_dim {
            None => expected_dim = Some(record.embedding.len()),
            Some(dim) if record.embedding.len() != dim => {
                warn!(
                    index = %idx,
                    name = %record.name,
                    got = %record.embedding.len(),
                    expected = %dim,
                    "enrollment_record_dimension_mismatch"
                );
                metrics.record_enrollment_skipped();
                continue;
            }
            Some(_) => {}
        }

        enrolled.push(EnrolledPassenger {
            name: record.name,
            assigned_seat: SeatId::new(&record.seat),
            embedding: record.embedding,
        });
    }

    info!(
        path = %path.display(),
        loaded = %enrolled.len(),
        skipped = %metrics.enrollment_skipped_total(),
        "enrollment_loaded"
    );

    enrolled
}

fn read_records(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read enrollment file {}", path.display()))?;

    // Parse records individually so one malformed entry does not discard
    // the rest of the file
    let records: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse enrollment file {}", path.display()))?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_from_str(content: &str) -> (Vec<EnrolledPassenger>, Metrics) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();

        let metrics = Metrics::new();
        let enrolled = load_enrollment(file.path(), &metrics);
        (enrolled, metrics)
    }

    #[test]
    fn test_load_valid_records() {
        let (enrolled, metrics) = load_from_str(
            r#"[
                {"name": "Alice", "seat": "A1", "embedding": [0.1, 0.2, 0.3]},
                {"name": "Bob", "seat": "B1", "embedding": [0.4, 0.5, 0.6]}
            ]"#,
        );

        assert_eq!(enrolled.len(), 2);
        assert_eq!(enrolled[0].name, "Alice");
        assert_eq!(enrolled[0].assigned_seat, SeatId::new("A1"));
        assert_eq!(enrolled[1].embedding, vec![0.4, 0.5, 0.6]);
        assert_eq!(metrics.enrollment_skipped_total(), 0);
    }

    #[test]
    fn test_malformed_record_skipped_others_kept() {
        let (enrolled, metrics) = load_from_str(
            r#"[
                {"name": "Alice", "seat": "A1", "embedding": [0.1, 0.2]},
                {"name": "Broken", "embedding": "not-a-vector"},
                {"name": "Bob", "seat": "B1", "embedding": [0.3, 0.4]}
            ]"#,
        );

        assert_eq!(enrolled.len(), 2);
        assert_eq!(enrolled[0].name, "Alice");
        assert_eq!(enrolled[1].name, "Bob");
        assert_eq!(metrics.enrollment_skipped_total(), 1);
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let (enrolled, metrics) = load_from_str(
            r#"[
                {"name": "Alice", "seat": "A1", "embedding": [0.1, 0.2, 0.3]},
                {"name": "Short", "seat": "A2", "embedding": [0.1]}
            ]"#,
        );

        assert_eq!(enrolled.len(), 1);
        assert_eq!(metrics.enrollment_skipped_total(), 1);
    }

    #[test]
    fn test_incomplete_record_skipped() {
        let (enrolled, metrics) = load_from_str(
            r#"[
                {"name": "", "seat": "A1", "embedding": [0.1]},
                {"name": "NoEmbedding", "seat": "A2", "embedding": []}
            ]"#,
        );

        assert!(enrolled.is_empty());
        assert_eq!(metrics.enrollment_skipped_total(), 2);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let metrics = Metrics::new();
        let enrolled = load_enrollment("/nonexistent/passengers.json", &metrics);
        assert!(enrolled.is_empty());
    }

    #[test]
    fn test_unparseable_file_degrades_to_empty() {
        let (enrolled, _metrics) = load_from_str("this is not json");
        assert!(enrolled.is_empty());
    }

    #[test]
    fn test_empty_array_is_valid() {
        let (enrolled, metrics) = load_from_str("[]");
        assert!(enrolled.is_empty());
        assert_eq!(metrics.enrollment_skipped_total(), 0);
    }
}
