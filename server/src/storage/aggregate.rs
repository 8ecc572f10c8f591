//! Pre-merge of incoming batches
//!
//! A batch may name the same metric many times. Merging first means each
//! backend touches every metric once per batch.

use metrics_core::{MetricKind, MetricRecord};
use std::collections::HashMap;
use tracing::debug;

/// Collapse a batch to one record per `(id, kind)`
///
/// Counter deltas are summed, a gauge keeps its last occurrence. Records
/// with an empty id or without the payload of their kind are dropped. The
/// result keeps the order in which each metric first appeared.
pub fn merge_batch(batch: &[MetricRecord]) -> Vec<MetricRecord> {
    let mut merged: Vec<MetricRecord> = Vec::with_capacity(batch.len());
    let mut positions: HashMap<(&str, MetricKind), usize> = HashMap::with_capacity(batch.len());

    for record in batch {
        if let Err(e) = record.validate() {
            debug!("Skipping batch record: {}", e);
            continue;
        }

        match positions.get(&(record.id.as_str(), record.kind)) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                match record.kind {
                    MetricKind::Gauge => existing.value = record.value,
                    MetricKind::Counter => {
                        let sum = existing
                            .delta
                            .unwrap_or(0)
                            .wrapping_add(record.delta.unwrap_or(0));
                        existing.delta = Some(sum);
                    }
                }
            }
            None => {
                positions.insert((record.id.as_str(), record.kind), merged.len());
                merged.push(MetricRecord {
                    hash: None,
                    ..record.clone()
                });
            }
        }
    }

    merged
}
