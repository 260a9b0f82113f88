//! JSONL persistence of recorded batch outputs and replay through an aggregator.

use crate::aggregator::{EpochMetrics, EvaluationAggregator, PassKind};
use crate::error::{EvalError, EvalResult};
use crate::merge::normalize;
use crate::record::{BatchRecord, PREDICTION, TARGET};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> EvalResult<()> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Reads one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> EvalResult<Vec<T>> {
    let contents = std::fs::read_to_string(path)?;
    let mut items = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item = serde_json::from_str(line).map_err(|e| {
            EvalError::SchemaMismatch(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        items.push(item);
    }

    Ok(items)
}

/// Runs one full pass over recorded batches: `begin_pass`, one `record_step`
/// per record, `end_pass`.
///
/// Records are converted before the pass begins. A failing step aborts the
/// pass, so the aggregator is idle again whenever this returns.
pub fn replay_pass(
    aggregator: &mut EvaluationAggregator,
    kind: PassKind,
    records: &[BatchRecord],
) -> EvalResult<EpochMetrics> {
    let steps = records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let prediction = normalize(idx, PREDICTION, &record.prediction)?.into_owned();
            let target = normalize(idx, TARGET, &record.target)?.into_owned();
            Ok((prediction, target, record.identifier.clone()))
        })
        .collect::<EvalResult<Vec<_>>>()?;

    aggregator.begin_pass(kind);
    for (idx, (prediction, target, identifier)) in steps.into_iter().enumerate() {
        if let Err(err) = aggregator.record_step(prediction, target, identifier) {
            tracing::warn!(pass = %kind, record = idx, error = %err, "replay step failed");
            aggregator.abort_pass();
            return Err(err);
        }
    }
    aggregator.end_pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorState;
    use crate::config::EvalConfig;
    use crate::sink::MemorySink;
    use kinodata_abstraction::FieldValue;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn records() -> Vec<BatchRecord> {
        vec![
            BatchRecord::new(vec![1.0, 2.0], vec![1.5, 2.5], FieldValue::from(vec!["10", "11"]))
                .unwrap(),
            BatchRecord::new(vec![3.0], vec![2.0], FieldValue::Numeric(vec![12.0])).unwrap(),
        ]
    }

    #[test]
    fn test_jsonl_write_then_read_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");
        write_jsonl(&path, &records()).unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("\n   \n");
        std::fs::write(&path, contents).unwrap();

        let loaded: Vec<BatchRecord> = read_jsonl(&path).unwrap();
        assert_eq!(loaded, records());
    }

    #[test]
    fn test_read_jsonl_reports_line_number() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.jsonl");
        std::fs::write(&path, "{\"a\": [1]}\nnot json\n").unwrap();

        let err = read_jsonl::<BTreeMap<String, FieldValue>>(&path).unwrap_err();
        assert!(matches!(err, EvalError::SchemaMismatch(msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_replay_pass_runs_full_lifecycle() {
        let sink = Arc::new(MemorySink::new());
        let mut agg =
            EvaluationAggregator::new(sink.clone(), sink.clone(), EvalConfig::default()).unwrap();

        let metrics = replay_pass(&mut agg, PassKind::Test, &records()).unwrap();
        assert_eq!(metrics.num_samples, 3);
        assert!((metrics.mae - 2.0 / 3.0).abs() < 1e-12);

        let tables = sink.tables();
        assert_eq!(tables[0].1.rows(), &[vec![1.0, 10.0], vec![2.0, 11.0], vec![3.0, 12.0]]);
    }

    #[test]
    fn test_replay_rejects_non_numeric_predictions() {
        let sink = Arc::new(MemorySink::new());
        let mut agg =
            EvaluationAggregator::new(sink.clone(), sink.clone(), EvalConfig::default()).unwrap();
        let record = BatchRecord {
            prediction: FieldValue::from(vec!["high"]),
            target: FieldValue::Numeric(vec![1.0]),
            identifier: FieldValue::Numeric(vec![1.0]),
        };

        sink.clear();
        let good = records().remove(1);

        let err = replay_pass(&mut agg, PassKind::Validation, &[good, record]).unwrap_err();
        assert!(matches!(
            err,
            EvalError::UnsupportedFieldType { record: 1, ref field } if field == PREDICTION
        ));
        assert!(sink.events().is_empty());
        assert_eq!(agg.state(), AggregatorState::Idle);
    }

    #[test]
    fn test_replay_failure_leaves_aggregator_idle() {
        let sink = Arc::new(MemorySink::new());
        let mut agg =
            EvaluationAggregator::new(sink.clone(), sink.clone(), EvalConfig::default()).unwrap();
        let mut batches = records();
        batches.push(BatchRecord {
            prediction: FieldValue::Numeric(vec![1.0, 2.0]),
            target: FieldValue::Numeric(vec![1.0]),
            identifier: FieldValue::Numeric(vec![13.0]),
        });

        let err = replay_pass(&mut agg, PassKind::Test, &batches).unwrap_err();
        assert!(matches!(err, EvalError::MisalignedRecord(_)));
        assert_eq!(agg.state(), AggregatorState::Idle);
        assert_eq!(agg.buffered_batches(), 0);
        assert!(sink.tables().is_empty());

        let metrics = replay_pass(&mut agg, PassKind::Test, &records()).unwrap();
        assert_eq!(metrics.num_samples, 3);
        assert_eq!(sink.tables().len(), 1);
    }
}
