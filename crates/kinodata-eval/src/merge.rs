//! Concatenation of per-batch records into epoch-level columns.

use crate::error::{EvalError, EvalResult};
use crate::record::FieldSource;
use kinodata_abstraction::FieldValue;
use std::borrow::Cow;

/// Concatenated numeric columns, in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedFields {
    columns: Vec<(String, Vec<f64>)>,
}

impl MergedFields {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<(String, Vec<f64>)> {
        self.columns
    }

    /// Removes a column and returns its values.
    pub fn take(&mut self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|(column, _)| column == name)?;
        Some(self.columns.remove(idx).1)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Merges records field by field, preserving record order and then the order
/// inside each record.
///
/// `subset` defaults to every field of the first record. Label fields are
/// converted element-wise to integers before concatenation. Lengths of
/// different fields are not compared against each other.
pub fn merge_records<R: FieldSource>(
    records: &[R],
    subset: Option<&[&str]>,
) -> EvalResult<MergedFields> {
    let Some(first) = records.first() else {
        return match subset {
            Some(fields) if !fields.is_empty() => Err(EvalError::SchemaMismatch(format!(
                "requested fields {fields:?} but there are no records"
            ))),
            _ => Ok(MergedFields::default()),
        };
    };

    let available = first.field_names();
    let fields: Vec<&str> = match subset {
        Some(fields) => {
            let missing: Vec<&str> =
                fields.iter().copied().filter(|f| !available.contains(f)).collect();
            if !missing.is_empty() {
                return Err(EvalError::SchemaMismatch(format!(
                    "fields {missing:?} are not present in the first record \
                     (available: {available:?})"
                )));
            }
            if let Some(dup) = fields.iter().enumerate().find_map(|(i, f)| {
                fields[..i].contains(f).then_some(*f)
            }) {
                return Err(EvalError::SchemaMismatch(format!(
                    "field '{dup}' requested more than once"
                )));
            }
            fields.to_vec()
        }
        None => available,
    };

    let mut columns = Vec::with_capacity(fields.len());
    for field in fields {
        let mut merged = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let value = record.field(field).ok_or_else(|| {
                EvalError::SchemaMismatch(format!("record {idx} has no field '{field}'"))
            })?;
            merged.extend_from_slice(&normalize(idx, field, value)?);
        }
        columns.push((field.to_string(), merged));
    }

    Ok(MergedFields { columns })
}

pub(crate) fn normalize<'a>(
    record: usize,
    field: &str,
    value: &'a FieldValue,
) -> EvalResult<Cow<'a, [f64]>> {
    let unsupported = || EvalError::UnsupportedFieldType { record, field: field.to_string() };
    match value {
        FieldValue::Numeric(values) => Ok(Cow::Borrowed(values)),
        FieldValue::Labels(labels) => labels
            .iter()
            .map(|label| {
                label
                    .trim()
                    .parse::<i64>()
                    .map(|v| v as f64)
                    .map_err(|_| unsupported())
            })
            .collect::<EvalResult<Vec<_>>>()
            .map(Cow::Owned),
        FieldValue::Unsupported(_) => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BatchRecord, IDENTIFIER, PREDICTION, TARGET};
    use std::collections::BTreeMap;

    fn map(field: &str, value: FieldValue) -> BTreeMap<String, FieldValue> {
        BTreeMap::from([(field.to_string(), value)])
    }

    #[test]
    fn test_mixed_numeric_and_label_records_merge_uniformly() {
        let records = vec![
            map("id", FieldValue::Numeric(vec![1.0, 2.0])),
            map("id", FieldValue::from(vec!["3", "4"])),
        ];
        let merged = merge_records(&records, None).unwrap();
        assert_eq!(merged.get("id").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_default_subset_uses_first_record_fields() {
        let records = vec![
            BatchRecord::new(vec![0.1, 0.2], vec![1.0, 2.0], FieldValue::Numeric(vec![5.0, 6.0]))
                .unwrap(),
            BatchRecord::new(vec![0.3], vec![3.0], FieldValue::from(vec!["7"])).unwrap(),
        ];
        let merged = merge_records(&records, None).unwrap();
        assert_eq!(merged.names().collect::<Vec<_>>(), vec![PREDICTION, TARGET, IDENTIFIER]);
        assert_eq!(merged.get(PREDICTION).unwrap(), &[0.1, 0.2, 0.3]);
        assert_eq!(merged.get(TARGET).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(merged.get(IDENTIFIER).unwrap(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_subset_keeps_requested_order() {
        let records =
            vec![BatchRecord::new(vec![0.5], vec![1.5], FieldValue::Numeric(vec![9.0])).unwrap()];
        let merged = merge_records(&records, Some(&[IDENTIFIER, PREDICTION][..])).unwrap();
        assert_eq!(merged.names().collect::<Vec<_>>(), vec![IDENTIFIER, PREDICTION]);
        assert!(merged.get(TARGET).is_none());
    }

    #[test]
    fn test_subset_outside_schema_is_rejected() {
        let records = vec![map("id", FieldValue::Numeric(vec![1.0]))];
        let err = merge_records(&records, Some(&["id", "pred"][..])).unwrap_err();
        assert!(matches!(err, EvalError::SchemaMismatch(msg) if msg.contains("pred")));
    }

    #[test]
    fn test_repeated_subset_field_is_rejected() {
        let records =
            vec![BatchRecord::new(vec![0.5], vec![1.5], FieldValue::Numeric(vec![9.0])).unwrap()];
        let err = merge_records(&records, Some(&[PREDICTION, TARGET, PREDICTION][..])).unwrap_err();
        assert!(matches!(err, EvalError::SchemaMismatch(msg) if msg.contains("'prediction'")));
    }

    #[test]
    fn test_field_missing_from_later_record_is_rejected() {
        let records = vec![
            map("id", FieldValue::Numeric(vec![1.0])),
            map("other", FieldValue::Numeric(vec![2.0])),
        ];
        let err = merge_records(&records, None).unwrap_err();
        assert!(matches!(err, EvalError::SchemaMismatch(msg) if msg.contains("record 1")));
    }

    #[test]
    fn test_unsupported_representation_names_record_and_field() {
        let records = vec![
            map("id", FieldValue::Numeric(vec![1.0])),
            map("id", FieldValue::Unsupported(serde_json::json!({"nested": true}))),
        ];
        let err = merge_records(&records, None).unwrap_err();
        match err {
            EvalError::UnsupportedFieldType { record, field } => {
                assert_eq!(record, 1);
                assert_eq!(field, "id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_integer_label_is_unsupported() {
        let records = vec![map("id", FieldValue::from(vec!["12", "CHEMBL1"]))];
        let err = merge_records(&records, None).unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedFieldType { record: 0, .. }));
    }

    #[test]
    fn test_empty_input() {
        let records: Vec<BatchRecord> = Vec::new();
        assert!(merge_records(&records, None).unwrap().is_empty());
        assert!(matches!(
            merge_records(&records, Some(&[PREDICTION][..])),
            Err(EvalError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_take_removes_column() {
        let records = vec![map("id", FieldValue::Numeric(vec![1.0, 2.0]))];
        let mut merged = merge_records(&records, None).unwrap();
        assert_eq!(merged.take("id"), Some(vec![1.0, 2.0]));
        assert!(merged.is_empty());
        assert_eq!(merged.take("id"), None);
    }
}
