use crate::error::{EvalError, EvalResult};
use kinodata_abstraction::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PREDICTION: &str = "prediction";
pub const TARGET: &str = "target";
pub const IDENTIFIER: &str = "identifier";

/// A mapping from field name to a per-batch field value, as seen by the merger.
pub trait FieldSource {
    /// Field names in their natural order.
    fn field_names(&self) -> Vec<&str>;

    fn field(&self, name: &str) -> Option<&FieldValue>;
}

impl FieldSource for BTreeMap<String, FieldValue> {
    fn field_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }

    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.get(name)
    }
}

/// Output of one evaluation step.
///
/// All three fields hold one entry per sample of the batch, index-aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub prediction: FieldValue,
    pub target: FieldValue,
    pub identifier: FieldValue,
}

impl BatchRecord {
    /// Build a record, rejecting fields of differing lengths.
    pub fn new(prediction: Vec<f64>, target: Vec<f64>, identifier: FieldValue) -> EvalResult<Self> {
        if prediction.len() != target.len() {
            return Err(EvalError::MisalignedRecord(format!(
                "{} predictions but {} targets",
                prediction.len(),
                target.len()
            )));
        }
        if let Some(len) = identifier.len() {
            if len != prediction.len() {
                return Err(EvalError::MisalignedRecord(format!(
                    "{} predictions but {len} identifiers",
                    prediction.len()
                )));
            }
        }
        Ok(Self {
            prediction: FieldValue::Numeric(prediction),
            target: FieldValue::Numeric(target),
            identifier,
        })
    }

    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prediction.len().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FieldSource for BatchRecord {
    fn field_names(&self) -> Vec<&str> {
        vec![PREDICTION, TARGET, IDENTIFIER]
    }

    fn field(&self, name: &str) -> Option<&FieldValue> {
        match name {
            PREDICTION => Some(&self.prediction),
            TARGET => Some(&self.target),
            IDENTIFIER => Some(&self.identifier),
            _ => None,
        }
    }
}
