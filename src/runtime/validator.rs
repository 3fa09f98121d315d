//! Mandatory-field check run on every row before resolution.

use crate::error::ImportError;
use crate::mapping::MappingSpec;
use crate::record::Row;

/// Destination fields every findings import must be able to fill.
pub const FINDING_MANDATORY_FIELDS: [&str; 2] = ["technical_details", "steps_to_reproduce"];

/// Checks that a row carries the columns mapped to a set of required
/// destination fields.
///
/// The required set names destination fields, not column labels; the labels
/// are looked up in the mapping, so one validator serves spreadsheets
/// with different headings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValidator {
    required_fields: Vec<String>,
}

impl RowValidator {
    pub fn new<I, S>(required_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_fields: required_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Validator for penetration-test findings.
    pub fn findings() -> Self {
        Self::new(FINDING_MANDATORY_FIELDS)
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Fails with [`ImportError::MissingMandatoryField`] listing every
    /// required field that has no mapping or whose mapped label is not a
    /// column of `row`.
    pub fn validate(&self, spec: &MappingSpec, row: &Row) -> Result<(), ImportError> {
        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|field| {
                spec.find_by_destination_field(field)
                    .map_or(true, |mapping| !row.contains_key(&mapping.label))
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ImportError::MissingMandatoryField { missing })
        }
    }
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::findings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, ProcessKind};

    fn spec() -> MappingSpec {
        MappingSpec::from_mappings(vec![
            FieldMapping::new("Details", "technical_details", ProcessKind::Copy),
            FieldMapping::new("How to reproduce", "steps_to_reproduce", ProcessKind::Copy),
        ])
        .unwrap()
    }

    fn row(labels: &[&str]) -> Row {
        labels
            .iter()
            .map(|l| (l.to_string(), "x".to_string()))
            .collect()
    }

    #[test]
    fn test_valid_row() {
        let validator = RowValidator::findings();
        assert!(validator
            .validate(&spec(), &row(&["Details", "How to reproduce", "Extra"]))
            .is_ok());
    }

    #[test]
    fn test_empty_cell_still_counts_as_present() {
        let mut r = row(&["Details", "How to reproduce"]);
        r.insert("Details".to_string(), String::new());
        assert!(RowValidator::findings().validate(&spec(), &r).is_ok());
    }

    #[test]
    fn test_missing_column() {
        let err = RowValidator::findings()
            .validate(&spec(), &row(&["Details"]))
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::MissingMandatoryField { ref missing } if missing == &["steps_to_reproduce"]
        ));
    }

    #[test]
    fn test_missing_mapping() {
        let spec = MappingSpec::from_mappings(vec![FieldMapping::new(
            "Details",
            "technical_details",
            ProcessKind::Copy,
        )])
        .unwrap();

        let err = RowValidator::findings()
            .validate(&spec, &row(&["Details", "How to reproduce"]))
            .unwrap_err();
        assert!(err.to_string().contains("steps_to_reproduce"));
    }

    #[test]
    fn test_custom_required_fields() {
        let validator = RowValidator::new(["steps_to_reproduce"]);
        assert!(validator.validate(&spec(), &row(&["How to reproduce"])).is_ok());
        assert!(RowValidator::new(Vec::<String>::new())
            .validate(&spec(), &Row::new())
            .is_ok());
    }
}
