//! Transfer form: reassigning an existing clearance between sponsoring organisations.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::domain::ClearanceRecord;
use crate::pdf::{fill_fields, FilledForm, PdfError};

/// Values written into the authority's transfer template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferFormValues {
    pub first_name: String,
    pub last_name: String,
    pub document_number: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub case_reference: Option<String>,
    #[serde(default)]
    pub expires_on: Option<String>,
    pub from_organization: String,
    pub to_organization: String,
}

impl TransferFormValues {
    pub fn from_record(
        record: &ClearanceRecord,
        from_organization: impl Into<String>,
        to_organization: impl Into<String>,
    ) -> Self {
        Self {
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            document_number: record.document_number.clone(),
            grade: record.grade.clone(),
            case_reference: record.case_reference.clone(),
            expires_on: record
                .expires_at
                .map(|date| date.format("%d/%m/%Y").to_string()),
            from_organization: from_organization.into(),
            to_organization: to_organization.into(),
        }
    }

    /// Label map in the vocabulary the authority templates use for field names.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("nombre".to_string(), self.first_name.clone());
        labels.insert("apellidos".to_string(), self.last_name.clone());
        labels.insert("dni".to_string(), self.document_number.clone());
        labels.insert("empresa_origen".to_string(), self.from_organization.clone());
        labels.insert("empresa_destino".to_string(), self.to_organization.clone());
        for (label, value) in [
            ("grado", &self.grade),
            ("expediente", &self.case_reference),
            ("fecha_caducidad", &self.expires_on),
        ] {
            if let Some(value) = value {
                labels.insert(label.to_string(), value.clone());
            }
        }
        labels
    }

    pub fn fill(&self, template: &[u8]) -> Result<FilledForm, PdfError> {
        fill_fields(template, &self.labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::clearance::domain::{ClearanceStatus, RecordId};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn labels_skip_missing_optional_values() {
        let record = ClearanceRecord {
            id: RecordId("hps-7".to_string()),
            first_name: "Ana".to_string(),
            last_name: "Ruiz".to_string(),
            document_number: "12345678A".to_string(),
            status: ClearanceStatus::Approved,
            expires_at: NaiveDate::from_ymd_opt(2027, 5, 31),
            approved_at: None,
            grade: Some("R,NS".to_string()),
            case_reference: None,
            notes: String::new(),
            updated_at: Utc::now(),
        };

        let labels = TransferFormValues::from_record(&record, "Acme Defensa", "Boreal Sistemas")
            .labels();
        assert_eq!(labels.get("fecha_caducidad").map(String::as_str), Some("31/05/2027"));
        assert_eq!(labels.get("grado").map(String::as_str), Some("R,NS"));
        assert_eq!(labels.get("empresa_destino").map(String::as_str), Some("Boreal Sistemas"));
        assert!(!labels.contains_key("expediente"));
    }
}
