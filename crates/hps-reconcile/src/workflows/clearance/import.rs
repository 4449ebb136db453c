//! CSV import and write-back for clearance records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use super::domain::{ClearanceRecord, ClearanceStatus, RecordId};

#[derive(Debug)]
pub enum RecordImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidStatus { row: usize, value: String },
    InvalidDate { row: usize, value: String },
}

impl std::fmt::Display for RecordImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordImportError::Io(err) => write!(f, "failed to read clearance records: {}", err),
            RecordImportError::Csv(err) => write!(f, "invalid clearance record CSV: {}", err),
            RecordImportError::InvalidStatus { row, value } => {
                write!(f, "row {}: unknown clearance status '{}'", row, value)
            }
            RecordImportError::InvalidDate { row, value } => {
                write!(f, "row {}: '{}' is not a DD/MM/YYYY or YYYY-MM-DD date", row, value)
            }
        }
    }
}

impl std::error::Error for RecordImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordImportError::Io(err) => Some(err),
            RecordImportError::Csv(err) => Some(err),
            RecordImportError::InvalidStatus { .. } | RecordImportError::InvalidDate { .. } => None,
        }
    }
}

impl From<std::io::Error> for RecordImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RecordImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub fn import_records_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ClearanceRecord>, RecordImportError> {
    let file = File::open(path)?;
    parse_records(file)
}

pub fn parse_records<R: Read>(reader: R) -> Result<Vec<ClearanceRecord>, RecordImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, row) in csv_reader.deserialize::<RecordRow>().enumerate() {
        let row = row?;
        // Header is line 1.
        records.push(row.into_record(index + 2)?);
    }

    Ok(records)
}

/// Rewrites the CSV at `path` with `records`, in the columns the importer reads.
///
/// The file is replaced through a sibling temporary file so a failed write
/// leaves the previous contents in place.
pub fn export_records_to_path<'a, P, I>(path: P, records: I) -> Result<(), RecordImportError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a ClearanceRecord>,
{
    let path = path.as_ref();
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = Path::new(&staging);

    let file = File::create(staging)?;
    write_records(file, records)?;
    fs::rename(staging, path)?;
    Ok(())
}

pub fn write_records<'a, W, I>(writer: W, records: I) -> Result<(), RecordImportError>
where
    W: Write,
    I: IntoIterator<Item = &'a ClearanceRecord>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(RecordRow::from_record(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
struct RecordRow {
    id: String,
    first_name: String,
    last_name: String,
    document_number: String,
    status: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    expires_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    approved_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    grade: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    case_reference: Option<String>,
    #[serde(default)]
    notes: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    updated_at: Option<String>,
}

impl RecordRow {
    fn from_record(record: &ClearanceRecord) -> Self {
        let date = |value: Option<NaiveDate>| value.map(|date| date.format("%Y-%m-%d").to_string());
        Self {
            id: record.id.0.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            document_number: record.document_number.clone(),
            status: record.status.label().to_string(),
            expires_at: date(record.expires_at),
            approved_at: date(record.approved_at),
            grade: record.grade.clone(),
            case_reference: record.case_reference.clone(),
            notes: record.notes.clone(),
            updated_at: Some(record.updated_at.to_rfc3339()),
        }
    }

    fn into_record(self, row: usize) -> Result<ClearanceRecord, RecordImportError> {
        let status = ClearanceStatus::from_label(&self.status).ok_or_else(|| {
            RecordImportError::InvalidStatus {
                row,
                value: self.status.clone(),
            }
        })?;
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(ClearanceRecord {
            id: RecordId(self.id),
            first_name: self.first_name,
            last_name: self.last_name,
            document_number: self.document_number.to_ascii_uppercase(),
            status,
            expires_at: optional_date(row, self.expires_at)?,
            approved_at: optional_date(row, self.approved_at)?,
            grade: self.grade,
            case_reference: self.case_reference,
            notes: self.notes,
            updated_at,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn optional_date(row: usize, value: Option<String>) -> Result<Option<NaiveDate>, RecordImportError> {
    let Some(value) = value else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(&value, "%Y-%m-%d"))
        .map(Some)
        .map_err(|_| RecordImportError::InvalidDate { row, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_with_optional_columns() {
        let csv = "\
id,first_name,last_name,document_number,status,expires_at,approved_at,grade,case_reference,notes,updated_at
hps-1,Juan,Pérez,12345678a,awaiting-decision,,,,,,
hps-2,Ana,Ruiz,X1234567L,approved,31/12/2026,2024-01-02,R,E-24-000001,renovada,2024-01-02T09:00:00Z
";
        let records = parse_records(csv.as_bytes()).expect("valid csv");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ClearanceStatus::AwaitingDecision);
        assert_eq!(records[0].document_number, "12345678A");
        assert_eq!(records[0].expires_at, None);
        assert_eq!(records[1].expires_at, NaiveDate::from_ymd_opt(2026, 12, 31));
        assert_eq!(records[1].approved_at, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(records[1].grade.as_deref(), Some("R"));
        assert_eq!(records[1].updated_at.to_rfc3339(), "2024-01-02T09:00:00+00:00");
    }

    #[test]
    fn written_records_read_back_unchanged() {
        let csv = "\
id,first_name,last_name,document_number,status,expires_at,approved_at,grade,case_reference,notes,updated_at
hps-1,Juan,Pérez,12345678A,awaiting_decision,,,,,,2024-03-01T08:00:00Z
hps-2,Ana,Ruiz,X1234567L,approved,31/12/2026,2024-01-02,\"R,NS\",E-24-000001,\"renovada, sin cambios\",2024-01-02T09:00:00Z
";
        let records = parse_records(csv.as_bytes()).expect("valid csv");

        let mut written = Vec::new();
        write_records(&mut written, &records).expect("writes");
        let text = String::from_utf8(written.clone()).expect("utf-8");
        assert!(text.starts_with("id,first_name,last_name,document_number,status,"));
        assert!(text.contains("2026-12-31"));

        assert_eq!(parse_records(written.as_slice()).expect("reads back"), records);
    }

    #[test]
    fn unknown_status_reports_row() {
        let csv = "\
id,first_name,last_name,document_number,status
hps-1,Juan,Pérez,12345678A,pending
";
        match parse_records(csv.as_bytes()) {
            Err(RecordImportError::InvalidStatus { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "pending");
            }
            other => panic!("expected invalid status, got {other:?}"),
        }
    }
}
