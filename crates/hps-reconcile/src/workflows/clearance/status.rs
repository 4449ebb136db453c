//! Ordered status pattern table: the first status with a matching pattern wins.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::domain::ClearanceStatus;
use crate::mailbox::InboundMessage;

/// One row of the table as configured: a target status and its patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatternEntry {
    pub status: ClearanceStatus,
    pub patterns: Vec<String>,
}

/// Configuration form of the table, editable without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusPatternTable {
    pub entries: Vec<StatusPatternEntry>,
}

impl StatusPatternTable {
    pub fn standard() -> Self {
        let entry = |status, patterns: &[&str]| StatusPatternEntry {
            status,
            patterns: patterns.iter().map(|pattern| pattern.to_string()).collect(),
        };

        Self {
            entries: vec![
                entry(
                    ClearanceStatus::AwaitingApplicantForm,
                    &[
                        r"nueva\s+solicitud",
                        r"enviad[ao]\s+al\s+(?:interesad[oa]|solicitante)\s+para\s+su\s+cumplimentaci[oó]n",
                        r"pendiente\s+de\s+cumplimentaci[oó]n",
                        r"has\s+been\s+sent\s+to\s+the\s+applicant\s+for\s+completion",
                    ],
                ),
                entry(
                    ClearanceStatus::Approved,
                    &[
                        r"ha\s+sido\s+(?:concedida|aprobada|concedido|aprobado)",
                        r"se\s+(?:ha\s+)?conced(?:e|ido)\s+la\s+habilitaci[oó]n",
                        r"has\s+been\s+(?:approved|granted)",
                    ],
                ),
                entry(
                    ClearanceStatus::Rejected,
                    &[
                        r"ha\s+sido\s+denegad[ao]",
                        r"no\s+cumple\s+(?:con\s+)?los\s+requisitos",
                        r"has\s+been\s+(?:rejected|denied)",
                        r"does\s+not\s+meet\s+(?:the\s+)?requirements",
                    ],
                ),
                entry(
                    ClearanceStatus::Expired,
                    &[
                        r"ha\s+(?:caducado|expirado)",
                        r"has\s+expired",
                    ],
                ),
            ],
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, StatusTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, StatusTableError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusTableError {
    #[error("failed to read status pattern table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid status pattern table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pattern '{pattern}' for status {status}: {source}")]
    Pattern {
        status: ClearanceStatus,
        pattern: String,
        source: regex::Error,
    },
}

/// Compiled, case-insensitive form of a [`StatusPatternTable`].
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    rules: Vec<(ClearanceStatus, Vec<Regex>)>,
}

impl StatusClassifier {
    pub fn new(table: &StatusPatternTable) -> Result<Self, StatusTableError> {
        let mut rules = Vec::with_capacity(table.entries.len());
        for entry in &table.entries {
            let mut compiled = Vec::with_capacity(entry.patterns.len());
            for pattern in &entry.patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| StatusTableError::Pattern {
                        status: entry.status,
                        pattern: pattern.clone(),
                        source,
                    })?;
                compiled.push(regex);
            }
            rules.push((entry.status, compiled));
        }
        Ok(Self { rules })
    }

    pub fn classify(&self, message: &InboundMessage) -> Option<ClearanceStatus> {
        self.classify_text(&message.search_text())
    }

    pub fn classify_text(&self, text: &str) -> Option<ClearanceStatus> {
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|pattern| pattern.is_match(text)))
            .map(|(status, _)| *status)
    }
}
