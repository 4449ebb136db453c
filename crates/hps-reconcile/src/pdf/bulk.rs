//! Authority list PDFs: filename recognition, list kind and row parsing.

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::warn;

use crate::workflows::clearance::ClearanceStatus;

/// Whether an attachment name follows the authority's case-number scheme or
/// names a grants/rejections list.
pub fn is_authority_pdf(filename: &str) -> bool {
    static CASE_NUMBER: OnceLock<Regex> = OnceLock::new();
    static KEYWORDS: OnceLock<Regex> = OnceLock::new();

    let name = filename.trim();
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        return false;
    }
    let case_number = CASE_NUMBER
        .get_or_init(|| Regex::new(r"(?i)^E-\d{2}-\d{6}").expect("static case number pattern"));
    let keywords = KEYWORDS.get_or_init(|| {
        Regex::new(r"(?i)list|grant|concesi[oó]n|rejection|denegaci[oó]n")
            .expect("static list keyword pattern")
    });
    case_number.is_match(name) || keywords.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityListKind {
    Grants,
    Rejections,
}

impl AuthorityListKind {
    /// Decides from the heading when it names exactly one kind, otherwise from
    /// the whole text. Text carrying both vocabularies without a deciding
    /// heading is not classified.
    pub fn classify(text: &str) -> Option<Self> {
        let heading = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(HEADING_LINES)
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(kind) = Self::exclusive_match(&heading) {
            return Some(kind);
        }

        let kind = Self::exclusive_match(text);
        if kind.is_none() && Self::matches_both(text) {
            warn!("authority list mentions both grants and rejections; skipping");
        }
        kind
    }

    fn vocabularies() -> (&'static Regex, &'static Regex) {
        static GRANTS: OnceLock<Regex> = OnceLock::new();
        static REJECTIONS: OnceLock<Regex> = OnceLock::new();

        let grants = GRANTS.get_or_init(|| {
            Regex::new(r"(?i)\b(?:concesi[oó]n|concesiones|concedidas?|grants?|granted)\b")
                .expect("static grant pattern")
        });
        let rejections = REJECTIONS.get_or_init(|| {
            Regex::new(r"(?i)\b(?:denegaci[oó]n|denegaciones|denegadas?|rejections?|rejected)\b")
                .expect("static rejection pattern")
        });
        (grants, rejections)
    }

    fn exclusive_match(text: &str) -> Option<Self> {
        let (grants, rejections) = Self::vocabularies();
        match (grants.is_match(text), rejections.is_match(text)) {
            (true, false) => Some(AuthorityListKind::Grants),
            (false, true) => Some(AuthorityListKind::Rejections),
            _ => None,
        }
    }

    fn matches_both(text: &str) -> bool {
        let (grants, rejections) = Self::vocabularies();
        grants.is_match(text) && rejections.is_match(text)
    }

    pub const fn target_status(self) -> ClearanceStatus {
        match self {
            AuthorityListKind::Grants => ClearanceStatus::Approved,
            AuthorityListKind::Rejections => ClearanceStatus::Rejected,
        }
    }
}

/// Leading non-blank lines read as the document heading.
const HEADING_LINES: usize = 3;

/// One columnar line of an authority list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorityRow {
    pub sequence: u32,
    pub document_number: String,
    pub grade: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub case_reference: String,
}

/// Every well-formed row in `text`; lines with impossible dates are dropped.
pub fn parse_rows(text: &str) -> Vec<AuthorityRow> {
    static ROW: OnceLock<Regex> = OnceLock::new();
    let row = ROW.get_or_init(|| {
        Regex::new(
            r"\b(\d{1,4})[ \t]+(\d{8}[A-Z]|[A-Z]\d{7}[A-Z])[ \t]+(.+?)[ \t]+(\d{2}/\d{2}/\d{4})[ \t]+(\d{2}/\d{2}/\d{4})[ \t]+(E-\d{2}-\d{6})\b",
        )
        .expect("static row pattern")
    });

    row.captures_iter(text)
        .filter_map(|captures| {
            let starts_on = parse_date(&captures[4]);
            let ends_on = parse_date(&captures[5]);
            let (Some(starts_on), Some(ends_on)) = (starts_on, ends_on) else {
                warn!(document = &captures[2], "skipping authority row with invalid dates");
                return None;
            };
            Some(AuthorityRow {
                sequence: captures[1].parse().ok()?,
                document_number: captures[2].to_string(),
                grade: captures[3].trim().to_string(),
                starts_on,
                ends_on,
                case_reference: captures[6].to_string(),
            })
        })
        .collect()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%d/%m/%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_case_numbered_and_keyword_filenames() {
        assert!(is_authority_pdf("E-25-027334-AICOX-0312_25.pdf"));
        assert!(is_authority_pdf("Listado_concesiones_junio.PDF"));
        assert!(is_authority_pdf("rejection-batch-7.pdf"));
        assert!(!is_authority_pdf("E-25-027334-AICOX-0312_25.docx"));
        assert!(!is_authority_pdf("factura_0312.pdf"));
    }

    #[test]
    fn classifies_list_kind_from_vocabulary() {
        assert_eq!(
            AuthorityListKind::classify("RELACIÓN DE HABILITACIONES CONCEDIDAS"),
            Some(AuthorityListKind::Grants)
        );
        assert_eq!(
            AuthorityListKind::classify("RELACIÓN DE HABILITACIONES DENEGADAS"),
            Some(AuthorityListKind::Rejections)
        );
        assert_eq!(AuthorityListKind::classify("Acta de reunión"), None);
    }

    #[test]
    fn grants_heading_wins_over_appeal_boilerplate() {
        let text = "RELACIÓN DE HABILITACIONES CONCEDIDAS\n\
Nº DOCUMENTO GRADO INICIO FIN EXPEDIENTE\n\
3 87654321B R,NS 01/01/2024 01/01/2025 E-25-027334\n\
\n\
Contra la presente resolución, o frente a una eventual denegación, cabe\n\
interponer recurso de alzada en el plazo de un mes.\n";
        assert_eq!(
            AuthorityListKind::classify(text),
            Some(AuthorityListKind::Grants)
        );
    }

    #[test]
    fn mixed_vocabulary_without_heading_is_not_classified() {
        let text = "Acta de la comisión\n\
Orden del día\n\
Asistentes\n\
Se revisan la concesión y la denegación de varias solicitudes.";
        assert_eq!(AuthorityListKind::classify(text), None);
    }

    #[test]
    fn keywords_need_word_boundaries() {
        assert_eq!(
            AuthorityListKind::classify("Relación de integrantes del equipo"),
            None
        );
    }

    #[test]
    fn parses_grant_row() {
        let text = "RELACIÓN DE HABILITACIONES CONCEDIDAS\n\
Nº DOCUMENTO GRADO INICIO FIN EXPEDIENTE\n\
3 87654321B R,NS 01/01/2024 01/01/2025 E-25-027334\n";
        let rows = parse_rows(text);
        assert_eq!(
            rows,
            vec![AuthorityRow {
                sequence: 3,
                document_number: "87654321B".to_string(),
                grade: "R,NS".to_string(),
                starts_on: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
                ends_on: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
                case_reference: "E-25-027334".to_string(),
            }]
        );
    }

    #[test]
    fn parses_several_rows_and_drops_invalid_dates() {
        let text = "1 X1234567L CONFIDENCIAL OTAN 15/03/2024 15/03/2029 E-24-000101\n\
2 12345678A SECRETO 31/02/2024 01/01/2025 E-24-000102\n\
4 11111111H RESERVADO 01/06/2024 01/06/2027 E-24-000104";
        let rows = parse_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].grade, "CONFIDENCIAL OTAN");
        assert_eq!(rows[1].sequence, 4);
        assert_eq!(rows[1].document_number, "11111111H");
    }
}
