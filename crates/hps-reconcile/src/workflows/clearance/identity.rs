//! Recovers the applicant named in a notification, as opposed to its addressee.
//!
//! Rules are evaluated top to bottom and the first hit wins, so stricter
//! context-anchored patterns must stay ahead of the looser ones.

use regex::Regex;
use std::sync::OnceLock;

use super::domain::ExtractedIdentity;
use crate::mailbox::InboundMessage;

const NAME: &str = r"\p{Lu}\p{Ll}+";
const HONORIFIC: &str = r"(?:(?i:d\.|dña\.|don|doña)\s+)?";

struct NameRule {
    label: &'static str,
    pattern: Regex,
}

/// Ordered name, document-number and date rules over subject + body.
pub struct IdentityExtractor {
    names: Vec<NameRule>,
    documents: Vec<Regex>,
    date: Regex,
}

impl IdentityExtractor {
    pub fn standard() -> &'static IdentityExtractor {
        static EXTRACTOR: OnceLock<IdentityExtractor> = OnceLock::new();
        EXTRACTOR.get_or_init(IdentityExtractor::build)
    }

    fn build() -> Self {
        let rule = |label, pattern: String| NameRule {
            label,
            pattern: Regex::new(&pattern).expect("static name pattern"),
        };

        let names = vec![
            rule(
                "of-name-dated",
                format!(
                    r"\b(?i:de|del)\s+{HONORIFIC}(?P<first>{NAME})\s+(?P<last>{NAME})(?:\s+{NAME})?\s*,?\s+(?i:con\s+fecha|de\s+fecha|fechad[ao])"
                ),
            ),
            rule(
                "name-dated",
                format!(
                    r"(?P<first>{NAME})\s+(?P<last>{NAME})\s*,?\s+(?i:con\s+fecha|de\s+fecha|fechad[ao])"
                ),
            ),
            rule(
                "request-of-name",
                format!(
                    r"\b(?i:solicitud|hps|habilitaci[oó]n|interesad[oa]|solicitante)\s+(?i:de|del)\s+{HONORIFIC}(?P<first>{NAME})\s+(?P<last>{NAME})"
                ),
            ),
            rule(
                "of-name",
                format!(r"\b(?i:de|del)\s+{HONORIFIC}(?P<first>{NAME})\s+(?P<last>{NAME})"),
            ),
        ];

        let documents = [
            r"(?i:\b(?:dni|nie|nif))\s*[:.]?\s*(\d{8}[A-Za-z])\b",
            r"(?i:\b(?:dni|nie|nif))\s*[:.]?\s*([A-Za-z]\d{7}[A-Za-z])\b",
            r"\b(\d{8}[A-Z])\b",
            r"\b([A-Z]\d{7}[A-Z])\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static document pattern"))
        .collect();

        Self {
            names,
            documents,
            date: Regex::new(r"\b(\d{2}/\d{2}/\d{4})\b").expect("static date pattern"),
        }
    }

    pub fn extract(&self, message: &InboundMessage) -> ExtractedIdentity {
        let text = message.search_text();
        let (first_name, last_name) = match self.extract_name(&text) {
            Some((first, last)) => (Some(first), Some(last)),
            None => (None, None),
        };

        ExtractedIdentity {
            first_name,
            last_name,
            document_number: self.extract_document(&text),
            date: self
                .date
                .captures(&text)
                .map(|captures| captures[1].to_string()),
            recipient: message.recipient.clone(),
        }
    }

    fn extract_name(&self, text: &str) -> Option<(String, String)> {
        self.names.iter().find_map(|rule| {
            let captures = rule.pattern.captures(text)?;
            tracing::trace!(rule = rule.label, "name rule matched");
            Some((
                captures["first"].to_string(),
                captures["last"].to_string(),
            ))
        })
    }

    pub(crate) fn extract_document(&self, text: &str) -> Option<String> {
        self.documents.iter().find_map(|pattern| {
            pattern
                .captures(text)
                .map(|captures| captures[1].to_ascii_uppercase())
        })
    }
}
