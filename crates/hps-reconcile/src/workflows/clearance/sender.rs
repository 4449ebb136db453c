use crate::config::AuthorityConfig;
use crate::mailbox::InboundMessage;

/// Decides whether a message comes from the issuing authority.
///
/// Matches the sender against the allow-list first, then falls back to subject
/// keywords because authority addresses vary between offices.
#[derive(Debug, Clone)]
pub struct SenderClassifier {
    senders: Vec<String>,
    keywords: Vec<String>,
}

impl SenderClassifier {
    pub fn new(config: &AuthorityConfig) -> Self {
        Self {
            senders: lowercase_all(&config.senders),
            keywords: lowercase_all(&config.subject_keywords),
        }
    }

    pub fn is_authoritative(&self, message: &InboundMessage) -> bool {
        let sender = message.sender.to_lowercase();
        if self.senders.iter().any(|entry| sender.contains(entry)) {
            return true;
        }

        let subject = message.subject.to_lowercase();
        self.keywords.iter().any(|keyword| subject.contains(keyword))
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}
