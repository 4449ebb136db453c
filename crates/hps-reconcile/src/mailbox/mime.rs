//! MIME decoding of raw RFC 822 messages into [`InboundMessage`] values.

use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use scraper::Html;

use super::{Attachment, InboundMessage, MessageId};

/// Parses one raw message. `uid` supplies the fallback identifier when the
/// message carries no `Message-ID` header.
pub fn parse_message(
    raw: &[u8],
    uid: u32,
    unread: bool,
) -> Result<InboundMessage, mailparse::MailParseError> {
    let parsed = mailparse::parse_mail(raw)?;
    let headers = &parsed.headers;

    let id = headers
        .get_first_value("Message-ID")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(MessageId)
        .unwrap_or_else(|| MessageId::from_uid(uid));

    let sender = headers
        .get_first_value("From")
        .map(|value| first_address(&value))
        .unwrap_or_default();
    let recipient = headers
        .get_first_value("To")
        .map(|value| first_address(&value))
        .unwrap_or_default();
    let subject = headers
        .get_first_value("Subject")
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    let received_at = headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|timestamp| DateTime::<Utc>::from_timestamp(timestamp, 0));

    let mut leaves = Vec::new();
    collect_leaves(&parsed, &mut leaves);

    let body = select_body(&leaves)?;
    let attachments = extract_attachments(&leaves)?;

    Ok(InboundMessage {
        id,
        sender,
        recipient,
        subject,
        body,
        received_at,
        unread,
        attachments,
    })
}

/// Every binary part declared with `Content-Disposition: attachment`.
pub fn extract_attachments(
    leaves: &[&ParsedMail<'_>],
) -> Result<Vec<Attachment>, mailparse::MailParseError> {
    let mut attachments = Vec::new();
    for (index, part) in leaves.iter().enumerate() {
        let disposition = part.get_content_disposition();
        if disposition.disposition != DispositionType::Attachment {
            continue;
        }

        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned()
            .unwrap_or_else(|| format!("attachment-{}", index + 1));

        attachments.push(Attachment {
            filename,
            content_type: part.ctype.mimetype.clone(),
            content: part.get_body_raw()?,
        });
    }
    Ok(attachments)
}

fn collect_leaves<'a, 'b>(part: &'b ParsedMail<'a>, leaves: &mut Vec<&'b ParsedMail<'a>>) {
    if part.subparts.is_empty() {
        leaves.push(part);
        return;
    }
    for sub in &part.subparts {
        collect_leaves(sub, leaves);
    }
}

fn select_body(leaves: &[&ParsedMail<'_>]) -> Result<String, mailparse::MailParseError> {
    if let Some(plain) = leaves
        .iter()
        .filter(|part| is_inline(part))
        .find(|part| part.ctype.mimetype.eq_ignore_ascii_case("text/plain"))
    {
        return plain.get_body();
    }

    if let Some(html) = leaves
        .iter()
        .filter(|part| is_inline(part))
        .find(|part| part.ctype.mimetype.eq_ignore_ascii_case("text/html"))
    {
        return Ok(html_to_text(&html.get_body()?));
    }

    Ok(String::new())
}

fn is_inline(part: &ParsedMail<'_>) -> bool {
    part.get_content_disposition().disposition != DispositionType::Attachment
}

fn first_address(raw: &str) -> String {
    let parsed = match mailparse::addrparse(raw) {
        Ok(list) => list,
        Err(_) => return raw.trim().to_string(),
    };

    let found = parsed.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
    });

    found.unwrap_or_else(|| raw.trim().to_string())
}

/// Visible text of an HTML body with entities decoded and whitespace collapsed.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .is_some_and(|element| matches!(element.name(), "script" | "style" | "title"));
            (!hidden).then_some(&**text)
        })
        .collect::<Vec<_>>()
        .join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
