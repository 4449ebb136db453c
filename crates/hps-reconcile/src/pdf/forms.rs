//! Fillable PDF forms: reading widget values and writing values by fuzzy name.

use lopdf::{Document, Object, ObjectId};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::{decode_text, encode_text, layout, resolve, PdfError};

/// Named form field and its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Output of [`fill_fields`]: the new document plus what was written.
#[derive(Debug, Clone)]
pub struct FilledForm {
    pub bytes: Vec<u8>,
    pub updated: Vec<FormField>,
    pub unmatched: Vec<String>,
}

struct Widget {
    name: String,
    value: String,
    field_id: Option<ObjectId>,
}

/// Every named widget on page 1, including empty ones.
pub fn read_form_fields(pdf: &[u8]) -> Result<Vec<FormField>, PdfError> {
    let document = Document::load_mem(pdf)?;
    Ok(first_page_widgets(&document)
        .into_iter()
        .filter(|widget| !widget.name.is_empty())
        .map(|widget| FormField {
            name: widget.name,
            value: widget.value,
        })
        .collect())
}

/// Populated widget values from page 1, or label-based text extraction when
/// no widget carries a value.
pub fn extract_fields(pdf: &[u8]) -> Result<BTreeMap<String, String>, PdfError> {
    let document = Document::load_mem(pdf)?;

    let mut fields = BTreeMap::new();
    for widget in first_page_widgets(&document) {
        if widget.name.is_empty() || widget.value.trim().is_empty() {
            continue;
        }
        fields.entry(widget.name).or_insert(widget.value);
    }
    if !fields.is_empty() {
        return Ok(fields);
    }

    match layout::first_page_text(&document) {
        Ok(text) => Ok(extract_labeled_values(&text)),
        Err(err) => {
            warn!(error = %err, "form has no values and its text could not be extracted");
            Ok(BTreeMap::new())
        }
    }
}

/// Writes `values` into the widgets whose names match each label.
///
/// Exact case-insensitive names are resolved for every label first; the
/// remaining labels then take the first free widget whose name contains the
/// label, or is contained in it. Each widget is written at most once, empty
/// values are skipped, and a widget that cannot be updated is logged without
/// aborting.
pub fn fill_fields(pdf: &[u8], values: &BTreeMap<String, String>) -> Result<FilledForm, PdfError> {
    let mut document = Document::load_mem(pdf)?;
    let pages = document.get_pages();
    let widgets: Vec<Widget> = pages
        .values()
        .flat_map(|page_id| page_widgets(&document, *page_id))
        .filter(|widget| !widget.name.is_empty())
        .collect();

    let labels: Vec<(&String, &String)> = values
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect();
    let targets = assign_widgets(&widgets, labels.iter().map(|(label, _)| label.as_str()));

    let mut updated = Vec::new();
    let mut unmatched = Vec::new();
    for ((label, value), target) in labels.into_iter().zip(targets) {
        let Some(widget) = target.map(|index| &widgets[index]) else {
            debug!(label = %label, "no free form field matches label");
            unmatched.push(label.clone());
            continue;
        };

        match set_value(&mut document, widget, value) {
            Ok(()) => updated.push(FormField {
                name: widget.name.clone(),
                value: value.clone(),
            }),
            Err(err) => warn!(field = %widget.name, error = %err, "failed to update form field"),
        }
    }

    if !updated.is_empty() {
        request_appearance_refresh(&mut document);
    }

    let mut bytes = Vec::new();
    document.save_to(&mut bytes)?;
    Ok(FilledForm {
        bytes,
        updated,
        unmatched,
    })
}

/// Identifies a widget for the one-write-per-field rule; kids of one field share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ClaimKey {
    Field(ObjectId),
    Position(usize),
}

/// Widget index per label, in label order: exact names first, then substrings.
fn assign_widgets<'a>(
    widgets: &[Widget],
    labels: impl Iterator<Item = &'a str>,
) -> Vec<Option<usize>> {
    let names: Vec<String> = widgets.iter().map(|widget| widget.name.to_lowercase()).collect();
    let labels: Vec<String> = labels.map(|label| label.trim().to_lowercase()).collect();
    let mut claimed: HashSet<ClaimKey> = HashSet::new();
    let mut targets: Vec<Option<usize>> = vec![None; labels.len()];

    let mut claim = |targets: &mut Vec<Option<usize>>, matches: &dyn Fn(&str, &str) -> bool| {
        for (slot, label) in labels.iter().enumerate() {
            if targets[slot].is_some() || label.is_empty() {
                continue;
            }
            let found = names.iter().enumerate().find(|(index, name)| {
                !claimed.contains(&claim_key(&widgets[*index], *index)) && matches(name, label)
            });
            if let Some((index, _)) = found {
                claimed.insert(claim_key(&widgets[index], index));
                targets[slot] = Some(index);
            }
        }
    };

    claim(&mut targets, &|name: &str, label: &str| name == label);
    claim(&mut targets, &|name: &str, label: &str| {
        name.contains(label) || label.contains(name)
    });
    targets
}

fn claim_key(widget: &Widget, index: usize) -> ClaimKey {
    widget
        .field_id
        .map(ClaimKey::Field)
        .unwrap_or(ClaimKey::Position(index))
}

fn set_value(document: &mut Document, widget: &Widget, value: &str) -> Result<(), PdfError> {
    let Some(id) = widget.field_id else {
        return Err(PdfError::InlineField(widget.name.clone()));
    };
    let field = document.get_object_mut(id)?.as_dict_mut()?;
    field.set("V", encode_text(value));
    Ok(())
}

fn request_appearance_refresh(document: &mut Document) {
    let Ok(root_id) = document.trailer.get(b"Root").and_then(Object::as_reference) else {
        return;
    };
    let acroform_id = match document
        .get_dictionary(root_id)
        .and_then(|catalog| catalog.get(b"AcroForm"))
    {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(_) => None,
        Err(_) => return,
    };

    let acroform = match acroform_id {
        Some(id) => document.get_object_mut(id).and_then(Object::as_dict_mut),
        None => document
            .get_object_mut(root_id)
            .and_then(Object::as_dict_mut)
            .and_then(|catalog| catalog.get_mut(b"AcroForm"))
            .and_then(Object::as_dict_mut),
    };
    if let Ok(acroform) = acroform {
        acroform.set("NeedAppearances", true);
    }
}

fn first_page_widgets(document: &Document) -> Vec<Widget> {
    match document.get_pages().get(&1) {
        Some(page_id) => page_widgets(document, *page_id),
        None => Vec::new(),
    }
}

fn page_widgets(document: &Document, page_id: ObjectId) -> Vec<Widget> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Some(Object::Array(annotations)) = page
        .get(b"Annots")
        .ok()
        .and_then(|annots| resolve(document, annots))
    else {
        return Vec::new();
    };

    annotations
        .iter()
        .filter_map(|annotation| widget_from(document, annotation))
        .collect()
}

fn widget_from(document: &Document, annotation: &Object) -> Option<Widget> {
    let own_id = annotation.as_reference().ok();
    let dict = resolve(document, annotation)?.as_dict().ok()?;
    if let Ok(subtype) = dict.get(b"Subtype").and_then(Object::as_name) {
        if subtype != b"Widget" {
            return None;
        }
    }

    // Merged field/widget dictionaries carry /T themselves; kids inherit it from /Parent.
    let (field_id, field) = if dict.has(b"T") {
        (own_id, dict)
    } else {
        let parent = dict.get(b"Parent").ok()?;
        (
            parent.as_reference().ok(),
            resolve(document, parent)?.as_dict().ok()?,
        )
    };

    let name = field
        .get(b"T")
        .ok()
        .and_then(|title| resolve(document, title))
        .and_then(|title| title.as_str().ok())
        .map(decode_text)?;
    let value = field
        .get(b"V")
        .ok()
        .and_then(|value| resolve(document, value))
        .map(object_text)
        .unwrap_or_default();

    Some(Widget {
        name: name.trim().to_string(),
        value,
        field_id,
    })
}

fn object_text(object: &Object) -> String {
    match object {
        Object::String(bytes, _) => decode_text(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Integer(value) => value.to_string(),
        Object::Real(value) => value.to_string(),
        _ => String::new(),
    }
}

/// Label rules applied to page text when a form has no populated widgets.
pub fn extract_labeled_values(text: &str) -> BTreeMap<String, String> {
    static RULES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        [
            ("nombre", r"(?im)^\s*nombre\s*:\s*(.+?)\s*$"),
            ("apellidos", r"(?im)^\s*apellidos?\s*:\s*(.+?)\s*$"),
            (
                "documento",
                r"(?i)\b(?:dni|nie|nif)\b\s*[:.]?\s*(\d{8}[a-z]|[a-z]\d{7}[a-z])\b",
            ),
            (
                "fecha_nacimiento",
                r"(?i)fecha\s+de\s+nacimiento\s*:?\s*(\d{2}/\d{2}/\d{4})",
            ),
            (
                "lugar_nacimiento",
                r"(?im)lugar\s+de\s+nacimiento\s*:?\s*(.+?)\s*$",
            ),
            ("telefono", r"(?i)tel[eé]fono\s*:?\s*(\+?\d[\d ]{7,}\d)"),
            ("email", r"(?i)\b([\w.+-]+@[\w-]+(?:\.[\w-]+)+)"),
        ]
        .into_iter()
        .map(|(label, pattern)| (label, Regex::new(pattern).expect("static label pattern")))
        .collect()
    });

    let mut values = BTreeMap::new();
    for (label, pattern) in rules {
        if let Some(captures) = pattern.captures(text) {
            let mut value = captures[1].trim().to_string();
            if *label == "documento" {
                value = value.to_ascii_uppercase();
            }
            values.insert(label.to_string(), value);
        }
    }
    values
}
