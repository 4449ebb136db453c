//! Layout-preserving text extraction from page content streams.
//!
//! Authority lists place every table cell with its own positioning operator,
//! so cells on one baseline are joined with a space and a change of baseline
//! starts a new line.

use lopdf::content::Content;
use lopdf::{Document, Object};

use super::{decode_text, PdfError};

/// Vertical movement, in text space units, treated as a new line.
const LINE_TOLERANCE: f32 = 2.0;
/// `TJ` adjustment, in thousandths of an em, wide enough to read as a gap.
const TJ_GAP: f32 = 200.0;

/// Text of every page in order, pages separated by a blank line.
pub(crate) fn document_text(document: &Document) -> Result<String, PdfError> {
    let mut pages = Vec::new();
    for page_id in document.get_pages().into_values() {
        let content = Content::decode(&document.get_page_content(page_id)?)?;
        pages.push(page_text(&content));
    }
    Ok(pages.join("\n\n"))
}

/// Text of page 1 alone.
pub(crate) fn first_page_text(document: &Document) -> Result<String, PdfError> {
    let Some(page_id) = document.get_pages().get(&1).copied() else {
        return Ok(String::new());
    };
    let content = Content::decode(&document.get_page_content(page_id)?)?;
    Ok(page_text(&content))
}

#[derive(Default)]
struct TextCursor {
    line_y: f32,
    leading: f32,
    printed_y: Option<f32>,
    gap: bool,
    out: String,
}

impl TextCursor {
    fn move_to(&mut self, y: f32) {
        self.line_y = y;
        self.gap = true;
    }

    fn show(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.printed_y {
            Some(previous) if (previous - self.line_y).abs() > LINE_TOLERANCE => {
                self.out.push('\n');
            }
            Some(_) if self.gap && !self.out.ends_with(char::is_whitespace) => {
                self.out.push(' ');
            }
            _ => {}
        }
        self.out.push_str(text);
        self.printed_y = Some(self.line_y);
        self.gap = false;
    }
}

fn page_text(content: &Content) -> String {
    let mut cursor = TextCursor::default();
    for operation in &content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "BT" => cursor.move_to(0.0),
            "ET" => cursor.gap = true,
            "TL" => cursor.leading = number(operands.first()),
            "Tm" => cursor.move_to(number(operands.get(5))),
            "Td" => cursor.move_to(cursor.line_y + number(operands.get(1))),
            "TD" => {
                let ty = number(operands.get(1));
                cursor.leading = -ty;
                cursor.move_to(cursor.line_y + ty);
            }
            "T*" => cursor.move_to(cursor.line_y - cursor.leading),
            "Tj" => cursor.show(&string(operands.first())),
            "'" => {
                cursor.move_to(cursor.line_y - cursor.leading);
                cursor.show(&string(operands.first()));
            }
            "\"" => {
                cursor.move_to(cursor.line_y - cursor.leading);
                cursor.show(&string(operands.get(2)));
            }
            "TJ" => {
                let Some(Object::Array(parts)) = operands.first() else {
                    continue;
                };
                for part in parts {
                    match part {
                        Object::String(..) => cursor.show(&string(Some(part))),
                        other if -number(Some(other)) > TJ_GAP => cursor.gap = true,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    cursor.out.push('\n');
    cursor.out
}

fn number(object: Option<&Object>) -> f32 {
    match object {
        Some(Object::Integer(value)) => *value as f32,
        Some(Object::Real(value)) => *value as f32,
        _ => 0.0,
    }
}

fn string(object: Option<&Object>) -> String {
    match object {
        Some(Object::String(bytes, _)) => decode_text(bytes),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::bulk::{parse_rows, AuthorityListKind};
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    fn table_pdf(heading: &str, rows: &[&[&str]]) -> Vec<u8> {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![50.into(), 780.into()]),
            Operation::new("Tj", vec![Object::string_literal(heading)]),
            Operation::new("ET", vec![]),
        ];
        for (line, cells) in rows.iter().enumerate() {
            let y = 740 - 20 * line as i64;
            for (column, cell) in cells.iter().enumerate() {
                let x = 40 + 90 * column as i64;
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 9.into()]),
                    Operation::new(
                        "Tm",
                        vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()],
                    ),
                    Operation::new("Tj", vec![Object::string_literal(*cell)]),
                    Operation::new("ET", vec![]),
                ]);
            }
        }

        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content { operations };
        let content_id =
            document.add_object(Stream::new(dictionary! {}, content.encode().expect("encodes")));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("save table");
        bytes
    }

    fn text_of(pdf: &[u8]) -> String {
        let document = Document::load_mem(pdf).expect("loads");
        document_text(&document).expect("extracts")
    }

    #[test]
    fn cells_on_one_baseline_become_one_row() {
        let pdf = table_pdf(
            "RELACION DE HABILITACIONES CONCEDIDAS",
            &[
                &["3", "87654321B", "R,NS", "01/01/2024", "01/01/2025", "E-25-027334"],
                &["4", "X1234567L", "C", "01/02/2024", "01/02/2029", "E-25-027335"],
            ],
        );
        let text = text_of(&pdf);

        assert_eq!(
            AuthorityListKind::classify(&text),
            Some(AuthorityListKind::Grants)
        );
        let rows = parse_rows(&text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].document_number, "87654321B");
        assert_eq!(rows[0].grade, "R,NS");
        assert_eq!(rows[0].case_reference, "E-25-027334");
        assert_eq!(rows[1].document_number, "X1234567L");
    }

    #[test]
    fn wide_tj_offsets_separate_words() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("Expediente"),
                        (-600).into(),
                        Object::string_literal("E-25-027334"),
                        (-20).into(),
                        Object::string_literal("X"),
                    ])],
                ),
                Operation::new("T*", vec![]),
                Operation::new("ET", vec![]),
            ],
        };
        assert_eq!(page_text(&content), "Expediente E-25-027334X\n");
    }

    #[test]
    fn baseline_changes_start_new_lines() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("TL", vec![12.into()]),
                Operation::new("Td", vec![10.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("primera")]),
                Operation::new("'", vec![Object::string_literal("segunda")]),
                Operation::new("ET", vec![]),
            ],
        };
        assert_eq!(page_text(&content), "primera\nsegunda\n");
    }
}
