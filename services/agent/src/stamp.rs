//! Visible signature stamp
//!
//! Appends a content stream to the first page drawing the signer box
//! (bottom-right, letter-page coordinates as deployed) and records the
//! signature details in the document Info dictionary. The stamp is a visual
//! annotation only; the cryptographic signature stays detached and is
//! verifiable against the original, unstamped bytes.

use chrono::Local;
use dsc::SignatureResult;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("PDF signing failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF signing failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF signing failed: document has no pages")]
    NoPages,
}

// Box anchored bottom-right of a letter page (612 x 792).
const BOX_X: f32 = 312.0;
const BOX_Y: f32 = 315.0;
const BOX_H: f32 = 120.0;

// Font resource names, chosen to avoid colliding with the page's own fonts.
const FONT_REGULAR: &str = "FsigR";
const FONT_BOLD: &str = "FsigB";

/// Stamp `input` with the visible signature box and metadata for `result`,
/// returning the rewritten document bytes.
pub fn apply_visible_signature(
    input: &[u8],
    result: &SignatureResult,
) -> Result<Vec<u8>, StampError> {
    let mut doc = Document::load_mem(input)?;

    let first_page = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or(StampError::NoPages)?;

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });

    let content = overlay_content(result);
    let stream = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

    add_fonts(&mut doc, first_page, regular, bold)?;
    append_page_content(&mut doc, first_page, stream)?;
    write_metadata(&mut doc, result);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn overlay_content(result: &SignatureResult) -> Content {
    let record = &result.certificate;
    let subject = ellipsize(&record.subject_cn, 25);
    let serial = ellipsize(&record.serial_number, 15);
    let signed_at = result.signed_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let valid = record.not_after > Local::now().naive_local();

    let label_x = BOX_X + 50.0;
    let value_x = BOX_X + 100.0;

    let mut ops = vec![Operation::new("q", vec![])];

    ops.push(fill_color(0.2, 0.2, 0.2));
    ops.extend(text(FONT_BOLD, 9, label_x, BOX_Y + BOX_H - 35.0, "Signed by:"));
    ops.extend(text(FONT_REGULAR, 8, value_x, BOX_Y + BOX_H - 35.0, &subject));
    ops.extend(text(FONT_BOLD, 9, label_x, BOX_Y + BOX_H - 47.0, "Serial No:"));
    ops.extend(text(FONT_REGULAR, 8, value_x, BOX_Y + BOX_H - 47.0, &serial));
    ops.extend(text(FONT_BOLD, 9, label_x, BOX_Y + BOX_H - 59.0, "Date/Time:"));
    ops.extend(text(FONT_REGULAR, 7, value_x, BOX_Y + BOX_H - 59.0, &signed_at));
    ops.extend(text(FONT_BOLD, 9, label_x, BOX_Y + BOX_H - 71.0, "Token:"));
    ops.extend(text(
        FONT_REGULAR,
        7,
        value_x,
        BOX_Y + BOX_H - 71.0,
        &result.token_label,
    ));

    ops.push(if valid {
        fill_color(0.16, 0.68, 0.32)
    } else {
        fill_color(0.86, 0.08, 0.24)
    });
    ops.extend(text(
        FONT_BOLD,
        8,
        BOX_X + 180.0,
        BOX_Y + BOX_H - 71.0,
        if valid { "VALID" } else { "EXPIRED" },
    ));

    ops.push(fill_color(0.6, 0.6, 0.6));
    ops.extend(text(
        FONT_REGULAR,
        6,
        label_x,
        BOX_Y + BOX_H - 83.0,
        "PKCS11 - SHA256 - SECURED",
    ));

    ops.push(Operation::new("Q", vec![]));
    Content { operations: ops }
}

fn fill_color(r: f32, g: f32, b: f32) -> Operation {
    Operation::new(
        "rg",
        vec![Object::Real(r), Object::Real(g), Object::Real(b)],
    )
}

fn text(font: &str, size: i64, x: f32, y: f32, value: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(size)],
        ),
        Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        Operation::new("Tj", vec![Object::string_literal(value)]),
        Operation::new("ET", vec![]),
    ]
}

fn ellipsize(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let truncated: String = value.chars().take(max).collect();
        format!("{truncated}...")
    } else {
        value.to_string()
    }
}

/// Register the overlay fonts in the page's resource dictionary, whether the
/// dictionary is inline or referenced.
fn add_fonts(
    doc: &mut Document,
    page_id: ObjectId,
    regular: ObjectId,
    bold: ObjectId,
) -> Result<(), StampError> {
    let resources = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Resources")
        .ok()
        .cloned();

    match resources {
        Some(Object::Reference(resources_id)) => {
            let dict = doc.get_object_mut(resources_id)?.as_dict_mut()?;
            set_font_entries(dict, regular, bold);
        }
        Some(Object::Dictionary(mut dict)) => {
            set_font_entries(&mut dict, regular, bold);
            doc.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Resources", dict);
        }
        _ => {
            let mut dict = Dictionary::new();
            set_font_entries(&mut dict, regular, bold);
            doc.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Resources", dict);
        }
    }
    Ok(())
}

fn set_font_entries(resources: &mut Dictionary, regular: ObjectId, bold: ObjectId) {
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(existing)) => existing.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_REGULAR, Object::Reference(regular));
    fonts.set(FONT_BOLD, Object::Reference(bold));
    resources.set("Font", fonts);
}

/// Append the overlay stream after the page's existing content so it draws on
/// top.
fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    stream: ObjectId,
) -> Result<(), StampError> {
    let contents = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Contents")
        .ok()
        .cloned();

    let merged = match contents {
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(stream));
            Object::Array(items)
        }
        Some(existing @ Object::Reference(_)) => {
            Object::Array(vec![existing, Object::Reference(stream)])
        }
        _ => Object::Reference(stream),
    };

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", merged);
    Ok(())
}

fn write_metadata(doc: &mut Document, result: &SignatureResult) {
    let info = dictionary! {
        "Title" => Object::string_literal("Digitally Signed Document"),
        "Author" => Object::string_literal(result.certificate.subject_cn.clone()),
        "Signer" => Object::string_literal(result.certificate.subject_cn.clone()),
        "SigningTime" => Object::string_literal(
            result.signed_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        ),
        "Signature" => Object::string_literal(hex::encode(&result.signature)),
    };
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", Object::Reference(info_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsc::parse_certificate;

    fn one_page_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let content = Content { operations: vec![] };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn sample_result() -> SignatureResult {
        SignatureResult {
            signature: vec![0xab; 256],
            signed_at: Local::now().naive_local(),
            certificate: parse_certificate(b"not a real certificate"),
            token_label: "Watchdata PROXKey".to_string(),
        }
    }

    #[test]
    fn test_stamped_document_reloads_and_carries_metadata() {
        let input = one_page_pdf();
        let result = sample_result();

        let stamped = apply_visible_signature(&input, &result).unwrap();
        let doc = Document::load_mem(&stamped).unwrap();

        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_object(info_id).unwrap().as_dict().unwrap();

        match info.get(b"Signature").unwrap() {
            Object::String(bytes, _) => {
                assert_eq!(bytes, &hex::encode(&result.signature).into_bytes());
            }
            other => panic!("expected a string signature entry, got {other:?}"),
        }
        match info.get(b"Signer").unwrap() {
            Object::String(bytes, _) => {
                assert_eq!(bytes, &result.certificate.subject_cn.clone().into_bytes());
            }
            other => panic!("expected a string signer entry, got {other:?}"),
        }
    }

    #[test]
    fn test_stamp_appends_a_second_content_stream() {
        let input = one_page_pdf();
        let stamped = apply_visible_signature(&input, &sample_result()).unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let (_, &page_id) = doc.get_pages().iter().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();

        match page.get(b"Contents").unwrap() {
            Object::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected a content array, got {other:?}"),
        }
    }

    #[test]
    fn test_stamp_registers_overlay_fonts() {
        let input = one_page_pdf();
        let stamped = apply_visible_signature(&input, &sample_result()).unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let (_, &page_id) = doc.get_pages().iter().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();

        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.get(FONT_REGULAR.as_bytes()).is_ok());
        assert!(fonts.get(FONT_BOLD.as_bytes()).is_ok());
    }

    #[test]
    fn test_garbage_input_is_a_pdf_error() {
        let err = apply_visible_signature(b"not a pdf", &sample_result());
        assert!(err.is_err());
    }
}
