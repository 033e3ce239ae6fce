//! PDF construction on top of `lopdf`: paginated plain text and single-image
//! documents.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;

use super::error::ConversionError;

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

pub const FONT_SIZE: f32 = 12.0;
pub const MARGIN_LEFT: f32 = 50.0;
pub const MARGIN_TOP: f32 = 50.0;
pub const MARGIN_BOTTOM: f32 = 50.0;
pub const LINE_HEIGHT: f32 = FONT_SIZE + 4.0;

/// Longer lines are cut, not wrapped.
pub const MAX_LINE_CHARS: usize = 80;

/// A text line with its baseline position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub y: f32,
    pub text: String,
}

/// Splits `text` into pages of positioned, truncated lines.
///
/// The cursor starts `MARGIN_TOP` below the page top and moves down one
/// `LINE_HEIGHT` per line; once it drops below `MARGIN_BOTTOM` the next line
/// opens a new page. Empty text still yields one page.
pub fn layout_text(text: &str) -> Vec<Vec<PlacedLine>> {
    let top = PAGE_HEIGHT - MARGIN_TOP;
    let mut pages = vec![Vec::new()];
    let mut y = top;

    for line in text.split('\n') {
        if y < MARGIN_BOTTOM {
            pages.push(Vec::new());
            y = top;
        }
        let text: String = line
            .trim_end_matches('\r')
            .chars()
            .take(MAX_LINE_CHARS)
            .collect();
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine { y, text });
        }
        y -= LINE_HEIGHT;
    }
    pages
}

/// Number of lines that fit on one page.
pub fn lines_per_page() -> usize {
    let usable = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    (usable / LINE_HEIGHT).floor() as usize + 1
}

/// Renders plain text into a paginated Helvetica document.
pub fn render_text(text: &str) -> Result<Vec<u8>, ConversionError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids = Vec::new();
    for lines in layout_text(text) {
        let mut operations = Vec::with_capacity(lines.len() * 5);
        for line in lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), FONT_SIZE.into()],
            ));
            operations.push(Operation::new("Td", vec![MARGIN_LEFT.into(), line.y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(to_win_ansi(&line.text), StringFormat::Literal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let content_id = add_content(&mut doc, Content { operations })?;
        page_ids.push(add_page(
            &mut doc,
            pages_id,
            content_id,
            resources_id,
            PAGE_WIDTH,
            PAGE_HEIGHT,
        ));
    }

    finish(doc, pages_id, page_ids)
}

/// Image payload ready for embedding.
#[derive(Debug, Clone)]
pub enum EmbeddedImage {
    /// JPEG bytes embedded as-is with `DCTDecode`.
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
        grayscale: bool,
    },
    /// Decoded 8-bit RGB samples plus an optional alpha plane.
    Pixels {
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
        width: u32,
        height: u32,
    },
}

impl EmbeddedImage {
    fn size(&self) -> (u32, u32) {
        match self {
            Self::Jpeg { width, height, .. } | Self::Pixels { width, height, .. } => {
                (*width, *height)
            }
        }
    }
}

/// Wraps one image as the single page of a document sized to the image.
pub fn render_image(image: EmbeddedImage) -> Result<Vec<u8>, ConversionError> {
    let (width, height) = image.size();
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = match image {
        EmbeddedImage::Jpeg {
            data, grayscale, ..
        } => {
            let color_space = if grayscale { "DeviceGray" } else { "DeviceRGB" };
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width as i64),
                "Height" => Object::Integer(height as i64),
                "ColorSpace" => color_space,
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            };
            doc.add_object(Stream::new(dict, data))
        }
        EmbeddedImage::Pixels { rgb, alpha, .. } => {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width as i64),
                "Height" => Object::Integer(height as i64),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "FlateDecode",
            };
            if let Some(alpha) = alpha {
                let mask = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(width as i64),
                    "Height" => Object::Integer(height as i64),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => "FlateDecode",
                };
                let mask_id = doc.add_object(Stream::new(mask, deflate(&alpha)?));
                dict.set("SMask", mask_id);
            }
            doc.add_object(Stream::new(dict, deflate(&rgb)?))
        }
    };

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    });
    let (w, h) = (width as f32, height as f32);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    w.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    h.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = add_content(&mut doc, content)?;
    let page_id = add_page(&mut doc, pages_id, content_id, resources_id, w, h);

    finish(doc, pages_id, vec![page_id])
}

fn add_content(doc: &mut Document, content: Content) -> Result<ObjectId, ConversionError> {
    let bytes = content
        .encode()
        .map_err(|e| ConversionError::external(format!("Failed to encode page content: {e}")))?;
    Ok(doc.add_object(Stream::new(Dictionary::new(), bytes)))
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    content_id: ObjectId,
    resources_id: ObjectId,
    width: f32,
    height: f32,
) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => resources_id,
    })
}

fn finish(
    mut doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
) -> Result<Vec<u8>, ConversionError> {
    let count = page_ids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
        "Count" => Object::Integer(count),
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ConversionError::external(format!("Failed to write PDF: {e}")))?;
    Ok(buffer)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ConversionError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ConversionError::external(format!("Failed to compress image data: {e}")))
}

/// Encodes text for a standard Type1 font; unmappable characters become `?`.
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) < 0x7f => c as u8,
            c if (0xa0..=0xff).contains(&(c as u32)) => c as u32 as u8,
            '€' => 0x80,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}
