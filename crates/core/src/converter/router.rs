//! Format routing: maps a request onto the operation that will serve it.
//!
//! Document pairs are data, not branches: [`PRIORITY_ROUTES`] wins over
//! [`DOCUMENT_MATRIX`], which wins over the generic office fallback. Image,
//! video and audio requests go straight to their pipeline because the engines
//! behind them accept arbitrary pairs within their format sets.

use super::error::ConversionError;
use super::types::{
    normalize_extension, AdapterOperation, DocumentOp, ImageOp, MediaClass, ScriptOp, VideoOp,
    AUDIO_FORMATS, RASTERIZER_FORMATS, RASTER_FORMATS, VIDEO_FORMATS,
};

/// One declarative routing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub input: &'static str,
    pub target: &'static str,
    pub operation: AdapterOperation,
}

const fn rule(input: &'static str, target: &'static str, operation: AdapterOperation) -> RouteRule {
    RouteRule {
        input,
        target,
        operation,
    }
}

/// Document pairs the office converter handles poorly. Checked first.
pub const PRIORITY_ROUTES: &[RouteRule] = &[
    rule("pdf", "docx", AdapterOperation::Script(ScriptOp::PdfToDocx)),
    rule("pdf", "doc", AdapterOperation::Script(ScriptOp::PdfToDocx)),
];

/// Document pairs with bespoke handling.
pub const DOCUMENT_MATRIX: &[RouteRule] = &[
    rule("docx", "html", AdapterOperation::Document(DocumentOp::DocxToHtml)),
    rule("docx", "txt", AdapterOperation::Document(DocumentOp::DocxToText)),
    rule("txt", "pdf", AdapterOperation::Document(DocumentOp::TextToPdf)),
    rule("csv", "json", AdapterOperation::Document(DocumentOp::CsvToJson)),
    rule("json", "csv", AdapterOperation::Document(DocumentOp::JsonToCsv)),
    rule("html", "pdf", AdapterOperation::Document(DocumentOp::OfficeConvert)),
    rule("htm", "pdf", AdapterOperation::Document(DocumentOp::OfficeConvert)),
    rule("pdf", "xlsx", AdapterOperation::Script(ScriptOp::PdfToSpreadsheet)),
    rule("pdf", "csv", AdapterOperation::Script(ScriptOp::PdfToSpreadsheet)),
];

/// Fallback for every document pair not listed in the matrix. The office
/// converter decides what it can open; an unreadable pair fails there.
pub const DOCUMENT_FALLBACK: AdapterOperation = AdapterOperation::Document(DocumentOp::OfficeConvert);

fn lookup(rules: &[RouteRule], input: &str, target: &str) -> Option<AdapterOperation> {
    rules
        .iter()
        .find(|r| r.input == input && r.target == target)
        .map(|r| r.operation)
}

/// Selects the operation for `(media_class, input_extension, target_format)`.
pub fn route(
    media_class: MediaClass,
    input_extension: &str,
    target_format: &str,
) -> Result<AdapterOperation, ConversionError> {
    let input = normalize_extension(input_extension);
    let target = normalize_extension(target_format);
    let (input, target) = (input.as_str(), target.as_str());
    let unsupported = || ConversionError::unsupported(media_class, input, target);

    match media_class {
        MediaClass::Document => {
            if let Some(op) = lookup(PRIORITY_ROUTES, input, target) {
                return Ok(op);
            }
            Ok(lookup(DOCUMENT_MATRIX, input, target).unwrap_or(DOCUMENT_FALLBACK))
        }
        MediaClass::Image => {
            if input == "pdf" {
                return if RASTERIZER_FORMATS.contains(&target) {
                    Ok(AdapterOperation::Image(ImageOp::PdfToImage))
                } else {
                    Err(unsupported())
                };
            }
            if !RASTER_FORMATS.contains(&input) {
                return Err(unsupported());
            }
            if target == "pdf" {
                Ok(AdapterOperation::Image(ImageOp::ImageToPdf))
            } else if RASTER_FORMATS.contains(&target) {
                Ok(AdapterOperation::Image(ImageOp::Convert))
            } else {
                Err(unsupported())
            }
        }
        MediaClass::Video => {
            if VIDEO_FORMATS.contains(&target) {
                Ok(AdapterOperation::Video(VideoOp::Convert))
            } else if AUDIO_FORMATS.contains(&target) {
                Ok(AdapterOperation::Video(VideoOp::ExtractAudio))
            } else {
                Err(unsupported())
            }
        }
        MediaClass::Audio => {
            if AUDIO_FORMATS.contains(&target) {
                Ok(AdapterOperation::Video(VideoOp::ExtractAudio))
            } else {
                Err(unsupported())
            }
        }
        MediaClass::Archive => Err(unsupported()),
    }
}
