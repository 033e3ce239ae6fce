//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::ConversionError;

/// Formats the office converter reads and writes.
pub const OFFICE_FORMATS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "html", "htm", "pdf", "xls", "xlsx", "ods", "csv", "ppt",
    "pptx", "odp", "epub",
];

/// Raster formats handled by the image pipeline.
pub const RASTER_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "tiff", "bmp"];

/// Page formats the PDF rasterizer can emit.
pub const RASTERIZER_FORMATS: &[&str] = &["png", "jpg", "jpeg", "tiff"];

/// Video containers the transcoding engine writes.
pub const VIDEO_FORMATS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv", "m4v"];

/// Audio containers the transcoding engine writes.
pub const AUDIO_FORMATS: &[&str] = &["mp3", "aac", "wav", "ogg", "flac", "m4a", "opus"];

/// Archive extensions; recognized so they can be classified, never converted.
pub const ARCHIVE_FORMATS: &[&str] = &["zip", "rar", "7z", "tar", "gz"];

/// Broad category of a request, selecting the adapter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Document,
    Image,
    Audio,
    Video,
    Archive,
}

impl MediaClass {
    /// Guesses the media class from a file extension.
    pub fn infer(extension: &str) -> Option<Self> {
        let ext = normalize_extension(extension);
        let ext = ext.as_str();
        if RASTER_FORMATS.contains(&ext) {
            Some(Self::Image)
        } else if VIDEO_FORMATS.contains(&ext) {
            Some(Self::Video)
        } else if AUDIO_FORMATS.contains(&ext) {
            Some(Self::Audio)
        } else if ARCHIVE_FORMATS.contains(&ext) {
            Some(Self::Archive)
        } else if OFFICE_FORMATS.contains(&ext) || ext == "json" {
            Some(Self::Document)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaClass {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "archive" => Ok(Self::Archive),
            other => Err(ConversionError::invalid_input(format!(
                "unknown media class: {other}"
            ))),
        }
    }
}

/// Lowercases an extension and strips any leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercased extension of a path, empty when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .unwrap_or_default()
}

/// A scalar option value as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl OptionValue {
    /// Integer view of the value. Strings are read like `parseInt`: the
    /// leading integer part counts and the rest is ignored.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::String(s) => parse_leading_int(s),
            _ => None,
        }
    }

    /// String view of the value.
    pub fn as_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for OptionValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| v * sign)
}

/// Caller supplied options; recognized keys depend on the operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionOptions(BTreeMap<String, OptionValue>);

impl ConversionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, returning self for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Non-empty string value for `key`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(OptionValue::as_string)
            .filter(|s| !s.trim().is_empty())
    }

    /// Integer value for `key`; present but unparsable values are an error.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConversionError> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::String(s)) if s.trim().is_empty() => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| {
                ConversionError::invalid_input(format!(
                    "option '{key}' must be an integer, got {}",
                    v.as_string()
                ))
            }),
        }
    }

    /// Positive pixel dimension for `key`.
    pub fn get_dimension(&self, key: &str) -> Result<Option<u32>, ConversionError> {
        match self.get_int(key)? {
            None => Ok(None),
            Some(v) if v > 0 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
            Some(v) => Err(ConversionError::invalid_input(format!(
                "option '{key}' must be a positive integer, got {v}"
            ))),
        }
    }

    /// Offset (zero allowed) for `key`.
    pub fn get_offset(&self, key: &str) -> Result<Option<u32>, ConversionError> {
        match self.get_int(key)? {
            None => Ok(None),
            Some(v) if v >= 0 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
            Some(v) => Err(ConversionError::invalid_input(format!(
                "option '{key}' must not be negative, got {v}"
            ))),
        }
    }

    /// Quality in 1..=100; out of range values are clamped.
    pub fn get_quality(&self, key: &str) -> Result<Option<u8>, ConversionError> {
        Ok(self.get_int(key)?.map(|q| q.clamp(1, 100) as u8))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }
}

/// A single conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Absolute path to an existing input file.
    pub source_path: PathBuf,
    pub media_class: MediaClass,
    /// Lowercase format token, e.g. `pdf`.
    pub target_format: String,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        media_class: MediaClass,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            media_class,
            target_format: target_format.into(),
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Lowercased extension of the source file.
    pub fn input_extension(&self) -> String {
        extension_of(&self.source_path)
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    /// The produced artifact.
    pub output_path: PathBuf,
    /// Base name of `output_path`.
    pub filename: String,
    /// Non-fatal diagnostics, in the order they were raised.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Additional artifacts of one-to-many conversions.
    #[serde(default)]
    pub auxiliary_files: Vec<PathBuf>,
}

impl ConversionResult {
    pub fn new(output_path: PathBuf) -> Self {
        let filename = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            success: true,
            output_path,
            filename,
            warnings: Vec::new(),
            auxiliary_files: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_auxiliary_files(mut self, files: Vec<PathBuf>) -> Self {
        self.auxiliary_files = files;
        self
    }
}

/// Identity of an adapter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Document,
    Script,
    Image,
    Video,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Document => "document",
            Self::Script => "script",
            Self::Image => "image",
            Self::Video => "video",
        })
    }
}

/// Operations of the document adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOp {
    DocxToHtml,
    DocxToText,
    TextToPdf,
    CsvToJson,
    JsonToCsv,
    /// Delegate to the headless office converter.
    OfficeConvert,
}

/// Operations of the script adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOp {
    PdfToDocx,
    PdfToSpreadsheet,
}

/// Operations of the image adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOp {
    Convert,
    Compress,
    Resize,
    Crop,
    Metadata,
    PdfToImage,
    ImageToPdf,
}

/// Operations of the video adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOp {
    Convert,
    Compress,
    Trim,
    ExtractAudio,
    ChangeResolution,
    Metadata,
}

/// An operation resolved for one request, tagged with its adapter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "adapter", content = "operation", rename_all = "snake_case")]
pub enum AdapterOperation {
    Document(DocumentOp),
    Script(ScriptOp),
    Image(ImageOp),
    Video(VideoOp),
}

impl AdapterOperation {
    /// The adapter family that executes this operation.
    pub fn adapter(&self) -> AdapterKind {
        match self {
            Self::Document(_) => AdapterKind::Document,
            Self::Script(_) => AdapterKind::Script,
            Self::Image(_) => AdapterKind::Image,
            Self::Video(_) => AdapterKind::Video,
        }
    }

    /// Operation name without the adapter prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Document(op) => match op {
                DocumentOp::DocxToHtml => "docx_to_html",
                DocumentOp::DocxToText => "docx_to_text",
                DocumentOp::TextToPdf => "text_to_pdf",
                DocumentOp::CsvToJson => "csv_to_json",
                DocumentOp::JsonToCsv => "json_to_csv",
                DocumentOp::OfficeConvert => "office_convert",
            },
            Self::Script(op) => match op {
                ScriptOp::PdfToDocx => "pdf_to_docx",
                ScriptOp::PdfToSpreadsheet => "pdf_to_spreadsheet",
            },
            Self::Image(op) => match op {
                ImageOp::Convert => "convert",
                ImageOp::Compress => "compress",
                ImageOp::Resize => "resize",
                ImageOp::Crop => "crop",
                ImageOp::Metadata => "metadata",
                ImageOp::PdfToImage => "pdf_to_image",
                ImageOp::ImageToPdf => "image_to_pdf",
            },
            Self::Video(op) => match op {
                VideoOp::Convert => "convert",
                VideoOp::Compress => "compress",
                VideoOp::Trim => "trim",
                VideoOp::ExtractAudio => "extract_audio",
                VideoOp::ChangeResolution => "change_resolution",
                VideoOp::Metadata => "metadata",
            },
        }
    }

    /// Whether this operation may be applied to inputs of `media_class`.
    pub fn accepts(&self, media_class: MediaClass) -> bool {
        match self {
            Self::Document(_) | Self::Script(_) => media_class == MediaClass::Document,
            Self::Image(_) => media_class == MediaClass::Image,
            Self::Video(op) => match media_class {
                MediaClass::Video => true,
                MediaClass::Audio => matches!(op, VideoOp::ExtractAudio | VideoOp::Metadata),
                _ => false,
            },
        }
    }

    /// Whether the operation only reads its input.
    pub fn is_introspection(&self) -> bool {
        matches!(
            self,
            Self::Image(ImageOp::Metadata) | Self::Video(VideoOp::Metadata)
        )
    }

    /// Looks up an explicit operation by name for a media class, e.g.
    /// `resize` for images or `trim` for videos.
    pub fn from_name(media_class: MediaClass, name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        let candidates: &[AdapterOperation] = match media_class {
            MediaClass::Image => &[
                Self::Image(ImageOp::Convert),
                Self::Image(ImageOp::Compress),
                Self::Image(ImageOp::Resize),
                Self::Image(ImageOp::Crop),
                Self::Image(ImageOp::Metadata),
                Self::Image(ImageOp::PdfToImage),
                Self::Image(ImageOp::ImageToPdf),
            ],
            MediaClass::Video | MediaClass::Audio => &[
                Self::Video(VideoOp::Convert),
                Self::Video(VideoOp::Compress),
                Self::Video(VideoOp::Trim),
                Self::Video(VideoOp::ExtractAudio),
                Self::Video(VideoOp::ChangeResolution),
                Self::Video(VideoOp::Metadata),
            ],
            MediaClass::Document => &[
                Self::Document(DocumentOp::DocxToHtml),
                Self::Document(DocumentOp::DocxToText),
                Self::Document(DocumentOp::TextToPdf),
                Self::Document(DocumentOp::CsvToJson),
                Self::Document(DocumentOp::JsonToCsv),
                Self::Document(DocumentOp::OfficeConvert),
                Self::Script(ScriptOp::PdfToDocx),
                Self::Script(ScriptOp::PdfToSpreadsheet),
            ],
            MediaClass::Archive => &[],
        };
        candidates
            .iter()
            .copied()
            .find(|op| op.name() == name && op.accepts(media_class))
    }
}

impl fmt::Display for AdapterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.adapter(), self.name())
    }
}

/// Introspection result of the image pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
    pub has_alpha: bool,
}

/// One stream reported by the media prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub codec_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Introspection result of the transcoding engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_secs: Option<f64>,
    pub bitrate: Option<u64>,
    /// Container name as reported by the prober, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub streams: Vec<StreamInfo>,
}

/// Metadata returned by the introspection operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaMetadata {
    Image(ImageMetadata),
    Video(VideoMetadata),
}
