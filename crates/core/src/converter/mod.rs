//! Converter module: format routing, conversion adapters and output resolution.
//!
//! Callers go through [`ConversionService`], which routes a request to one of
//! four adapter families behind the [`Adapter`] trait:
//!
//! - [`DocumentAdapter`]: DOCX extraction, text to PDF, CSV/JSON, and the
//!   headless office converter for everything else
//! - [`ScriptAdapter`]: interpreter scripts for PDF to DOCX and PDF tables
//! - [`ImageAdapter`]: in-process raster pipeline, PDF rasterization, image to PDF
//! - [`VideoAdapter`]: FFmpeg transcoding and ffprobe metadata
//!
//! # Example
//!
//! ```ignore
//! use omniconvert_core::converter::{ConversionRequest, ConversionService, ConverterConfig, MediaClass};
//!
//! let service = ConversionService::new(ConverterConfig::default(), "/srv/converted");
//!
//! let request = ConversionRequest::new("/srv/uploads/notes.csv", MediaClass::Document, "json");
//! let result = service.convert(&request).await?;
//! println!("Wrote {}", result.filename);
//! ```

mod config;
mod document;
pub mod docx;
mod error;
mod image;
mod paths;
pub mod pdf;
mod process;
mod resolver;
mod router;
mod script;
mod service;
mod traits;
mod types;
mod video;

pub use config::{ConverterConfig, ImageConfig, TimeoutConfig, ToolsConfig};
pub use document::{csv_to_json, json_to_csv, DocumentAdapter};
pub use error::{ConversionError, ErrorKind};
pub use self::image::{
    compute_resize_dimensions, read_image_metadata, Fit, ImageAdapter, ResizeRequest,
};
pub use paths::{resolve_output_path, stem_of, unique_stem};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner};
pub use resolver::{resolve, resolve_since, DirSnapshot};
pub use router::{route, RouteRule, DOCUMENT_FALLBACK, DOCUMENT_MATRIX, PRIORITY_ROUTES};
pub use script::ScriptAdapter;
pub use service::{normalize_target, ConversionService};
pub use traits::{Adapter, Invocation};
pub use types::*;
pub use video::{crf_for, parse_frame_rate, resolve_resolution, VideoAdapter};
