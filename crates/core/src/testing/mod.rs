//! Testing utilities and mock implementations.
//!
//! [`MockAdapter`] stands in for any adapter family so the conversion facade
//! can be exercised without external tools installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use omniconvert_core::testing::MockAdapter;
//!
//! let image = Arc::new(MockAdapter::new(AdapterKind::Image));
//! let service = ConversionService::with_adapters(document, script, image.clone(), video, dir);
//!
//! service.convert(&request).await?;
//! assert_eq!(image.invocation_count().await, 1);
//! ```

mod mock_adapter;

pub use mock_adapter::{MockAdapter, RecordedInvocation};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};

    /// WordprocessingML namespace used by fixture documents.
    pub const WORD_NAMESPACE: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// Write `contents` to `dir/name` and return the path.
    pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write a minimal DOCX container whose body is `body_xml`.
    pub fn write_docx(dir: &Path, name: &str, body_xml: &str) -> io::Result<PathBuf> {
        let path = dir.join(name);
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path)?);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .map_err(io::Error::other)?;
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WORD_NAMESPACE}"><w:body>{body_xml}</w:body></w:document>"#
        )?;
        zip.finish().map_err(io::Error::other)?;
        Ok(path)
    }

    /// Write a solid-color RGB image; the format follows the extension.
    pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> io::Result<PathBuf> {
        let path = dir.join(name);
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]))
            .save(&path)
            .map_err(io::Error::other)?;
        Ok(path)
    }
}
