//! Image adapter: raster pipeline on the `image` crate, PDF pages through
//! poppler's `pdftoppm`, and single-image PDFs through [`super::pdf`].

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use super::config::ConverterConfig;
use super::error::ConversionError;
use super::paths::{resolve_output_path, unique_stem};
use super::pdf::{self, EmbeddedImage};
use super::process::{run_blocking, CommandSpec, ProcessRunner};
use super::traits::{foreign_operation, Adapter, Invocation};
use super::types::{
    extension_of, AdapterKind, AdapterOperation, ConversionOptions, ConversionResult, ImageMetadata,
    ImageOp, MediaMetadata,
};

/// How an image is fitted into a requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Preserve aspect ratio, fit within the box.
    #[default]
    Inside,
    /// Preserve aspect ratio, cover the box.
    Outside,
    /// Fill the box exactly, cropping the overflow.
    Cover,
    /// Fit within the box, padding the rest with transparency.
    Contain,
    /// Stretch to the box.
    Fill,
}

impl FromStr for Fit {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            other => Err(ConversionError::invalid_input(format!(
                "unknown fit mode: {other}"
            ))),
        }
    }
}

/// A resize requested through `width`, `height` and `fit` options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
}

impl ResizeRequest {
    /// Reads the resize options; `None` when neither dimension is given.
    pub fn from_options(options: &ConversionOptions) -> Result<Option<Self>, ConversionError> {
        let width = options.get_dimension("width")?;
        let height = options.get_dimension("height")?;
        if width.is_none() && height.is_none() {
            return Ok(None);
        }
        let fit = match options.get_str("fit") {
            Some(fit) => fit.parse()?,
            None => Fit::default(),
        };
        Ok(Some(Self { width, height, fit }))
    }

    /// Applies the resize. Images are never enlarged.
    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        let source = (img.width(), img.height());
        let (tw, th) = compute_resize_dimensions(source, self.width, self.height, self.fit);
        let resized = if (tw, th) == source {
            img
        } else {
            img.resize_exact(tw, th, FilterType::Lanczos3)
        };

        let (Some(w), Some(h)) = (self.width, self.height) else {
            return resized;
        };
        match self.fit {
            Fit::Cover => {
                let (cw, ch) = (w.min(tw), h.min(th));
                resized.crop_imm((tw - cw) / 2, (th - ch) / 2, cw, ch)
            }
            Fit::Contain => {
                let (cw, ch) = (w.min(source.0), h.min(source.1));
                let mut canvas = RgbaImage::new(cw, ch);
                let x = cw.saturating_sub(tw) / 2;
                let y = ch.saturating_sub(th) / 2;
                image::imageops::overlay(&mut canvas, &resized.to_rgba8(), x as i64, y as i64);
                DynamicImage::ImageRgba8(canvas)
            }
            _ => resized,
        }
    }
}

/// Scaled size of a `source` image for the requested box, before any
/// cover crop or contain padding.
///
/// With one dimension the other follows the aspect ratio. The scale factor
/// never exceeds 1.
pub fn compute_resize_dimensions(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
) -> (u32, u32) {
    let (sw, sh) = source;
    if sw == 0 || sh == 0 {
        return source;
    }
    let ratio = |target: u32, actual: u32| target as f64 / actual as f64;

    match (width, height) {
        (None, None) => source,
        (Some(w), None) => scale(source, ratio(w, sw).min(1.0)),
        (None, Some(h)) => scale(source, ratio(h, sh).min(1.0)),
        (Some(w), Some(h)) => {
            let (rw, rh) = (ratio(w, sw), ratio(h, sh));
            match fit {
                Fit::Fill => (w.min(sw), h.min(sh)),
                Fit::Inside | Fit::Contain => scale(source, rw.min(rh).min(1.0)),
                Fit::Outside | Fit::Cover => scale(source, rw.max(rh).min(1.0)),
            }
        }
    }
}

fn scale((w, h): (u32, u32), factor: f64) -> (u32, u32) {
    if factor >= 1.0 {
        return (w, h);
    }
    let scaled = |v: u32| ((v as f64 * factor).round() as u32).max(1);
    (scaled(w), scaled(h))
}

/// Encoder settings for one output.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Encoding {
    Jpeg(u8),
    PngBest,
    WebpLossless,
    Standard(ImageFormat),
}

fn raster_format(extension: &str) -> Option<ImageFormat> {
    match ImageFormat::from_extension(extension)? {
        format @ (ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::WebP
        | ImageFormat::Gif
        | ImageFormat::Tiff
        | ImageFormat::Bmp) => Some(format),
        _ => None,
    }
}

/// 8-bit RGB(A), which every enabled encoder accepts.
fn to_8bit(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

fn encode(img: &DynamicImage, encoding: Encoding) -> Result<Vec<u8>, ConversionError> {
    let mut buffer = Cursor::new(Vec::new());
    let result = match encoding {
        Encoding::Jpeg(quality) => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality)),
        Encoding::PngBest => to_8bit(img).write_with_encoder(PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Best,
            PngFilter::Adaptive,
        )),
        Encoding::WebpLossless => {
            to_8bit(img).write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
        }
        Encoding::Standard(format) => to_8bit(img).write_to(&mut buffer, format),
    };
    result.map_err(|e| ConversionError::external(format!("Failed to encode image: {e}")))?;
    Ok(buffer.into_inner())
}

fn quality_ignored(format: &str) -> String {
    format!("Option 'quality' is ignored for {format} output")
}

fn decode(path: &Path) -> Result<DynamicImage, ConversionError> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| ConversionError::invalid_input(format!("Cannot read {}: {e}", path.display())))?
        .decode()
        .map_err(|e| ConversionError::invalid_input(format!("Cannot decode {}: {e}", path.display())))
}

/// Reads dimensions, format and alpha without decoding pixel data.
pub fn read_image_metadata(path: &Path) -> Result<ImageMetadata, ConversionError> {
    let invalid = |reason: String| {
        ConversionError::invalid_input(format!("Cannot read {}: {reason}", path.display()))
    };
    let size_bytes = std::fs::metadata(path)
        .map_err(|e| invalid(e.to_string()))?
        .len();
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| invalid(e.to_string()))?;
    let format = reader
        .format()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown")
        .to_string();
    let decoder = reader.into_decoder().map_err(|e| invalid(e.to_string()))?;
    let (width, height) = decoder.dimensions();

    Ok(ImageMetadata {
        width,
        height,
        format,
        size_bytes,
        has_alpha: decoder.color_type().has_alpha(),
    })
}

/// Prepares an image for embedding: JPEG content passes through, anything
/// else is decoded into RGB plus an optional alpha plane. The format is
/// sniffed from the bytes, never from the file name.
fn embeddable(path: &Path) -> Result<EmbeddedImage, ConversionError> {
    let data = std::fs::read(path).map_err(|e| {
        ConversionError::invalid_input(format!("Cannot read {}: {e}", path.display()))
    })?;
    let reader = ImageReader::new(Cursor::new(data.as_slice()))
        .with_guessed_format()
        .map_err(|e| ConversionError::invalid_input(e.to_string()))?;
    if reader.format() == Some(ImageFormat::Jpeg) {
        let (width, height, grayscale) = {
            let decoder = reader
                .into_decoder()
                .map_err(|e| ConversionError::invalid_input(format!("Invalid JPEG: {e}")))?;
            let (width, height) = decoder.dimensions();
            (width, height, decoder.color_type().channel_count() == 1)
        };
        return Ok(EmbeddedImage::Jpeg {
            data,
            width,
            height,
            grayscale,
        });
    }

    let img = reader
        .decode()
        .map_err(|e| ConversionError::invalid_input(format!("Cannot decode {}: {e}", path.display())))?;
    let (width, height) = (img.width(), img.height());
    if img.color().has_alpha() {
        let rgba = img.to_rgba8().into_raw();
        let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(rgba.len() / 4);
        for px in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        Ok(EmbeddedImage::Pixels {
            rgb,
            alpha: Some(alpha),
            width,
            height,
        })
    } else {
        Ok(EmbeddedImage::Pixels {
            rgb: img.to_rgb8().into_raw(),
            alpha: None,
            width,
            height,
        })
    }
}

/// Executes [`ImageOp`] operations.
pub struct ImageAdapter {
    config: ConverterConfig,
    runner: ProcessRunner,
}

impl ImageAdapter {
    pub fn new(config: ConverterConfig) -> Self {
        let runner = ProcessRunner::new(config.timeouts.subprocess());
        Self { config, runner }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Decodes the input, applies `work` and writes the bytes it returns.
    async fn transform<F>(
        &self,
        input: &Path,
        output: PathBuf,
        work: F,
    ) -> Result<ConversionResult, ConversionError>
    where
        F: FnOnce(DynamicImage) -> Result<Vec<u8>, ConversionError> + Send + 'static,
    {
        let source = input.to_path_buf();
        let dest = output.clone();
        run_blocking(move || {
            let bytes = work(decode(&source)?)?;
            std::fs::write(&dest, bytes).map_err(|e| ConversionError::io(&dest, e))
        })
        .await?;
        Ok(ConversionResult::new(output))
    }

    async fn convert(
        &self,
        input: &Path,
        target: &str,
        options: &ConversionOptions,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let format = raster_format(target)
            .ok_or_else(|| ConversionError::unsupported("image", extension_of(input), target))?;
        let resize = ResizeRequest::from_options(options)?;

        let mut warnings = Vec::new();
        let requested = options.get_quality("quality")?;
        let encoding = if format == ImageFormat::Jpeg {
            Encoding::Jpeg(requested.unwrap_or(self.config.image.default_jpeg_quality))
        } else {
            if requested.is_some() {
                warnings.push(quality_ignored(target));
            }
            Encoding::Standard(format)
        };

        let output = resolve_output_path(input, target, output_dir);
        let result = self
            .transform(input, output, move |img| {
                let img = match resize {
                    Some(resize) => resize.apply(img),
                    None => img,
                };
                encode(&img, encoding)
            })
            .await?;
        Ok(result.with_warnings(warnings))
    }

    async fn compress(
        &self,
        input: &Path,
        options: &ConversionOptions,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let requested = options.get_quality("quality")?;
        let quality = requested.unwrap_or(self.config.image.default_compress_quality);
        let extension = extension_of(input);
        let mut warnings = Vec::new();
        let (encoding, extension) = match raster_format(&extension) {
            Some(ImageFormat::Jpeg) => (Encoding::Jpeg(quality), extension),
            Some(ImageFormat::Png) => {
                if requested.is_some() {
                    warnings.push(quality_ignored(&extension));
                }
                (Encoding::PngBest, extension)
            }
            Some(ImageFormat::WebP) => {
                if requested.is_some() {
                    warnings.push(quality_ignored(&extension));
                }
                warnings.push(
                    "WebP is re-encoded losslessly; the output may be larger than the input"
                        .to_string(),
                );
                (Encoding::WebpLossless, extension)
            }
            _ => (Encoding::Jpeg(quality), "jpg".to_string()),
        };

        let output = resolve_output_path(input, &extension, output_dir);
        let result = self
            .transform(input, output, move |img| encode(&img, encoding))
            .await?;
        Ok(result.with_warnings(warnings))
    }

    async fn resize(
        &self,
        input: &Path,
        options: &ConversionOptions,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let resize = ResizeRequest::from_options(options)?.ok_or_else(|| {
            ConversionError::invalid_input("resize requires a 'width' or 'height' option")
        })?;
        let (encoding, extension) = self.same_format(input)?;
        let output = resolve_output_path(input, &extension, output_dir);
        self.transform(input, output, move |img| encode(&resize.apply(img), encoding))
            .await
    }

    async fn crop(
        &self,
        input: &Path,
        options: &ConversionOptions,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let required = |key: &str, value: Option<u32>| {
            value.ok_or_else(|| ConversionError::invalid_input(format!("crop requires '{key}'")))
        };
        let left = required("left", options.get_offset("left")?)?;
        let top = required("top", options.get_offset("top")?)?;
        let width = required("width", options.get_dimension("width")?)?;
        let height = required("height", options.get_dimension("height")?)?;

        let (encoding, extension) = self.same_format(input)?;
        let output = resolve_output_path(input, &extension, output_dir);
        self.transform(input, output, move |img| {
            let fits = |offset: u32, size: u32, limit: u32| offset as u64 + size as u64 <= limit as u64;
            if !fits(left, width, img.width()) || !fits(top, height, img.height()) {
                return Err(ConversionError::invalid_input(format!(
                    "crop region {width}x{height}+{left}+{top} exceeds image bounds {}x{}",
                    img.width(),
                    img.height()
                )));
            }
            encode(&img.crop_imm(left, top, width, height), encoding)
        })
        .await
    }

    /// Encoder and extension that keep the input's format.
    fn same_format(&self, input: &Path) -> Result<(Encoding, String), ConversionError> {
        let extension = extension_of(input);
        match raster_format(&extension) {
            Some(ImageFormat::Jpeg) => Ok((
                Encoding::Jpeg(self.config.image.default_jpeg_quality),
                extension,
            )),
            Some(format) => Ok((Encoding::Standard(format), extension)),
            None => Err(ConversionError::unsupported("image", extension.clone(), extension)),
        }
    }

    /// Rasterizes PDF pages. Page one is the result, later pages are
    /// auxiliary files.
    async fn pdf_to_image(
        &self,
        input: &Path,
        target: &str,
        options: &ConversionOptions,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let flag = match target {
            "png" => "-png",
            "jpg" | "jpeg" => "-jpeg",
            "tiff" | "tif" => "-tiff",
            _ => return Err(ConversionError::unsupported("image", "pdf", target)),
        };
        let dpi = options
            .get_dimension("dpi")?
            .unwrap_or(self.config.image.pdf_dpi);
        let prefix = unique_stem(input);

        let mut spec = CommandSpec::new(&self.config.tools.pdftoppm_path)
            .arg(flag)
            .args(["-r".to_string(), dpi.to_string()]);
        if flag == "-jpeg" {
            if let Some(quality) = options.get_quality("quality")? {
                spec = spec.args(["-jpegopt".to_string(), format!("quality={quality}")]);
            }
        }
        if let Some(page) = options.get_dimension("page")? {
            spec = spec.args([
                "-f".to_string(),
                page.to_string(),
                "-l".to_string(),
                page.to_string(),
            ]);
        }
        let spec = spec.arg(input).arg(output_dir.join(&prefix));

        let finished = self.runner.run(&spec).await?.ensure_success("pdftoppm")?;

        let mut pages: Vec<PathBuf> = std::fs::read_dir(output_dir)
            .map_err(|e| ConversionError::io(output_dir, e))?
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();
        pages.sort();
        debug!(prefix = %prefix, pages = pages.len(), "Rasterized PDF pages");

        let mut pages = pages.into_iter();
        let Some(first) = pages.next() else {
            return Err(ConversionError::output_not_found(
                output_dir.join(format!("{prefix}-1.{target}")).display().to_string(),
            )
            .with_command(finished.command));
        };
        Ok(ConversionResult::new(first).with_auxiliary_files(pages.collect()))
    }

    async fn image_to_pdf(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let output = resolve_output_path(input, "pdf", output_dir);
        let source = input.to_path_buf();
        let dest = output.clone();
        run_blocking(move || {
            let bytes = pdf::render_image(embeddable(&source)?)?;
            std::fs::write(&dest, bytes).map_err(|e| ConversionError::io(&dest, e))
        })
        .await?;
        Ok(ConversionResult::new(output))
    }
}

#[async_trait]
impl Adapter for ImageAdapter {
    fn name(&self) -> &str {
        "image"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Image
    }

    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError> {
        let AdapterOperation::Image(op) = invocation.operation else {
            return Err(foreign_operation(self.kind(), &invocation));
        };
        let Invocation {
            input,
            target,
            options,
            output_dir,
            ..
        } = invocation;

        info!(op = ?op, input = %input.display(), target = %target, "Processing image");
        let result = match op {
            ImageOp::Convert => self.convert(input, target, options, output_dir).await,
            ImageOp::Compress => self.compress(input, options, output_dir).await,
            ImageOp::Resize => self.resize(input, options, output_dir).await,
            ImageOp::Crop => self.crop(input, options, output_dir).await,
            ImageOp::PdfToImage => self.pdf_to_image(input, target, options, output_dir).await,
            ImageOp::ImageToPdf => self.image_to_pdf(input, output_dir).await,
            // Produces no artifact; served by `inspect`.
            ImageOp::Metadata => Err(foreign_operation(self.kind(), &invocation)),
        }?;
        info!(output = %result.output_path.display(), "Image processed");
        Ok(result)
    }

    async fn inspect(&self, input: &Path) -> Result<MediaMetadata, ConversionError> {
        let path = input.to_path_buf();
        let metadata = run_blocking(move || read_image_metadata(&path)).await?;
        Ok(MediaMetadata::Image(metadata))
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        let version = self
            .runner
            .probe_version(&self.config.tools.pdftoppm_path, "-v")
            .await?;
        debug!(version = %version, "PDF rasterizer available");
        Ok(())
    }
}
