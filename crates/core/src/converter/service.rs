//! Orchestration facade: the single entry point callers use.
//!
//! A request flows through [`route`], then the adapter owning the chosen
//! operation, and the produced artifact is checked on disk before the result
//! is handed back. Adapter error kinds are passed through untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use super::config::ConverterConfig;
use super::document::DocumentAdapter;
use super::error::{ConversionError, ErrorKind};
use super::image::ImageAdapter;
use super::router::route;
use super::script::ScriptAdapter;
use super::traits::{Adapter, Invocation};
use super::types::{
    extension_of, AdapterKind, AdapterOperation, ConversionRequest, ConversionResult,
    MediaClass, MediaMetadata,
};
use super::video::VideoAdapter;

/// Routes requests to the adapter families and validates their results.
pub struct ConversionService {
    document: Arc<dyn Adapter>,
    script: Arc<dyn Adapter>,
    image: Arc<dyn Adapter>,
    video: Arc<dyn Adapter>,
    output_dir: PathBuf,
}

impl ConversionService {
    /// Creates a service backed by the real adapters.
    pub fn new(config: ConverterConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_adapters(
            Arc::new(DocumentAdapter::new(config.clone())),
            Arc::new(ScriptAdapter::new(config.clone())),
            Arc::new(ImageAdapter::new(config.clone())),
            Arc::new(VideoAdapter::new(config)),
            output_dir,
        )
    }

    /// Creates a service from explicit adapters, one per family.
    pub fn with_adapters(
        document: Arc<dyn Adapter>,
        script: Arc<dyn Adapter>,
        image: Arc<dyn Adapter>,
        video: Arc<dyn Adapter>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            document,
            script,
            image,
            video,
            output_dir: output_dir.into(),
        }
    }

    /// Directory every artifact is written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn adapter(&self, kind: AdapterKind) -> &Arc<dyn Adapter> {
        match kind {
            AdapterKind::Document => &self.document,
            AdapterKind::Script => &self.script,
            AdapterKind::Image => &self.image,
            AdapterKind::Video => &self.video,
        }
    }

    /// Selects the operation that would serve `request`, without running it.
    pub fn plan(&self, request: &ConversionRequest) -> Result<AdapterOperation, ConversionError> {
        let target = normalize_target(&request.target_format)?;
        route(request.media_class, &request.input_extension(), &target)
    }

    /// Converts the request's source into its target format.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let span = info_span!(
            "convert",
            media_class = %request.media_class,
            input = %request.source_path.display(),
            target = %request.target_format,
        );
        async {
            check_source(&request.source_path)?;
            let operation = self.plan(request)?;
            self.dispatch(request, operation).await
        }
        .instrument(span)
        .await
    }

    /// Runs an explicitly chosen operation instead of the routed one, e.g.
    /// `resize` on an image or `trim` on a video.
    pub async fn perform(
        &self,
        request: &ConversionRequest,
        operation: AdapterOperation,
    ) -> Result<ConversionResult, ConversionError> {
        let span = info_span!(
            "perform",
            operation = %operation,
            input = %request.source_path.display(),
            target = %request.target_format,
        );
        async {
            check_source(&request.source_path)?;
            normalize_target(&request.target_format)?;
            if !operation.accepts(request.media_class) {
                return Err(ConversionError::unsupported(
                    request.media_class,
                    request.input_extension(),
                    operation.to_string(),
                ));
            }
            if operation.is_introspection() {
                return Err(ConversionError::invalid_input(format!(
                    "{operation} produces no artifact; inspect the file instead"
                )));
            }
            self.dispatch(request, operation).await
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        request: &ConversionRequest,
        operation: AdapterOperation,
    ) -> Result<ConversionResult, ConversionError> {
        let target = normalize_target(&request.target_format)?;
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| ConversionError::io(&self.output_dir, e))?;

        let adapter = self.adapter(operation.adapter());
        info!(operation = %operation, adapter = adapter.name(), "Dispatching conversion");

        let start = Instant::now();
        let outcome = adapter
            .execute(Invocation {
                operation,
                input: &request.source_path,
                target: &target,
                options: &request.options,
                output_dir: &self.output_dir,
            })
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if e.kind() == ErrorKind::InvalidInput {
                    warn!(operation = %operation, kind = %e.kind(), error = %e, "Conversion rejected");
                } else {
                    error!(
                        operation = %operation,
                        kind = %e.kind(),
                        command = e.underlying_command().unwrap_or("-"),
                        error = %e,
                        "Conversion failed"
                    );
                }
                return Err(e);
            }
        };

        if !result.output_path.is_file() {
            error!(operation = %operation, output = %result.output_path.display(), "Adapter reported a missing artifact");
            return Err(ConversionError::output_not_found(
                result.output_path.display().to_string(),
            ));
        }

        for warning in &result.warnings {
            warn!(operation = %operation, warning = %warning, "Conversion warning");
        }
        info!(
            operation = %operation,
            filename = %result.filename,
            auxiliary = result.auxiliary_files.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Conversion completed"
        );
        Ok(result)
    }

    /// Reads metadata of an image, video or audio file.
    pub async fn inspect(
        &self,
        path: &Path,
        media_class: MediaClass,
    ) -> Result<MediaMetadata, ConversionError> {
        check_source(path)?;
        match media_class {
            MediaClass::Image => self.image.inspect(path).await,
            MediaClass::Video | MediaClass::Audio => self.video.inspect(path).await,
            MediaClass::Document | MediaClass::Archive => Err(ConversionError::unsupported(
                media_class,
                extension_of(path),
                "metadata",
            )),
        }
    }

    /// Probes every adapter's external tools, reporting each family.
    pub async fn validate_tools(&self) -> Vec<(AdapterKind, Result<(), ConversionError>)> {
        let mut report = Vec::with_capacity(4);
        for kind in [
            AdapterKind::Document,
            AdapterKind::Script,
            AdapterKind::Image,
            AdapterKind::Video,
        ] {
            let outcome = self.adapter(kind).validate().await;
            if let Err(e) = &outcome {
                warn!(adapter = %kind, error = %e, "Tool check failed");
            }
            report.push((kind, outcome));
        }
        report
    }
}

fn check_source(path: &Path) -> Result<(), ConversionError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConversionError::invalid_input(format!(
            "source file does not exist: {}",
            path.display()
        )))
    }
}

/// Lowercases a target token, rejecting anything but ASCII letters and digits.
pub fn normalize_target(target: &str) -> Result<String, ConversionError> {
    let target = target.trim().to_ascii_lowercase();
    if target.is_empty() || !target.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConversionError::invalid_input(format!(
            "target format must be a non-empty alphanumeric token, got '{target}'"
        )));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{DocumentOp, ImageOp};

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("PDF").unwrap(), "pdf");
        assert_eq!(normalize_target(" mp3 ").unwrap(), "mp3");
        assert!(normalize_target("").is_err());
        assert!(normalize_target(".pdf").is_err());
        assert!(normalize_target("../pdf").is_err());
    }

    #[test]
    fn test_plan_uses_router() {
        let service = ConversionService::new(ConverterConfig::default(), "/tmp/unused");
        let request = ConversionRequest::new("/in/notes.CSV", MediaClass::Document, "JSON");
        assert_eq!(
            service.plan(&request).unwrap(),
            AdapterOperation::Document(DocumentOp::CsvToJson)
        );

        let request = ConversionRequest::new("/in/a.png", MediaClass::Image, "jpg");
        assert_eq!(
            service.plan(&request).unwrap(),
            AdapterOperation::Image(ImageOp::Convert)
        );

        let request = ConversionRequest::new("/in/a.zip", MediaClass::Archive, "tar");
        assert_eq!(
            service.plan(&request).unwrap_err().kind(),
            ErrorKind::UnsupportedConversion
        );
    }
}
