//! Mock adapter for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{
    resolve_output_path, Adapter, AdapterKind, AdapterOperation, ConversionError,
    ConversionOptions, ConversionResult, Invocation, MediaMetadata,
};

/// A recorded invocation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub operation: AdapterOperation,
    pub input: PathBuf,
    pub target: String,
    pub options: ConversionOptions,
    pub output_dir: PathBuf,
    /// Whether the invocation succeeded.
    pub success: bool,
}

/// Mock implementation of the Adapter trait.
///
/// Provides controllable behavior for testing:
/// - Track invocations for assertions
/// - Inject the error returned by the next call
/// - Skip writing the artifact to exercise post-condition checks
/// - Control metadata returned by `inspect`
///
/// # Example
///
/// ```rust,ignore
/// use omniconvert_core::testing::MockAdapter;
///
/// let document = Arc::new(MockAdapter::new(AdapterKind::Document));
/// document.set_next_error(ConversionError::external("soffice crashed")).await;
///
/// let err = service.convert(&request).await.unwrap_err();
/// assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
/// assert_eq!(document.invocation_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    kind: AdapterKind,
    invocations: Arc<RwLock<Vec<RecordedInvocation>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<ConversionError>>>,
    /// Whether `execute` writes the artifact it reports.
    write_output: Arc<RwLock<bool>>,
    warnings: Arc<RwLock<Vec<String>>>,
    metadata: Arc<RwLock<Option<MediaMetadata>>>,
}

impl MockAdapter {
    /// Create a new mock standing in for the `kind` family.
    pub fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            invocations: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            write_output: Arc::new(RwLock::new(true)),
            warnings: Arc::new(RwLock::new(Vec::new())),
            metadata: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all recorded invocations.
    pub async fn recorded_invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.read().await.clone()
    }

    /// Get the number of invocations performed.
    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ConversionError) {
        *self.next_error.write().await = Some(error);
    }

    /// Report success without writing the artifact.
    pub async fn set_write_output(&self, write: bool) {
        *self.write_output.write().await = write;
    }

    /// Warnings attached to every successful result.
    pub async fn set_warnings(&self, warnings: Vec<String>) {
        *self.warnings.write().await = warnings;
    }

    /// Metadata returned by `inspect`.
    pub async fn set_metadata(&self, metadata: MediaMetadata) {
        *self.metadata.write().await = Some(metadata);
    }

    async fn take_error(&self) -> Option<ConversionError> {
        self.next_error.write().await.take()
    }

    async fn record(&self, invocation: &Invocation<'_>, success: bool) {
        self.invocations.write().await.push(RecordedInvocation {
            operation: invocation.operation,
            input: invocation.input.to_path_buf(),
            target: invocation.target.to_string(),
            options: invocation.options.clone(),
            output_dir: invocation.output_dir.to_path_buf(),
            success,
        });
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> AdapterKind {
        self.kind
    }

    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError> {
        if let Some(err) = self.take_error().await {
            self.record(&invocation, false).await;
            return Err(err);
        }
        self.record(&invocation, true).await;

        let output = resolve_output_path(invocation.input, invocation.target, invocation.output_dir);
        if *self.write_output.read().await {
            tokio::fs::write(&output, b"mock artifact")
                .await
                .map_err(|e| ConversionError::io(&output, e))?;
        }
        let warnings = self.warnings.read().await.clone();
        Ok(ConversionResult::new(output).with_warnings(warnings))
    }

    async fn inspect(&self, input: &Path) -> Result<MediaMetadata, ConversionError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.metadata.read().await.clone().ok_or_else(|| {
            ConversionError::unsupported(self.kind, input.display().to_string(), "metadata")
        })
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}
