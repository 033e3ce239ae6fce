//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConversionError;
use super::types::{
    AdapterKind, AdapterOperation, ConversionOptions, ConversionResult, MediaMetadata,
};

/// Everything an adapter needs to run one operation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub operation: AdapterOperation,
    pub input: &'a Path,
    /// Lowercase target format token.
    pub target: &'a str,
    pub options: &'a ConversionOptions,
    /// Directory the artifact must be written to.
    pub output_dir: &'a Path,
}

/// One engine family behind the uniform conversion contract.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the name of this adapter implementation.
    fn name(&self) -> &str;

    /// The family of operations this adapter executes.
    fn kind(&self) -> AdapterKind;

    /// Runs an operation and returns the produced artifact.
    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError>;

    /// Reads metadata without producing an artifact.
    async fn inspect(&self, input: &Path) -> Result<MediaMetadata, ConversionError> {
        Err(ConversionError::unsupported(
            self.kind(),
            input.display().to_string(),
            "metadata",
        ))
    }

    /// Validates that the adapter's external tools are reachable.
    async fn validate(&self) -> Result<(), ConversionError> {
        Ok(())
    }
}

/// Error for an operation dispatched to the wrong adapter.
pub(crate) fn foreign_operation(adapter: AdapterKind, invocation: &Invocation<'_>) -> ConversionError {
    ConversionError::unsupported(
        adapter,
        invocation.operation.to_string(),
        invocation.target.to_string(),
    )
}
