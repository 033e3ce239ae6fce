//! Script adapter: converters implemented as interpreter scripts.
//!
//! Scripts are invoked as `<interpreter> <script> <input> <output>` and must
//! write exactly `<output>`; no directory search is attempted.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::config::ConverterConfig;
use super::error::ConversionError;
use super::paths::resolve_output_path;
use super::process::{CommandSpec, ProcessRunner};
use super::traits::{foreign_operation, Adapter, Invocation};
use super::types::{AdapterKind, AdapterOperation, ConversionResult, ScriptOp};

/// Executes [`ScriptOp`] operations under the script timeout.
pub struct ScriptAdapter {
    config: ConverterConfig,
    runner: ProcessRunner,
}

impl ScriptAdapter {
    pub fn new(config: ConverterConfig) -> Self {
        let runner = ProcessRunner::new(config.timeouts.script());
        Self { config, runner }
    }

    fn script_for(&self, op: ScriptOp) -> &Path {
        match op {
            ScriptOp::PdfToDocx => &self.config.tools.pdf_to_docx_script,
            ScriptOp::PdfToSpreadsheet => &self.config.tools.pdf_to_excel_script,
        }
    }

    async fn run_script(
        &self,
        op: ScriptOp,
        input: &Path,
        output: PathBuf,
    ) -> Result<ConversionResult, ConversionError> {
        let script = self.script_for(op);
        let spec = CommandSpec::new(&self.config.tools.python_path)
            .arg(script)
            .arg(input)
            .arg(&output);

        let tool = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        let finished = self.runner.run(&spec).await?.ensure_success(&tool)?;
        if !finished.stdout.trim().is_empty() {
            debug!(script = %tool, stdout = %finished.stdout.trim(), "Script output");
        }

        if !output.is_file() {
            warn!(script = %tool, expected = %output.display(), "Script exited cleanly without output");
            return Err(
                ConversionError::output_not_found(output.display().to_string())
                    .with_command(finished.command),
            );
        }
        Ok(ConversionResult::new(output))
    }
}

#[async_trait]
impl Adapter for ScriptAdapter {
    fn name(&self) -> &str {
        "script"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Script
    }

    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError> {
        let AdapterOperation::Script(op) = invocation.operation else {
            return Err(foreign_operation(self.kind(), &invocation));
        };
        let Invocation {
            input,
            target,
            output_dir,
            ..
        } = invocation;

        let mut warnings = Vec::new();
        let extension = match op {
            // The engine only writes the Office Open XML format.
            ScriptOp::PdfToDocx => {
                if target != "docx" {
                    warnings.push(format!("Requested {target}, produced docx"));
                }
                "docx"
            }
            ScriptOp::PdfToSpreadsheet => match target {
                "xlsx" | "csv" => target,
                _ => return Err(foreign_operation(self.kind(), &invocation)),
            },
        };

        let output = resolve_output_path(input, extension, output_dir);
        info!(op = ?op, input = %input.display(), output = %output.display(), "Running script converter");
        let result = self.run_script(op, input, output).await?;
        Ok(result.with_warnings(warnings))
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        let version = self
            .runner
            .probe_version(&self.config.tools.python_path, "--version")
            .await?;
        debug!(version = %version, "Script interpreter available");
        for op in [ScriptOp::PdfToDocx, ScriptOp::PdfToSpreadsheet] {
            let script = self.script_for(op);
            if !script.is_file() {
                return Err(ConversionError::external(format!(
                    "Converter script not found: {}",
                    script.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::converter::{ConversionOptions, ErrorKind};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        input: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let input = dir.path().join("scan.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            Self { dir, input }
        }

        /// Adapter running `body` as a shell script with `/bin/sh`.
        fn adapter(&self, body: &str, timeout_secs: u64) -> ScriptAdapter {
            let script = self.dir.path().join("convert.sh");
            std::fs::write(&script, body).unwrap();
            let mut config = ConverterConfig::default()
                .with_script_timeout(timeout_secs)
                .with_pdf_to_docx(PathBuf::from("/bin/sh"), script.clone());
            config.tools.pdf_to_excel_script = script;
            ScriptAdapter::new(config)
        }

        async fn run(
            &self,
            adapter: &ScriptAdapter,
            op: ScriptOp,
            target: &str,
        ) -> Result<ConversionResult, ConversionError> {
            let options = ConversionOptions::new();
            adapter
                .execute(Invocation {
                    operation: AdapterOperation::Script(op),
                    input: &self.input,
                    target,
                    options: &options,
                    output_dir: self.dir.path(),
                })
                .await
        }
    }

    #[tokio::test]
    async fn test_pdf_to_docx_success() {
        let fx = Fixture::new();
        let adapter = fx.adapter(r#"cp "$1" "$2""#, 10);
        let result = fx.run(&adapter, ScriptOp::PdfToDocx, "docx").await.unwrap();
        assert!(result.filename.starts_with("scan_"));
        assert!(result.filename.ends_with(".docx"));
        assert!(result.output_path.is_file());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_doc_request_yields_docx() {
        let fx = Fixture::new();
        let adapter = fx.adapter(r#"cp "$1" "$2""#, 10);
        let result = fx.run(&adapter, ScriptOp::PdfToDocx, "doc").await.unwrap();
        assert!(result.filename.ends_with(".docx"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_spreadsheet_extension_follows_target() {
        let fx = Fixture::new();
        let adapter = fx.adapter(r#"echo "a,b" > "$2""#, 10);
        let result = fx.run(&adapter, ScriptOp::PdfToSpreadsheet, "csv").await.unwrap();
        assert!(result.filename.ends_with(".csv"));

        let err = fx
            .run(&adapter, ScriptOp::PdfToSpreadsheet, "ods")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let fx = Fixture::new();
        let adapter = fx.adapter("echo 'no module named pdf2docx' >&2; exit 2", 10);
        let err = fx.run(&adapter, ScriptOp::PdfToDocx, "docx").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
        match err {
            ConversionError::ExternalToolFailure { stderr, .. } => {
                assert!(stderr.unwrap().contains("pdf2docx"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_without_output() {
        let fx = Fixture::new();
        let adapter = fx.adapter("exit 0", 10);
        let err = fx.run(&adapter, ScriptOp::PdfToDocx, "docx").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputNotFound);
        assert!(err.underlying_command().unwrap().starts_with("/bin/sh"));
    }

    #[tokio::test]
    async fn test_timeout_kills_script() {
        let fx = Fixture::new();
        let adapter = fx.adapter(r#"sleep 30; cp "$1" "$2""#, 1);
        let start = Instant::now();
        let err = fx.run(&adapter, ScriptOp::PdfToDocx, "docx").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(20));
    }
}
