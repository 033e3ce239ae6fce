//! Document adapter: in-process text formats plus the headless office
//! converter for everything else.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use super::config::ConverterConfig;
use super::docx;
use super::error::ConversionError;
use super::paths::{resolve_output_path, stem_of};
use super::pdf;
use super::process::{run_blocking, CommandSpec, ProcessRunner};
use super::resolver::{resolve_since, DirSnapshot};
use super::traits::{foreign_operation, Adapter, Invocation};
use super::types::{AdapterKind, AdapterOperation, ConversionResult, DocumentOp};

/// Executes [`DocumentOp`] operations.
pub struct DocumentAdapter {
    config: ConverterConfig,
    runner: ProcessRunner,
}

impl DocumentAdapter {
    pub fn new(config: ConverterConfig) -> Self {
        let runner = ProcessRunner::new(config.timeouts.subprocess());
        Self { config, runner }
    }

    /// Creates an adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    async fn docx(
        &self,
        input: &Path,
        output_dir: &Path,
        op: DocumentOp,
    ) -> Result<ConversionResult, ConversionError> {
        let target = if op == DocumentOp::DocxToHtml { "html" } else { "txt" };
        let output = resolve_output_path(input, target, output_dir);
        let source = input.to_path_buf();

        let content = run_blocking(move || {
            let file = std::fs::File::open(&source).map_err(|e| read_error(&source, e))?;
            docx::extract(std::io::BufReader::new(file))
        })
        .await?;

        for warning in &content.warnings {
            debug!(input = %input.display(), warning = %warning, "Document extraction warning");
        }

        let body = if op == DocumentOp::DocxToHtml {
            html_document(&content.html)
        } else {
            content.text
        };
        write_output(&output, body.as_bytes()).await?;
        Ok(ConversionResult::new(output).with_warnings(content.warnings))
    }

    async fn text_to_pdf(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let output = resolve_output_path(input, "pdf", output_dir);
        let text = read_text(input).await?;
        let bytes = run_blocking(move || pdf::render_text(&text)).await?;
        write_output(&output, &bytes).await?;
        Ok(ConversionResult::new(output))
    }

    async fn csv_to_json(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let output = resolve_output_path(input, "json", output_dir);
        let json = csv_to_json(&read_text(input).await?)?;
        write_output(&output, json.as_bytes()).await?;
        Ok(ConversionResult::new(output))
    }

    async fn json_to_csv(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let output = resolve_output_path(input, "csv", output_dir);
        let csv = json_to_csv(&read_text(input).await?)?;
        write_output(&output, csv.as_bytes()).await?;
        Ok(ConversionResult::new(output))
    }

    /// Delegates to the office converter and locates what it wrote.
    async fn office_convert(
        &self,
        input: &Path,
        target: &str,
        output_dir: &Path,
    ) -> Result<ConversionResult, ConversionError> {
        let spec = CommandSpec::new(&self.config.tools.soffice_path)
            .args(["--headless", "--convert-to", target, "--outdir"])
            .arg(output_dir)
            .arg(input);

        let before = DirSnapshot::take(output_dir);
        let output = self.runner.run(&spec).await?.ensure_success("soffice")?;
        let path = resolve_since(&stem_of(input), target, output_dir, &before)
            .map_err(|e| e.with_command(output.command.clone()))?;
        Ok(ConversionResult::new(path))
    }
}

#[async_trait]
impl Adapter for DocumentAdapter {
    fn name(&self) -> &str {
        "document"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Document
    }

    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError> {
        let AdapterOperation::Document(op) = invocation.operation else {
            return Err(foreign_operation(self.kind(), &invocation));
        };
        let Invocation {
            input,
            target,
            output_dir,
            ..
        } = invocation;

        info!(op = ?op, input = %input.display(), target = %target, "Converting document");
        let result = match op {
            DocumentOp::DocxToHtml | DocumentOp::DocxToText => {
                self.docx(input, output_dir, op).await
            }
            DocumentOp::TextToPdf => self.text_to_pdf(input, output_dir).await,
            DocumentOp::CsvToJson => self.csv_to_json(input, output_dir).await,
            DocumentOp::JsonToCsv => self.json_to_csv(input, output_dir).await,
            DocumentOp::OfficeConvert => self.office_convert(input, target, output_dir).await,
        }?;
        info!(output = %result.output_path.display(), warnings = result.warnings.len(), "Document converted");
        Ok(result)
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        let version = self
            .runner
            .probe_version(&self.config.tools.soffice_path, "--version")
            .await?;
        debug!(version = %version, "Office converter available");
        Ok(())
    }
}

/// Wraps an HTML fragment in the standalone page served to users.
fn html_document(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Converted Document</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }}
    </style>
</head>
<body>
{body}
</body>
</html>"#
    )
}

/// Converts naive comma separated text into a pretty-printed JSON array.
///
/// No quoting rules apply: every `"` is removed and values never contain
/// commas. Short rows are padded with empty strings, long rows truncated.
pub fn csv_to_json(content: &str) -> Result<String, ConversionError> {
    let mut lines = content.trim().split('\n');
    let headers: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .split(',')
        .map(unquote)
        .collect();

    let rows: Vec<Value> = lines
        .map(|line| {
            let values: Vec<String> = line.split(',').map(unquote).collect();
            let row: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = values.get(i).cloned().unwrap_or_default();
                    (header.clone(), Value::String(value))
                })
                .collect();
            Value::Object(row)
        })
        .collect();

    serde_json::to_string_pretty(&rows)
        .map_err(|e| ConversionError::external(format!("Failed to serialize JSON: {e}")))
}

fn unquote(field: &str) -> String {
    field.trim().replace('"', "")
}

/// Flattens a JSON array of objects into comma separated text.
///
/// The first element's keys form the header. Values containing a comma are
/// wrapped in double quotes; embedded quotes are not escaped.
pub fn json_to_csv(content: &str) -> Result<String, ConversionError> {
    let data: Value = serde_json::from_str(content)
        .map_err(|e| ConversionError::invalid_input(format!("Malformed JSON: {e}")))?;

    let rows = match data.as_array() {
        Some(rows) if !rows.is_empty() => rows,
        _ => {
            return Err(ConversionError::invalid_input(
                "JSON must be an array of objects",
            ))
        }
    };
    let objects: Vec<&Map<String, Value>> = rows
        .iter()
        .map(Value::as_object)
        .collect::<Option<_>>()
        .ok_or_else(|| ConversionError::invalid_input("JSON must be an array of objects"))?;

    let headers: Vec<&String> = objects[0].keys().collect();
    let mut lines = Vec::with_capacity(objects.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    for object in &objects {
        let line = headers
            .iter()
            .map(|h| csv_field(object.get(h.as_str())))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn csv_field(value: Option<&Value>) -> String {
    let rendered = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if rendered.contains(',') {
        format!("\"{rendered}\"")
    } else {
        rendered
    }
}

fn read_error(path: &Path, e: std::io::Error) -> ConversionError {
    ConversionError::invalid_input(format!("Cannot read {}: {e}", path.display()))
}

async fn read_text(path: &Path) -> Result<String, ConversionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| read_error(path, e))?;
    String::from_utf8(bytes)
        .map_err(|_| ConversionError::invalid_input(format!("{} is not UTF-8 text", path.display())))
}

pub(crate) async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ConversionError::io(path, e))
}
