//! Configuration for the converter adapters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Locations of the external tools the adapters shell out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Headless office converter binary.
    #[serde(default = "default_soffice_path")]
    pub soffice_path: PathBuf,

    /// Interpreter used to run converter scripts.
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,

    /// Script converting PDF to DOCX.
    #[serde(default = "default_pdf_to_docx_script")]
    pub pdf_to_docx_script: PathBuf,

    /// Script extracting PDF tables into XLSX or CSV.
    #[serde(default = "default_pdf_to_excel_script")]
    pub pdf_to_excel_script: PathBuf,

    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Poppler rasterizer used for PDF to image.
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,
}

fn default_soffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_python_path() -> PathBuf {
    PathBuf::from("python3")
}

fn default_pdf_to_docx_script() -> PathBuf {
    PathBuf::from("scripts/pdf_to_docx.py")
}

fn default_pdf_to_excel_script() -> PathBuf {
    PathBuf::from("scripts/pdf_to_excel.py")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_pdftoppm_path() -> PathBuf {
    PathBuf::from("pdftoppm")
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            soffice_path: default_soffice_path(),
            python_path: default_python_path(),
            pdf_to_docx_script: default_pdf_to_docx_script(),
            pdf_to_excel_script: default_pdf_to_excel_script(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            pdftoppm_path: default_pdftoppm_path(),
            ffmpeg_log_level: default_log_level(),
        }
    }
}

/// Wall-clock limits applied to every subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Limit for office, ffmpeg, ffprobe and rasterizer invocations.
    #[serde(default = "default_subprocess_secs")]
    pub subprocess_secs: u64,

    /// Limit for script converters.
    #[serde(default = "default_script_secs")]
    pub script_secs: u64,
}

fn default_subprocess_secs() -> u64 {
    1800 // 30 minutes
}

fn default_script_secs() -> u64 {
    300
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            subprocess_secs: default_subprocess_secs(),
            script_secs: default_script_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn subprocess(&self) -> Duration {
        Duration::from_secs(self.subprocess_secs)
    }

    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script_secs)
    }
}

/// Defaults of the image pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Rasterization resolution for PDF pages.
    #[serde(default = "default_pdf_dpi")]
    pub pdf_dpi: u32,

    /// JPEG quality used by `convert` when none is requested.
    #[serde(default = "default_jpeg_quality")]
    pub default_jpeg_quality: u8,

    /// Quality used by `compress` when none is requested.
    #[serde(default = "default_compress_quality")]
    pub default_compress_quality: u8,
}

fn default_pdf_dpi() -> u32 {
    150
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_compress_quality() -> u8 {
    70
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            pdf_dpi: default_pdf_dpi(),
            default_jpeg_quality: default_jpeg_quality(),
            default_compress_quality: default_compress_quality(),
        }
    }
}

/// Everything the adapters need, bundled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

impl ConverterConfig {
    /// Sets the subprocess timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeouts.subprocess_secs = timeout_secs;
        self
    }

    /// Sets the script timeout in seconds.
    pub fn with_script_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeouts.script_secs = timeout_secs;
        self
    }

    /// Sets the script interpreter and the PDF to DOCX script.
    pub fn with_pdf_to_docx(mut self, interpreter: PathBuf, script: PathBuf) -> Self {
        self.tools.python_path = interpreter;
        self.tools.pdf_to_docx_script = script;
        self
    }

    /// Sets the office converter binary.
    pub fn with_soffice(mut self, path: PathBuf) -> Self {
        self.tools.soffice_path = path;
        self
    }
}
