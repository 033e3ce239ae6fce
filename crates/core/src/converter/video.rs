//! FFmpeg-based video and audio adapter.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::config::ConverterConfig;
use super::error::ConversionError;
use super::paths::resolve_output_path;
use super::process::{CommandSpec, ProcessRunner};
use super::traits::{foreign_operation, Adapter, Invocation};
use super::types::{
    extension_of, AdapterKind, AdapterOperation, ConversionOptions, ConversionResult,
    MediaMetadata, StreamInfo, VideoMetadata, VideoOp,
};

/// Named frame sizes accepted by the `resolution` option.
pub const RESOLUTION_PRESETS: &[(&str, &str)] = &[
    ("4k", "3840x2160"),
    ("1080p", "1920x1080"),
    ("720p", "1280x720"),
    ("480p", "854x480"),
    ("360p", "640x360"),
];

/// CRF per compression tier; lower is better quality.
pub const CRF_TIERS: &[(&str, u8)] = &[("low", 28), ("medium", 23), ("high", 18)];

const DEFAULT_CRF: u8 = 23;

/// Interval between progress log lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Frame size for a `resolution` value; unknown names pass through as given.
pub fn resolve_resolution(value: &str) -> String {
    RESOLUTION_PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value.trim()))
        .map(|(_, size)| size.to_string())
        .unwrap_or_else(|| value.trim().to_string())
}

/// CRF for a `quality` tier; unknown or missing tiers map to medium.
pub fn crf_for(quality: Option<&str>) -> u8 {
    quality
        .and_then(|q| {
            CRF_TIERS
                .iter()
                .find(|(tier, _)| tier.eq_ignore_ascii_case(q.trim()))
        })
        .map(|(_, crf)| *crf)
        .unwrap_or(DEFAULT_CRF)
}

/// Bare numbers are kilobits per second.
fn bitrate_arg(value: &str) -> String {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("{value}k")
    } else {
        value.to_string()
    }
}

fn timestamp_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(:\d{1,2}){0,2}(\.\d+)?$").ok())
        .as_ref()
}

fn required_time(options: &ConversionOptions, key: &str) -> Result<String, ConversionError> {
    let value = options
        .get_str(key)
        .ok_or_else(|| ConversionError::invalid_input(format!("trim requires '{key}'")))?;
    let value = value.trim().to_string();
    match timestamp_regex() {
        Some(re) if !re.is_match(&value) => Err(ConversionError::invalid_input(format!(
            "option '{key}' must be seconds or [HH:]MM:SS, got {value}"
        ))),
        _ => Ok(value),
    }
}

/// Parses a rational frame rate like `30000/1001`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse::<f64>().ok(),
    }
}

/// Executes [`VideoOp`] operations with ffmpeg and inspects media with ffprobe.
pub struct VideoAdapter {
    config: ConverterConfig,
    runner: ProcessRunner,
}

impl VideoAdapter {
    /// Creates a new video adapter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        let runner = ProcessRunner::new(config.timeouts.subprocess());
        Self { config, runner }
    }

    /// Creates an adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments for one operation.
    fn build_args(
        &self,
        op: VideoOp,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<String>, ConversionError> {
        let mut args = vec!["-y".to_string()];

        // Input seek, so stream copy starts at the nearest keyframe.
        let trim = if op == VideoOp::Trim {
            let start = required_time(options, "startTime")?;
            let duration = required_time(options, "duration")?;
            args.extend(["-ss".to_string(), start]);
            Some(duration)
        } else {
            None
        };

        args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);

        match op {
            VideoOp::Convert => {
                if let Some(resolution) = options.get_str("resolution") {
                    args.extend(["-s".to_string(), resolve_resolution(&resolution)]);
                }
                if let Some(bitrate) = options.get_str("videoBitrate") {
                    args.extend(["-b:v".to_string(), bitrate_arg(&bitrate)]);
                }
                if let Some(bitrate) = options.get_str("audioBitrate") {
                    args.extend(["-b:a".to_string(), bitrate_arg(&bitrate)]);
                }
                if let Some(fps) = options.get_dimension("fps")? {
                    args.extend(["-r".to_string(), fps.to_string()]);
                }
            }
            VideoOp::Compress => {
                let crf = crf_for(options.get_str("quality").as_deref());
                args.extend([
                    "-crf".to_string(),
                    crf.to_string(),
                    "-preset".to_string(),
                    "medium".to_string(),
                ]);
            }
            VideoOp::Trim => {
                if let Some(duration) = trim {
                    args.extend(["-t".to_string(), duration]);
                }
                args.extend(["-c".to_string(), "copy".to_string()]);
            }
            VideoOp::ExtractAudio => args.push("-vn".to_string()),
            VideoOp::ChangeResolution => {
                let resolution = options.get_str("resolution").ok_or_else(|| {
                    ConversionError::invalid_input("change_resolution requires 'resolution'")
                })?;
                args.extend(["-s".to_string(), resolve_resolution(&resolution)]);
            }
            VideoOp::Metadata => {
                return Err(ConversionError::invalid_input(
                    "metadata produces no output file",
                ))
            }
        }

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.tools.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        // The container follows the output extension.
        args.push(output.to_string_lossy().to_string());

        Ok(args)
    }

    /// Parses ffprobe JSON output into [`VideoMetadata`].
    fn parse_probe_output(output: &str) -> Result<VideoMetadata, ConversionError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            #[serde(default)]
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize, Default)]
        struct ProbeFormat {
            #[serde(default)]
            format_name: String,
            duration: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            #[serde(default)]
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            ConversionError::external(format!("Failed to parse ffprobe output: {e}"))
        })?;

        let video = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

        Ok(VideoMetadata {
            duration_secs: probe.format.duration.as_deref().and_then(|d| d.parse().ok()),
            bitrate: probe.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            format: probe.format.format_name.clone(),
            width: video.and_then(|s| s.width),
            height: video.and_then(|s| s.height),
            fps: video
                .and_then(|s| s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            video_codec: video.and_then(|s| s.codec_name.clone()),
            audio_codec: audio.and_then(|s| s.codec_name.clone()),
            streams: probe
                .streams
                .iter()
                .map(|s| StreamInfo {
                    codec_type: s.codec_type.clone(),
                    codec_name: s.codec_name.clone(),
                    width: s.width,
                    height: s.height,
                })
                .collect(),
        })
    }

    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ConversionError> {
        let spec = CommandSpec::new(&self.config.tools.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path);
        let output = self.runner.run(&spec).await?.ensure_success("ffprobe")?;
        Self::parse_probe_output(&output.stdout)
    }

    /// Runs ffmpeg, logging progress parsed from its stderr.
    async fn run_ffmpeg(
        &self,
        args: Vec<String>,
        output: &Path,
        duration_secs: Option<f64>,
    ) -> Result<(), ConversionError> {
        let spec = CommandSpec::new(&self.config.tools.ffmpeg_path).args(args);

        let time_regex = Regex::new(r"out_time_(?:ms|us)=(\d+)").ok();
        let speed_regex = Regex::new(r"speed=\s*(\d+\.?\d*)x").ok();
        let mut current_time = 0.0;
        let mut current_speed: Option<String> = None;
        let mut last_log = Instant::now();
        let mut error_lines = Vec::new();

        let finished = self
            .runner
            .run_streaming(&spec, |line| {
                // Capture error output
                if line.contains("Error") || line.contains("error") {
                    error_lines.push(line.to_string());
                }

                if let Some(caps) = time_regex.as_ref().and_then(|re| re.captures(line)) {
                    if let Some(us) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                        current_time = us / 1_000_000.0;
                    }
                }
                if let Some(caps) = speed_regex.as_ref().and_then(|re| re.captures(line)) {
                    current_speed = caps.get(1).map(|m| format!("{}x", m.as_str()));
                }

                if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                    let percent = match duration_secs {
                        Some(d) if d > 0.0 => (current_time / d * 100.0).min(100.0),
                        _ => 0.0,
                    };
                    debug!(
                        time_secs = current_time,
                        percent = %format!("{percent:.1}"),
                        speed = current_speed.as_deref().unwrap_or("?"),
                        "Transcoding progress"
                    );
                    last_log = Instant::now();
                }
            })
            .await?;

        if !finished.status.success() {
            let details = if error_lines.is_empty() {
                finished.stderr.clone()
            } else {
                error_lines.join("\n")
            };
            error!(command = %finished.command, code = ?finished.status.code(), "FFmpeg failed");
            return Err(ConversionError::tool_failed(
                format!("FFmpeg exited with code: {:?}", finished.status.code()),
                finished.command,
                Some(details),
            ));
        }

        if !output.is_file() {
            return Err(
                ConversionError::output_not_found(output.display().to_string())
                    .with_command(finished.command),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for VideoAdapter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Video
    }

    async fn execute(&self, invocation: Invocation<'_>) -> Result<ConversionResult, ConversionError> {
        let AdapterOperation::Video(op) = invocation.operation else {
            return Err(foreign_operation(self.kind(), &invocation));
        };
        if op == VideoOp::Metadata {
            return Err(foreign_operation(self.kind(), &invocation));
        }
        let Invocation {
            input,
            target,
            options,
            output_dir,
            ..
        } = invocation;

        let extension = match op {
            VideoOp::Convert | VideoOp::ExtractAudio => target.to_string(),
            _ => extension_of(input),
        };
        let output = resolve_output_path(input, &extension, output_dir);
        let args = self.build_args(op, input, &output, options)?;

        // Duration only feeds progress reporting.
        let duration_secs = self
            .probe(input)
            .await
            .ok()
            .and_then(|m| m.duration_secs);

        info!(op = ?op, input = %input.display(), output = %output.display(), "Transcoding");
        let start = Instant::now();
        self.run_ffmpeg(args, &output, duration_secs).await?;
        info!(
            output = %output.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transcoding finished"
        );
        Ok(ConversionResult::new(output))
    }

    async fn inspect(&self, input: &Path) -> Result<MediaMetadata, ConversionError> {
        Ok(MediaMetadata::Video(self.probe(input).await?))
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        for program in [&self.config.tools.ffmpeg_path, &self.config.tools.ffprobe_path] {
            let version = self.runner.probe_version(program, "-version").await?;
            debug!(version = %version, "Transcoder available");
        }
        Ok(())
    }
}
