use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Timeouts are not 0
/// - PDF rasterization DPI is within 36..=1200
/// - Default qualities are within 1..=100
/// - Tool paths are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.timeouts.subprocess_secs == 0 {
        return Err(ConfigError::ValidationError(
            "timeouts.subprocess_secs cannot be 0".to_string(),
        ));
    }
    if config.timeouts.script_secs == 0 {
        return Err(ConfigError::ValidationError(
            "timeouts.script_secs cannot be 0".to_string(),
        ));
    }

    if !(36..=1200).contains(&config.image.pdf_dpi) {
        return Err(ConfigError::ValidationError(format!(
            "image.pdf_dpi must be between 36 and 1200, got {}",
            config.image.pdf_dpi
        )));
    }

    for (name, quality) in [
        ("image.default_jpeg_quality", config.image.default_jpeg_quality),
        (
            "image.default_compress_quality",
            config.image.default_compress_quality,
        ),
    ] {
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be between 1 and 100, got {quality}"
            )));
        }
    }

    let tools = &config.tools;
    for (name, path) in [
        ("tools.soffice_path", &tools.soffice_path),
        ("tools.python_path", &tools.python_path),
        ("tools.ffmpeg_path", &tools.ffmpeg_path),
        ("tools.ffprobe_path", &tools.ffprobe_path),
        ("tools.pdftoppm_path", &tools.pdftoppm_path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!("{name} cannot be empty")));
        }
    }

    Ok(())
}
