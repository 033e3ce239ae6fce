use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OMNICONVERT_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Built-in defaults with environment variable overrides, for runs without a file
pub fn load_default_config() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("OMNICONVERT_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[storage]
converted_dir = "/srv/converted"

[timeouts]
script_secs = 120
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.storage.converted_dir, PathBuf::from("/srv/converted"));
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.timeouts.script_secs, 120);
        assert_eq!(config.timeouts.subprocess_secs, 1800);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.tools.soffice_path, PathBuf::from("soffice"));
        assert_eq!(config.image.pdf_dpi, 150);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[timeouts]
script_secs = "five minutes"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[tools]
soffice_path = "/opt/libreoffice/program/soffice"

[image]
pdf_dpi = 300
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.tools.soffice_path,
            PathBuf::from("/opt/libreoffice/program/soffice")
        );
        assert_eq!(config.image.pdf_dpi, 300);
        assert_eq!(config.tools.ffmpeg_path, PathBuf::from("ffmpeg"));
    }
}
