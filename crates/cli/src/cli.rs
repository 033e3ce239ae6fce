use clap::{Parser, Subcommand};
use std::path::PathBuf;

use omniconvert_core::converter::{MediaClass, OptionValue};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file path; built-in defaults are used when it is absent
    #[arg(
        short,
        long,
        global = true,
        env = "OMNICONVERT_CONFIG",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a file into another format
    Convert {
        /// Input file
        input: PathBuf,

        /// Target format, e.g. pdf or webp
        #[arg(short, long)]
        to: String,

        /// Media class; inferred from the input extension when omitted
        #[arg(long)]
        class: Option<MediaClass>,

        /// Run a named operation instead of the routed one (resize, crop, trim, ...)
        #[arg(long)]
        op: Option<String>,

        /// Operation option as key=value, repeatable
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,

        /// Output directory; defaults to storage.converted_dir
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print metadata of an image, video or audio file
    Inspect {
        /// Input file
        input: PathBuf,

        /// Media class; inferred from the input extension when omitted
        #[arg(long)]
        class: Option<MediaClass>,
    },

    /// Show which operation would serve a conversion
    Route {
        /// Input extension, e.g. docx
        input_ext: String,

        /// Target format
        target: String,

        /// Media class of the input
        #[arg(long)]
        class: MediaClass,
    },

    /// Check that the external tools respond
    Check,
}

/// Parses `key=value`; numbers and booleans keep their type.
pub fn parse_option(raw: &str) -> Result<(String, OptionValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("option key is empty in '{raw}'"));
    }

    let value = value.trim();
    let parsed = if let Ok(i) = value.parse::<i64>() {
        OptionValue::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        OptionValue::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        OptionValue::Bool(b)
    } else {
        OptionValue::String(value.to_string())
    };
    Ok((key.to_string(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option_types() {
        assert_eq!(
            parse_option("width=800").unwrap(),
            ("width".to_string(), OptionValue::Integer(800))
        );
        assert_eq!(
            parse_option("quality=high").unwrap(),
            ("quality".to_string(), OptionValue::String("high".to_string()))
        );
        assert_eq!(
            parse_option("startTime=00:01:30").unwrap().1,
            OptionValue::String("00:01:30".to_string())
        );
        assert_eq!(parse_option("ratio=1.5").unwrap().1, OptionValue::Float(1.5));
        assert_eq!(parse_option("flag=true").unwrap().1, OptionValue::Bool(true));
        assert!(parse_option("width").is_err());
        assert!(parse_option("=3").is_err());
    }

    #[test]
    fn test_convert_args() {
        let args = Args::try_parse_from([
            "omniconvert",
            "convert",
            "photo.png",
            "--to",
            "jpg",
            "--op",
            "resize",
            "-o",
            "width=640",
            "-o",
            "fit=cover",
            "--verbose",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Commands::Convert {
                input,
                to,
                class,
                op,
                options,
                output_dir,
            } => {
                assert_eq!(input, PathBuf::from("photo.png"));
                assert_eq!(to, "jpg");
                assert_eq!(class, None);
                assert_eq!(op.as_deref(), Some("resize"));
                assert_eq!(options.len(), 2);
                assert_eq!(output_dir, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_route_args() {
        let args =
            Args::try_parse_from(["omniconvert", "route", "pdf", "docx", "--class", "document"])
                .unwrap();
        match args.command {
            Commands::Route { class, .. } => assert_eq!(class, MediaClass::Document),
            other => panic!("unexpected {other:?}"),
        }

        assert!(
            Args::try_parse_from(["omniconvert", "route", "a", "b", "--class", "hologram"])
                .is_err()
        );
    }
}
