mod cli;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omniconvert_core::converter::{
    extension_of, route, AdapterOperation, ConversionOptions, ConversionRequest,
    ConversionService, MediaClass,
};
use omniconvert_core::{load_config, load_default_config, validate_config, Config};

use cli::{Args, Commands};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json);

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    // Logs go to stderr so results on stdout stay machine readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn load(config_path: &Path) -> Result<Config> {
    let config = if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        info!("No configuration at {:?}, using defaults", config_path);
        load_default_config().context("Failed to load default config")?
    };
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn media_class_for(path: &Path, explicit: Option<MediaClass>) -> Result<MediaClass> {
    if let Some(class) = explicit {
        return Ok(class);
    }
    let ext = extension_of(path);
    MediaClass::infer(&ext).ok_or_else(|| {
        anyhow!("Cannot infer media class from extension {ext:?}; pass --class")
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = load(&args.config)?;

    match args.command {
        Commands::Convert {
            input,
            to,
            class,
            op,
            options,
            output_dir,
        } => {
            let input = std::path::absolute(&input)
                .with_context(|| format!("Invalid input path {:?}", input))?;
            let media_class = media_class_for(&input, class)?;
            let output_dir = output_dir.unwrap_or_else(|| config.storage.converted_dir.clone());

            let mut request_options = ConversionOptions::new();
            for (key, value) in options {
                request_options.insert(key, value);
            }
            let request =
                ConversionRequest::new(&input, media_class, to).with_options(request_options);

            let service = ConversionService::new(config.converter(), output_dir);
            let result = match op {
                Some(name) => {
                    let operation = AdapterOperation::from_name(media_class, &name)
                        .ok_or_else(|| anyhow!("Unknown operation '{name}' for {media_class}"))?;
                    service.perform(&request, operation).await
                }
                None => service.convert(&request).await,
            }
            .with_context(|| format!("Failed to convert {:?}", input))?;

            print_json(&result)
        }
        Commands::Inspect { input, class } => {
            let input = std::path::absolute(&input)
                .with_context(|| format!("Invalid input path {:?}", input))?;
            let media_class = media_class_for(&input, class)?;
            let service = ConversionService::new(config.converter(), PathBuf::new());
            let metadata = service
                .inspect(&input, media_class)
                .await
                .with_context(|| format!("Failed to inspect {:?}", input))?;
            print_json(&metadata)
        }
        Commands::Route {
            input_ext,
            target,
            class,
        } => {
            let operation = route(class, &input_ext, &target)?;
            println!("{operation}");
            Ok(())
        }
        Commands::Check => {
            let service =
                ConversionService::new(config.converter(), config.storage.converted_dir.clone());
            let mut failed = 0;
            for (kind, outcome) in service.validate_tools().await {
                match outcome {
                    Ok(()) => println!("{:<10} ok", kind.to_string()),
                    Err(e) => {
                        failed += 1;
                        println!("{:<10} FAILED: {e}", kind.to_string());
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} adapter(s) failed the tool check");
            }
            Ok(())
        }
    }
}
