pub mod config;
pub mod converter;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
    StorageConfig,
};
pub use converter::{
    Adapter, AdapterKind, AdapterOperation, ConversionError, ConversionOptions, ConversionRequest,
    ConversionResult, ConversionService, ErrorKind, MediaClass, MediaMetadata,
};
