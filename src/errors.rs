use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {value}")]
    InvalidConfigValue { field: &'static str, value: String },

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("Key already present in index")]
    DuplicateKey,

    #[error("Index invariant violated: {0}")]
    Corrupted(String),

    #[error("Cache name already registered: {0}")]
    NameTaken(String),
}
