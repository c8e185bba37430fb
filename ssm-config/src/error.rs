use std::path::PathBuf;

/// Errors raised while loading, validating, or bootstrapping configuration. Unlike the runtime
/// error taxonomy in `ssm-core`, every variant here maps to `Configuration` — nothing at this
/// layer is a transport, process, or cancellation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
