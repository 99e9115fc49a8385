use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration errors. Every variant is fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("instance '{group}/{instance}': unknown backend type '{backend}'")]
    UnknownBackend {
        group: String,
        instance: String,
        backend: String,
    },

    #[error("instance '{group}/{instance}': dsn must not be empty")]
    EmptyDsn { group: String, instance: String },

    #[error("endpoint '{endpoint}': target group '{target}' is not defined")]
    UnknownTarget { endpoint: String, target: String },

    #[error("endpoint '{endpoint}': instance '{instance}' appears in more than one target group")]
    DuplicateInstance { endpoint: String, instance: String },

    #[error("invalid endpoint path '{0}'")]
    InvalidEndpointPath(String),

    #[error("endpoint path '/{0}' is configured more than once")]
    DuplicateEndpoint(String),

    #[error("endpoint '{endpoint}': collect #{index} has an empty query")]
    EmptyQuery { endpoint: String, index: usize },

    #[error("metric '{key}': value column must not be empty")]
    EmptyValueColumn { key: String },

    #[error("metric '{key}': label '{label}' is reserved")]
    ReservedLabel { key: String, label: String },

    #[error("metric '{key}': duplicate label '{label}'")]
    DuplicateLabel { key: String, label: String },

    #[error("metric '{key}' collides with an exporter metric")]
    ReservedKey { key: String },

    #[error("metric '{key}' is defined more than once with different {what}")]
    DescriptorConflict { key: String, what: &'static str },

    #[error("metric '{key}': invalid descriptor: {source}")]
    InvalidDescriptor {
        key: String,
        #[source]
        source: prometheus::Error,
    },
}
