use omap_kernel::{ConfigError, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read file: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json at {path}: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported document format: {path} (expected .toml or .json)")]
    UnsupportedFormat { path: String },

    #[error("invalid type expression {expr:?}: {reason}")]
    TypeExpr { expr: String, reason: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("cannot encode {path}: {reason}")]
    Encode { path: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Invalid(String),
}

impl DocumentError {
    pub(crate) fn decode(path: &str, reason: impl Into<String>) -> Self {
        DocumentError::Decode {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
