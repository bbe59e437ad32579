use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(i32),

    #[error("Invalid array size: {0}")]
    InvalidArraySize(i32),

    #[error("Invalid asset index: {index} (asset count: {count})")]
    InvalidAssetIndex { index: i32, count: usize },

    #[error("Invalid asset kind: {0}")]
    InvalidAssetKind(u8),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid UTF-16 string")]
    InvalidUtf16,

    #[error("Filter contains an empty name")]
    InvalidFilter,

    #[error("Filter is empty, use get_all_assets instead")]
    EmptyFilter,

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
