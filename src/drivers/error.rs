use thiserror::Error;
#[derive(Debug, Error)]
pub enum NeuroError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid filter design: {0}")]
    InvalidFilter(String),
    #[error("epoch length mismatch: expected {expected} samples, got {actual}")]
    EpochLength { expected: usize, actual: usize },
    #[error("channel index {index} out of range: source has {available} channel(s)")]
    ChannelOutOfRange { index: usize, available: usize },
    #[error("no data source available: {0}")]
    SourceUnavailable(String),
    #[error("source pull failed: {0}")]
    Source(String),
}
impl From<serde_json::Error> for NeuroError {
    fn from(value: serde_json::Error) -> Self {
        NeuroError::InvalidConfig(value.to_string())
    }
}
