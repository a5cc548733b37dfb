use thiserror::Error;

/// Errors raised by event transforms and pipeline construction.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Binning needs at least one event to locate its time range.
    #[error("event list is empty; binning requires at least one event")]
    EmptyEvents,

    #[error("timestamps must be ascending (first violation at row {index})")]
    UnsortedTimestamps { index: usize },

    #[error("malformed event line: {0}")]
    MalformedEvent(String),

    #[error("wrong number of dimensions: found {found} columns, expected 2 or 4")]
    WrongColumnCount { found: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("event at row {index} addresses {address:?}, outside the frame")]
    AddressOutOfRange { index: usize, address: Vec<i64> },

    #[error("label {label} is outside [0, {num_classes})")]
    LabelOutOfRange { label: i64, num_classes: usize },

    /// Kernel and input tensors live on different devices.
    #[error("device mismatch: kernel on {kernel}, input on {input}")]
    DeviceMismatch { kernel: String, input: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{transform} expects {expected} input, got {found}")]
    UnexpectedInput {
        transform: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransformError>;
