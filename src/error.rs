use thiserror::Error;

/// Engine error types.
///
/// Analysis itself never fails on market content (missing indicators and
/// degenerate bars degrade to neutral sub-scores). These variants cover
/// construction, configuration and persistence.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient data: need {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Mismatched series: {bars} bars but {indicators} indicator rows")]
    MismatchedSeries { bars: usize, indicators: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
