use thiserror::Error;

/// Errors raised while building or running models and samplers.
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter set cannot produce a valid simulation. Samplers treat this
    /// as zero likelihood rather than a failure.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Keys no model input consumed, usually a misspelled name. Unlike
    /// [`Error::InvalidParameters`] this is a configuration mistake.
    #[error("unrecognized parameters: {}", .0.join(", "))]
    UnknownParameters(Vec<String>),

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{key}' must be a {expected}")]
    ParameterType { key: String, expected: &'static str },

    #[error("unknown simulator '{0}'")]
    UnknownSimulator(String),

    #[error("interpolation point {x} outside [{lo}, {hi}]")]
    OutOfRange { x: f64, lo: f64, hi: f64 },

    #[error("sampler error: {0}")]
    Sampling(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid date '{0}'")]
    Date(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameters(msg.into())
    }

    pub fn is_invalid_parameters(&self) -> bool {
        matches!(self, Error::InvalidParameters(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
