use thiserror::Error;

/// Everything that can go wrong while turning a request into a nutrition record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI gateway is not configured: {0}")]
    Configuration(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// `status` is `None` when the call never produced an HTTP response.
    #[error("AI gateway returned {}: {body}", describe_status(.status))]
    Upstream { status: Option<u16>, body: String },

    #[error("Failed to parse nutrition data from AI response")]
    Parse { raw: String },

    #[error("Invalid nutrition data structure from AI: {0}")]
    Schema(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no response".to_string(),
    }
}

impl AnalysisError {
    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Configuration(_) => "configuration_error",
            AnalysisError::InvalidRequest(_) => "invalid_request",
            AnalysisError::Upstream { .. } => "upstream_error",
            AnalysisError::Parse { .. } => "parse_error",
            AnalysisError::Schema(_) => "schema_error",
        }
    }
}

/// Errors from the tracking operations (meals, water, weight, summaries).
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("{0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
