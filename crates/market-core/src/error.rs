use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider payload: {0}")]
    Parse(String),

    #[error("No quote data for {0}")]
    NoData(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}
