use thiserror::Error;

/// Message shown when the answer service gives no usable detail.
pub const GENERIC_FAILURE: &str = "Failed to get response from server";

/// Failures at the durable storage boundary. None of these are fatal: the
/// conversation store recovers from every variant locally.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read stored conversations: {0}")]
    Read(#[source] std::io::Error),

    #[error("stored conversations are malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to write conversations: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to remove stored conversations: {0}")]
    Remove(#[source] std::io::Error),
}

/// Failures talking to the answer service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("answer service returned {status}")]
    Status {
        status: u16,
        detail: Option<String>,
    },

    #[error("malformed answer payload: {0}")]
    MalformedPayload(String),

    #[error("request task ended abnormally: {0}")]
    Interrupted(String),
}

impl ServiceError {
    /// Human-readable text for the error banner: the service's own `detail`
    /// when it sent one, otherwise the generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Status {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}
