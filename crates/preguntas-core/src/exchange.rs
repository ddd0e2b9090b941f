//! The conversation record shared between the store, the orchestrator and
//! any UI that renders the thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One question/answer pair.
///
/// Exchanges are only built once the answer has arrived, so a stored
/// exchange always carries both halves. The timestamp is the moment the
/// question was submitted, not when the answer came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: String,
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(query: impl Into<String>, response: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            query: query.into(),
            response: response.into(),
            timestamp,
        }
    }
}

/// Random v4 UUID rendered as a string.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
