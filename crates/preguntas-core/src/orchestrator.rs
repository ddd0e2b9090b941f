//! Lifecycle of the single in-flight question.
//!
//! ```text
//!   Idle ──begin──▶ Pending ──settle(Ok)──▶ Idle
//!                      │
//!                      └──settle(Err)──▶ Error ──begin──▶ Pending
//!                                          └──reset──▶ Idle
//! ```
//!
//! `submit` runs the whole cycle in one call. Front ends that must keep
//! drawing while the request is out (the TUI) call `begin`, run the request
//! themselves, and hand the result back through `settle`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::client::AnswerService;
use crate::error::ServiceError;
use crate::exchange::Exchange;
use crate::storage::Storage;
use crate::store::{ConversationStore, Persistence};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryState {
    #[default]
    Idle,
    Pending,
    Error(String),
}

impl QueryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Why a submission was dropped before anything happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    EmptyQuestion,
    AlreadyPending,
}

/// A question that has been accepted and is waiting on the service.
#[must_use]
#[derive(Debug)]
pub struct Submission {
    query: String,
    submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// How a submission ended.
#[derive(Debug)]
pub enum Settled {
    Answered(Persistence),
    Failed(String),
}

pub struct QueryOrchestrator<S: Storage> {
    store: ConversationStore<S>,
    service: Arc<dyn AnswerService>,
    state: QueryState,
}

impl<S: Storage> QueryOrchestrator<S> {
    pub fn new(store: ConversationStore<S>, service: Arc<dyn AnswerService>) -> Self {
        Self {
            store,
            service,
            state: QueryState::Idle,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn exchanges(&self) -> &[Exchange] {
        self.store.exchanges()
    }

    pub fn store(&self) -> &ConversationStore<S> {
        &self.store
    }

    pub fn service(&self) -> Arc<dyn AnswerService> {
        Arc::clone(&self.service)
    }

    /// Accept a question: trims it, stamps the submission time and moves to
    /// `Pending`. Rejections leave the state untouched.
    pub fn begin(&mut self, question: &str) -> Result<Submission, Rejected> {
        let query = question.trim();
        if query.is_empty() {
            return Err(Rejected::EmptyQuestion);
        }
        if self.state.is_pending() {
            debug!("ignoring submission while a query is in flight");
            return Err(Rejected::AlreadyPending);
        }

        self.state = QueryState::Pending;
        Ok(Submission {
            query: query.to_string(),
            submitted_at: Utc::now(),
        })
    }

    /// Fold the service outcome into the store and leave `Pending`.
    pub fn settle(
        &mut self,
        submission: Submission,
        result: Result<String, ServiceError>,
    ) -> Settled {
        match result {
            Ok(response) => {
                let exchange =
                    Exchange::new(submission.query, response, submission.submitted_at);
                let persistence = self.store.append(exchange).persistence;
                info!(count = self.store.len(), "query answered");
                self.state = QueryState::Idle;
                Settled::Answered(persistence)
            }
            Err(e) => {
                warn!(error = %e, "query failed");
                let message = e.user_message();
                self.state = QueryState::Error(message.clone());
                Settled::Failed(message)
            }
        }
    }

    /// Submit a question and wait for the answer.
    pub async fn submit(&mut self, question: &str) -> Result<Settled, Rejected> {
        let submission = self.begin(question)?;
        let result = self.service.ask(submission.query()).await;
        Ok(self.settle(submission, result))
    }

    /// Dismiss an error. Does nothing in any other state.
    pub fn reset(&mut self) {
        if matches!(self.state, QueryState::Error(_)) {
            self.state = QueryState::Idle;
        }
    }

    pub fn clear(&mut self) -> Persistence {
        self.store.clear()
    }
}
