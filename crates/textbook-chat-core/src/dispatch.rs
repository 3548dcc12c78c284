//! Query dispatch: one logical question, at most two attempts.
//!
//! Each attempt runs under its own cancellation token, a child of the
//! dispatcher's shutdown token. The token is cancelled when the per-attempt
//! deadline expires or when the owner shuts the dispatcher down, and it is
//! released as soon as the attempt resolves.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{QueryError, CANCELLED_MESSAGE};
use crate::lock;
use crate::persona::Persona;
use crate::selection::{Mode, QueryScope};
use crate::state::QueryResponse;

/// Per-attempt deadline. RAG queries can be slow.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
/// Pause between a retryable failure and the retry.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Retries per user question, on top of the first attempt.
pub const MAX_RETRIES: u32 = 1;

/// Body of `POST /query`. Fields are private so a request cannot change once
/// built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    question: String,
    mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona: Option<Persona>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, scope: &QueryScope, persona: Persona) -> Self {
        Self {
            question: question.into(),
            mode: scope.mode(),
            selected_text: scope.selected_text().map(str::to_string),
            persona: persona.as_request_value(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected_text(&self) -> Option<&str> {
        self.selected_text.as_deref()
    }

    pub fn persona(&self) -> Option<Persona> {
        self.persona
    }
}

/// Sends one attempt to the backend. Implementations classify their own
/// failures; the dispatcher owns deadlines, cancellation and retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError>;
}

pub struct QueryDispatcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    retry_delay: Duration,
    shutdown: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
}

impl QueryDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: QUERY_TIMEOUT,
            retry_delay: RETRY_DELAY,
            shutdown: CancellationToken::new(),
            active: Mutex::new(None),
        }
    }

    pub fn with_timing(mut self, timeout: Duration, retry_delay: Duration) -> Self {
        self.timeout = timeout;
        self.retry_delay = retry_delay;
        self
    }

    /// Send `request`, retrying once on a transient failure.
    pub async fn dispatch(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let mut last_error = QueryError::unexpected();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    error = last_error.kind(),
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "retrying query"
                );
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }

            match self.attempt(request, attempt).await {
                Ok(response) => {
                    tracing::debug!(
                        attempt,
                        chunks = response.chunks_retrieved,
                        confidence = response.confidence.as_str(),
                        "query answered"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => last_error = e,
                Err(e) => {
                    tracing::debug!(attempt, error = e.kind(), "query failed");
                    return Err(e);
                }
            }
        }

        Err(last_error)
    }

    async fn attempt(&self, request: &QueryRequest, attempt: u32) -> Result<QueryResponse, QueryError> {
        let token = self.shutdown.child_token();
        let _armed = Armed::new(&self.active, token.clone());
        tracing::debug!(attempt, mode = request.mode().as_str(), "sending query");

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(cancelled()),
            _ = tokio::time::sleep(self.timeout) => {
                token.cancel();
                Err(QueryError::Timeout)
            }
            result = self.transport.send(request) => result,
        }
    }

    /// Whether an attempt is currently holding a cancellation token.
    pub fn is_in_flight(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Abort the in-flight attempt (and any pending retry) for good.
    /// Calling it again, or with nothing in flight, does nothing.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!(in_flight = self.is_in_flight(), "shutting down query dispatcher");
        }
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for QueryDispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn cancelled() -> QueryError {
    QueryError::Unexpected(CANCELLED_MESSAGE.to_string())
}

/// Holds the active-token slot for one attempt; releases it however the
/// attempt ends.
struct Armed<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> Armed<'a> {
    fn new(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *lock(slot) = Some(token);
        Self { slot }
    }
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        lock(self.slot).take();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    use crate::state::{Confidence, SourceReference};

    /// What the scripted backend does on one call.
    pub enum Step {
        Reply(Result<QueryResponse, QueryError>),
        /// Reply after a delay.
        Slow(Duration, Result<QueryResponse, QueryError>),
        /// Never reply.
        Hang,
    }

    #[derive(Default)]
    pub struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<(Instant, QueryRequest)>>,
    }

    impl ScriptedTransport {
        pub fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<QueryRequest> {
            self.requests.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
            self.requests.lock().unwrap().push((Instant::now(), request.clone()));
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(result)) => result,
                Some(Step::Slow(delay, result)) => {
                    tokio::time::sleep(delay).await;
                    result
                }
                Some(Step::Hang) => std::future::pending().await,
                None => panic!("scripted transport ran out of steps"),
            }
        }
    }

    pub fn ros2_response() -> QueryResponse {
        QueryResponse {
            answer: "ROS 2 is...".to_string(),
            sources: vec![SourceReference {
                chapter_title: "Chapter 1: Introduction to ROS 2".to_string(),
                section_title: "What is ROS 2?".to_string(),
                module: "module-1-ros2".to_string(),
                url: "/module-1-ros2/chapter-1#what-is-ros2".to_string(),
                relevance_score: 0.92,
            }],
            confidence: Confidence::High,
            mode_used: "global".to_string(),
            chunks_retrieved: 4,
        }
    }
}
