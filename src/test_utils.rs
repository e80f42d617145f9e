//! Mocks shared by unit and integration tests.

use crate::acceptance::ConnectionStatusSource;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::types::events::{AcceptanceEvent, CallAcceptanceListener};
use popin_core::ApiError;
use popin_core::types::{CallId, CallQueueId, StatusUpdate};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct MockHttpClient;

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        Ok(HttpResponse {
            status_code: 200,
            body: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingMockHttpClient;

#[async_trait::async_trait]
impl HttpClient for FailingMockHttpClient {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        Err(anyhow::anyhow!("Not implemented"))
    }
}

/// Replies with queued responses in order and records every request.
/// Once the queue is empty the fallback is used, or a transport error if
/// there is none.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    fallback: Option<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, response: HttpResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn push_json(&self, status_code: u16, body: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::json(status_code, body)));
        self
    }

    pub fn push_error(&self, message: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no scripted response left")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PollReply {
    Update(StatusUpdate),
    /// Transport failure.
    Fail,
    /// Answers after the given delay.
    Delayed(Duration, StatusUpdate),
    /// Never answers.
    Pending,
}

/// Status source that plays back a script of poll replies.
#[derive(Debug)]
pub struct ScriptedStatusSource {
    script: Mutex<VecDeque<PollReply>>,
    fallback: PollReply,
    polls: Mutex<Vec<(CallQueueId, Instant)>>,
}

impl ScriptedStatusSource {
    pub fn new(script: Vec<PollReply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: PollReply::Fail,
            polls: Mutex::new(Vec::new()),
        })
    }

    /// Reply used once the script is exhausted.
    pub fn with_fallback(self: Arc<Self>, update: StatusUpdate) -> Arc<Self> {
        self.with_fallback_reply(PollReply::Update(update))
    }

    pub fn with_fallback_reply(self: Arc<Self>, reply: PollReply) -> Arc<Self> {
        let inner = Arc::try_unwrap(self).expect("configure the source before sharing it");
        Arc::new(Self {
            fallback: reply,
            ..inner
        })
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().unwrap().len()
    }

    pub fn polled_ids(&self) -> Vec<CallQueueId> {
        self.polls.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait::async_trait]
impl ConnectionStatusSource for ScriptedStatusSource {
    async fn connection_update(
        &self,
        call_queue_id: CallQueueId,
    ) -> Result<StatusUpdate, ApiError> {
        self.polls
            .lock()
            .unwrap()
            .push((call_queue_id, Instant::now()));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            PollReply::Update(update) => Ok(update),
            PollReply::Fail => Err(ApiError::Transport(anyhow::anyhow!("connection reset"))),
            PollReply::Delayed(delay, update) => {
                tokio::time::sleep(delay).await;
                Ok(update)
            }
            PollReply::Pending => std::future::pending().await,
        }
    }
}

/// Records listener callbacks with the (tokio) time they arrived.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(Instant, AcceptanceEvent)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AcceptanceEvent> {
        self.events.lock().unwrap().iter().map(|(_, e)| *e).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, AcceptanceEvent)> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: AcceptanceEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

impl CallAcceptanceListener for RecordingListener {
    fn on_queue_position_change(&self, position: u32) {
        self.record(AcceptanceEvent::QueuePositionChanged(position));
    }

    fn on_call_accepted(&self, call_id: CallId) {
        self.record(AcceptanceEvent::CallAccepted(call_id));
    }

    fn on_call_missed(&self) {
        self.record(AcceptanceEvent::CallMissed);
    }
}
