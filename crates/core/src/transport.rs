use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::envelope::Envelope;

/// Result of one delivery attempt. Transport failures are data, never errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The request could not be constructed.
    InternalError(String),
    /// Network-level failure before a response arrived.
    RequestError(String),
    /// A response arrived with a status outside 200..=299.
    ServerResponseError(u16),
    Success(Vec<u8>),
}

/// How the coordinator treats an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Delivered,
    /// Worth retrying as-is later.
    Transient,
    /// The envelope itself is unlikely to ever be accepted.
    Rejected,
}

impl TransportOutcome {
    pub fn from_status(status: u16, body: Vec<u8>) -> Self {
        if (200..=299).contains(&status) {
            Self::Success(body)
        } else {
            Self::ServerResponseError(status)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Success(_) => Disposition::Delivered,
            Self::RequestError(_) => Disposition::Transient,
            Self::ServerResponseError(status) if is_transient_status(*status) => {
                Disposition::Transient
            }
            Self::ServerResponseError(_) | Self::InternalError(_) => Disposition::Rejected,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InternalError(_) => "internal_error",
            Self::RequestError(_) => "request_error",
            Self::ServerResponseError(_) => "server_response_error",
            Self::Success(_) => "success",
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one delivery attempt for `envelope`.
    async fn send(&self, envelope: &Envelope) -> TransportOutcome;
}

/// Transport that replays a fixed script of outcomes and records every envelope it saw.
///
/// Once the script runs out every further attempt succeeds.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<TransportOutcome>>,
    sent: Mutex<Vec<Envelope>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: impl IntoIterator<Item = TransportOutcome>) -> Self {
        Self { script: Mutex::new(outcomes.into_iter().collect()), sent: Mutex::default() }
    }

    pub fn push(&self, outcome: TransportOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Every envelope passed to `send`, in call order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, envelope: &Envelope) -> TransportOutcome {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(envelope.clone());
        }

        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| TransportOutcome::Success(b"ok".to_vec()))
    }
}
