use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DeliveryError;

const REDACTED: &str = "[REDACTED]";

/// How an envelope reaches Slack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Incoming webhook; the envelope token is the webhook id.
    #[default]
    Webhook,
    /// `chat.postMessage` with an API token and a channel.
    Authenticated,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(Self::Webhook),
            "authenticated" => Ok(Self::Authenticated),
            other => Err(format!("unsupported connection mode `{other}`")),
        }
    }
}

/// One unit of work in the upload queue.
///
/// On disk an envelope is the positional array `[token, payload, channel, name]`;
/// that shape is private to this module.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PersistedEnvelope", into = "PersistedEnvelope")]
pub struct Envelope {
    pub token: String,
    pub payload: Map<String, Value>,
    pub channel: String,
    pub name: String,
}

impl Envelope {
    pub fn new(
        token: impl Into<String>,
        payload: Map<String, Value>,
        channel: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self { token: token.into(), payload, channel: channel.into(), name: name.into() }
    }

    /// An empty channel means webhook delivery.
    pub fn mode(&self) -> ConnectionMode {
        if self.channel.is_empty() {
            ConnectionMode::Webhook
        } else {
            ConnectionMode::Authenticated
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("token", &REDACTED)
            .field("payload", &self.payload)
            .field("channel", &self.channel)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedEnvelope(String, Map<String, Value>, String, String);

impl From<PersistedEnvelope> for Envelope {
    fn from(value: PersistedEnvelope) -> Self {
        let PersistedEnvelope(token, payload, channel, name) = value;
        Self { token, payload, channel, name }
    }
}

impl From<Envelope> for PersistedEnvelope {
    fn from(value: Envelope) -> Self {
        Self(value.token, value.payload, value.channel, value.name)
    }
}

/// Where a submission should be delivered.
#[derive(Clone, PartialEq, Eq)]
pub enum SubmissionTarget {
    /// Webhook delivery. `None` falls back to the configured default token.
    Webhook { webhook_id: Option<String> },
    /// Authenticated delivery to a channel name or id.
    Channel(String),
}

impl fmt::Debug for SubmissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook { webhook_id } => f
                .debug_struct("Webhook")
                .field("webhook_id", &webhook_id.as_ref().map(|_| REDACTED))
                .finish(),
            Self::Channel(channel) => f.debug_tuple("Channel").field(channel).finish(),
        }
    }
}

/// A caller's request to deliver one payload, before token resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub target: SubmissionTarget,
    pub payload: Value,
    pub name: String,
}

impl Submission {
    pub fn webhook(webhook_id: Option<String>, payload: Value, name: impl Into<String>) -> Self {
        Self { target: SubmissionTarget::Webhook { webhook_id }, payload, name: name.into() }
    }

    pub fn channel(channel: impl Into<String>, payload: Value, name: impl Into<String>) -> Self {
        Self { target: SubmissionTarget::Channel(channel.into()), payload, name: name.into() }
    }

    /// Builds a submission from any serializable payload.
    pub fn from_serializable<T: Serialize>(
        target: SubmissionTarget,
        payload: &T,
        name: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let payload = serde_json::to_value(payload)
            .map_err(|error| DeliveryError::InvalidPayload(error.to_string()))?;
        Ok(Self { target, payload, name: name.into() })
    }

    /// Resolves the token and validates target and payload. Nothing is mutated
    /// on failure, so callers can validate before touching the queue.
    pub fn into_envelope(self, default_token: &str) -> Result<Envelope, DeliveryError> {
        let (token, channel) = match self.target {
            SubmissionTarget::Webhook { webhook_id } => {
                let token = webhook_id
                    .as_deref()
                    .and_then(non_empty)
                    .or_else(|| non_empty(default_token))
                    .ok_or(DeliveryError::TokenNotDefined)?;
                (token, String::new())
            }
            SubmissionTarget::Channel(channel) => {
                let token = non_empty(default_token).ok_or(DeliveryError::TokenNotDefined)?;
                if channel.trim().is_empty() {
                    return Err(DeliveryError::AuthenticatedCommandTypeRequiresAChannelArgument);
                }
                (token, channel)
            }
        };

        let payload = match self.payload {
            Value::Object(map) => map,
            other => {
                return Err(DeliveryError::InvalidPayload(format!(
                    "expected a JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Envelope { token, payload, channel, name: self.name })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
