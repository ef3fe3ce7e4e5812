use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use reporter_core::config::SlackConfig;
use reporter_core::{Envelope, Transport, TransportOutcome};

use crate::command::{PostingIdentity, SlackCommand, SlackEndpoints};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackTransportSettings {
    pub endpoints: SlackEndpoints,
    pub identity: PostingIdentity,
    pub timeout: Duration,
}

impl Default for SlackTransportSettings {
    fn default() -> Self {
        Self {
            endpoints: SlackEndpoints::default(),
            identity: PostingIdentity::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SlackTransportSettings {
    pub fn from_config(config: &SlackConfig) -> Self {
        Self {
            endpoints: SlackEndpoints::from_config(config),
            identity: PostingIdentity::from_config(config),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Sends envelopes to Slack over HTTPS.
///
/// Every failure is folded into a [`TransportOutcome`]; nothing is retried
/// here. Error text never carries the request URL, which holds the webhook id.
#[derive(Clone, Debug)]
pub struct SlackTransport {
    client: Client,
    settings: SlackTransportSettings,
}

impl SlackTransport {
    pub fn new(settings: SlackTransportSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    pub fn with_client(client: Client, settings: SlackTransportSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &SlackTransportSettings {
        &self.settings
    }
}

#[async_trait]
impl Transport for SlackTransport {
    async fn send(&self, envelope: &Envelope) -> TransportOutcome {
        let command = SlackCommand::from_envelope(envelope, &self.settings.identity);
        let request = match command.build_request(&self.client, &self.settings.endpoints) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    event_name = "slack.request.invalid",
                    mode = command.mode().as_str(),
                    form_name = %envelope.name,
                    error = %error,
                    "could not build slack request"
                );
                return TransportOutcome::InternalError(error.to_string());
            }
        };

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                let error = error.without_url();
                debug!(
                    event_name = "slack.request.failed",
                    mode = command.mode().as_str(),
                    timeout = error.is_timeout(),
                    error = %error,
                    "slack request did not complete"
                );
                return TransportOutcome::RequestError(error.to_string());
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            debug!(
                event_name = "slack.response.rejected",
                mode = command.mode().as_str(),
                status,
                "slack answered with an error status"
            );
            return TransportOutcome::ServerResponseError(status);
        }

        match response.bytes().await {
            Ok(body) => TransportOutcome::from_status(status, body.to_vec()),
            Err(error) => TransportOutcome::RequestError(error.without_url().to_string()),
        }
    }
}
