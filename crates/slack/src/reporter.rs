use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use reporter_core::config::ReporterConfig;
use reporter_core::coordinator::DeliveryWorker;
use reporter_core::logging::init_logging;
use reporter_core::{
    ConfigError, ConnectionMode, ConnectivityMonitor, DeliveryCoordinator, DeliveryError,
    DrainReport, FileQueueStore, LoadOptions, Submission, SubmissionTarget, Transport,
};

use crate::attachment::FeedbackReport;
use crate::transport::{SlackTransport, SlackTransportSettings};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not build slack http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Per-submission routing. Empty fields fall back to the configured defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormRoute {
    pub webhook_id: Option<String>,
    pub channel: Option<String>,
}

impl FormRoute {
    pub fn webhook(webhook_id: impl Into<String>) -> Self {
        Self { webhook_id: Some(webhook_id.into()), channel: None }
    }

    pub fn channel(channel: impl Into<String>) -> Self {
        Self { webhook_id: None, channel: Some(channel.into()) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Persisted (or sent directly) and a drain ran.
    Accepted(DrainReport),
    /// Persisted; delivery waits for connectivity.
    Deferred,
    /// The queue is disabled and the network was unreachable.
    Dropped,
    /// The queue file could not be written. Nothing was sent.
    NotPersisted,
}

/// Host-facing entry point: turns completed forms into queued Slack messages.
pub struct FeedbackReporter {
    connection_mode: ConnectionMode,
    disable_queue: bool,
    coordinator: Arc<DeliveryCoordinator>,
}

impl FeedbackReporter {
    /// Loads configuration, installs logging and wires the HTTPS transport.
    pub fn bootstrap(
        options: LoadOptions,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Result<Self, BootstrapError> {
        let config = ReporterConfig::load(options)?;
        init_logging(&config.logging);
        Self::from_config(&config, connectivity)
    }

    pub fn from_config(
        config: &ReporterConfig,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Result<Self, BootstrapError> {
        let transport = SlackTransport::new(SlackTransportSettings::from_config(&config.slack))
            .map_err(BootstrapError::HttpClient)?;
        Ok(Self::with_transport(config, connectivity, Arc::new(transport)))
    }

    pub fn with_transport(
        config: &ReporterConfig,
        connectivity: Arc<dyn ConnectivityMonitor>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = FileQueueStore::new(config.queue.cache_path.clone());
        let dead_letters = store.dead_letter_sibling();
        let settings = config.delivery_settings();
        let coordinator =
            DeliveryCoordinator::new(settings, Arc::new(store), transport, connectivity)
                .with_dead_letter_store(Arc::new(dead_letters));

        info!(
            event_name = "reporter.ready",
            mode = config.slack.connection_mode.as_str(),
            disable_queue = config.queue.disable_queue,
            cache_path = %config.queue.cache_path.display(),
            "feedback reporter ready"
        );

        Self {
            connection_mode: config.slack.connection_mode,
            disable_queue: config.queue.disable_queue,
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        self.connection_mode
    }

    pub fn coordinator(&self) -> &Arc<DeliveryCoordinator> {
        &self.coordinator
    }

    /// Starts the background worker that drains the queue on reconnect.
    pub fn start(&self) -> DeliveryWorker {
        self.coordinator.spawn()
    }

    /// Renders `report` and hands it to the coordinator.
    ///
    /// Wiring mistakes (missing token, missing channel) are returned as errors;
    /// runtime conditions are reported through [`SubmitOutcome`].
    pub async fn submit(
        &self,
        report: &FeedbackReport,
        route: &FormRoute,
    ) -> Result<SubmitOutcome, DeliveryError> {
        let submission = Submission::from_serializable(
            self.target_for(route),
            &report.to_attachment(),
            report.title.clone(),
        )?;

        match self.coordinator.enqueue(submission).await {
            Ok(drain) => Ok(SubmitOutcome::Accepted(drain)),
            Err(DeliveryError::NoInternetConnection) if self.disable_queue => {
                Ok(SubmitOutcome::Dropped)
            }
            Err(DeliveryError::NoInternetConnection) => Ok(SubmitOutcome::Deferred),
            Err(DeliveryError::Persistence(error)) => {
                warn!(
                    event_name = "reporter.submit.not_persisted",
                    form_name = %report.title,
                    error = %error,
                    "feedback could not be saved to the upload queue"
                );
                Ok(SubmitOutcome::NotPersisted)
            }
            Err(error) => Err(error),
        }
    }

    fn target_for(&self, route: &FormRoute) -> SubmissionTarget {
        match self.connection_mode {
            ConnectionMode::Webhook => {
                SubmissionTarget::Webhook { webhook_id: route.webhook_id.clone() }
            }
            ConnectionMode::Authenticated => {
                SubmissionTarget::Channel(route.channel.clone().unwrap_or_default())
            }
        }
    }
}
