//! Delivery coordinator.
//!
//! Owns the single-writer gate over the upload queue. Every enqueue, flush
//! and drain runs under that gate, so at most one transport call is in flight
//! and queue mutations never interleave. Draining is strictly FIFO with
//! head-of-line blocking: a failed head stops the drain and stays in place.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::domain::envelope::{Envelope, Submission};
use crate::errors::DeliveryError;
use crate::store::QueueStore;
use crate::transport::{Disposition, Transport, TransportOutcome};

pub const DEFAULT_MAX_REJECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub struct DeliverySettings {
    /// Used when a submission carries no token of its own.
    pub default_token: SecretString,
    /// Send immediately and never persist; failed sends are dropped.
    pub disable_queue: bool,
    /// Consecutive rejections of one head before it is dead-lettered. `0` never gives up.
    pub max_rejections: u32,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            default_token: String::new().into(),
            disable_queue: false,
            max_rejections: DEFAULT_MAX_REJECTIONS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UploadState {
    #[default]
    NoUploadRequired,
    RetryUpload,
}

impl UploadState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoUploadRequired => "no_upload_required",
            Self::RetryUpload => "retry_upload",
        }
    }
}

/// What one enqueue or flush accomplished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub dead_lettered: usize,
    /// Submissions lost because the queue is disabled and the send failed.
    pub dropped: usize,
    pub remaining: usize,
    pub upload_state: UploadState,
}

#[derive(Debug, Default)]
struct RejectionTracker {
    head: Option<Envelope>,
    count: u32,
}

impl RejectionTracker {
    fn record(&mut self, head: &Envelope) -> u32 {
        if self.head.as_ref() == Some(head) {
            self.count = self.count.saturating_add(1);
        } else {
            self.head = Some(head.clone());
            self.count = 1;
        }
        self.count
    }

    fn clear(&mut self) {
        self.head = None;
        self.count = 0;
    }
}

pub struct DeliveryCoordinator {
    settings: DeliverySettings,
    store: Arc<dyn QueueStore>,
    dead_letters: Option<Arc<dyn QueueStore>>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    gate: Mutex<RejectionTracker>,
    upload_state: watch::Sender<UploadState>,
}

impl DeliveryCoordinator {
    pub fn new(
        settings: DeliverySettings,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        let (upload_state, _receiver) = watch::channel(UploadState::default());
        Self {
            settings,
            store,
            dead_letters: None,
            transport,
            connectivity,
            gate: Mutex::new(RejectionTracker::default()),
            upload_state,
        }
    }

    /// Parks rejected envelopes in `store` instead of discarding them.
    pub fn with_dead_letter_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    pub fn upload_state(&self) -> UploadState {
        *self.upload_state.borrow()
    }

    pub fn subscribe_upload_state(&self) -> watch::Receiver<UploadState> {
        self.upload_state.subscribe()
    }

    /// Validates and persists `submission`, then drains the queue.
    ///
    /// Validation happens before the queue is touched. `NoInternetConnection`
    /// means the submission is safely queued and will be retried later, unless
    /// the queue is disabled, in which case it was dropped.
    pub async fn enqueue(&self, submission: Submission) -> Result<DrainReport, DeliveryError> {
        let envelope = submission.into_envelope(self.settings.default_token.expose_secret())?;
        let correlation_id = Uuid::new_v4().to_string();

        if self.settings.disable_queue {
            return self.send_unqueued(envelope, &correlation_id).await;
        }

        let mut tracker = self.gate.lock().await;
        let mode = envelope.mode();
        let form_name = envelope.name.clone();
        let queue_depth = self.store.append(envelope).await?;
        info!(
            event_name = "delivery.enqueue.accepted",
            correlation_id = %correlation_id,
            mode = mode.as_str(),
            form_name = %form_name,
            queue_depth,
            "queued feedback for upload"
        );

        self.drain_locked(&mut tracker, &correlation_id).await
    }

    /// Retries whatever is queued. A no-op when the queue is disabled.
    pub async fn flush(&self) -> Result<DrainReport, DeliveryError> {
        if self.settings.disable_queue {
            return Ok(DrainReport { upload_state: self.upload_state(), ..DrainReport::default() });
        }

        let mut tracker = self.gate.lock().await;
        let correlation_id = Uuid::new_v4().to_string();
        self.drain_locked(&mut tracker, &correlation_id).await
    }

    /// Flushes once at start-up, then again on every connectivity change until
    /// `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut connectivity = self.connectivity.subscribe();
        let mut monitoring = true;

        info!(event_name = "delivery.worker.started", "delivery coordinator started");
        self.flush_and_log("startup").await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = connectivity.changed(), if monitoring => {
                    if changed.is_err() {
                        warn!(
                            event_name = "delivery.worker.monitor_closed",
                            "connectivity monitor went away; waiting for shutdown"
                        );
                        monitoring = false;
                    } else {
                        let status = *connectivity.borrow_and_update();
                        debug!(
                            event_name = "delivery.worker.connectivity_changed",
                            status = status.as_str(),
                            "connectivity changed; flushing upload queue"
                        );
                        self.flush_and_log("connectivity_changed").await;
                    }
                }
            }
        }

        info!(event_name = "delivery.worker.stopped", "delivery coordinator stopped");
    }

    /// Runs [`DeliveryCoordinator::run`] on the tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> DeliveryWorker {
        let (shutdown, receiver) = watch::channel(false);
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move { coordinator.run(receiver).await });
        DeliveryWorker { shutdown, handle }
    }

    async fn flush_and_log(&self, trigger: &'static str) {
        match self.flush().await {
            Ok(report) => debug!(
                event_name = "delivery.flush.completed",
                trigger,
                delivered = report.delivered,
                dead_lettered = report.dead_lettered,
                remaining = report.remaining,
                upload_state = report.upload_state.as_str(),
                "upload queue flushed"
            ),
            Err(DeliveryError::NoInternetConnection) => debug!(
                event_name = "delivery.flush.deferred",
                trigger,
                "offline; upload queue left for the next connectivity change"
            ),
            Err(error) => warn!(
                event_name = "delivery.flush.failed",
                trigger,
                error_class = error.error_class(),
                error = %error,
                "upload queue flush failed"
            ),
        }
    }

    async fn send_unqueued(
        &self,
        envelope: Envelope,
        correlation_id: &str,
    ) -> Result<DrainReport, DeliveryError> {
        let _gate = self.gate.lock().await;

        if !self.connectivity.current_status().is_online() {
            warn!(
                event_name = "delivery.bypass.offline",
                correlation_id = %correlation_id,
                form_name = %envelope.name,
                "queue disabled and offline; feedback dropped"
            );
            return Err(DeliveryError::NoInternetConnection);
        }

        let outcome = self.transport.send(&envelope).await;
        let mut report =
            DrainReport { upload_state: self.upload_state(), ..DrainReport::default() };
        if outcome.is_success() {
            info!(
                event_name = "delivery.bypass.delivered",
                correlation_id = %correlation_id,
                form_name = %envelope.name,
                "delivered feedback without queueing"
            );
            report.delivered = 1;
        } else {
            warn!(
                event_name = "delivery.bypass.dropped",
                correlation_id = %correlation_id,
                form_name = %envelope.name,
                error_class = outcome.error_class(),
                detail = %describe_failure(&outcome),
                "queue disabled; failed feedback dropped"
            );
            report.dropped = 1;
        }
        Ok(report)
    }

    async fn drain_locked(
        &self,
        tracker: &mut RejectionTracker,
        correlation_id: &str,
    ) -> Result<DrainReport, DeliveryError> {
        let mut report = DrainReport::default();

        loop {
            let Some(head) = self.store.peek_first().await else {
                tracker.clear();
                self.set_upload_state(UploadState::NoUploadRequired);
                report.upload_state = UploadState::NoUploadRequired;
                report.remaining = 0;
                return Ok(report);
            };

            if !self.connectivity.current_status().is_online() {
                self.set_upload_state(UploadState::RetryUpload);
                debug!(
                    event_name = "delivery.drain.offline",
                    correlation_id = %correlation_id,
                    delivered = report.delivered,
                    "offline; deferring upload"
                );
                return Err(DeliveryError::NoInternetConnection);
            }

            let outcome = self.transport.send(&head).await;
            match outcome.disposition() {
                Disposition::Delivered => {
                    tracker.clear();
                    self.store.remove_first().await?;
                    report.delivered += 1;
                    info!(
                        event_name = "delivery.drain.delivered",
                        correlation_id = %correlation_id,
                        form_name = %head.name,
                        mode = head.mode().as_str(),
                        "delivered queued feedback"
                    );
                }
                Disposition::Transient => {
                    tracker.clear();
                    warn!(
                        event_name = "delivery.drain.retry_scheduled",
                        correlation_id = %correlation_id,
                        form_name = %head.name,
                        error_class = outcome.error_class(),
                        detail = %describe_failure(&outcome),
                        "upload failed; will retry on next flush"
                    );
                    return Ok(self.stop_for_retry(report).await);
                }
                Disposition::Rejected => {
                    let rejections = tracker.record(&head);
                    let limit = self.settings.max_rejections;
                    if limit > 0 && rejections >= limit {
                        self.dead_letter(&head, rejections, &outcome, correlation_id).await?;
                        tracker.clear();
                        report.dead_lettered += 1;
                        continue;
                    }

                    warn!(
                        event_name = "delivery.drain.rejected",
                        correlation_id = %correlation_id,
                        form_name = %head.name,
                        error_class = outcome.error_class(),
                        detail = %describe_failure(&outcome),
                        rejections,
                        max_rejections = limit,
                        "upload rejected; head kept in place"
                    );
                    return Ok(self.stop_for_retry(report).await);
                }
            }
        }
    }

    async fn stop_for_retry(&self, mut report: DrainReport) -> DrainReport {
        self.set_upload_state(UploadState::RetryUpload);
        report.upload_state = UploadState::RetryUpload;
        report.remaining = self.store.load().await.len();
        report
    }

    async fn dead_letter(
        &self,
        head: &Envelope,
        rejections: u32,
        outcome: &TransportOutcome,
        correlation_id: &str,
    ) -> Result<(), DeliveryError> {
        if let Some(dead_letters) = &self.dead_letters {
            dead_letters.append(head.clone()).await?;
        }
        self.store.remove_first().await?;

        error!(
            event_name = "delivery.drain.dead_lettered",
            correlation_id = %correlation_id,
            form_name = %head.name,
            rejections,
            error_class = outcome.error_class(),
            detail = %describe_failure(outcome),
            parked = self.dead_letters.is_some(),
            "giving up on repeatedly rejected feedback"
        );
        Ok(())
    }

    fn set_upload_state(&self, next: UploadState) {
        let mut previous = next;
        let changed = self.upload_state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });

        if changed {
            debug!(
                event_name = "delivery.upload_state.changed",
                from = previous.as_str(),
                to = next.as_str(),
                "upload state changed"
            );
        }
    }
}

/// Handle to a spawned [`DeliveryCoordinator::run`] loop.
pub struct DeliveryWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DeliveryWorker {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the loop to stop and waits for it. An in-flight send is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(join_error) = self.handle.await {
            warn!(
                event_name = "delivery.worker.join_failed",
                error = %join_error,
                "delivery worker did not stop cleanly"
            );
        }
    }
}

fn describe_failure(outcome: &TransportOutcome) -> String {
    match outcome {
        TransportOutcome::InternalError(reason) | TransportOutcome::RequestError(reason) => {
            reason.clone()
        }
        TransportOutcome::ServerResponseError(status) => format!("http status {status}"),
        TransportOutcome::Success(_) => "success".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{DeliveryCoordinator, DeliverySettings, UploadState};
    use crate::connectivity::StaticConnectivity;
    use crate::domain::envelope::Submission;
    use crate::errors::DeliveryError;
    use crate::store::{InMemoryQueueStore, QueueStore};
    use crate::transport::{ScriptedTransport, TransportOutcome};

    struct Harness {
        store: Arc<InMemoryQueueStore>,
        dead_letters: Arc<InMemoryQueueStore>,
        transport: Arc<ScriptedTransport>,
        coordinator: DeliveryCoordinator,
    }

    fn harness(
        settings: DeliverySettings,
        connectivity: StaticConnectivity,
        outcomes: Vec<TransportOutcome>,
    ) -> Harness {
        let store = Arc::new(InMemoryQueueStore::default());
        let dead_letters = Arc::new(InMemoryQueueStore::default());
        let transport = Arc::new(ScriptedTransport::new(outcomes));
        let coordinator = DeliveryCoordinator::new(
            settings,
            store.clone(),
            transport.clone(),
            Arc::new(connectivity),
        )
        .with_dead_letter_store(dead_letters.clone());
        Harness { store, dead_letters, transport, coordinator }
    }

    fn webhook_settings() -> DeliverySettings {
        DeliverySettings { default_token: "T0/B0/default".to_owned().into(), ..Default::default() }
    }

    fn form(name: &str) -> Submission {
        Submission::webhook(None, json!({ "pretext": name }), name)
    }

    #[tokio::test]
    async fn online_enqueue_delivers_and_empties_queue() {
        let h = harness(webhook_settings(), StaticConnectivity::online(), Vec::new());

        let report = h.coordinator.enqueue(form("a")).await.expect("enqueue");

        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(report.upload_state, UploadState::NoUploadRequired);
        assert!(h.store.load().await.is_empty());
        assert_eq!(h.transport.sent()[0].token, "T0/B0/default");
    }

    #[tokio::test]
    async fn offline_enqueue_persists_without_sending() {
        let h = harness(webhook_settings(), StaticConnectivity::offline(), Vec::new());

        let error = h.coordinator.enqueue(form("a")).await.expect_err("offline");

        assert!(matches!(error, DeliveryError::NoInternetConnection));
        assert_eq!(h.store.load().await.len(), 1);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.coordinator.upload_state(), UploadState::RetryUpload);
    }

    #[tokio::test]
    async fn configuration_errors_leave_queue_untouched() {
        let h = harness(DeliverySettings::default(), StaticConnectivity::online(), Vec::new());

        let error = h.coordinator.enqueue(form("a")).await.expect_err("no token");

        assert!(matches!(error, DeliveryError::TokenNotDefined));
        assert!(h.store.load().await.is_empty());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_keeps_head_and_stops_drain() {
        let h = harness(
            webhook_settings(),
            StaticConnectivity::online(),
            vec![TransportOutcome::ServerResponseError(503)],
        );

        let report = h.coordinator.enqueue(form("a")).await.expect("enqueue");

        assert_eq!(report.delivered, 0);
        assert_eq!(report.remaining, 1);
        assert_eq!(report.upload_state, UploadState::RetryUpload);
        assert_eq!(h.coordinator.upload_state(), UploadState::RetryUpload);

        let report = h.coordinator.flush().await.expect("flush");
        assert_eq!(report.delivered, 1);
        assert_eq!(h.coordinator.upload_state(), UploadState::NoUploadRequired);
    }

    #[tokio::test]
    async fn repeated_rejections_move_head_to_dead_letters() {
        let settings = DeliverySettings { max_rejections: 2, ..webhook_settings() };
        let h = harness(
            settings,
            StaticConnectivity::online(),
            vec![
                TransportOutcome::ServerResponseError(404),
                TransportOutcome::ServerResponseError(404),
            ],
        );

        let first = h.coordinator.enqueue(form("doomed")).await.expect("enqueue");
        assert_eq!(first.remaining, 1);
        assert_eq!(first.dead_lettered, 0);

        let second = h.coordinator.enqueue(form("next")).await.expect("enqueue");
        assert_eq!(second.dead_lettered, 1);
        assert_eq!(second.delivered, 1);
        assert!(h.store.load().await.is_empty());

        let parked = h.dead_letters.load().await;
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].name, "doomed");
    }

    #[tokio::test]
    async fn transient_failure_breaks_a_rejection_streak() {
        let settings = DeliverySettings { max_rejections: 2, ..webhook_settings() };
        let h = harness(
            settings,
            StaticConnectivity::online(),
            vec![
                TransportOutcome::ServerResponseError(404),
                TransportOutcome::ServerResponseError(503),
                TransportOutcome::ServerResponseError(404),
            ],
        );

        h.coordinator.enqueue(form("flaky")).await.expect("enqueue");
        h.coordinator.flush().await.expect("flush");
        let third = h.coordinator.flush().await.expect("flush");

        assert_eq!(third.dead_lettered, 0);
        assert_eq!(third.remaining, 1);
        assert!(h.dead_letters.load().await.is_empty());
        assert_eq!(h.transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn zero_max_rejections_never_dead_letters() {
        let settings = DeliverySettings { max_rejections: 0, ..webhook_settings() };
        let h = harness(
            settings,
            StaticConnectivity::online(),
            vec![TransportOutcome::InternalError("bad url".to_owned()); 6],
        );

        for index in 0..6 {
            let report =
                h.coordinator.enqueue(form(&format!("stuck-{index}"))).await.expect("enqueue");
            assert_eq!(report.delivered, 0);
        }

        assert!(h.dead_letters.load().await.is_empty());
        assert_eq!(h.store.load().await.len(), 6);
        assert!(h.transport.sent().iter().all(|envelope| envelope.name == "stuck-0"));
    }

    #[tokio::test]
    async fn flush_with_disabled_queue_is_a_no_op() {
        let settings = DeliverySettings { disable_queue: true, ..webhook_settings() };
        let h = harness(settings, StaticConnectivity::online(), Vec::new());

        let report = h.coordinator.flush().await.expect("flush");

        assert_eq!(report.delivered, 0);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_queue_drops_failed_submission() {
        let settings = DeliverySettings { disable_queue: true, ..webhook_settings() };
        let h = harness(
            settings,
            StaticConnectivity::online(),
            vec![TransportOutcome::RequestError("connection reset".to_owned())],
        );

        let report = h.coordinator.enqueue(form("a")).await.expect("enqueue");

        assert_eq!(report.dropped, 1);
        assert_eq!(h.transport.sent().len(), 1);
        assert!(h.store.load().await.is_empty());

        let retry = h.coordinator.flush().await.expect("flush");
        assert_eq!(retry.delivered, 0);
        assert_eq!(h.transport.sent().len(), 1);
    }
}
