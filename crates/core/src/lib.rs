//! Reliable feedback delivery.
//!
//! Submissions are resolved into [`Envelope`]s, persisted in a durable FIFO
//! upload queue and drained by the [`DeliveryCoordinator`] whenever the
//! network is reachable. Transport, storage and connectivity are traits so
//! hosts and tests can swap them.

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod store;
pub mod transport;

pub use config::{ConfigError, ConfigOverrides, LoadOptions, LogFormat, ReporterConfig};
pub use connectivity::{
    ConnectivityMonitor, ConnectivityState, NetworkKind, ReachabilityMonitor, StaticConnectivity,
};
pub use coordinator::{
    DeliveryCoordinator, DeliverySettings, DeliveryWorker, DrainReport, UploadState,
};
pub use domain::envelope::{ConnectionMode, Envelope, Submission, SubmissionTarget};
pub use errors::{DeliveryError, QueueStoreError};
pub use store::{FileQueueStore, InMemoryQueueStore, QueueStore};
pub use transport::{Disposition, ScriptedTransport, Transport, TransportOutcome};
