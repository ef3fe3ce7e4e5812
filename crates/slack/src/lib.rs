//! Slack delivery for feedback forms.
//!
//! - **Attachments** (`attachment`) - render a completed form as a Slack attachment
//! - **Commands** (`command`) - webhook and `chat.postMessage` request construction
//! - **Transport** (`transport`) - HTTPS [`reporter_core::Transport`] implementation
//! - **Reporter** (`reporter`) - host entry point wiring config, queue and transport
//!
//! # Architecture
//!
//! ```text
//! FeedbackReport → FeedbackReporter → DeliveryCoordinator → upload queue (JSON file)
//!                                            ↓
//!                                     SlackTransport → hooks.slack.com / slack.com/api
//! ```

pub mod attachment;
pub mod command;
pub mod reporter;
pub mod transport;

pub use attachment::{
    AttachmentField, FeedbackField, FeedbackReport, FieldLabels, FieldPlacement, SlackAttachment,
    SystemField,
};
pub use command::{CommandError, PostingIdentity, SlackCommand, SlackEndpoints};
pub use reporter::{BootstrapError, FeedbackReporter, FormRoute, SubmitOutcome};
pub use transport::{SlackTransport, SlackTransportSettings};
