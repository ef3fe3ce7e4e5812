use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("could not encode upload queue as JSON: {0}")]
    CouldNotSaveJson(#[source] serde_json::Error),
    #[error("failed to write upload queue `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no webhook id was given and no default token is configured")]
    TokenNotDefined,
    #[error("authenticated delivery requires a channel argument")]
    AuthenticatedCommandTypeRequiresAChannelArgument,
    #[error("no internet connection; delivery deferred until connectivity returns")]
    NoInternetConnection,
    #[error("payload is not a valid JSON object: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Persistence(#[from] QueueStoreError),
}

impl DeliveryError {
    /// Errors caused by how the host wired the reporter, as opposed to runtime conditions.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TokenNotDefined
                | Self::AuthenticatedCommandTypeRequiresAChannelArgument
                | Self::InvalidPayload(_)
        )
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::TokenNotDefined => "token_not_defined",
            Self::AuthenticatedCommandTypeRequiresAChannelArgument => "channel_required",
            Self::NoInternetConnection => "no_internet_connection",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Persistence(_) => "persistence",
        }
    }
}
