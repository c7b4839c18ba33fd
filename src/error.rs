use thiserror::Error;

/// Failures surfaced by the dataset engine.
///
/// `AccessDenied`, `MalformedSnapshot`, `NoInputProvided` and
/// `ConfirmationRequired` abort an operation before anything is touched.
/// `CollectionOperationFailed` is only ever recorded inside a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("credential incorrect")]
    AccessDenied,

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("{collection}: {message}")]
    CollectionOperationFailed { collection: String, message: String },

    #[error("no snapshot provided")]
    NoInputProvided,

    #[error("reset requires explicit confirmation")]
    ConfirmationRequired,

    #[error("identity provider unavailable: {0}")]
    IdentityUnavailable(String),
}

impl DatasetError {
    pub fn collection_failed(collection: &str, err: &anyhow::Error) -> Self {
        Self::CollectionOperationFailed {
            collection: collection.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Stable error code used in IPC envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::MalformedSnapshot(_) => "malformed_input",
            Self::CollectionOperationFailed { .. } => "collection_failed",
            Self::NoInputProvided => "no_input",
            Self::ConfirmationRequired => "confirmation_required",
            Self::IdentityUnavailable(_) => "identity_unavailable",
        }
    }
}
