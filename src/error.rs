//! Error taxonomy for a sweep run.
//!
//! Every failure aborts the run. Nothing here is retried by the core; the
//! transport decides on its own retries before surfacing a [`TransportError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Which half of a trial an error or progress record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Upload => write!(f, "upload"),
            Operation::Download => write!(f, "download"),
        }
    }
}

/// Container lifecycle step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningAction {
    Create,
    Delete,
}

impl std::fmt::Display for ProvisioningAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningAction::Create => write!(f, "create"),
            ProvisioningAction::Delete => write!(f, "delete"),
        }
    }
}

/// A single upload or download that did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{operation} of blob {blob} exceeded the {limit:?} operation timeout")]
    Timeout {
        operation: Operation,
        blob: String,
        limit: Duration,
    },

    #[error("{operation} of blob {blob} failed: {source}")]
    Transport {
        operation: Operation,
        blob: String,
        #[source]
        source: TransportError,
    },
}

impl TransferError {
    pub fn operation(&self) -> Operation {
        match self {
            TransferError::Timeout { operation, .. } | TransferError::Transport { operation, .. } => {
                *operation
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("cannot average an empty list of trial durations")]
    EmptyInput,

    #[error("failed to {action} container {container}: {source}")]
    Provisioning {
        action: ProvisioningAction,
        container: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("failed to write results to {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sweep interrupted before completion")]
    Interrupted,
}

impl SweepError {
    /// True when the run was aborted by an expired per-operation deadline,
    /// as opposed to a transport or network failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SweepError::Transfer(TransferError::Timeout { .. }))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SweepError::InvalidConfiguration(msg.into())
    }
}
