//! Error types for the pawlog crate.

use std::io;

use thiserror::Error;

/// Errors returned by remote and local store calls.
///
/// The repository layer matches on these variants to decide whether to fall
/// back to the local store. None of them reach the user.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No remote store is configured. Expected steady state without a backend.
    #[error("remote store not configured")]
    NotConfigured,

    /// The remote collection (table) does not exist yet.
    #[error("collection '{0}' is not provisioned on the remote store")]
    NotProvisioned(String),

    /// Network, auth, validation or server-side failure on the remote store.
    #[error("remote store error: {0}")]
    Transient(String),

    /// Local durable storage failed (quota, permissions, serialization).
    #[error("local store error: {0}")]
    Local(#[from] io::Error),
}

impl StoreError {
    /// Whether the failure is a soft miss rather than a real fault.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::NotProvisioned(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Local(io::Error::from(err))
    }
}

/// A required form field is missing or out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn required(field: &'static str) -> Self {
        Self::new(field, "is required")
    }
}

/// Errors surfaced to the caller of a repository write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another submission on the same form has not finished yet.
    #[error("a previous submission is still in progress")]
    InFlight,
}

/// Malformed configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
