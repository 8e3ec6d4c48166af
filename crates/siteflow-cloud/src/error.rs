//! Cloud provisioning error types
//!
//! Every error maps onto a closed set of [`ErrorKind`]s. Callers branch on the
//! kind (retry, create-vs-update, idempotent success, abort) and never on the
//! message text.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used for control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource does not exist
    NotFound,
    /// The resource already exists (or is concurrently modified)
    Conflict,
    /// Throttling or a transient network failure; safe to retry
    Transient,
    /// Anything else
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Cloud provisioning errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Access denied: {message}\n  → Grant the `{permission}` permission to the deploying identity")]
    AccessDenied { message: String, permission: String },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Bucket name `{0}` is already taken by another account\n  → Choose a different `s3.bucketName` in the configuration"
    )]
    BucketNameTaken(String),

    #[error(
        "Distribution not found: {0}\n  → Check the distribution id in the configuration or state file, or run `siteflow recover --force`"
    )]
    DistributionNotFound(String),

    #[error("Price class change rejected by the provider: {0}")]
    PriceClassRestricted(String),

    #[error(
        "No hosted zone found for {domain}\n  → Create a public hosted zone for `{parent}` and delegate it at your registrar, then re-run the deployment"
    )]
    HostedZoneNotFound { domain: String, parent: String },

    #[error("Certificate for {domain} failed: {reason}")]
    CertificateFailed { domain: String, reason: String },

    #[error(
        "Certificate for {domain} is not ready: {source}\n  → Make sure the domain is delegated to these name servers: {}",
        .name_servers.join(", ")
    )]
    CertificateNotReady {
        domain: String,
        name_servers: Vec<String>,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Timeout: {message}\n  → {remediation}")]
    Timeout {
        message: String,
        remediation: String,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Corrupt state file {}: {reason}\n  → Fix or delete the file, then run `siteflow recover`", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error(
        "State already records {resource} `{recorded}`, refusing to replace it with `{requested}`"
    )]
    StateConflict {
        resource: &'static str,
        recorded: String,
        requested: String,
    },

    #[error("Failed to scan {}: {message}", .path.display())]
    Scan { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Classify this error for control flow
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::ResourceNotFound(_) => ErrorKind::NotFound,
            CloudError::ResourceAlreadyExists(_) | CloudError::StateConflict { .. } => {
                ErrorKind::Conflict
            }
            CloudError::Transient(_) => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn timeout(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        CloudError::Timeout {
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
