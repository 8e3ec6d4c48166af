//! Progress events
//!
//! The engine never prints. It reports what it is doing through a
//! [`ProgressReporter`]; the CLI renders the events.

use crate::certificate::CertificatePhase;
use crate::tracker::ChangeSummary;

/// Pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Certificate,
    Bucket,
    Upload,
    Cleanup,
    Distribution,
    WaitForDeployment,
    Invalidation,
    CacheWarming,
    AliasRecords,
    Rollback,
    Teardown,
    Discovery,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Certificate => write!(f, "certificate"),
            Step::Bucket => write!(f, "bucket"),
            Step::Upload => write!(f, "upload"),
            Step::Cleanup => write!(f, "cleanup"),
            Step::Distribution => write!(f, "distribution"),
            Step::WaitForDeployment => write!(f, "wait for deployment"),
            Step::Invalidation => write!(f, "invalidation"),
            Step::CacheWarming => write!(f, "cache warming"),
            Step::AliasRecords => write!(f, "alias records"),
            Step::Rollback => write!(f, "rollback"),
            Step::Teardown => write!(f, "teardown"),
            Step::Discovery => write!(f, "discovery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployEvent {
    StepStarted(Step),
    StepSkipped { step: Step, reason: String },
    BucketReady { bucket: String, created: bool },
    ChangesDetected(ChangeSummary),
    UploadProgress { completed: usize, total: usize },
    ObjectsDeleted { count: usize },
    CertificatePhase { domain: String, phase: CertificatePhase },
    HostedZoneCreated { zone: String, name_servers: Vec<String> },
    DistributionReady { id: String, domain: String, created: bool },
    DistributionDeployed { id: String },
    InvalidationCreated { id: String, paths: Vec<String> },
    AliasRecordsPublished { records: Vec<String> },
    ResourceDeleted { kind: String, id: String },
    RolledBack { bucket: String },
    /// A best-effort sub-step failed; the run continues
    Warning(String),
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: DeployEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: DeployEvent) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: DeployEvent) {
        match event {
            DeployEvent::Warning(message) => tracing::warn!("{}", message),
            other => tracing::info!("{:?}", other),
        }
    }
}

/// Emit a warning both to the reporter and to the log
pub(crate) fn warn(reporter: &dyn ProgressReporter, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!("{}", message);
    reporter.report(DeployEvent::Warning(message));
}
