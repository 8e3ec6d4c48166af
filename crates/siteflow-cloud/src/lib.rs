//! SiteFlow deployment engine
//!
//! This crate turns a local directory of static files into a hosted website:
//! an object-storage bucket, an optional CDN distribution with a custom
//! domain and certificate, and the DNS records that point at it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  siteflow CLI                    │
//! │        (deploy / remove / status / recover)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │ DeployEvent
//! ┌─────────────────▼───────────────────────────────┐
//! │                 siteflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   deploy (orchestrator, rollback)         │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌─────┐  │
//! │  │ storage │ │   cdn   │ │certificate│ │ dns │  │
//! │  └─────────┘ └─────────┘ └───────────┘ └─────┘  │
//! │  ┌─────────┐ ┌─────────┐ ┌───────────┐          │
//! │  │ tracker │ │  state  │ │ discovery │          │
//! │  └─────────┘ └─────────┘ └───────────┘          │
//! │  trait ObjectStore / CdnService /               │
//! │        CertificateAuthority / DnsService        │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼────────────┐
//! │ siteflow-cloud-aws │
//! │ S3 / CloudFront /  │
//! │ ACM / Route 53     │
//! └────────────────────┘
//! ```

pub mod cdn;
pub mod certificate;
pub mod deploy;
pub mod discovery;
pub mod dns;
pub mod error;
pub mod event;
pub mod provider;
pub mod retry;
pub mod state;
pub mod storage;
pub mod tags;
pub mod tracker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use deploy::{
    CdnRequest, CustomDomain, DeployContext, DeployReport, DeployRequest, LiveStatus,
    RemoveReport, RemoveRequest, ResourceStatus, StatusReport, Timing, deploy, remove, status,
};
pub use discovery::{
    DiscoveredResource, DiscoveredSet, ResourceKind, discover_all, discover_for_app_env,
    recover_state,
};
pub use error::{CloudError, ErrorKind, Result};
pub use event::{DeployEvent, ProgressReporter, SilentReporter, Step, TracingReporter};
pub use provider::{
    CacheWarmer, CdnService, CertificateAuthority, CloudClients, DnsService, ObjectStore,
    PriceClass,
};
pub use retry::{PollConfig, RetryConfig};
pub use state::{DeploymentState, EnvironmentRef, StateStore};
pub use tags::TagSet;
pub use tracker::{ChangeSet, ChangeSummary, FileDescriptor};
