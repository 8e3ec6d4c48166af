//! AWS adapters for SiteFlow
//!
//! Implements the provider ports of `siteflow-cloud` on top of the AWS SDK:
//!
//! - S3 buckets and objects ([`S3Store`])
//! - CloudFront distributions, invalidations and origin access control ([`CloudFrontCdn`])
//! - ACM certificates, always in `us-east-1` ([`AcmAuthority`])
//! - Route 53 hosted zones and record sets ([`Route53Dns`])
//! - Cache warming over HTTPS ([`HttpWarmer`])
//!
//! # Example
//!
//! ```ignore
//! use siteflow_cloud_aws::{build_clients, load_session};
//!
//! let session = load_session("ap-northeast-1", Some("deploy")).await;
//! let clients = build_clients(&session)?;
//! ```

pub mod acm;
pub mod cloudfront;
pub mod credentials;
pub mod error;
pub mod route53;
pub mod s3;
pub mod warmer;

pub use acm::AcmAuthority;
pub use cloudfront::CloudFrontCdn;
pub use credentials::{AwsSession, CredentialSource, load_session, resolve_source};
pub use route53::Route53Dns;
pub use s3::S3Store;
pub use warmer::HttpWarmer;

use siteflow_cloud::{CloudClients, Result};
use std::sync::Arc;

/// SDK accessors return `T` for some required members and `Option<T>` for others
pub(crate) fn field<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

/// Client handles for every port
pub fn build_clients(session: &AwsSession) -> Result<CloudClients> {
    Ok(CloudClients {
        storage: Arc::new(S3Store::new(&session.config)),
        cdn: Arc::new(CloudFrontCdn::new(&session.config)),
        certificates: Arc::new(AcmAuthority::new(&session.certificate_config)),
        dns: Arc::new(Route53Dns::new(&session.config)),
        warmer: Some(Arc::new(HttpWarmer::new(warmer::DEFAULT_TIMEOUT)?)),
    })
}
