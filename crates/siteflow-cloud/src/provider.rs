//! Provider ports
//!
//! The provisioners only talk to remote systems through these traits. The AWS
//! adapters live in `siteflow-cloud-aws`; in-memory fakes live in
//! [`crate::testing`].
//!
//! Adapters translate provider failures into [`CloudError`](crate::CloudError)
//! variants so that callers can branch on [`ErrorKind`](crate::ErrorKind):
//! a missing resource is `ResourceNotFound`, an already-owned one is
//! `ResourceAlreadyExists`, throttling is `Transient`.

use crate::error::Result;
use crate::tags::TagSet;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============ Object storage ============

/// A single object to upload
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(())` when the bucket exists and is accessible, `ResourceNotFound` otherwise
    async fn head_bucket(&self, bucket: &str) -> Result<()>;

    /// `ResourceAlreadyExists` when the caller already owns the bucket,
    /// `BucketNameTaken` when somebody else does
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    async fn put_public_access_block(&self, bucket: &str) -> Result<()>;

    async fn put_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: Option<&str>,
    ) -> Result<()>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()>;

    async fn put_bucket_tags(&self, bucket: &str, tags: &TagSet) -> Result<()>;

    /// Empty set when the bucket has no tags
    async fn bucket_tags(&self, bucket: &str) -> Result<TagSet>;

    async fn bucket_region(&self, bucket: &str) -> Result<String>;

    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn put_object(&self, bucket: &str, object: &ObjectUpload) -> Result<()>;

    async fn list_object_keys(&self, bucket: &str) -> Result<Vec<String>>;

    /// Deletes at most one provider batch worth of keys
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

// ============ CDN ============

/// CDN price class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_All")]
    All,
    #[serde(rename = "PriceClass_200")]
    P200,
    #[default]
    #[serde(rename = "PriceClass_100")]
    P100,
}

impl PriceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceClass::All => "PriceClass_All",
            PriceClass::P200 => "PriceClass_200",
            PriceClass::P100 => "PriceClass_100",
        }
    }
}

impl std::fmt::Display for PriceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PriceClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PriceClass_All" | "All" | "all" => Ok(PriceClass::All),
            "PriceClass_200" | "200" => Ok(PriceClass::P200),
            "PriceClass_100" | "100" => Ok(PriceClass::P100),
            other => Err(format!(
                "unknown price class `{}` (expected PriceClass_All, PriceClass_200 or PriceClass_100)",
                other
            )),
        }
    }
}

/// Custom error response mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub error_code: i32,
    pub response_code: i32,
    pub response_page_path: String,
    pub min_ttl: i64,
}

/// Provider-neutral view of the distribution settings siteflow manages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionConfig {
    pub caller_reference: String,
    pub comment: String,
    pub enabled: bool,
    pub origin_id: String,
    pub origin_domain: String,
    pub origin_access_control_id: Option<String>,
    pub default_root_object: String,
    pub price_class: PriceClass,
    pub ipv6: bool,
    pub aliases: Vec<String>,
    pub certificate_arn: Option<String>,
    pub error_pages: Vec<ErrorPage>,
}

/// Distribution config together with its concurrency token
#[derive(Debug, Clone)]
pub struct VersionedConfig {
    pub config: DistributionConfig,
    pub etag: String,
}

pub const DISTRIBUTION_DEPLOYED: &str = "Deployed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionInfo {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub status: String,
    pub enabled: bool,
    pub aliases: Vec<String>,
}

impl DistributionInfo {
    pub fn is_deployed(&self) -> bool {
        self.status == DISTRIBUTION_DEPLOYED
    }
}

#[async_trait]
pub trait CdnService: Send + Sync {
    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionInfo>;

    /// `ResourceNotFound` when the id is unknown
    async fn get_distribution(&self, id: &str) -> Result<DistributionInfo>;

    async fn get_distribution_config(&self, id: &str) -> Result<VersionedConfig>;

    /// Conditional write keyed on `etag`. A stale token is `ResourceAlreadyExists`
    /// (conflict); a price class the account's pricing plan forbids is
    /// `PriceClassRestricted`.
    async fn update_distribution(
        &self,
        id: &str,
        config: &DistributionConfig,
        etag: &str,
    ) -> Result<DistributionInfo>;

    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<()>;

    async fn list_distributions(&self) -> Result<Vec<DistributionInfo>>;

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> Result<()>;

    async fn resource_tags(&self, arn: &str) -> Result<TagSet>;

    /// Returns the invalidation id
    async fn create_invalidation(&self, id: &str, paths: &[String]) -> Result<String>;

    async fn invalidation_completed(&self, id: &str, invalidation_id: &str) -> Result<bool>;

    async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>>;

    async fn create_origin_access_control(&self, name: &str) -> Result<String>;
}

// ============ Certificates ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Failed,
    Revoked,
    ValidationTimedOut,
    Expired,
    Inactive,
    Other(String),
}

impl CertificateStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "PENDING_VALIDATION" => CertificateStatus::PendingValidation,
            "ISSUED" => CertificateStatus::Issued,
            "FAILED" => CertificateStatus::Failed,
            "REVOKED" => CertificateStatus::Revoked,
            "VALIDATION_TIMED_OUT" => CertificateStatus::ValidationTimedOut,
            "EXPIRED" => CertificateStatus::Expired,
            "INACTIVE" => CertificateStatus::Inactive,
            other => CertificateStatus::Other(other.to_string()),
        }
    }

    /// Terminal states that can never become `Issued`
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Failed
                | CertificateStatus::Revoked
                | CertificateStatus::ValidationTimedOut
                | CertificateStatus::Expired
                | CertificateStatus::Inactive
        )
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateStatus::PendingValidation => write!(f, "PENDING_VALIDATION"),
            CertificateStatus::Issued => write!(f, "ISSUED"),
            CertificateStatus::Failed => write!(f, "FAILED"),
            CertificateStatus::Revoked => write!(f, "REVOKED"),
            CertificateStatus::ValidationTimedOut => write!(f, "VALIDATION_TIMED_OUT"),
            CertificateStatus::Expired => write!(f, "EXPIRED"),
            CertificateStatus::Inactive => write!(f, "INACTIVE"),
            CertificateStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub arn: String,
    pub domain_name: String,
    pub alternate_names: Vec<String>,
    pub status: CertificateStatus,
}

/// DNS record the certificate authority wants published
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub arn: String,
    pub domain_name: String,
    pub alternate_names: Vec<String>,
    pub status: CertificateStatus,
    pub validation_records: Vec<ValidationRecord>,
    pub failure_reason: Option<String>,
    pub in_use_by: Vec<String>,
}

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn list_certificates(&self) -> Result<Vec<CertificateSummary>>;

    /// Requests a DNS-validated certificate and returns its ARN
    async fn request_certificate(
        &self,
        domain: &str,
        alternate_names: &[String],
        tags: &TagSet,
    ) -> Result<String>;

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetails>;

    async fn certificate_tags(&self, arn: &str) -> Result<TagSet>;

    async fn delete_certificate(&self, arn: &str) -> Result<()>;
}

// ============ DNS ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    /// Zone apex without the trailing dot
    pub name: String,
    pub private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordTarget {
    Value { value: String, ttl: i64 },
    Alias { dns_name: String, hosted_zone_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: RecordType,
    pub target: RecordTarget,
}

impl DnsRecord {
    /// `name TYPE` label used in state files
    pub fn label(&self) -> String {
        format!("{} {}", self.name, self.record_type.as_str())
    }
}

#[async_trait]
pub trait DnsService: Send + Sync {
    async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>>;

    async fn create_hosted_zone(&self, name: &str) -> Result<HostedZone>;

    async fn name_servers(&self, zone_id: &str) -> Result<Vec<String>>;

    async fn tag_hosted_zone(&self, zone_id: &str, tags: &TagSet) -> Result<()>;

    async fn hosted_zone_tags(&self, zone_id: &str) -> Result<TagSet>;

    /// Idempotent UPSERT of every record in one change batch
    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()>;

    /// Missing records are ignored
    async fn delete_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()>;
}

// ============ Cache warming ============

#[async_trait]
pub trait CacheWarmer: Send + Sync {
    /// Fetches `url` and returns the HTTP status
    async fn warm(&self, url: &str) -> Result<u16>;
}

/// Client handles for every provider port
#[derive(Clone)]
pub struct CloudClients {
    pub storage: Arc<dyn ObjectStore>,
    pub cdn: Arc<dyn CdnService>,
    pub certificates: Arc<dyn CertificateAuthority>,
    pub dns: Arc<dyn DnsService>,
    pub warmer: Option<Arc<dyn CacheWarmer>>,
}
