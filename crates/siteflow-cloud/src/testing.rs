//! In-memory provider fakes
//!
//! [`FakeCloud`] implements every provider port against plain maps so the
//! provisioners and the orchestrator can be exercised without network access.
//! Failures are injected per operation name with [`FakeCloud::fail`].

use crate::error::{CloudError, Result};
use crate::event::{DeployEvent, ProgressReporter};
use crate::provider::{
    CacheWarmer, CdnService, CertificateAuthority, CertificateDetails, CertificateStatus,
    CertificateSummary, CloudClients, DistributionConfig, DistributionInfo, DnsRecord, DnsService,
    HostedZone, ObjectStore, ObjectUpload, RecordType, ValidationRecord, VersionedConfig,
    DISTRIBUTION_DEPLOYED,
};
use crate::tags::TagSet;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FAKE_ACCOUNT: &str = "123456789012";

/// Object as stored by the fake bucket
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBucket {
    pub region: String,
    pub objects: BTreeMap<String, StoredObject>,
    pub tags: TagSet,
    pub policy: Option<String>,
    pub website: Option<(String, Option<String>)>,
    pub public_access_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct FakeDistribution {
    pub info: DistributionInfo,
    pub config: DistributionConfig,
    pub etag: u64,
    pub tags: TagSet,
    pub polls: u32,
}

#[derive(Debug, Clone)]
pub struct FakeCertificate {
    pub details: CertificateDetails,
    pub tags: TagSet,
    pub describes: u32,
}

#[derive(Debug, Clone)]
pub struct FakeZone {
    pub zone: HostedZone,
    pub name_servers: Vec<String>,
    pub tags: TagSet,
    pub records: BTreeMap<(String, RecordType), DnsRecord>,
}

struct Injected {
    remaining: usize,
    make: fn() -> CloudError,
}

pub struct FakeState {
    pub buckets: BTreeMap<String, FakeBucket>,
    /// Bucket names owned by another account
    pub foreign_buckets: Vec<String>,
    pub uploads: Vec<String>,
    pub distributions: BTreeMap<String, FakeDistribution>,
    pub invalidations: Vec<(String, Vec<String>)>,
    pub origin_access_controls: BTreeMap<String, String>,
    pub certificates: BTreeMap<String, FakeCertificate>,
    pub certificate_requests: Vec<String>,
    pub zones: BTreeMap<String, FakeZone>,
    pub warmed: Vec<String>,
    /// Every mutating call, in order (`operation:target`)
    pub calls: Vec<String>,

    /// Polls of `get_distribution` before an updated distribution is deployed
    pub polls_until_deployed: u32,
    /// Describes before a pending certificate reaches `certificate_outcome`
    pub describes_until_issued: u32,
    /// Describes during which validation records are not yet available
    pub describes_without_records: u32,
    pub certificate_outcome: CertificateStatus,
    /// Reject explicit price class changes (discount pricing plans)
    pub restrict_price_class: bool,

    next_id: u64,
    failures: BTreeMap<String, Injected>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of every provider port
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        let state = FakeState {
            certificate_outcome: CertificateStatus::Issued,
            describes_until_issued: 2,
            describes_without_records: 1,
            polls_until_deployed: 1,
            buckets: BTreeMap::new(),
            foreign_buckets: Vec::new(),
            uploads: Vec::new(),
            distributions: BTreeMap::new(),
            invalidations: Vec::new(),
            origin_access_controls: BTreeMap::new(),
            certificates: BTreeMap::new(),
            certificate_requests: Vec::new(),
            zones: BTreeMap::new(),
            warmed: Vec::new(),
            calls: Vec::new(),
            restrict_price_class: false,
            next_id: 0,
            failures: BTreeMap::new(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Lock the fake's state for inspection or tuning
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Client handles backed by this fake
    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients {
            storage: self.clone(),
            cdn: self.clone(),
            certificates: self.clone(),
            dns: self.clone(),
            warmer: Some(self.clone()),
        }
    }

    /// Make the next `times` calls of `operation` fail with `make()`
    pub fn fail(&self, operation: &str, times: usize, make: fn() -> CloudError) {
        self.state().failures.insert(
            operation.to_string(),
            Injected {
                remaining: times,
                make,
            },
        );
    }

    /// Make every call of `operation` fail
    pub fn fail_always(&self, operation: &str, make: fn() -> CloudError) {
        self.fail(operation, usize::MAX, make);
    }

    fn begin(&self, operation: &str, target: &str, record: bool) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        if let Some(injected) = state.failures.get_mut(operation)
            && injected.remaining > 0
        {
            injected.remaining -= 1;
            let err = (injected.make)();
            return Err(err);
        }
        if record {
            state.calls.push(format!("{}:{}", operation, target));
        }
        Ok(state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn bucket(&self, name: &str) -> Option<FakeBucket> {
        self.state().buckets.get(name).cloned()
    }

    pub fn add_bucket(&self, name: &str, region: &str, tags: TagSet) {
        self.state().buckets.insert(
            name.to_string(),
            FakeBucket {
                region: region.to_string(),
                tags,
                ..Default::default()
            },
        );
    }

    pub fn distribution(&self, id: &str) -> Option<FakeDistribution> {
        self.state().distributions.get(id).cloned()
    }

    /// Seed an issued certificate
    pub fn add_issued_certificate(&self, domain: &str, alternate_names: &[&str]) -> String {
        let mut state = self.state();
        let n = state.next_id();
        let arn = format!("arn:aws:acm:us-east-1:{}:certificate/existing-{}", FAKE_ACCOUNT, n);
        let mut names = vec![domain.to_string()];
        names.extend(alternate_names.iter().map(|s| s.to_string()));
        state.certificates.insert(
            arn.clone(),
            FakeCertificate {
                details: CertificateDetails {
                    arn: arn.clone(),
                    domain_name: domain.to_string(),
                    alternate_names: names,
                    status: CertificateStatus::Issued,
                    validation_records: Vec::new(),
                    failure_reason: None,
                    in_use_by: Vec::new(),
                },
                tags: TagSet::new(),
                describes: 0,
            },
        );
        arn
    }

    /// Seed a public hosted zone and return its id
    pub fn add_zone(&self, name: &str) -> String {
        let mut state = self.state();
        let n = state.next_id();
        let id = format!("ZFAKE{}", n);
        state.zones.insert(
            id.clone(),
            FakeZone {
                zone: HostedZone {
                    id: id.clone(),
                    name: name.trim_end_matches('.').to_string(),
                    private: false,
                },
                name_servers: fake_name_servers(n),
                tags: TagSet::new(),
                records: BTreeMap::new(),
            },
        );
        id
    }

    pub fn zone(&self, id: &str) -> Option<FakeZone> {
        self.state().zones.get(id).cloned()
    }

    pub fn tag_zone(&self, id: &str, tags: TagSet) {
        if let Some(zone) = self.state().zones.get_mut(id) {
            zone.tags = tags;
        }
    }
}

fn fake_name_servers(n: u64) -> Vec<String> {
    vec![
        format!("ns-{}.awsdns-01.com", n),
        format!("ns-{}.awsdns-02.net", n + 100),
    ]
}

fn not_found(what: &str, id: &str) -> CloudError {
    CloudError::ResourceNotFound(format!("{} {}", what, id))
}

#[async_trait]
impl ObjectStore for FakeCloud {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        let state = self.begin("head_bucket", bucket, false)?;
        if state.foreign_buckets.iter().any(|b| b == bucket) {
            return Err(CloudError::BucketNameTaken(bucket.to_string()));
        }
        if state.buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(not_found("bucket", bucket))
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut state = self.begin("create_bucket", bucket, true)?;
        if state.foreign_buckets.iter().any(|b| b == bucket) {
            return Err(CloudError::BucketNameTaken(bucket.to_string()));
        }
        if state.buckets.contains_key(bucket) {
            return Err(CloudError::ResourceAlreadyExists(bucket.to_string()));
        }
        state.buckets.insert(
            bucket.to_string(),
            FakeBucket {
                region: region.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn put_public_access_block(&self, bucket: &str) -> Result<()> {
        let mut state = self.begin("put_public_access_block", bucket, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        b.public_access_blocked = true;
        Ok(())
    }

    async fn put_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: Option<&str>,
    ) -> Result<()> {
        let mut state = self.begin("put_website", bucket, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        b.website = Some((
            index_document.to_string(),
            error_document.map(str::to_string),
        ));
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        let mut state = self.begin("put_bucket_policy", bucket, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        b.policy = Some(policy.to_string());
        Ok(())
    }

    async fn put_bucket_tags(&self, bucket: &str, tags: &TagSet) -> Result<()> {
        let mut state = self.begin("put_bucket_tags", bucket, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        b.tags = tags.clone();
        Ok(())
    }

    async fn bucket_tags(&self, bucket: &str) -> Result<TagSet> {
        let state = self.begin("bucket_tags", bucket, false)?;
        state
            .buckets
            .get(bucket)
            .map(|b| b.tags.clone())
            .ok_or_else(|| not_found("bucket", bucket))
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let state = self.begin("bucket_region", bucket, false)?;
        state
            .buckets
            .get(bucket)
            .map(|b| b.region.clone())
            .ok_or_else(|| not_found("bucket", bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let state = self.begin("list_buckets", "", false)?;
        Ok(state.buckets.keys().cloned().collect())
    }

    async fn put_object(&self, bucket: &str, object: &ObjectUpload) -> Result<()> {
        let mut state = self.begin("put_object", &object.key, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        b.objects.insert(
            object.key.clone(),
            StoredObject {
                body: object.body.clone(),
                content_type: object.content_type.clone(),
                content_encoding: object.content_encoding.clone(),
                cache_control: object.cache_control.clone(),
            },
        );
        state.uploads.push(object.key.clone());
        Ok(())
    }

    async fn list_object_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let state = self.begin("list_object_keys", bucket, false)?;
        state
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .ok_or_else(|| not_found("bucket", bucket))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut state = self.begin("delete_objects", bucket, false)?;
        let b = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        for key in keys {
            b.objects.remove(key);
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.begin("delete_bucket", bucket, true)?;
        let b = state
            .buckets
            .get(bucket)
            .ok_or_else(|| not_found("bucket", bucket))?;
        if !b.objects.is_empty() {
            return Err(CloudError::ApiError(format!("BucketNotEmpty: {}", bucket)));
        }
        state.buckets.remove(bucket);
        Ok(())
    }
}

#[async_trait]
impl CdnService for FakeCloud {
    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionInfo> {
        let mut state = self.begin("create_distribution", &config.origin_domain, true)?;
        let n = state.next_id();
        let id = format!("EFAKE{}", n);
        let info = DistributionInfo {
            id: id.clone(),
            arn: format!("arn:aws:cloudfront::{}:distribution/{}", FAKE_ACCOUNT, id),
            domain_name: format!("d{}.cloudfront.net", n),
            status: "InProgress".to_string(),
            enabled: config.enabled,
            aliases: config.aliases.clone(),
        };
        if let Some(arn) = &config.certificate_arn
            && let Some(cert) = state.certificates.get_mut(arn)
        {
            cert.details.in_use_by.push(info.arn.clone());
        }
        state.distributions.insert(
            id,
            FakeDistribution {
                info: info.clone(),
                config: config.clone(),
                etag: 1,
                tags: TagSet::new(),
                polls: 0,
            },
        );
        Ok(info)
    }

    async fn get_distribution(&self, id: &str) -> Result<DistributionInfo> {
        let mut state = self.begin("get_distribution", id, false)?;
        let until = state.polls_until_deployed;
        let dist = state
            .distributions
            .get_mut(id)
            .ok_or_else(|| not_found("distribution", id))?;
        dist.polls += 1;
        if dist.polls >= until {
            dist.info.status = DISTRIBUTION_DEPLOYED.to_string();
        }
        Ok(dist.info.clone())
    }

    async fn get_distribution_config(&self, id: &str) -> Result<VersionedConfig> {
        let state = self.begin("get_distribution_config", id, false)?;
        let dist = state
            .distributions
            .get(id)
            .ok_or_else(|| not_found("distribution", id))?;
        Ok(VersionedConfig {
            config: dist.config.clone(),
            etag: dist.etag.to_string(),
        })
    }

    async fn update_distribution(
        &self,
        id: &str,
        config: &DistributionConfig,
        etag: &str,
    ) -> Result<DistributionInfo> {
        let mut state = self.begin("update_distribution", id, true)?;
        let restrict = state.restrict_price_class;
        let dist = state
            .distributions
            .get_mut(id)
            .ok_or_else(|| not_found("distribution", id))?;
        if dist.etag.to_string() != etag {
            return Err(CloudError::ResourceAlreadyExists(format!(
                "PreconditionFailed: stale etag for {}",
                id
            )));
        }
        if restrict && dist.config.price_class != config.price_class {
            return Err(CloudError::PriceClassRestricted(format!(
                "{} cannot use {}",
                id, config.price_class
            )));
        }
        let previous_certificate = dist.config.certificate_arn.take();
        dist.config = config.clone();
        dist.etag += 1;
        dist.polls = 0;
        dist.info.status = "InProgress".to_string();
        dist.info.enabled = config.enabled;
        dist.info.aliases = config.aliases.clone();
        let info = dist.info.clone();

        if previous_certificate != config.certificate_arn {
            if let Some(old) = previous_certificate
                .as_ref()
                .and_then(|arn| state.certificates.get_mut(arn))
            {
                old.details.in_use_by.retain(|user| *user != info.arn);
            }
            if let Some(new) = config
                .certificate_arn
                .as_ref()
                .and_then(|arn| state.certificates.get_mut(arn))
            {
                new.details.in_use_by.push(info.arn.clone());
            }
        }
        Ok(info)
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<()> {
        let mut state = self.begin("delete_distribution", id, true)?;
        let dist = state
            .distributions
            .get(id)
            .ok_or_else(|| not_found("distribution", id))?;
        if dist.etag.to_string() != etag {
            return Err(CloudError::ResourceAlreadyExists(format!(
                "PreconditionFailed: stale etag for {}",
                id
            )));
        }
        if dist.config.enabled || !dist.info.is_deployed() {
            return Err(CloudError::ApiError(format!(
                "DistributionNotDisabled: {}",
                id
            )));
        }
        let arn = dist.info.arn.clone();
        state.distributions.remove(id);
        for cert in state.certificates.values_mut() {
            cert.details.in_use_by.retain(|user| *user != arn);
        }
        Ok(())
    }

    async fn list_distributions(&self) -> Result<Vec<DistributionInfo>> {
        let state = self.begin("list_distributions", "", false)?;
        Ok(state
            .distributions
            .values()
            .map(|d| d.info.clone())
            .collect())
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> Result<()> {
        let mut state = self.begin("tag_resource", arn, false)?;
        let dist = state
            .distributions
            .values_mut()
            .find(|d| d.info.arn == arn)
            .ok_or_else(|| not_found("distribution", arn))?;
        dist.tags = tags.clone();
        Ok(())
    }

    async fn resource_tags(&self, arn: &str) -> Result<TagSet> {
        let state = self.begin("resource_tags", arn, false)?;
        state
            .distributions
            .values()
            .find(|d| d.info.arn == arn)
            .map(|d| d.tags.clone())
            .ok_or_else(|| not_found("distribution", arn))
    }

    async fn create_invalidation(&self, id: &str, paths: &[String]) -> Result<String> {
        let mut state = self.begin("create_invalidation", id, true)?;
        if !state.distributions.contains_key(id) {
            return Err(not_found("distribution", id));
        }
        let n = state.next_id();
        state
            .invalidations
            .push((id.to_string(), paths.to_vec()));
        Ok(format!("IFAKE{}", n))
    }

    async fn invalidation_completed(&self, _id: &str, _invalidation_id: &str) -> Result<bool> {
        self.begin("invalidation_completed", "", false)?;
        Ok(true)
    }

    async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>> {
        let state = self.begin("find_origin_access_control", name, false)?;
        Ok(state.origin_access_controls.get(name).cloned())
    }

    async fn create_origin_access_control(&self, name: &str) -> Result<String> {
        let mut state = self.begin("create_origin_access_control", name, true)?;
        let n = state.next_id();
        let id = format!("OACFAKE{}", n);
        state
            .origin_access_controls
            .insert(name.to_string(), id.clone());
        Ok(id)
    }
}

fn validation_record(domain: &str) -> ValidationRecord {
    let base = domain.trim_start_matches("*.");
    ValidationRecord {
        name: format!("_acme.{}.", base),
        record_type: "CNAME".to_string(),
        value: format!("_token.{}.acm-validations.aws.", base),
    }
}

#[async_trait]
impl CertificateAuthority for FakeCloud {
    async fn list_certificates(&self) -> Result<Vec<CertificateSummary>> {
        let state = self.begin("list_certificates", "", false)?;
        Ok(state
            .certificates
            .values()
            .map(|c| CertificateSummary {
                arn: c.details.arn.clone(),
                domain_name: c.details.domain_name.clone(),
                alternate_names: c.details.alternate_names.clone(),
                status: c.details.status.clone(),
            })
            .collect())
    }

    async fn request_certificate(
        &self,
        domain: &str,
        alternate_names: &[String],
        tags: &TagSet,
    ) -> Result<String> {
        let mut state = self.begin("request_certificate", domain, true)?;
        let n = state.next_id();
        let arn = format!("arn:aws:acm:us-east-1:{}:certificate/fake-{}", FAKE_ACCOUNT, n);
        let mut names = vec![domain.to_string()];
        names.extend(alternate_names.iter().cloned());
        let validation_records = names.iter().map(|d| validation_record(d)).collect();
        state.certificates.insert(
            arn.clone(),
            FakeCertificate {
                details: CertificateDetails {
                    arn: arn.clone(),
                    domain_name: domain.to_string(),
                    alternate_names: names,
                    status: CertificateStatus::PendingValidation,
                    validation_records,
                    failure_reason: None,
                    in_use_by: Vec::new(),
                },
                tags: tags.clone(),
                describes: 0,
            },
        );
        state.certificate_requests.push(domain.to_string());
        Ok(arn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetails> {
        let mut state = self.begin("describe_certificate", arn, false)?;
        let without_records = state.describes_without_records;
        let until_issued = state.describes_until_issued;
        let outcome = state.certificate_outcome.clone();
        let cert = state
            .certificates
            .get_mut(arn)
            .ok_or_else(|| not_found("certificate", arn))?;
        cert.describes += 1;

        let mut details = cert.details.clone();
        if details.status == CertificateStatus::PendingValidation {
            if cert.describes > until_issued {
                cert.details.status = outcome.clone();
                if outcome == CertificateStatus::Failed {
                    cert.details.failure_reason = Some("CAA_ERROR".to_string());
                }
                details = cert.details.clone();
            }
            if cert.describes <= without_records {
                details.validation_records.clear();
            }
        }
        Ok(details)
    }

    async fn certificate_tags(&self, arn: &str) -> Result<TagSet> {
        let state = self.begin("certificate_tags", arn, false)?;
        state
            .certificates
            .get(arn)
            .map(|c| c.tags.clone())
            .ok_or_else(|| not_found("certificate", arn))
    }

    async fn delete_certificate(&self, arn: &str) -> Result<()> {
        let mut state = self.begin("delete_certificate", arn, true)?;
        let cert = state
            .certificates
            .get(arn)
            .ok_or_else(|| not_found("certificate", arn))?;
        if !cert.details.in_use_by.is_empty() {
            return Err(CloudError::ApiError(format!("ResourceInUse: {}", arn)));
        }
        state.certificates.remove(arn);
        Ok(())
    }
}

#[async_trait]
impl DnsService for FakeCloud {
    async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>> {
        let state = self.begin("list_hosted_zones", "", false)?;
        Ok(state.zones.values().map(|z| z.zone.clone()).collect())
    }

    async fn create_hosted_zone(&self, name: &str) -> Result<HostedZone> {
        drop(self.begin("create_hosted_zone", name, true)?);
        let id = self.add_zone(name);
        self.state()
            .zones
            .get(&id)
            .map(|z| z.zone.clone())
            .ok_or_else(|| not_found("hosted zone", &id))
    }

    async fn name_servers(&self, zone_id: &str) -> Result<Vec<String>> {
        let state = self.begin("name_servers", zone_id, false)?;
        state
            .zones
            .get(zone_id)
            .map(|z| z.name_servers.clone())
            .ok_or_else(|| not_found("hosted zone", zone_id))
    }

    async fn tag_hosted_zone(&self, zone_id: &str, tags: &TagSet) -> Result<()> {
        let mut state = self.begin("tag_hosted_zone", zone_id, false)?;
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| not_found("hosted zone", zone_id))?;
        zone.tags = tags.clone();
        Ok(())
    }

    async fn hosted_zone_tags(&self, zone_id: &str) -> Result<TagSet> {
        let state = self.begin("hosted_zone_tags", zone_id, false)?;
        state
            .zones
            .get(zone_id)
            .map(|z| z.tags.clone())
            .ok_or_else(|| not_found("hosted zone", zone_id))
    }

    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        let mut state = self.begin("upsert_records", zone_id, true)?;
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| not_found("hosted zone", zone_id))?;
        for record in records {
            zone.records.insert(
                (record.name.trim_end_matches('.').to_string(), record.record_type),
                record.clone(),
            );
        }
        Ok(())
    }

    async fn delete_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        let mut state = self.begin("delete_records", zone_id, true)?;
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| not_found("hosted zone", zone_id))?;
        for record in records {
            zone.records.remove(&(
                record.name.trim_end_matches('.').to_string(),
                record.record_type,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheWarmer for FakeCloud {
    async fn warm(&self, url: &str) -> Result<u16> {
        let mut state = self.begin("warm", url, false)?;
        state.warmed.push(url.to_string());
        Ok(200)
    }
}

/// Collects every reported event
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<DeployEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeployEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeployEvent::Warning(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: DeployEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
