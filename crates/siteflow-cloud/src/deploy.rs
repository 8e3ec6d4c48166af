//! Deployment orchestration
//!
//! `deploy` runs the pipeline
//!
//! ```text
//! (a) certificate → (b) bucket → (c) upload/cleanup → (d) distribution
//!     → (e) wait for deployment → (f) invalidation + cache warming → (g) alias records
//! ```
//!
//! and persists the state record after every durable step. A failure after a
//! freshly created bucket tears that bucket down again unless rollback is
//! disabled; the original error is returned either way.
//!
//! `remove` tears an environment down in reverse order and `status` compares
//! the record against the live resources.

use crate::cdn::{self, CdnConfig, DistributionOptions, InvalidationTarget};
use crate::certificate::{self, CertificateConfig, CertificateRequest, VALIDATION_METHOD};
use crate::dns;
use crate::error::{CloudError, Result};
use crate::event::{self, DeployEvent, ProgressReporter, Step};
use crate::provider::{CloudClients, HostedZone, PriceClass};
use crate::retry::RetryConfig;
use crate::state::{
    CdnResource, CertificateResource, DeploymentState, DnsResource, StateStore, StorageResource,
};
use crate::storage::{self, BucketOutcome, HostingOptions, UploadOptions, UploadReport};
use crate::tags::TagSet;
use crate::tracker::{self, ChangeSummary, ExcludeSet, FileDescriptor};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// ============ Context & requests ============

/// Retry and polling knobs for one run
#[derive(Debug, Clone, Default)]
pub struct Timing {
    pub retry: RetryConfig,
    pub certificate: CertificateConfig,
    pub cdn: CdnConfig,
}

/// Everything a run needs besides the request
#[derive(Clone)]
pub struct DeployContext {
    pub store: Arc<StateStore>,
    pub clients: CloudClients,
    pub reporter: Arc<dyn ProgressReporter>,
    pub timing: Timing,
}

impl DeployContext {
    fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    fn step(&self, step: Step) {
        self.reporter.report(DeployEvent::StepStarted(step));
    }

    fn skip(&self, step: Step, reason: impl Into<String>) {
        self.reporter.report(DeployEvent::StepSkipped {
            step,
            reason: reason.into(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct CustomDomain {
    pub domain_name: String,
    pub aliases: Vec<String>,
    /// Pre-supplied certificate; skips certificate provisioning
    pub certificate_arn: Option<String>,
}

impl CustomDomain {
    /// Primary domain followed by the aliases
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![dns::normalize_domain(&self.domain_name)];
        for alias in &self.aliases {
            let alias = dns::normalize_domain(alias);
            if !names.contains(&alias) {
                names.push(alias);
            }
        }
        names
    }
}

#[derive(Debug, Clone)]
pub struct CdnRequest {
    pub price_class: PriceClass,
    pub ipv6: bool,
    pub spa: bool,
    pub custom_domain: Option<CustomDomain>,
    /// Paths fetched through the CDN after invalidation
    pub cache_warming: Vec<String>,
}

/// Fully resolved deployment settings
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub app: String,
    pub environment: String,
    pub source: PathBuf,
    pub region: String,
    pub bucket: String,
    pub index_document: String,
    pub error_document: Option<String>,
    pub exclude: Vec<String>,
    pub concurrency: usize,
    pub gzip: bool,
    pub cache_control: Option<String>,
    /// Delete remote objects whose local file is gone
    pub cleanup: bool,
    /// `None` deploys storage only
    pub cdn: Option<CdnRequest>,
    pub rollback: bool,
    pub force_invalidate: bool,
    pub wait_invalidation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub bucket: String,
    pub bucket_created: bool,
    pub website_url: String,
    pub changes: ChangeSummary,
    pub upload: UploadReport,
    pub deleted: usize,
    pub delete_failures: Vec<String>,
    pub certificate_arn: Option<String>,
    pub distribution_id: Option<String>,
    pub distribution_domain: Option<String>,
    /// `None` when the wait was skipped or failed
    pub deployed: Option<bool>,
    pub invalidation_id: Option<String>,
    pub alias_records: Vec<String>,
    /// Where the site is served; `None` for a storage-only deploy, whose
    /// bucket blocks public access
    pub url: Option<String>,
}

// ============ deploy ============

/// Run the full deployment pipeline for one environment
pub async fn deploy(ctx: &DeployContext, request: &DeployRequest) -> Result<DeployReport> {
    let mut state = ctx
        .store
        .get_or_create(&request.app, &request.environment)
        .await?;
    let tags = TagSet::convention(&request.app, &request.environment);

    if let Some(recorded) = state.bucket_name()
        && recorded != request.bucket
    {
        return Err(CloudError::StateConflict {
            resource: "bucket",
            recorded: recorded.to_string(),
            requested: request.bucket.clone(),
        });
    }

    // (a)
    let certificate = ensure_certificate(ctx, request, &mut state).await?;

    // (b)
    ctx.step(Step::Bucket);
    let hosting = HostingOptions {
        index_document: request.index_document.clone(),
        error_document: request.error_document.clone(),
        distribution_arn: None,
    };
    let bucket = storage::ensure_bucket(
        ctx.clients.storage.as_ref(),
        &request.bucket,
        &request.region,
        &hosting,
        &tags,
        &ctx.timing.retry,
        ctx.reporter(),
    )
    .await?;
    state.record_storage(StorageResource {
        bucket_name: bucket.bucket.clone(),
        region: bucket.region.clone(),
        website_url: bucket.website_url.clone(),
    })?;
    ctx.store.save(&mut state).await?;

    let mut report = DeployReport {
        bucket: bucket.bucket.clone(),
        bucket_created: bucket.created,
        website_url: bucket.website_url.clone(),
        certificate_arn: certificate.arn.clone(),
        ..Default::default()
    };

    let result = deploy_after_bucket(
        ctx,
        request,
        &mut state,
        &bucket,
        &tags,
        certificate,
        &mut report,
    )
    .await;

    match result {
        Ok(()) => {
            info!(
                "Deployed {}/{} to {}",
                request.app,
                request.environment,
                report.url.as_deref().unwrap_or(&report.bucket)
            );
            Ok(report)
        }
        Err(e) => {
            if bucket.created && request.rollback {
                rollback(ctx, &mut state, &bucket).await;
            } else if bucket.created {
                event::warn(
                    ctx.reporter(),
                    format!("Rollback disabled; bucket {} was left in place", bucket.bucket),
                );
            }
            Err(e)
        }
    }
}

/// Outcome of step (a)
#[derive(Debug, Default)]
struct CertificateStep {
    arn: Option<String>,
    zone: Option<HostedZone>,
    /// Auto-created certificate replaced by `arn`, deleted once the
    /// distribution no longer serves it
    superseded: Option<String>,
}

/// Step (a): custom domain without a certificate → provision one
async fn ensure_certificate(
    ctx: &DeployContext,
    request: &DeployRequest,
    state: &mut DeploymentState,
) -> Result<CertificateStep> {
    let Some(domain) = request
        .cdn
        .as_ref()
        .and_then(|cdn| cdn.custom_domain.as_ref())
    else {
        ctx.skip(Step::Certificate, "no custom domain");
        return Ok(CertificateStep::default());
    };

    if let Some(arn) = &domain.certificate_arn {
        ctx.skip(Step::Certificate, "certificate ARN supplied");
        return Ok(CertificateStep {
            arn: Some(arn.clone()),
            ..Default::default()
        });
    }

    ctx.step(Step::Certificate);
    let names = domain.all_names();
    let provisioned = certificate::provision_certificate(
        ctx.clients.certificates.as_ref(),
        ctx.clients.dns.as_ref(),
        &CertificateRequest {
            domain: names[0].clone(),
            alternate_names: names[1..].to_vec(),
            app: request.app.clone(),
            environment: request.environment.clone(),
        },
        &ctx.timing.certificate,
        ctx.reporter(),
    )
    .await?;

    let recorded = state.resources.acm.as_ref();
    let replaced = recorded.is_some_and(|r| r.certificate_arn != provisioned.arn);
    let superseded = recorded
        .filter(|r| replaced && r.auto_created)
        .map(|r| r.certificate_arn.clone());
    // a reused certificate keeps its recorded origin
    let auto_created = provisioned.auto_created
        || recorded.is_some_and(|r| r.certificate_arn == provisioned.arn && r.auto_created);
    let resource = CertificateResource {
        certificate_arn: provisioned.arn.clone(),
        domain_name: provisioned.domain.clone(),
        validation_method: VALIDATION_METHOD.to_string(),
        status: provisioned.status.to_string(),
        auto_created,
    };
    if replaced {
        // the domain changed; the new certificate supersedes the recorded one
        info!("Replacing recorded certificate with {}", provisioned.arn);
        state.replace_certificate(resource);
    } else {
        state.record_certificate(resource)?;
    }
    ctx.store.save(state).await?;

    Ok(CertificateStep {
        arn: Some(provisioned.arn),
        zone: provisioned.zone,
        superseded,
    })
}

/// The distribution's default root object applies to `/` only
fn warn_nested_index(ctx: &DeployContext, files: &[FileDescriptor], index_document: &str) {
    let suffix = format!("/{}", index_document);
    if let Some(nested) = files.iter().find(|f| f.key.ends_with(&suffix)) {
        let directory = &nested.key[..nested.key.len() - index_document.len()];
        event::warn(
            ctx.reporter(),
            format!(
                "/{} is not served as {}: only the site root resolves to {}. Link to the file itself",
                directory, nested.key, index_document
            ),
        );
    }
}

/// Best-effort deletion of a certificate the distribution moved off
async fn retire_certificate(ctx: &DeployContext, arn: &str) {
    match certificate::delete(ctx.clients.certificates.as_ref(), arn, &ctx.timing.retry).await {
        Ok(()) => {
            info!("Deleted superseded certificate {}", arn);
            ctx.reporter.report(DeployEvent::ResourceDeleted {
                kind: "certificate".to_string(),
                id: arn.to_string(),
            });
        }
        Err(e) => event::warn(
            ctx.reporter(),
            format!(
                "Could not delete superseded certificate {}: {}. Delete it once the distribution no longer uses it",
                arn, e
            ),
        ),
    }
}

/// Steps (c) through (g)
#[allow(clippy::too_many_arguments)]
async fn deploy_after_bucket(
    ctx: &DeployContext,
    request: &DeployRequest,
    state: &mut DeploymentState,
    bucket: &BucketOutcome,
    tags: &TagSet,
    certificate: CertificateStep,
    report: &mut DeployReport,
) -> Result<()> {
    let CertificateStep {
        arn: certificate_arn,
        zone,
        superseded,
    } = certificate;
    let storage = ctx.clients.storage.as_ref();

    // (c)
    ctx.step(Step::Upload);
    let excludes = ExcludeSet::new(&request.exclude)?;
    let files = tracker::scan(&request.source, &excludes)?;
    let changes = tracker::classify(&files, &state.files);
    report.changes = changes.summary();
    ctx.reporter
        .report(DeployEvent::ChangesDetected(report.changes));

    let defaults = UploadOptions::default();
    let upload_options = UploadOptions {
        concurrency: request.concurrency.max(1),
        gzip: request.gzip,
        cache_control: request
            .cache_control
            .clone()
            .unwrap_or(defaults.cache_control),
        html_cache_control: defaults.html_cache_control,
        retry: ctx.timing.retry.clone(),
    };
    report.upload = storage::upload_changed_files(
        storage,
        &bucket.bucket,
        &changes.to_upload(),
        &upload_options,
        ctx.reporter(),
    )
    .await?;

    let mut digests = changes.current_digests();
    if !changes.deleted.is_empty() {
        if request.cleanup {
            ctx.step(Step::Cleanup);
            let deleted = storage::delete_removed_files(
                storage,
                &bucket.bucket,
                &changes.deleted,
                &ctx.timing.retry,
                ctx.reporter(),
            )
            .await;
            report.deleted = deleted.deleted;
            // keep failed keys so the next run retries them
            for key in deleted.failed_keys {
                if let Some(digest) = state.files.get(&key) {
                    digests.insert(key, digest.clone());
                }
            }
            report.delete_failures = deleted.failures;
        } else {
            ctx.skip(Step::Cleanup, "cleanup disabled");
            for key in &changes.deleted {
                if let Some(digest) = state.files.get(key) {
                    digests.insert(key.clone(), digest.clone());
                }
            }
        }
    }
    state.files = digests;
    ctx.store.save(state).await?;

    // (d)
    let Some(cdn_request) = &request.cdn else {
        ctx.skip(Step::Distribution, "CDN disabled");
        event::warn(
            ctx.reporter(),
            format!(
                "CDN disabled: bucket {} blocks public access, so the site has no public URL. Enable `cloudfront` to serve it",
                bucket.bucket
            ),
        );
        return Ok(());
    };
    let cdn_client = ctx.clients.cdn.as_ref();
    warn_nested_index(ctx, &files, &request.index_document);

    ctx.step(Step::Distribution);
    let names = cdn_request
        .custom_domain
        .as_ref()
        .map(CustomDomain::all_names)
        .unwrap_or_default();
    let options = DistributionOptions {
        app: request.app.clone(),
        environment: request.environment.clone(),
        bucket: bucket.bucket.clone(),
        region: bucket.region.clone(),
        index_document: request.index_document.clone(),
        price_class: cdn_request.price_class,
        ipv6: cdn_request.ipv6,
        spa: cdn_request.spa,
        aliases: names.clone(),
        certificate_arn: certificate_arn.clone(),
    };
    let known_id = state.distribution_id().map(str::to_string);
    let distribution = cdn::ensure_distribution(
        cdn_client,
        &options,
        known_id.as_deref(),
        tags,
        &ctx.timing.cdn,
        ctx.reporter(),
    )
    .await?;
    storage::apply_origin_policy(
        storage,
        &bucket.bucket,
        &distribution.info.arn,
        &ctx.timing.retry,
    )
    .await?;
    state.record_distribution(CdnResource {
        distribution_id: distribution.info.id.clone(),
        domain_name: distribution.info.domain_name.clone(),
        distribution_url: format!("https://{}", distribution.info.domain_name),
        certificate_arn: certificate_arn.clone(),
        aliases: names.clone(),
        last_invalidation: None,
    })?;
    ctx.store.save(state).await?;

    let id = distribution.info.id.clone();
    let cdn_domain = distribution.info.domain_name.clone();
    report.distribution_id = Some(id.clone());
    report.distribution_domain = Some(cdn_domain.clone());
    report.url = Some(format!("https://{}", cdn_domain));

    // (e)
    ctx.step(Step::WaitForDeployment);
    report.deployed =
        match cdn::wait_until_deployed(cdn_client, &id, &ctx.timing.cdn, ctx.reporter()).await {
            Ok(deployed) => Some(deployed),
            Err(e) => {
                event::warn(
                    ctx.reporter(),
                    format!("Could not check deployment status of {}: {}", id, e),
                );
                None
            }
        };
    if let Some(old) = &superseded {
        retire_certificate(ctx, old).await;
    }

    // (f)
    // only what reached the bucket can be stale at the edge
    let changed_remotely = report.upload.uploaded > 0 || report.deleted > 0;
    if changed_remotely || request.force_invalidate {
        ctx.step(Step::Invalidation);
        let invalidation_id = cdn::invalidate(
            cdn_client,
            &id,
            &InvalidationTarget::All,
            request.wait_invalidation,
            &ctx.timing.cdn,
            ctx.reporter(),
        )
        .await?;
        state.mark_invalidated(Utc::now());
        ctx.store.save(state).await?;
        report.invalidation_id = Some(invalidation_id);
        warm_cache(ctx, &cdn_domain, &cdn_request.cache_warming).await;
    } else {
        ctx.skip(Step::Invalidation, "no changes");
    }

    // (g)
    let Some(domain) = &cdn_request.custom_domain else {
        ctx.skip(Step::AliasRecords, "no custom domain");
        return Ok(());
    };
    ctx.step(Step::AliasRecords);
    let zone = match zone {
        Some(zone) => zone,
        None => {
            dns::resolve_hosted_zone(
                ctx.clients.dns.as_ref(),
                &domain.domain_name,
                &request.app,
                &request.environment,
                &ctx.timing.retry,
                ctx.reporter(),
            )
            .await?
            .zone
        }
    };
    let labels = dns::publish_alias_records(
        ctx.clients.dns.as_ref(),
        &zone.id,
        &names[0],
        &names[1..],
        &cdn_domain,
        &ctx.timing.retry,
    )
    .await?;
    ctx.reporter.report(DeployEvent::AliasRecordsPublished {
        records: labels.clone(),
    });
    state.record_dns(DnsResource {
        hosted_zone_id: zone.id,
        hosted_zone_name: zone.name,
        records: labels.clone(),
    })?;
    ctx.store.save(state).await?;

    report.alias_records = labels;
    report.url = Some(format!("https://{}", names[0]));
    Ok(())
}

/// Best-effort GET of each path through the CDN
async fn warm_cache(ctx: &DeployContext, cdn_domain: &str, paths: &[String]) {
    let Some(warmer) = &ctx.clients.warmer else {
        return;
    };
    if paths.is_empty() {
        return;
    }

    ctx.step(Step::CacheWarming);
    for path in paths {
        let url = format!("https://{}/{}", cdn_domain, path.trim_start_matches('/'));
        match warmer.warm(&url).await {
            Ok(status) if status < 400 => tracing::debug!("Warmed {} ({})", url, status),
            Ok(status) => event::warn(
                ctx.reporter(),
                format!("Cache warming {} returned {}", url, status),
            ),
            Err(e) => event::warn(ctx.reporter(), format!("Cache warming {} failed: {}", url, e)),
        }
    }
}

/// Tear down a bucket created by the failed run
async fn rollback(ctx: &DeployContext, state: &mut DeploymentState, bucket: &BucketOutcome) {
    ctx.step(Step::Rollback);
    warn!("Rolling back bucket {}", bucket.bucket);

    if let Err(e) =
        storage::tear_down(ctx.clients.storage.as_ref(), &bucket.bucket, &ctx.timing.retry).await
    {
        event::warn(
            ctx.reporter(),
            format!(
                "Rollback of bucket {} failed: {}; delete it manually or re-run the deployment",
                bucket.bucket, e
            ),
        );
        return;
    }

    state.clear_storage();
    if let Err(e) = ctx.store.save(state).await {
        event::warn(
            ctx.reporter(),
            format!("Failed to save state after rollback: {}", e),
        );
    }
    ctx.reporter.report(DeployEvent::RolledBack {
        bucket: bucket.bucket.clone(),
    });
    event::warn(
        ctx.reporter(),
        format!(
            "Bucket {} was removed; re-run with --no-rollback to keep partial resources for inspection",
            bucket.bucket
        ),
    );
}

// ============ remove ============

#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub app: String,
    pub environment: String,
    /// Keep the bucket and its record
    pub keep_bucket: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
    /// `(kind, id)` in deletion order
    pub deleted: Vec<(String, String)>,
    pub state_deleted: bool,
}

/// Tear down every recorded resource in reverse creation order
pub async fn remove(ctx: &DeployContext, request: &RemoveRequest) -> Result<RemoveReport> {
    let (app, environment) = (&request.app, &request.environment);
    let Some(mut state) = ctx.store.load(app, environment).await? else {
        return Err(CloudError::StateError(format!(
            "No state for {}/{}; run `siteflow recover` to rebuild it from tags",
            app, environment
        )));
    };
    let retry = &ctx.timing.retry;
    let mut report = RemoveReport::default();
    let mut deleted = |kind: &str, id: &str| {
        ctx.reporter.report(DeployEvent::ResourceDeleted {
            kind: kind.to_string(),
            id: id.to_string(),
        });
        report.deleted.push((kind.to_string(), id.to_string()));
    };
    ctx.step(Step::Teardown);

    if let Some(zone) = state.resources.route53.clone() {
        if let Some(cdn_res) = state.resources.cloudfront.clone()
            && let Some((primary, aliases)) = cdn_res.aliases.split_first()
        {
            dns::delete_alias_records(
                ctx.clients.dns.as_ref(),
                &zone.hosted_zone_id,
                primary,
                aliases,
                &cdn_res.domain_name,
                retry,
            )
            .await?;
            deleted("alias records", &zone.hosted_zone_id);
        }
        state.clear_dns();
        ctx.store.save(&mut state).await?;
    }

    if let Some(cdn_res) = state.resources.cloudfront.clone() {
        cdn::tear_down(
            ctx.clients.cdn.as_ref(),
            &cdn_res.distribution_id,
            &ctx.timing.cdn,
            ctx.reporter(),
        )
        .await?;
        deleted("distribution", &cdn_res.distribution_id);
        state.clear_distribution();
        ctx.store.save(&mut state).await?;
    }

    if let Some(cert) = state.resources.acm.clone() {
        if cert.auto_created {
            certificate::delete(
                ctx.clients.certificates.as_ref(),
                &cert.certificate_arn,
                retry,
            )
            .await?;
            deleted("certificate", &cert.certificate_arn);
        }
        state.clear_certificate();
        ctx.store.save(&mut state).await?;
    }

    if let Some(s3) = state.resources.s3.clone() {
        if request.keep_bucket {
            ctx.skip(Step::Teardown, format!("keeping bucket {}", s3.bucket_name));
        } else {
            storage::tear_down(ctx.clients.storage.as_ref(), &s3.bucket_name, retry).await?;
            deleted("bucket", &s3.bucket_name);
            state.clear_storage();
            ctx.store.save(&mut state).await?;
        }
    }

    if state.is_empty() {
        report.state_deleted = ctx.store.delete(app, environment).await?;
    }
    info!("Removed {}/{}", app, environment);
    Ok(report)
}

// ============ status ============

/// Live view of a recorded resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveStatus {
    Present(Option<String>),
    Missing,
    Unknown(String),
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveStatus::Present(Some(status)) => write!(f, "{}", status),
            LiveStatus::Present(None) => write!(f, "present"),
            LiveStatus::Missing => write!(f, "missing"),
            LiveStatus::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

fn live<T>(result: Result<T>, status: impl FnOnce(T) -> Option<String>) -> LiveStatus {
    match result {
        Ok(value) => LiveStatus::Present(status(value)),
        Err(e) if e.is_not_found() => LiveStatus::Missing,
        Err(e) => LiveStatus::Unknown(e.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub kind: &'static str,
    pub id: String,
    pub live: LiveStatus,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state: DeploymentState,
    pub resources: Vec<ResourceStatus>,
}

/// Recorded state plus live checks; `None` when nothing is recorded
pub async fn status(
    ctx: &DeployContext,
    app: &str,
    environment: &str,
) -> Result<Option<StatusReport>> {
    let Some(state) = ctx.store.load(app, environment).await? else {
        return Ok(None);
    };
    let mut resources = Vec::new();

    if let Some(s3) = &state.resources.s3 {
        let result = ctx.clients.storage.head_bucket(&s3.bucket_name).await;
        resources.push(ResourceStatus {
            kind: "bucket",
            id: s3.bucket_name.clone(),
            live: live(result, |_| None),
        });
    }

    if let Some(cdn_res) = &state.resources.cloudfront {
        let result = ctx
            .clients
            .cdn
            .get_distribution(&cdn_res.distribution_id)
            .await;
        resources.push(ResourceStatus {
            kind: "distribution",
            id: cdn_res.distribution_id.clone(),
            live: live(result, |info| Some(info.status)),
        });
    }

    if let Some(cert) = &state.resources.acm {
        let result = ctx
            .clients
            .certificates
            .describe_certificate(&cert.certificate_arn)
            .await;
        resources.push(ResourceStatus {
            kind: "certificate",
            id: cert.certificate_arn.clone(),
            live: live(result, |details| Some(details.status.to_string())),
        });
    }

    if let Some(zone) = &state.resources.route53 {
        let result = ctx.clients.dns.name_servers(&zone.hosted_zone_id).await;
        resources.push(ResourceStatus {
            kind: "hosted zone",
            id: zone.hosted_zone_id.clone(),
            live: live(result, |_| None),
        });
    }

    Ok(Some(StatusReport { state, resources }))
}
