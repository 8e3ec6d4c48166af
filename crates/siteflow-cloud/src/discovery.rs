//! Tag-based resource discovery and state recovery
//!
//! Remote resources are mapped back to an application/environment pair
//! exclusively through the convention tags in [`crate::tags`].

use crate::dns;
use crate::error::{CloudError, Result};
use crate::provider::{CdnService, CertificateAuthority, CloudClients, DnsService, ObjectStore};
use crate::retry::{RetryConfig, with_retry};
use crate::state::{
    CdnResource, CertificateResource, DeploymentState, DnsResource, Resources, StateStore,
    StorageResource,
};
use crate::storage;
use crate::tags::TagSet;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    Bucket,
    Distribution,
    Certificate,
    HostedZone,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Distribution => write!(f, "distribution"),
            ResourceKind::Certificate => write!(f, "certificate"),
            ResourceKind::HostedZone => write!(f, "hosted zone"),
        }
    }
}

/// A managed resource found by its tags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredResource {
    pub kind: ResourceKind,
    /// Provider-assigned identifier (bucket name, distribution id, ARN, zone id)
    pub id: String,
    /// Domain or name
    pub name: String,
    pub status: Option<String>,
    pub region: Option<String>,
    pub aliases: Vec<String>,
    pub tags: TagSet,
}

impl DiscoveredResource {
    pub fn app(&self) -> Option<&str> {
        self.tags.app()
    }

    pub fn environment(&self) -> Option<&str> {
        self.tags.environment()
    }
}

/// At most one resource of each kind for one application/environment pair
#[derive(Debug, Clone, Default)]
pub struct DiscoveredSet {
    pub bucket: Option<DiscoveredResource>,
    pub distribution: Option<DiscoveredResource>,
    pub certificate: Option<DiscoveredResource>,
    pub hosted_zone: Option<DiscoveredResource>,
}

impl DiscoveredSet {
    pub fn is_empty(&self) -> bool {
        self.resources().is_empty()
    }

    pub fn resources(&self) -> Vec<&DiscoveredResource> {
        [
            &self.bucket,
            &self.distribution,
            &self.certificate,
            &self.hosted_zone,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// ============ Scanners ============

async fn scan_buckets(
    storage: &dyn ObjectStore,
    retry: &RetryConfig,
) -> Result<Vec<DiscoveredResource>> {
    let names = with_retry(retry, "list buckets", || storage.list_buckets()).await?;
    let mut found = Vec::new();
    for name in names {
        let tags = match with_retry(retry, "get bucket tags", || storage.bucket_tags(&name)).await {
            Ok(tags) => tags,
            Err(e) => {
                debug!("Skipping bucket {}: {}", name, e);
                continue;
            }
        };
        if !tags.is_managed() {
            continue;
        }
        let region = with_retry(retry, "get bucket region", || storage.bucket_region(&name))
            .await
            .ok();
        found.push(DiscoveredResource {
            kind: ResourceKind::Bucket,
            id: name.clone(),
            name,
            status: None,
            region,
            aliases: Vec::new(),
            tags,
        });
    }
    Ok(found)
}

async fn scan_distributions(
    cdn: &dyn CdnService,
    retry: &RetryConfig,
) -> Result<Vec<DiscoveredResource>> {
    let distributions = with_retry(retry, "list distributions", || cdn.list_distributions()).await?;
    let mut found = Vec::new();
    for dist in distributions {
        let tags = match with_retry(retry, "get distribution tags", || {
            cdn.resource_tags(&dist.arn)
        })
        .await
        {
            Ok(tags) => tags,
            Err(e) => {
                debug!("Skipping distribution {}: {}", dist.id, e);
                continue;
            }
        };
        if !tags.is_managed() {
            continue;
        }
        found.push(DiscoveredResource {
            kind: ResourceKind::Distribution,
            id: dist.id,
            name: dist.domain_name,
            status: Some(dist.status),
            region: None,
            aliases: dist.aliases,
            tags,
        });
    }
    Ok(found)
}

async fn scan_certificates(
    acm: &dyn CertificateAuthority,
    retry: &RetryConfig,
) -> Result<Vec<DiscoveredResource>> {
    let certificates = with_retry(retry, "list certificates", || acm.list_certificates()).await?;
    let mut found = Vec::new();
    for cert in certificates {
        let tags = match with_retry(retry, "get certificate tags", || {
            acm.certificate_tags(&cert.arn)
        })
        .await
        {
            Ok(tags) => tags,
            Err(e) => {
                debug!("Skipping certificate {}: {}", cert.arn, e);
                continue;
            }
        };
        if !tags.is_managed() {
            continue;
        }
        found.push(DiscoveredResource {
            kind: ResourceKind::Certificate,
            id: cert.arn,
            name: cert.domain_name,
            status: Some(cert.status.to_string()),
            region: None,
            aliases: cert.alternate_names,
            tags,
        });
    }
    Ok(found)
}

async fn scan_zones(dns: &dyn DnsService, retry: &RetryConfig) -> Result<Vec<DiscoveredResource>> {
    let zones = with_retry(retry, "list hosted zones", || dns.list_hosted_zones()).await?;
    let mut found = Vec::new();
    for zone in zones {
        let tags = match with_retry(retry, "get hosted zone tags", || {
            dns.hosted_zone_tags(&zone.id)
        })
        .await
        {
            Ok(tags) => tags,
            Err(e) => {
                debug!("Skipping hosted zone {}: {}", zone.id, e);
                continue;
            }
        };
        if !tags.is_managed() {
            continue;
        }
        found.push(DiscoveredResource {
            kind: ResourceKind::HostedZone,
            id: zone.id,
            name: zone.name,
            status: None,
            region: None,
            aliases: Vec::new(),
            tags,
        });
    }
    Ok(found)
}

async fn scan_all(clients: &CloudClients, retry: &RetryConfig) -> Result<Vec<DiscoveredResource>> {
    let (buckets, distributions, certificates, zones) = tokio::join!(
        scan_buckets(clients.storage.as_ref(), retry),
        scan_distributions(clients.cdn.as_ref(), retry),
        scan_certificates(clients.certificates.as_ref(), retry),
        scan_zones(clients.dns.as_ref(), retry),
    );

    let mut all = buckets?;
    all.extend(distributions?);
    all.extend(certificates?);
    all.extend(zones?);
    Ok(all)
}

fn pick_one(
    mut candidates: Vec<DiscoveredResource>,
    kind: ResourceKind,
    app: &str,
    environment: &str,
) -> Option<DiscoveredResource> {
    candidates.sort_by(|a, b| a.id.cmp(&b.id));
    if candidates.len() > 1 {
        warn!(
            "Found {} {}s tagged for {}/{}; using {}",
            candidates.len(),
            kind,
            app,
            environment,
            candidates[0].id
        );
    }
    candidates.into_iter().next()
}

// ============ Public API ============

/// Managed resources tagged for `app`/`environment`, at most one per kind
pub async fn discover_for_app_env(
    clients: &CloudClients,
    app: &str,
    environment: &str,
    retry: &RetryConfig,
) -> Result<DiscoveredSet> {
    let all = scan_all(clients, retry).await?;
    let of_kind = |kind: ResourceKind| -> Vec<DiscoveredResource> {
        all.iter()
            .filter(|r| r.kind == kind && r.tags.belongs_to(app, environment))
            .cloned()
            .collect()
    };

    Ok(DiscoveredSet {
        bucket: pick_one(of_kind(ResourceKind::Bucket), ResourceKind::Bucket, app, environment),
        distribution: pick_one(
            of_kind(ResourceKind::Distribution),
            ResourceKind::Distribution,
            app,
            environment,
        ),
        certificate: pick_one(
            of_kind(ResourceKind::Certificate),
            ResourceKind::Certificate,
            app,
            environment,
        ),
        hosted_zone: pick_one(
            of_kind(ResourceKind::HostedZone),
            ResourceKind::HostedZone,
            app,
            environment,
        ),
    })
}

/// Every managed resource, ordered by application, environment and kind
pub async fn discover_all(
    clients: &CloudClients,
    retry: &RetryConfig,
) -> Result<Vec<DiscoveredResource>> {
    let mut all = scan_all(clients, retry).await?;
    all.sort_by(|a, b| {
        (a.app(), a.environment(), a.kind, &a.id).cmp(&(b.app(), b.environment(), b.kind, &b.id))
    });
    Ok(all)
}

/// Build a record from discovered resources.
///
/// The digest map is left empty, so the next deployment uploads everything.
pub fn state_from_discovery(app: &str, environment: &str, set: &DiscoveredSet) -> DeploymentState {
    let mut resources = Resources::default();

    if let Some(bucket) = &set.bucket {
        let region = bucket
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());
        resources.s3 = Some(StorageResource {
            website_url: storage::website_endpoint(&bucket.id, &region),
            bucket_name: bucket.id.clone(),
            region,
        });
    }

    if let Some(cert) = &set.certificate {
        resources.acm = Some(CertificateResource {
            certificate_arn: cert.id.clone(),
            domain_name: cert.name.clone(),
            validation_method: crate::certificate::VALIDATION_METHOD.to_string(),
            status: cert.status.clone().unwrap_or_default(),
            auto_created: cert.tags.is_auto_created(),
        });
    }

    if let Some(dist) = &set.distribution {
        resources.cloudfront = Some(CdnResource {
            distribution_id: dist.id.clone(),
            domain_name: dist.name.clone(),
            distribution_url: format!("https://{}", dist.name),
            certificate_arn: set.certificate.as_ref().map(|c| c.id.clone()),
            aliases: dist.aliases.clone(),
            last_invalidation: None,
        });
    }

    if let Some(zone) = &set.hosted_zone {
        let records = match (&set.distribution, dist_primary(set)) {
            (Some(dist), Some(primary)) => {
                dns::alias_records(&primary, &dist.aliases, &dist.name)
                    .iter()
                    .map(|r| r.label())
                    .collect()
            }
            _ => Vec::new(),
        };
        resources.route53 = Some(DnsResource {
            hosted_zone_id: zone.id.clone(),
            hosted_zone_name: zone.name.clone(),
            records,
        });
    }

    let mut state = DeploymentState::new(app, environment);
    state.replace_resources(resources);
    state
}

fn dist_primary(set: &DiscoveredSet) -> Option<String> {
    set.distribution.as_ref()?.aliases.first().cloned()
}

/// Rebuild and save the record for `app`/`environment` from tags.
///
/// Refuses to overwrite an existing record unless `force` is set.
pub async fn recover_state(
    store: &StateStore,
    clients: &CloudClients,
    app: &str,
    environment: &str,
    force: bool,
    retry: &RetryConfig,
) -> Result<DeploymentState> {
    if !force && store.load(app, environment).await?.is_some() {
        return Err(CloudError::StateError(format!(
            "State for {}/{} already exists; pass --force to overwrite it",
            app, environment
        )));
    }

    let mut set = discover_for_app_env(clients, app, environment, retry).await?;
    if set.is_empty() {
        return Err(CloudError::ResourceNotFound(format!(
            "no resources tagged for {}/{}",
            app, environment
        )));
    }

    // zones the user created are not tagged; find the one serving the aliases
    if set.hosted_zone.is_none()
        && let Some(primary) = dist_primary(&set)
    {
        let zones = with_retry(retry, "list hosted zones", || clients.dns.list_hosted_zones()).await?;
        if let Some(zone) = dns::best_zone(&zones, &primary) {
            set.hosted_zone = Some(DiscoveredResource {
                kind: ResourceKind::HostedZone,
                id: zone.id,
                name: zone.name,
                status: None,
                region: None,
                aliases: Vec::new(),
                tags: TagSet::new(),
            });
        }
    }

    let mut state = state_from_discovery(app, environment, &set);
    store.save(&mut state).await?;
    info!(
        "Recovered state for {}/{} ({} resources)",
        app,
        environment,
        set.resources().len()
    );
    Ok(state)
}
