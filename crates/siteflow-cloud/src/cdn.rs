//! CDN distribution provisioning
//!
//! The distribution fronts the bucket's regional endpoint through an origin
//! access control. Updates follow get-config → mutate → conditional write on
//! the ETag so fields siteflow does not manage are preserved by the adapter.

use crate::error::{CloudError, ErrorKind, Result};
use crate::event::{self, DeployEvent, ProgressReporter};
use crate::provider::{
    CdnService, DistributionConfig, DistributionInfo, ErrorPage, PriceClass, VersionedConfig,
};
use crate::retry::{PollConfig, PollStatus, RetryConfig, poll_until, with_retry};
use crate::storage::regional_domain;
use crate::tags::TagSet;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

/// Timing for CDN operations
#[derive(Debug, Clone)]
pub struct CdnConfig {
    pub retry: RetryConfig,
    /// Wait for `Deployed` (default: 20 minutes)
    pub deployment: PollConfig,
    pub invalidation: PollConfig,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            deployment: PollConfig::backoff(
                Duration::from_secs(15),
                Duration::from_secs(60),
                Duration::from_secs(20 * 60),
            ),
            invalidation: PollConfig::backoff(
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(10 * 60),
            ),
        }
    }
}

/// Desired distribution settings
#[derive(Debug, Clone)]
pub struct DistributionOptions {
    pub app: String,
    pub environment: String,
    pub bucket: String,
    pub region: String,
    pub index_document: String,
    pub price_class: PriceClass,
    pub ipv6: bool,
    /// Serve the index document for unknown paths
    pub spa: bool,
    /// Primary domain first, then aliases
    pub aliases: Vec<String>,
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DistributionOutcome {
    pub info: DistributionInfo,
    pub created: bool,
    pub updated: bool,
}

/// Name of the origin access control for a bucket (max 64 chars)
pub fn origin_access_control_name(bucket: &str) -> String {
    let mut name = format!("siteflow-{}", bucket);
    name.truncate(64);
    name
}

/// 403/404 → index document with 200, for client-side routing
pub fn spa_error_pages(index_document: &str) -> Vec<ErrorPage> {
    [403, 404]
        .into_iter()
        .map(|error_code| ErrorPage {
            error_code,
            response_code: 200,
            response_page_path: format!("/{}", index_document.trim_start_matches('/')),
            min_ttl: 0,
        })
        .collect()
}

fn origin_id(bucket: &str) -> String {
    format!("s3-{}", bucket)
}

/// Overlay the managed fields of `options` onto `base`
fn apply_options(
    base: &DistributionConfig,
    options: &DistributionOptions,
    oac_id: &str,
) -> DistributionConfig {
    let mut config = base.clone();
    config.enabled = true;
    config.origin_id = origin_id(&options.bucket);
    config.origin_domain = regional_domain(&options.bucket, &options.region);
    config.origin_access_control_id = Some(oac_id.to_string());
    config.default_root_object = options.index_document.clone();
    config.price_class = options.price_class;
    config.ipv6 = options.ipv6;
    config.aliases = options.aliases.clone();
    config.certificate_arn = options.certificate_arn.clone();
    config.error_pages = if options.spa {
        spa_error_pages(&options.index_document)
    } else {
        Vec::new()
    };
    config
}

/// Fresh distribution config for `options`
pub fn build_config(options: &DistributionOptions, oac_id: &str) -> DistributionConfig {
    let base = DistributionConfig {
        caller_reference: format!(
            "siteflow-{}-{}-{}",
            options.app,
            options.environment,
            Utc::now().timestamp_millis()
        ),
        comment: format!("siteflow {}/{}", options.app, options.environment),
        enabled: true,
        origin_id: String::new(),
        origin_domain: String::new(),
        origin_access_control_id: None,
        default_root_object: String::new(),
        price_class: PriceClass::default(),
        ipv6: true,
        aliases: Vec::new(),
        certificate_arn: None,
        error_pages: Vec::new(),
    };
    apply_options(&base, options, oac_id)
}

/// Find or create the origin access control named `name`
pub async fn ensure_origin_access_control(
    cdn: &dyn CdnService,
    name: &str,
    retry: &RetryConfig,
) -> Result<String> {
    if let Some(id) = with_retry(retry, "find origin access control", || {
        cdn.find_origin_access_control(name)
    })
    .await?
    {
        return Ok(id);
    }

    match with_retry(retry, "create origin access control", || {
        cdn.create_origin_access_control(name)
    })
    .await
    {
        Ok(id) => {
            info!("Created origin access control {} ({})", name, id);
            Ok(id)
        }
        Err(e) if e.kind() == ErrorKind::Conflict => {
            let existing = with_retry(retry, "find origin access control", || {
                cdn.find_origin_access_control(name)
            })
            .await?;
            existing.ok_or(e)
        }
        Err(e) => Err(e),
    }
}

/// Best-effort tagging; returns whether the tags were written
pub async fn tag(
    cdn: &dyn CdnService,
    arn: &str,
    tags: &TagSet,
    retry: &RetryConfig,
    reporter: &dyn ProgressReporter,
) -> bool {
    match with_retry(retry, "tag distribution", || cdn.tag_resource(arn, tags)).await {
        Ok(()) => true,
        Err(e) => {
            event::warn(reporter, format!("Failed to tag distribution {}: {}", arn, e));
            false
        }
    }
}

async fn fetch_config(cdn: &dyn CdnService, id: &str, retry: &RetryConfig) -> Result<VersionedConfig> {
    match with_retry(retry, "get distribution config", || cdn.get_distribution_config(id)).await {
        Ok(current) => Ok(current),
        Err(e) if e.is_not_found() => Err(CloudError::DistributionNotFound(id.to_string())),
        Err(e) => Err(e),
    }
}

/// Conditional write of `mutate(current)`; a stale ETag is refetched once.
///
/// Returns `None` when the mutation leaves the config unchanged.
async fn update_with<F>(
    cdn: &dyn CdnService,
    id: &str,
    retry: &RetryConfig,
    mutate: F,
) -> Result<Option<DistributionInfo>>
where
    F: Fn(&DistributionConfig) -> DistributionConfig,
{
    let mut refetched = false;
    loop {
        let current = fetch_config(cdn, id, retry).await?;
        let desired = mutate(&current.config);
        if desired == current.config {
            return Ok(None);
        }

        match with_retry(retry, "update distribution", || {
            cdn.update_distribution(id, &desired, &current.etag)
        })
        .await
        {
            Ok(info) => return Ok(Some(info)),
            Err(e) if e.kind() == ErrorKind::Conflict && !refetched => {
                debug!("Stale ETag for {}, refetching", id);
                refetched = true;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Create the distribution, or reconcile the one recorded as `known_id`
pub async fn ensure_distribution(
    cdn: &dyn CdnService,
    options: &DistributionOptions,
    known_id: Option<&str>,
    tags: &TagSet,
    config: &CdnConfig,
    reporter: &dyn ProgressReporter,
) -> Result<DistributionOutcome> {
    let oac_id = ensure_origin_access_control(
        cdn,
        &origin_access_control_name(&options.bucket),
        &config.retry,
    )
    .await?;

    let outcome = match known_id {
        None => {
            let desired = build_config(options, &oac_id);
            let info = with_retry(&config.retry, "create distribution", || {
                cdn.create_distribution(&desired)
            })
            .await?;
            info!("Created distribution {} ({})", info.id, info.domain_name);
            DistributionOutcome {
                info,
                created: true,
                updated: false,
            }
        }
        Some(id) => {
            let updated = match update_with(cdn, id, &config.retry, |current| {
                apply_options(current, options, &oac_id)
            })
            .await
            {
                Ok(updated) => updated,
                Err(CloudError::PriceClassRestricted(message)) => {
                    event::warn(
                        reporter,
                        format!(
                            "Price class {} rejected for {} ({}); keeping the current price class",
                            options.price_class, id, message
                        ),
                    );
                    update_with(cdn, id, &config.retry, |current| {
                        let mut desired = apply_options(current, options, &oac_id);
                        desired.price_class = current.price_class;
                        desired
                    })
                    .await?
                }
                Err(e) => return Err(e),
            };

            match updated {
                Some(info) => {
                    info!("Updated distribution {}", id);
                    DistributionOutcome {
                        info,
                        created: false,
                        updated: true,
                    }
                }
                None => {
                    let info = with_retry(&config.retry, "get distribution", || {
                        cdn.get_distribution(id)
                    })
                    .await?;
                    DistributionOutcome {
                        info,
                        created: false,
                        updated: false,
                    }
                }
            }
        }
    };

    tag(cdn, &outcome.info.arn, tags, &config.retry, reporter).await;
    reporter.report(DeployEvent::DistributionReady {
        id: outcome.info.id.clone(),
        domain: outcome.info.domain_name.clone(),
        created: outcome.created,
    });
    Ok(outcome)
}

/// Wait for `Deployed`; `false` (with a warning) on timeout
pub async fn wait_until_deployed(
    cdn: &dyn CdnService,
    id: &str,
    config: &CdnConfig,
    reporter: &dyn ProgressReporter,
) -> Result<bool> {
    let deployed = poll_until(&config.deployment, || async move {
        let info = with_retry(&config.retry, "get distribution", || cdn.get_distribution(id)).await?;
        Ok(if info.is_deployed() {
            PollStatus::Ready(())
        } else {
            PollStatus::Pending(info.status)
        })
    })
    .await?;

    if deployed.is_some() {
        reporter.report(DeployEvent::DistributionDeployed { id: id.to_string() });
        Ok(true)
    } else {
        event::warn(
            reporter,
            format!(
                "Distribution {} is not deployed after {:?}; changes will propagate in the background",
                id, config.deployment.timeout
            ),
        );
        Ok(false)
    }
}

/// What to invalidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    All,
    Paths(Vec<String>),
}

impl InvalidationTarget {
    pub fn paths(&self) -> Vec<String> {
        match self {
            InvalidationTarget::All => vec!["/*".to_string()],
            InvalidationTarget::Paths(paths) => paths
                .iter()
                .map(|p| format!("/{}", p.trim_start_matches('/')))
                .collect(),
        }
    }
}

/// Create an invalidation and optionally wait for it to complete
pub async fn invalidate(
    cdn: &dyn CdnService,
    id: &str,
    target: &InvalidationTarget,
    wait: bool,
    config: &CdnConfig,
    reporter: &dyn ProgressReporter,
) -> Result<String> {
    let paths = target.paths();
    let invalidation_id = with_retry(&config.retry, "create invalidation", || {
        cdn.create_invalidation(id, &paths)
    })
    .await?;
    info!("Created invalidation {} on {}", invalidation_id, id);
    reporter.report(DeployEvent::InvalidationCreated {
        id: invalidation_id.clone(),
        paths,
    });

    if wait {
        let invalidation = invalidation_id.as_str();
        let done = poll_until(&config.invalidation, || async move {
            let completed = with_retry(&config.retry, "get invalidation", || {
                cdn.invalidation_completed(id, invalidation)
            })
            .await?;
            Ok(if completed {
                PollStatus::Ready(())
            } else {
                PollStatus::Pending("InProgress".to_string())
            })
        })
        .await?;
        if done.is_none() {
            event::warn(
                reporter,
                format!("Invalidation {} is still in progress", invalidation_id),
            );
        }
    }

    Ok(invalidation_id)
}

/// Disable, wait for deployment and delete; an unknown id is success
pub async fn tear_down(
    cdn: &dyn CdnService,
    id: &str,
    config: &CdnConfig,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let disabled = update_with(cdn, id, &config.retry, |current| {
        let mut desired = current.clone();
        desired.enabled = false;
        desired
    })
    .await;
    match disabled {
        Ok(Some(_)) => info!("Disabled distribution {}", id),
        Ok(None) => {}
        Err(CloudError::DistributionNotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    }

    if !wait_until_deployed(cdn, id, config, reporter).await? {
        return Err(CloudError::timeout(
            format!("distribution {} is still being disabled", id),
            "Re-run `siteflow remove` once the distribution status is Deployed",
        ));
    }

    let current = match fetch_config(cdn, id, &config.retry).await {
        Ok(current) => current,
        Err(CloudError::DistributionNotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    match with_retry(&config.retry, "delete distribution", || {
        cdn.delete_distribution(id, &current.etag)
    })
    .await
    {
        Ok(()) => {
            info!("Deleted distribution {}", id);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SilentReporter;
    use crate::testing::{FakeCloud, RecordingReporter};

    fn quick() -> CdnConfig {
        CdnConfig {
            retry: RetryConfig::immediate(2),
            deployment: PollConfig::fixed(Duration::from_millis(1), Duration::from_secs(5)),
            invalidation: PollConfig::fixed(Duration::from_millis(1), Duration::from_secs(5)),
        }
    }

    fn options() -> DistributionOptions {
        DistributionOptions {
            app: "web".into(),
            environment: "prod".into(),
            bucket: "site".into(),
            region: "ap-northeast-1".into(),
            index_document: "index.html".into(),
            price_class: PriceClass::P100,
            ipv6: true,
            spa: true,
            aliases: Vec::new(),
            certificate_arn: None,
        }
    }

    #[test]
    fn test_build_config() {
        let config = build_config(&options(), "OAC1");
        assert_eq!(config.origin_domain, "site.s3.ap-northeast-1.amazonaws.com");
        assert_eq!(config.origin_access_control_id.as_deref(), Some("OAC1"));
        assert_eq!(config.default_root_object, "index.html");
        assert!(config.caller_reference.starts_with("siteflow-web-prod-"));
        assert_eq!(config.error_pages.len(), 2);
        assert!(
            config
                .error_pages
                .iter()
                .all(|p| p.response_code == 200 && p.response_page_path == "/index.html")
        );

        let plain = build_config(
            &DistributionOptions {
                spa: false,
                ..options()
            },
            "OAC1",
        );
        assert!(plain.error_pages.is_empty());
    }

    #[test]
    fn test_invalidation_paths() {
        assert_eq!(InvalidationTarget::All.paths(), vec!["/*"]);
        assert_eq!(
            InvalidationTarget::Paths(vec!["index.html".into(), "/css/a.css".into()]).paths(),
            vec!["/index.html", "/css/a.css"]
        );
    }

    #[tokio::test]
    async fn test_origin_access_control_is_reused() {
        let cloud = FakeCloud::new();
        let retry = RetryConfig::immediate(1);
        let first = ensure_origin_access_control(&cloud, "siteflow-site", &retry)
            .await
            .unwrap();
        let second = ensure_origin_access_control(&cloud, "siteflow-site", &retry)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cloud.state().origin_access_controls.len(), 1);
    }

    #[tokio::test]
    async fn test_create_then_reconcile() {
        let cloud = FakeCloud::new();
        let tags = TagSet::convention("web", "prod");

        let created = ensure_distribution(&cloud, &options(), None, &tags, &quick(), &SilentReporter)
            .await
            .unwrap();
        assert!(created.created);
        let id = created.info.id.clone();
        assert!(cloud.distribution(&id).unwrap().tags.belongs_to("web", "prod"));

        // unchanged options do not write
        let same = ensure_distribution(
            &cloud,
            &options(),
            Some(&id),
            &tags,
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert!(!same.created);
        assert!(!same.updated);

        let changed = ensure_distribution(
            &cloud,
            &DistributionOptions {
                aliases: vec!["example.com".into()],
                certificate_arn: Some("arn:cert".into()),
                ..options()
            },
            Some(&id),
            &tags,
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert!(changed.updated);
        let stored = cloud.distribution(&id).unwrap();
        assert_eq!(stored.config.aliases, vec!["example.com"]);
        assert_eq!(stored.etag, 2);
        assert!(stored.config.caller_reference.starts_with("siteflow-web-prod-"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_fatal() {
        let cloud = FakeCloud::new();
        let err = ensure_distribution(
            &cloud,
            &options(),
            Some("EMISSING"),
            &TagSet::new(),
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::DistributionNotFound(_)));
        assert!(cloud.state().distributions.is_empty());
    }

    #[tokio::test]
    async fn test_price_class_restriction_keeps_current() {
        let cloud = FakeCloud::new();
        let created = ensure_distribution(
            &cloud,
            &options(),
            None,
            &TagSet::new(),
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();
        cloud.state().restrict_price_class = true;
        let reporter = RecordingReporter::new();

        let outcome = ensure_distribution(
            &cloud,
            &DistributionOptions {
                price_class: PriceClass::All,
                ipv6: false,
                ..options()
            },
            Some(&created.info.id),
            &TagSet::new(),
            &quick(),
            &reporter,
        )
        .await
        .unwrap();

        assert!(outcome.updated);
        let stored = cloud.distribution(&created.info.id).unwrap();
        assert_eq!(stored.config.price_class, PriceClass::P100);
        assert!(!stored.config.ipv6);
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_tagging_failure_is_a_warning() {
        let cloud = FakeCloud::new();
        cloud.fail_always("tag_resource", || CloudError::ApiError("denied".into()));
        let reporter = RecordingReporter::new();

        let outcome = ensure_distribution(&cloud, &options(), None, &TagSet::new(), &quick(), &reporter)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_timeout_is_not_fatal() {
        let cloud = FakeCloud::new();
        cloud.state().polls_until_deployed = u32::MAX;
        let created = ensure_distribution(
            &cloud,
            &options(),
            None,
            &TagSet::new(),
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();
        let mut config = quick();
        config.deployment = PollConfig::fixed(Duration::from_millis(1), Duration::from_millis(10));
        let reporter = RecordingReporter::new();

        let deployed = wait_until_deployed(&cloud, &created.info.id, &config, &reporter)
            .await
            .unwrap();
        assert!(!deployed);
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cloud = FakeCloud::new();
        let created = ensure_distribution(
            &cloud,
            &options(),
            None,
            &TagSet::new(),
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();

        invalidate(
            &cloud,
            &created.info.id,
            &InvalidationTarget::All,
            true,
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert_eq!(
            cloud.state().invalidations,
            vec![(created.info.id.clone(), vec!["/*".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_tear_down_disables_then_deletes() {
        let cloud = FakeCloud::new();
        let created = ensure_distribution(
            &cloud,
            &options(),
            None,
            &TagSet::new(),
            &quick(),
            &SilentReporter,
        )
        .await
        .unwrap();

        tear_down(&cloud, &created.info.id, &quick(), &SilentReporter)
            .await
            .unwrap();
        assert!(cloud.distribution(&created.info.id).is_none());

        // already gone
        tear_down(&cloud, &created.info.id, &quick(), &SilentReporter)
            .await
            .unwrap();
    }
}
