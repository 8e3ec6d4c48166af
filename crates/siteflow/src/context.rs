//! Wiring between siteflow.yaml, the AWS session and the engine

use crate::reporter::ConsoleReporter;
use anyhow::Context;
use colored::Colorize;
use siteflow_cloud::{
    CdnRequest, CustomDomain, DeployContext, DeployRequest, PriceClass, StateStore, Timing,
};
use siteflow_config::LoadedConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct DeployFlags {
    pub force_invalidate: bool,
    pub no_rollback: bool,
    pub no_cleanup: bool,
    pub wait_invalidation: bool,
}

/// Config resolved for the requested environment
pub fn load_config(environment: Option<&str>) -> anyhow::Result<LoadedConfig> {
    let loaded = siteflow_config::load_for_environment(environment)?;
    println!(
        "📄 {} ({})",
        loaded.path.display().to_string().cyan(),
        loaded.environment.bold()
    );
    Ok(loaded)
}

/// Project directory of the config file, or the current directory without one
pub fn project_dir() -> anyhow::Result<PathBuf> {
    match siteflow_config::find_config_file() {
        Ok(path) => Ok(siteflow_config::project_dir(&path)?),
        Err(_) => Ok(std::env::current_dir()?),
    }
}

pub fn timing(loaded: &LoadedConfig) -> Timing {
    let mut timing = Timing::default();
    timing.cdn.deployment.timeout = Duration::from_secs(loaded.config.cloudfront.wait_timeout_secs);
    timing
}

/// Session, clients and state store for one command
pub async fn build(
    region: &str,
    profile: Option<&str>,
    project_dir: &std::path::Path,
    timing: Timing,
) -> anyhow::Result<DeployContext> {
    let session = siteflow_cloud_aws::load_session(region, profile).await;
    tracing::debug!("AWS credentials from {}", session.source);
    let clients =
        siteflow_cloud_aws::build_clients(&session).context("Failed to create AWS clients")?;

    Ok(DeployContext {
        store: Arc::new(StateStore::new(project_dir)),
        clients,
        reporter: Arc::new(ConsoleReporter::new()),
        timing,
    })
}

/// Explicit `--profile` wins over the config file
pub fn profile<'a>(cli: Option<&'a str>, loaded: &'a LoadedConfig) -> Option<&'a str> {
    cli.or(loaded.config.profile.as_deref())
}

pub fn deploy_request(loaded: &LoadedConfig, flags: &DeployFlags) -> anyhow::Result<DeployRequest> {
    let config = &loaded.config;
    let environment = &loaded.environment;

    let cdn = if config.cdn_enabled() {
        let cloudfront = &config.cloudfront;
        let price_class: PriceClass = cloudfront
            .price_class
            .parse()
            .map_err(anyhow::Error::msg)?;
        Some(CdnRequest {
            price_class,
            ipv6: cloudfront.ipv6,
            spa: cloudfront.spa,
            custom_domain: cloudfront.custom_domain.as_ref().map(|d| CustomDomain {
                domain_name: d.domain_name.clone(),
                aliases: d.aliases.clone(),
                certificate_arn: d.certificate_arn.clone(),
            }),
            cache_warming: cloudfront.cache_warming.clone(),
        })
    } else {
        None
    };

    let source = loaded.source_dir();
    anyhow::ensure!(
        source.is_dir(),
        "Source directory {} does not exist\n  → Build the site first or set `source` in {}",
        source.display(),
        loaded.path.display()
    );

    Ok(DeployRequest {
        app: config.app.clone(),
        environment: environment.clone(),
        source,
        region: config.region.clone(),
        bucket: config.bucket_name(environment),
        index_document: config.s3.index_document.clone(),
        error_document: config.s3.error_document.clone(),
        exclude: config.s3.exclude.clone(),
        concurrency: config.s3.concurrency,
        gzip: config.s3.gzip,
        cache_control: config.s3.cache_control.clone(),
        cleanup: config.s3.cleanup && !flags.no_cleanup,
        cdn,
        rollback: !flags.no_rollback,
        force_invalidate: flags.force_invalidate,
        wait_invalidation: flags.wait_invalidation,
    })
}
