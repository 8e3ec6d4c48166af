use crate::context;
use anyhow::Context;
use colored::Colorize;
use siteflow_cloud::{DeploymentState, RemoveRequest, StateStore};

/// What a teardown would delete, in order
fn plan(state: &DeploymentState, keep_bucket: bool) -> Vec<String> {
    let resources = &state.resources;
    let mut plan = Vec::new();
    if let (Some(zone), Some(cdn)) = (&resources.route53, &resources.cloudfront) {
        plan.push(format!(
            "alias records for {} in {}",
            cdn.aliases.join(", "),
            zone.hosted_zone_name
        ));
    }
    if let Some(cdn) = &resources.cloudfront {
        plan.push(format!("distribution {} ({})", cdn.distribution_id, cdn.domain_name));
    }
    if let Some(cert) = resources.acm.as_ref().filter(|c| c.auto_created) {
        plan.push(format!("certificate for {}", cert.domain_name));
    }
    if let Some(s3) = &resources.s3
        && !keep_bucket
    {
        plan.push(format!("bucket {} and all of its objects", s3.bucket_name));
    }
    plan
}

pub async fn handle(
    environment: Option<&str>,
    profile: Option<&str>,
    yes: bool,
    keep_bucket: bool,
) -> anyhow::Result<()> {
    let loaded = context::load_config(environment)?;
    let (app, environment) = (&loaded.config.app, &loaded.environment);

    let store = StateStore::new(&loaded.project_dir);
    let state = store
        .load(app, environment)
        .await?
        .with_context(|| format!("No state recorded for {}/{}", app, environment))?;

    println!();
    println!("{}", format!("Resources of {}/{}:", app, environment).bold());
    for item in plan(&state, keep_bucket) {
        println!("  • {}", item);
    }

    if !yes {
        println!();
        println!("{}", "Warning: these resources will be deleted permanently.".yellow());
        println!("Pass --yes to proceed");
        return Ok(());
    }

    println!();
    let ctx = context::build(
        &loaded.config.region,
        context::profile(profile, &loaded),
        &loaded.project_dir,
        context::timing(&loaded),
    )
    .await?;
    let request = RemoveRequest {
        app: app.clone(),
        environment: environment.clone(),
        keep_bucket,
    };
    let report = siteflow_cloud::remove(&ctx, &request)
        .await
        .with_context(|| format!("Failed to remove {}/{}", app, environment))?;

    println!();
    println!(
        "{} ({} resources deleted)",
        "✓ Removal complete".green().bold(),
        report.deleted.len()
    );
    if !report.state_deleted {
        println!("  State kept at {}", store.state_path(app, environment).display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_cloud::state::{CdnResource, CertificateResource, StorageResource};

    fn state() -> DeploymentState {
        let mut state = DeploymentState::new("blog", "prod");
        state.resources.s3 = Some(StorageResource {
            bucket_name: "blog-prod".into(),
            region: "us-east-1".into(),
            website_url: "http://blog-prod.s3-website-us-east-1.amazonaws.com".into(),
        });
        state.resources.cloudfront = Some(CdnResource {
            distribution_id: "E123".into(),
            domain_name: "d123.cloudfront.net".into(),
            distribution_url: "https://d123.cloudfront.net".into(),
            certificate_arn: None,
            aliases: Vec::new(),
            last_invalidation: None,
        });
        state
    }

    #[test]
    fn test_plan_order() {
        let plan = plan(&state(), false);
        assert_eq!(plan.len(), 2);
        assert!(plan[0].starts_with("distribution E123"));
        assert!(plan[1].starts_with("bucket blog-prod"));
    }

    #[test]
    fn test_plan_keeps_bucket_and_supplied_certificate() {
        let mut state = state();
        state.resources.acm = Some(CertificateResource {
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/x".into(),
            domain_name: "example.com".into(),
            validation_method: "DNS".into(),
            status: "ISSUED".into(),
            auto_created: false,
        });
        let plan = plan(&state, true);
        assert_eq!(plan, vec!["distribution E123 (d123.cloudfront.net)"]);
    }
}
