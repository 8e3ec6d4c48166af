use crate::context;
use anyhow::Context;
use colored::Colorize;

pub async fn handle(
    environment: Option<&str>,
    profile: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let loaded = context::load_config(environment)?;
    let (app, environment) = (&loaded.config.app, &loaded.environment);
    println!(
        "{}",
        format!("Recovering state for {}/{} from resource tags...", app, environment).blue()
    );

    let ctx = context::build(
        &loaded.config.region,
        context::profile(profile, &loaded),
        &loaded.project_dir,
        context::timing(&loaded),
    )
    .await?;

    let state = siteflow_cloud::recover_state(
        &ctx.store,
        &ctx.clients,
        app,
        environment,
        force,
        &ctx.timing.retry,
    )
    .await
    .with_context(|| format!("Failed to recover {}/{}", app, environment))?;

    let resources = &state.resources;
    if let Some(s3) = &resources.s3 {
        println!("  ✓ bucket       {}", s3.bucket_name.cyan());
    }
    if let Some(cdn) = &resources.cloudfront {
        println!("  ✓ distribution {} ({})", cdn.distribution_id.cyan(), cdn.domain_name);
    }
    if let Some(cert) = &resources.acm {
        println!("  ✓ certificate  {}", cert.certificate_arn.cyan());
    }
    if let Some(zone) = &resources.route53 {
        println!("  ✓ hosted zone  {} ({})", zone.hosted_zone_id.cyan(), zone.hosted_zone_name);
    }

    println!();
    println!(
        "{} {}",
        "✓ State saved to".green().bold(),
        ctx.store.state_path(app, environment).display()
    );
    println!("  The next deployment uploads every file again");
    Ok(())
}
