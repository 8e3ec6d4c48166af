use crate::context::{self, DeployFlags};
use anyhow::Context;
use colored::Colorize;
use std::time::Instant;

pub async fn handle(
    environment: Option<&str>,
    profile: Option<&str>,
    flags: &DeployFlags,
) -> anyhow::Result<()> {
    println!("{}", "Starting deployment...".blue().bold());
    let loaded = context::load_config(environment)?;
    let request = context::deploy_request(&loaded, flags)?;

    println!("  App:    {}", request.app.cyan());
    println!("  Bucket: {} ({})", request.bucket.cyan(), request.region);
    println!("  Source: {}", request.source.display());
    if let Some(domain) = request.cdn.as_ref().and_then(|c| c.custom_domain.as_ref()) {
        println!("  Domain: {}", domain.all_names().join(", ").cyan());
    }
    println!();

    let ctx = context::build(
        &request.region,
        context::profile(profile, &loaded),
        &loaded.project_dir,
        context::timing(&loaded),
    )
    .await?;

    let started = Instant::now();
    let report = siteflow_cloud::deploy(&ctx, &request)
        .await
        .with_context(|| format!("Deployment of {}/{} failed", request.app, request.environment))?;

    println!();
    println!(
        "{} in {:.1}s",
        "✓ Deployment complete".green().bold(),
        started.elapsed().as_secs_f64()
    );
    println!("  {}", report.changes);
    if report.upload.uploaded > 0 {
        println!(
            "  Uploaded {} files ({} bytes, {} compressed)",
            report.upload.uploaded, report.upload.bytes, report.upload.compressed
        );
    }
    if report.deleted > 0 {
        println!("  Deleted {} objects", report.deleted);
    }
    for failure in &report.delete_failures {
        println!("  {} {}", "⚠".yellow(), failure);
    }
    if let Some(id) = &report.distribution_id {
        println!("  Distribution: {}", id);
    }
    if report.deployed == Some(false) {
        println!(
            "  {}",
            "Distribution is still propagating; changes may take a few minutes to appear".yellow()
        );
    }
    println!();
    match &report.url {
        Some(url) => println!("  🌐 {}", url.cyan().bold()),
        None => println!(
            "  {}",
            format!(
                "Uploaded to private bucket {}; enable `cloudfront` to serve it publicly",
                report.bucket
            )
            .yellow()
        ),
    }

    Ok(())
}
