use crate::context;
use colored::Colorize;
use siteflow_cloud::LiveStatus;

fn render(live: &LiveStatus) -> String {
    match live {
        LiveStatus::Present(_) => live.to_string().green().to_string(),
        LiveStatus::Missing => live.to_string().red().to_string(),
        LiveStatus::Unknown(_) => live.to_string().yellow().to_string(),
    }
}

pub async fn handle(environment: Option<&str>, profile: Option<&str>) -> anyhow::Result<()> {
    let loaded = context::load_config(environment)?;
    let (app, environment) = (&loaded.config.app, &loaded.environment);

    let ctx = context::build(
        &loaded.config.region,
        context::profile(profile, &loaded),
        &loaded.project_dir,
        context::timing(&loaded),
    )
    .await?;

    let Some(report) = siteflow_cloud::status(&ctx, app, environment).await? else {
        println!(
            "{}",
            format!("No deployment recorded for {}/{}", app, environment).yellow()
        );
        println!("Run `siteflow deploy` or `siteflow recover` first");
        return Ok(());
    };

    let state = &report.state;
    println!();
    println!("{}", format!("{}/{}", state.app, state.environment).bold());
    println!(
        "  Last deployed: {}",
        state.last_deployed.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Tracked files: {}", state.files.len());
    if let Some(cdn) = &state.resources.cloudfront {
        println!("  URL:           {}", cdn.distribution_url.cyan());
        if let Some(at) = cdn.last_invalidation {
            println!("  Invalidated:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    } else if let Some(s3) = &state.resources.s3 {
        println!(
            "  Endpoint:      {} {}",
            s3.website_url,
            "(private bucket; not publicly served)".dimmed()
        );
    }

    println!();
    for resource in &report.resources {
        println!(
            "  {:<13} {:<40} {}",
            resource.kind,
            resource.id,
            render(&resource.live)
        );
    }
    if report
        .resources
        .iter()
        .any(|r| r.live == LiveStatus::Missing)
    {
        println!();
        println!(
            "{}",
            "Some recorded resources no longer exist; `siteflow deploy` recreates the bucket, `siteflow recover --force` rebuilds the record".yellow()
        );
    }
    Ok(())
}
