use crate::context;
use colored::Colorize;
use siteflow_cloud::{DiscoveredResource, RetryConfig, Timing};

const DEFAULT_REGION: &str = "us-east-1";

fn print_resource(resource: &DiscoveredResource) {
    let owner = match (resource.app(), resource.environment()) {
        (Some(app), Some(env)) => format!("{}/{}", app, env),
        _ => "-".to_string(),
    };
    let mut detail = resource.name.clone();
    if let Some(status) = &resource.status {
        detail.push_str(&format!(" [{}]", status));
    }
    if !resource.aliases.is_empty() {
        detail.push_str(&format!(" ({})", resource.aliases.join(", ")));
    }
    println!(
        "  {} {:<12} {:<40} {}",
        format!("{:<20}", owner).cyan(),
        resource.kind.to_string(),
        resource.id,
        detail
    );
}

pub async fn handle(
    environment: Option<&str>,
    profile: Option<&str>,
    all: bool,
) -> anyhow::Result<()> {
    let found = siteflow_config::find_config_file()
        .ok()
        .map(|path| siteflow_config::load_config(&path).map(|config| (path, config)))
        .transpose()?;

    let retry = RetryConfig::default();
    match found {
        Some((path, config)) if !all => {
            let environment = config.resolve_environment(environment)?;
            let project_dir = siteflow_config::project_dir(&path)?;
            let ctx = context::build(
                &config.region,
                profile.or(config.profile.as_deref()),
                &project_dir,
                Timing::default(),
            )
            .await?;
            println!(
                "{}",
                format!("Resources tagged for {}/{}:", config.app, environment).bold()
            );
            let set =
                siteflow_cloud::discover_for_app_env(&ctx.clients, &config.app, &environment, &retry)
                    .await?;
            if set.is_empty() {
                println!("  {}", "none".dimmed());
            }
            for resource in set.resources() {
                print_resource(resource);
            }
        }
        found => {
            let (region, config_profile) = match &found {
                Some((_, config)) => (config.region.clone(), config.profile.clone()),
                None => (DEFAULT_REGION.to_string(), None),
            };
            let ctx = context::build(
                &region,
                profile.or(config_profile.as_deref()),
                &context::project_dir()?,
                Timing::default(),
            )
            .await?;
            println!("{}", "Resources managed by siteflow:".bold());
            let resources = siteflow_cloud::discover_all(&ctx.clients, &retry).await?;
            if resources.is_empty() {
                println!("  {}", "none".dimmed());
            }
            for resource in &resources {
                print_resource(resource);
            }
        }
    }
    Ok(())
}
