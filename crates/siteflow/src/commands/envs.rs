use crate::context;
use colored::Colorize;
use siteflow_cloud::StateStore;

pub async fn handle() -> anyhow::Result<()> {
    let store = StateStore::new(context::project_dir()?);
    let environments = store.list_environments().await?;

    if environments.is_empty() {
        println!("{}", "No deployments recorded".yellow());
        return Ok(());
    }

    println!("{}", "Recorded environments:".bold());
    for env in environments {
        match store.load(&env.app, &env.environment).await {
            Ok(Some(state)) => {
                let url = state
                    .resources
                    .cloudfront
                    .as_ref()
                    .map(|c| c.distribution_url.clone())
                    .unwrap_or_else(|| "(storage only)".to_string());
                println!(
                    "  • {}/{}  {}  {}",
                    env.app.cyan(),
                    env.environment.cyan(),
                    state.last_deployed.format("%Y-%m-%d %H:%M"),
                    url
                );
            }
            Ok(None) => {}
            Err(e) => println!("  • {}/{}  {}", env.app, env.environment, e.to_string().red()),
        }
    }
    Ok(())
}
