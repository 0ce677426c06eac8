use colored::Colorize;
use std::path::Path;

pub async fn handle(config: Option<&Path>, name: Option<&str>, kind: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let gateway = super::gateway(&config)?;

    let networks = gateway.list_networks(name, kind).await?;
    if networks.is_empty() {
        println!("{}", "No networks found".yellow());
        return Ok(());
    }

    println!("{:<8} {:<24} DESCRIPTION", "KEY", "NAME");
    for network in networks {
        println!(
            "{:<8} {:<24} {}",
            network.key,
            network.name.cyan(),
            network.description.unwrap_or_default()
        );
    }
    Ok(())
}
