use colored::Colorize;
use std::path::Path;

pub async fn handle(config: Option<&Path>, name: Option<&str>, snapshots: bool) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let gateway = super::gateway(&config)?;

    let vms = gateway.list_vms(name, snapshots).await?;
    if vms.is_empty() {
        println!("{}", "No VMs found".yellow());
        return Ok(());
    }

    println!("{:<8} {:<24} {:>5} {:>8}  SNAPSHOT", "KEY", "NAME", "CPU", "RAM(MB)");
    for vm in vms {
        let cpu = vm.cpu_cores.map(|c| c.to_string()).unwrap_or_default();
        let ram = vm.ram.map(|r| r.to_string()).unwrap_or_default();
        let snapshot = if vm.is_snapshot { "yes" } else { "" };
        println!(
            "{:<8} {:<24} {:>5} {:>8}  {}",
            vm.key,
            vm.name.cyan(),
            cpu,
            ram,
            snapshot
        );
    }
    Ok(())
}
