use colored::Colorize;
use std::path::Path;

pub fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    eprintln!("{}", "Validating build file...".blue());

    let config = match super::load_config(config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Build file error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Build file is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  cluster: {}", config.connection.endpoint.cyan());
    println!(
        "  vm: {} ({} cores, {} MB)",
        config.vm.name.cyan(),
        config.vm.cpu_cores,
        config.vm.ram
    );
    println!("  disks: {}", config.vm.disks.len());
    for disk in &config.vm.disks {
        let size = disk
            .size_gb
            .map(|gb| format!("{} GB", gb))
            .unwrap_or_else(|| "(source size)".to_string());
        println!("    - {} [{}] {}", disk.name.cyan(), disk.media, size);
    }
    println!("  nics: {}", config.vm.nics.len());
    for nic in &config.vm.nics {
        let vnet = nic
            .vnet
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        println!("    - {} (vnet {})", nic.name.cyan(), vnet);
    }
    if !config.vm.cloud_init_files.is_empty() {
        println!("  cloud-init files: {}", config.vm.cloud_init_files.len());
        for file in &config.vm.cloud_init_files {
            println!("    - {} ({} bytes)", file.name.cyan(), file.contents.len());
        }
    }
    let communicator = if config.uses_ssh() { "ssh" } else { "none" };
    println!("  communicator: {}", communicator);
    println!("  provision commands: {}", config.provision.len());

    if !config.warnings.is_empty() {
        println!();
        for warning in &config.warnings {
            println!("{} {}", "⚠".yellow(), warning.yellow());
        }
    }

    Ok(())
}
