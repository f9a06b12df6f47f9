//! `--check`: validate configuration and host tooling without serving

use std::time::Duration;

use colored::Colorize;

use crate::deploy::command::{CommandRunner, CommandSpec, ProcessRunner};
use crate::registry::Registry;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

const REQUIRED_TOOLS: [&str; 3] = ["git", "systemctl", "journalctl"];

/// Print a report; returns whether everything passed
pub async fn run_check(layout: &StorageLayout, settings: &Settings) -> bool {
    let mut ok = true;

    println!("{}", "app-deployer configuration check".bold());
    println!("  base directory: {}", layout.base_dir.display());

    match settings.validate() {
        Ok(()) => println!("  {} settings", "ok".green()),
        Err(e) => {
            ok = false;
            println!("  {} settings: {}", "error".red(), e);
        }
    }

    let workspaces_dir = settings
        .workspaces_dir
        .clone()
        .unwrap_or_else(|| layout.workspaces_dir());
    match Registry::load(&layout.applications_file(), &workspaces_dir).await {
        Ok(registry) => {
            println!(
                "  {} {} application(s) in {}",
                "ok".green(),
                registry.len(),
                layout.applications_file().path().display()
            );
            for app in registry.summaries() {
                println!(
                    "      {} -> {} ({})",
                    app.name.cyan(),
                    app.deploy_path.display(),
                    app.service_name
                );
            }
        }
        Err(e) => {
            ok = false;
            println!("  {} applications: {}", "error".red(), e);
        }
    }

    let runner = ProcessRunner::default();
    for tool in REQUIRED_TOOLS {
        let cmd = CommandSpec::new(tool, ["--version"]).timeout(Duration::from_secs(10));
        match runner.run(&cmd).await {
            Ok(outcome) if outcome.success() => {
                let version = outcome.stdout.lines().next().unwrap_or("").trim().to_string();
                println!("  {} {} {}", "ok".green(), tool, version.dimmed());
            }
            Ok(outcome) => {
                ok = false;
                println!(
                    "  {} {} exited with {:?}",
                    "error".red(),
                    tool,
                    outcome.exit_code
                );
            }
            Err(e) => {
                ok = false;
                println!("  {} {}: {}", "missing".red(), tool, e);
            }
        }
    }

    if ok {
        println!("{}", "All checks passed".green().bold());
    } else {
        println!("{}", "Some checks failed".red().bold());
    }
    ok
}
