use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::Colorize;
use dynmount_core::RunFile;
use std::path::Path;

/// Print the registry snapshot the daemon keeps in its run file.
pub fn execute(config: &Path, json: bool) -> Result<bool> {
    let settings = super::settings_or_default(config);
    let path = &settings.run_file;

    let Some(states) = RunFile::read(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?
    else {
        if json {
            println!("[]");
        } else {
            println!("{}", "Daemon not running".dimmed());
        }
        return Ok(true);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(true);
    }

    if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
        let at: DateTime<Local> = modified.into();
        println!(
            "{} {}",
            "Dynamic mounts".bold(),
            format!("(as of {})", at.format("%Y-%m-%d %H:%M:%S")).dimmed()
        );
    } else {
        println!("{}", "Dynamic mounts".bold());
    }

    if states.is_empty() {
        println!("  {}", "none".dimmed());
        return Ok(true);
    }
    for state in &states {
        println!(
            "  {:<20} {:<10} {}",
            state.name,
            super::health_label(state.health),
            state.mountpoint.display()
        );
        for (share, enabled) in state.references.iter().zip(&state.references_enabled) {
            let marker = if *enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            println!("      share {share} [{marker}]");
        }
    }
    Ok(true)
}
