use anyhow::Result;
use colored::Colorize;
use dynmount_core::{ConfigStore, Method};
use std::path::Path;

fn method_label(method: Method) -> colored::ColoredString {
    let label = method.to_string();
    match method {
        Method::Disabled => label.dimmed(),
        Method::Startup => label.normal(),
        Method::Auto => label.cyan(),
        Method::Dynmount => label.green(),
    }
}

fn enabled_label(enabled: bool) -> colored::ColoredString {
    if enabled {
        "enabled".green()
    } else {
        "disabled".dimmed()
    }
}

pub fn execute(config: &Path) -> Result<bool> {
    let store = super::load_store(config)?;
    let intent = store.intent();

    if intent.mounts.is_empty()
        && intent.remote_mounts.is_empty()
        && intent.shares.is_empty()
        && intent.netshares.is_empty()
    {
        println!("Nothing configured in {}", config.display());
        return Ok(true);
    }

    if !intent.mounts.is_empty() {
        println!("{}", "Mounts:".bold());
        for (name, spec) in &intent.mounts {
            let identity = match (&spec.uuid, &spec.label) {
                (Some(uuid), _) if spec.zfs => format!("pool {uuid}"),
                (Some(uuid), _) => format!("UUID={uuid}"),
                (None, Some(label)) => format!("LABEL={label}"),
                (None, None) => "-".to_string(),
            };
            let point = spec.mountpoint.clone().unwrap_or_else(|| {
                store.settings().default_mountpoint(name)
            });
            println!(
                "  {:<20} {:<10} {} → {}",
                name.cyan(),
                method_label(spec.method),
                identity,
                point.display()
            );
        }
        println!();
    }

    if !intent.remote_mounts.is_empty() {
        println!("{}", "Remote mounts:".bold());
        for (name, spec) in &intent.remote_mounts {
            println!(
                "  {:<20} {:<10} {} [{}]",
                name.cyan(),
                method_label(spec.method),
                spec.url(),
                spec.fstype
            );
        }
        println!();
    }

    if !intent.shares.is_empty() {
        println!("{}", "Shares:".bold());
        for (name, spec) in &intent.shares {
            println!(
                "  {:<20} {:<10} {}/{}",
                name.cyan(),
                enabled_label(spec.enabled),
                spec.mount,
                spec.folder.display()
            );
        }
        println!();
    }

    if !intent.netshares.is_empty() {
        println!("{}", "Netshares:".bold());
        for (name, spec) in &intent.netshares {
            println!(
                "  {:<20} {:<10} {} via {}",
                name.cyan(),
                enabled_label(spec.enabled),
                spec.share,
                spec.protocol
            );
        }
    }
    Ok(true)
}
