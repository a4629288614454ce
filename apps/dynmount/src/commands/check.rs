use anyhow::Result;
use colored::Colorize;
use dynmount_core::{Backends, ConfigStore, HealthChecker, Strictness};
use std::path::Path;

/// One-shot health sweep. Returns `false` when problems were found.
pub async fn execute(config: &Path, json: bool, light: bool) -> Result<bool> {
    let store = super::load_store(config)?;
    let backends = Backends::system(store.settings(), store.intent());
    let strictness = if light {
        Strictness::Light
    } else {
        Strictness::Full
    };

    let errors = HealthChecker::new(store.settings(), store.intent(), &backends)
        .check(strictness)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&errors)?);
    } else if errors.is_empty() {
        println!("{}", "No problems found".green());
    } else {
        println!("{}", format!("{} problem(s) found:", errors.len()).bold());
        for record in &errors {
            println!("  {} {}", "✗".red(), record);
        }
    }
    Ok(errors.is_empty())
}
