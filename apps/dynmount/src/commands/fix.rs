use anyhow::Result;
use colored::Colorize;
use dynmount_core::{AutoFixer, Backends, ConfigStore, Core, FixLevel, Strictness};
use std::path::Path;

/// Check, fix and check again. Returns `false` when problems remain.
pub async fn execute(config: &Path) -> Result<bool> {
    super::require_root("fix")?;

    let store = super::load_store(config)?;
    let backends = Backends::system(store.settings(), store.intent());
    let mut core = Core::new(Box::new(store), backends);
    core.sync_registry().await;

    let errors = core.checker().check(Strictness::Full).await;
    if errors.is_empty() {
        println!("{}", "No problems found".green());
        return Ok(true);
    }

    let mut fixer = AutoFixer::new();
    let fixed = fixer.fix(&mut core, &errors).await;
    for message in fixer.messages() {
        let line = message.to_string();
        match message.level {
            FixLevel::Info => println!("{line}"),
            FixLevel::Warning => println!("{}", line.yellow()),
            FixLevel::Error => println!("{}", line.red()),
        }
    }
    println!(
        "{}",
        format!("Fixed {fixed} of {} problem(s)", errors.len()).bold()
    );

    let remaining = core.checker().check(Strictness::Full).await;
    if !remaining.is_empty() {
        println!("{}", "Still failing:".bold());
        for record in &remaining {
            println!("  {} {}", "✗".red(), record);
        }
    }
    Ok(remaining.is_empty())
}
