pub mod check;
pub mod daemon;
pub mod fix;
pub mod list;
pub mod status;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use dynmount_core::{ConfigStore, DynHealth, JsonConfigStore};
use std::path::Path;

pub(crate) fn load_store(config: &Path) -> Result<JsonConfigStore> {
    JsonConfigStore::load(config)
        .with_context(|| format!("Failed to load configuration from {}", config.display()))
}

pub(crate) fn require_root(command: &str) -> Result<()> {
    if dynmount_core::platform::is_privileged() {
        Ok(())
    } else {
        anyhow::bail!("dynmount {command} must run as root")
    }
}

pub(crate) fn health_label(health: DynHealth) -> ColoredString {
    let label = health.to_string();
    match health {
        DynHealth::Online => label.green(),
        DynHealth::Auto => label.cyan(),
        DynHealth::Degraded | DynHealth::Unmounted => label.yellow(),
        DynHealth::Offline | DynHealth::Hostfail | DynHealth::Unavail => label.red(),
    }
}

/// Settings of the config document, or the built-in defaults when it cannot
/// be read.
pub(crate) fn settings_or_default(config: &Path) -> dynmount_core::Settings {
    match JsonConfigStore::load(config) {
        Ok(store) => store.settings().clone(),
        Err(e) => {
            tracing::debug!("Using default settings: {}", e);
            dynmount_core::Settings::default()
        }
    }
}
