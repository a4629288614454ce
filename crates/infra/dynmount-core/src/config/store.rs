use super::settings::Settings;
use super::types::{Config, Intent};
use super::validation;
use crate::error::{DynmountError, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the config document.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dynmount/dynmount.json";

/// Access to the persisted intent. Only the intent is writable; settings are
/// fixed for the lifetime of a loaded store.
pub trait ConfigStore: Send + Sync {
    fn settings(&self) -> &Settings;
    fn intent(&self) -> &Intent;
    fn intent_mut(&mut self) -> &mut Intent;
    /// Persist the current intent.
    fn save(&mut self) -> Result<()>;
    /// Re-read the intent from the backing store.
    fn reload(&mut self) -> Result<()>;
}

/// Resolve the config path from an explicit flag, `DYNMOUNT_CONFIG`, or the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env_trimmed("DYNMOUNT_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// JSON file backed store.
pub struct JsonConfigStore {
    path: PathBuf,
    /// Exactly what is on disk; env overrides never leak into saves.
    config: Config,
    settings: Settings,
}

impl JsonConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = read_config(&path)?;
        let mut settings = config.settings.clone();
        apply_env_overrides(&mut settings);
        Ok(Self {
            path,
            config,
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup(&self) -> Result<()> {
        if self.path.exists() {
            let backup_path = self.path.with_extension("json.bak");
            fs::copy(&self.path, backup_path)?;
            debug!("Created config backup");
        }
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn intent(&self) -> &Intent {
        &self.config.intent
    }

    fn intent_mut(&mut self) -> &mut Intent {
        &mut self.config.intent
    }

    fn save(&mut self) -> Result<()> {
        validation::validate(&self.config)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.backup()?;

        debug!("Saving config to {:?}", self.path);
        let json = serde_json::to_string_pretty(&self.config)?;
        let af = AtomicFile::new(&self.path, AllowOverwrite);
        af.write(|f| f.write_all(json.as_bytes()))
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        let config = read_config(&self.path)?;
        self.config.intent = config.intent;
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(DynmountError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }

    debug!("Loading config from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        DynmountError::ConfigInvalid {
            message: format!("{}: {e}", path.display()),
        }
    })?;
    validation::validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Some(v) = env_trimmed("DYNMOUNT_RUN_FILE") {
        settings.run_file = PathBuf::from(v);
    }
    if let Some(v) = env_trimmed("DYNMOUNT_SHARES_ROOT") {
        settings.shares_root = PathBuf::from(v);
    }
    if let Some(v) = env_trimmed("DYNMOUNT_AUTOFIX_RETRIES") {
        match v.parse() {
            Ok(n) => settings.autofix.retries = n,
            Err(_) => tracing::warn!("Ignoring invalid DYNMOUNT_AUTOFIX_RETRIES={}", v),
        }
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryConfigStore {
    pub settings: Settings,
    pub intent: Intent,
    pub saves: usize,
}

#[cfg(test)]
impl ConfigStore for MemoryConfigStore {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn intent(&self) -> &Intent {
        &self.intent
    }

    fn intent_mut(&mut self) -> &mut Intent {
        &mut self.intent
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}
