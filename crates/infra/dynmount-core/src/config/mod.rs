mod settings;
mod store;
mod types;
pub mod validation;

pub use settings::{AutofixSettings, Settings};
#[cfg(test)]
pub use store::MemoryConfigStore;
pub use store::{ConfigStore, DEFAULT_CONFIG_PATH, JsonConfigStore, resolve_config_path};
pub use types::{
    Config, Intent, Method, MountSpec, NetshareProtocol, NetshareSpec, RemoteFsType,
    RemoteMountSpec, ShareSpec,
};
