pub mod backends;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fix;
pub mod health;
pub mod mount;
pub mod orchestrator;
pub mod paths;
pub mod platform;
pub mod probe;
pub mod registry;
pub mod run_file;
pub mod shares;
pub mod watcher;

pub use backends::Backends;
pub use config::{
    AutofixSettings, Config, ConfigStore, Intent, JsonConfigStore, Method, MountSpec,
    NetshareProtocol, NetshareSpec, RemoteFsType, RemoteMountSpec, Settings, ShareSpec,
    resolve_config_path,
};
pub use daemon::Daemon;
pub use error::{DynmountError, Result};
pub use fix::{AutoFixSupervisor, AutoFixer, FixLevel, FixMessage, SupervisorState};
pub use health::{ErrorKind, ErrorRecord, HealthChecker, ObjectKind, Strictness};
pub use orchestrator::{Core, MountOrchestrator, RemoteMountOrchestrator, SharedCore};
pub use registry::{DynHealth, DynMountRegistry, DynMountState};
pub use run_file::RunFile;
