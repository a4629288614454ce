use crate::config::{Method, RemoteMountSpec};
use crate::health::{ErrorKind, ErrorRecord, ObjectKind};
use crate::orchestrator::Core;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for FixLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixLevel::Info => write!(f, "INFO"),
            FixLevel::Warning => write!(f, "WARNING"),
            FixLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixMessage {
    pub number: usize,
    pub level: FixLevel,
    pub text: String,
}

impl std::fmt::Display for FixMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>3}. [{}] {}", self.number, self.level, self.text)
    }
}

/// Applies the remediation for each health problem, in order.
///
/// Never retries; a failed step is logged with a next step for a human and
/// the rest of the list still runs.
#[derive(Debug, Default)]
pub struct AutoFixer {
    messages: Vec<FixMessage>,
}

impl AutoFixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numbered log of everything the fixer did.
    pub fn messages(&self) -> &[FixMessage] {
        &self.messages
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == FixLevel::Error)
    }

    fn log(&mut self, level: FixLevel, text: String) {
        match level {
            FixLevel::Info => info!("{}", text),
            FixLevel::Warning => warn!("{}", text),
            FixLevel::Error => error!("{}", text),
        }
        self.messages.push(FixMessage {
            number: self.messages.len() + 1,
            level,
            text,
        });
    }

    /// Work through `errors`. Returns the number of successful remediations.
    pub async fn fix(&mut self, core: &mut Core, errors: &[ErrorRecord]) -> usize {
        let mut fixed = 0;
        let mut config_changed = false;

        for record in errors {
            match self.fix_one(core, record).await {
                Step::Fixed { config } => {
                    fixed += 1;
                    config_changed |= config;
                }
                Step::Skipped | Step::Failed => {}
            }
        }

        if config_changed {
            core.sync_registry().await;
        }
        fixed
    }

    async fn fix_one(&mut self, core: &mut Core, record: &ErrorRecord) -> Step {
        let name = record.name.as_str();
        match (record.object, record.kind) {
            (ObjectKind::Mount, ErrorKind::Unavailable | ErrorKind::Unhealthy) => {
                self.manual(record, "check the device or pool and repair it by hand")
            }
            (ObjectKind::Mount, ErrorKind::NotMountedAuto | ErrorKind::ReferencedNotMounted) => {
                self.mount_local(core, name).await
            }
            (ObjectKind::Mount, ErrorKind::NotMounted) => {
                let wanted = core
                    .intent()
                    .mount(name)
                    .is_some_and(|m| m.method == Method::Dynmount)
                    || core.intent().mount_is_referenced(name);
                if wanted {
                    self.mount_local(core, name).await
                } else {
                    self.left_alone(record)
                }
            }
            (
                ObjectKind::RemoteMount,
                ErrorKind::Unavailable | ErrorKind::Unhealthy | ErrorKind::HostUnreachable,
            ) => self.manual(
                record,
                "check the server, network and mount helper, then mount it by hand",
            ),
            (
                ObjectKind::RemoteMount,
                ErrorKind::NotMountedAuto | ErrorKind::ReferencedNotMounted,
            ) => self.mount_remote(core, name).await,
            (ObjectKind::RemoteMount, ErrorKind::NotMounted) => {
                let wanted = core
                    .intent()
                    .remote_mount(name)
                    .is_some_and(|r| r.method == Method::Dynmount)
                    || core.intent().mount_is_referenced(name);
                if wanted {
                    self.mount_remote(core, name).await
                } else {
                    self.left_alone(record)
                }
            }
            (ObjectKind::RemoteMount, ErrorKind::MissingNetdevOption) => {
                self.rewrite_remote(core, record, "added _netdev option", |spec| {
                    spec.options.push("_netdev".to_string());
                })
            }
            (ObjectKind::RemoteMount, ErrorKind::MissingCredentials) => {
                let (what, guest) = match core.intent().remote_mount(name) {
                    Some(spec) if spec.has_credentials() && spec.is_guest() => {
                        ("dropped guest option in favour of stored credentials", false)
                    }
                    _ => ("added guest option", true),
                };
                self.rewrite_remote(core, record, what, |spec| {
                    spec.options.retain(|o| o != "guest");
                    if guest {
                        spec.options.push("guest".to_string());
                    }
                })
            }
            (ObjectKind::Share, ErrorKind::DisabledButReferenced) => {
                self.enable_share(core, name).await
            }
            (ObjectKind::Share, ErrorKind::EnabledNotLinked | ErrorKind::ReferencedNotLinked) => {
                self.link_share(core, name).await
            }
            (ObjectKind::Share, ErrorKind::DisabledLinked) => match core.unlink_share(name).await {
                Ok(_) => {
                    self.log(FixLevel::Info, format!("Share {name}: removed link"));
                    Step::Fixed { config: false }
                }
                Err(e) => self.failed(
                    record,
                    &e.to_string(),
                    "remove the link under the shares root by hand",
                ),
            },
            (ObjectKind::Netshare, ErrorKind::Unavailable) => self.fix_netshare(core, name).await,
            _ => {
                self.log(
                    FixLevel::Warning,
                    format!("{record}: no automatic fix, left as is"),
                );
                Step::Skipped
            }
        }
    }

    fn manual(&mut self, record: &ErrorRecord, next_step: &str) -> Step {
        self.log(
            FixLevel::Warning,
            format!("{record}: cannot be fixed automatically; {next_step}"),
        );
        Step::Skipped
    }

    fn left_alone(&mut self, record: &ErrorRecord) -> Step {
        self.log(
            FixLevel::Info,
            format!("{record}: nothing depends on it, left unmounted"),
        );
        Step::Skipped
    }

    fn failed(&mut self, record: &ErrorRecord, reason: &str, next_step: &str) -> Step {
        self.log(
            FixLevel::Error,
            format!("{record}: fix failed ({reason}); {next_step}"),
        );
        Step::Failed
    }

    async fn mount_local(&mut self, core: &mut Core, name: &str) -> Step {
        match core.mount_configured(name).await {
            Ok(point) => {
                self.log(
                    FixLevel::Info,
                    format!("Mount {name}: mounted on {}", point.display()),
                );
                Step::Fixed { config: false }
            }
            Err(e) => {
                let record = ErrorRecord::new(ObjectKind::Mount, name, ErrorKind::NotMounted);
                self.failed(
                    &record,
                    &e.to_string(),
                    "check the device is attached and mount it by hand",
                )
            }
        }
    }

    async fn mount_remote(&mut self, core: &mut Core, name: &str) -> Step {
        match core.mount_remote(name).await {
            Ok(point) => {
                self.log(
                    FixLevel::Info,
                    format!("Remote mount {name}: mounted on {}", point.display()),
                );
                Step::Fixed { config: false }
            }
            Err(e) => {
                let record = ErrorRecord::new(ObjectKind::RemoteMount, name, ErrorKind::NotMounted);
                self.failed(
                    &record,
                    &e.to_string(),
                    "check the server and credentials and mount it by hand",
                )
            }
        }
    }

    fn rewrite_remote<F>(
        &mut self,
        core: &mut Core,
        record: &ErrorRecord,
        what: &str,
        change: F,
    ) -> Step
    where
        F: FnOnce(&mut RemoteMountSpec),
    {
        let name = record.name.as_str();
        if core.intent().remote_mount(name).is_none() {
            self.log(
                FixLevel::Warning,
                format!("Remote mount {name}: no longer configured"),
            );
            return Step::Skipped;
        }
        let result = core.update_intent(|intent| {
            if let Some(spec) = intent.remote_mount_mut(name) {
                change(spec);
            }
        });
        match result {
            Ok(()) => {
                self.log(FixLevel::Info, format!("Remote mount {name}: {what}"));
                Step::Fixed { config: true }
            }
            Err(e) => self.failed(record, &e.to_string(), "edit the configuration by hand"),
        }
    }

    async fn link_share(&mut self, core: &mut Core, name: &str) -> Step {
        match core.link_share(name).await {
            Ok(link) => {
                self.log(
                    FixLevel::Info,
                    format!("Share {name}: linked {}", link.display()),
                );
                Step::Fixed { config: false }
            }
            Err(e) => {
                let record = ErrorRecord::new(ObjectKind::Share, name, ErrorKind::EnabledNotLinked);
                self.failed(&record, &e.to_string(), "mount its source first")
            }
        }
    }

    /// Enable a share and link it. Only when its source is reachable.
    async fn enable_share(&mut self, core: &mut Core, name: &str) -> Step {
        let reachable = match core.share_target(name) {
            Some(target) => tokio::fs::try_exists(&target).await.unwrap_or(false),
            None => false,
        };
        if !reachable {
            let record = ErrorRecord::new(ObjectKind::Share, name, ErrorKind::DisabledButReferenced);
            return self.failed(
                &record,
                "source is not reachable",
                "mount its source, then enable the share",
            );
        }
        if let Err(e) = core.update_intent(|intent| {
            if let Some(share) = intent.share_mut(name) {
                share.enabled = true;
            }
        }) {
            let record = ErrorRecord::new(ObjectKind::Share, name, ErrorKind::DisabledButReferenced);
            return self.failed(&record, &e.to_string(), "enable the share by hand");
        }
        self.log(FixLevel::Info, format!("Share {name}: enabled"));
        match self.link_share(core, name).await {
            Step::Fixed { .. } | Step::Skipped => Step::Fixed { config: true },
            Step::Failed => Step::Failed,
        }
    }

    async fn fix_netshare(&mut self, core: &mut Core, name: &str) -> Step {
        let Some(share) = core.intent().netshares.get(name).map(|n| n.share.clone()) else {
            self.log(FixLevel::Warning, format!("Netshare {name}: no longer configured"));
            return Step::Skipped;
        };

        if core.intent().share(&share).is_none() {
            return match core.update_intent(|intent| {
                intent.remove_netshare(name);
            }) {
                Ok(()) => {
                    self.log(
                        FixLevel::Info,
                        format!("Netshare {name}: share {share} no longer exists, removed netshare"),
                    );
                    Step::Fixed { config: true }
                }
                Err(e) => {
                    let record = ErrorRecord::new(ObjectKind::Netshare, name, ErrorKind::Unavailable);
                    self.failed(&record, &e.to_string(), "remove the netshare by hand")
                }
            };
        }

        if core.intent().share(&share).is_some_and(|s| s.enabled) {
            // An earlier step may already have brought the source back.
            return self.link_share(core, &share).await;
        }
        self.enable_share(core, &share).await
    }
}

enum Step {
    Fixed { config: bool },
    Skipped,
    Failed,
}
