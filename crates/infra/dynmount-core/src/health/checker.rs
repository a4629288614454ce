use super::{ErrorKind, ErrorRecord, ObjectKind, Strictness};
use crate::backends::Backends;
use crate::config::{Intent, Method, MountSpec, RemoteMountSpec, Settings};
use crate::error::Result;
use crate::paths;
use crate::probe::host_of_url;
use crate::shares;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Compares live state against intent. Never mutates either.
///
/// Callers serialise sweeps through the core lock; the checker itself does
/// not lock, so a one-shot command-line sweep can run without a daemon.
pub struct HealthChecker<'a> {
    settings: &'a Settings,
    intent: &'a Intent,
    backends: &'a Backends,
}

/// Not-mounted classification shared by local and remote mounts.
fn not_mounted_kind(
    auto_expected: bool,
    method: Method,
    referenced: bool,
    strictness: Strictness,
) -> Option<ErrorKind> {
    let full = strictness == Strictness::Full;
    if auto_expected && full {
        Some(ErrorKind::NotMountedAuto)
    } else if referenced {
        Some(ErrorKind::ReferencedNotMounted)
    } else if full && method != Method::Auto {
        Some(ErrorKind::NotMounted)
    } else {
        None
    }
}

impl<'a> HealthChecker<'a> {
    pub fn new(settings: &'a Settings, intent: &'a Intent, backends: &'a Backends) -> Self {
        Self {
            settings,
            intent,
            backends,
        }
    }

    /// One sweep in configuration order: mounts, remote mounts, shares,
    /// netshares. A malformed entry is logged and skipped.
    pub async fn check(&self, strictness: Strictness) -> Vec<ErrorRecord> {
        let mut errors = Vec::new();

        for (name, spec) in &self.intent.mounts {
            if let Err(e) = self.check_mount(name, spec, strictness, &mut errors).await {
                warn!("Skipping health check of mount {}: {}", name, e);
            }
        }
        for (name, spec) in &self.intent.remote_mounts {
            if let Err(e) = self
                .check_remote_mount(name, spec, strictness, &mut errors)
                .await
            {
                warn!("Skipping health check of remote mount {}: {}", name, e);
            }
        }
        let available_shares = self.check_shares(&mut errors).await;
        self.check_netshares(&available_shares, &mut errors);

        for record in &errors {
            warn!(
                object = %record.object,
                name = %record.name,
                kind = %record.kind,
                "Health problem"
            );
        }
        debug!("Health sweep found {} problems", errors.len());
        errors
    }

    async fn check_mount(
        &self,
        name: &str,
        spec: &MountSpec,
        strictness: Strictness,
        errors: &mut Vec<ErrorRecord>,
    ) -> Result<()> {
        if spec.method == Method::Disabled {
            return Ok(());
        }
        let dynamic = spec.method.is_dynamic();
        let referenced = self.intent.mount_is_referenced(name);
        let mut push = |kind| errors.push(ErrorRecord::new(ObjectKind::Mount, name, kind));

        let mounted = if let Some(pool) = spec.pool() {
            let Some(health) = self.backends.zfs.pool_health(pool).await? else {
                if !dynamic {
                    push(ErrorKind::Unavailable);
                }
                return Ok(());
            };
            if health != "ONLINE" {
                push(ErrorKind::Unhealthy);
            }
            self.backends.zfs.is_mounted(pool).await?
        } else {
            let device = self
                .backends
                .devices
                .find_device(spec.uuid.as_deref(), spec.label.as_deref())
                .await;
            if device.is_none() {
                if !dynamic {
                    push(ErrorKind::Unavailable);
                }
                return Ok(());
            }
            let point = paths::mount_point(self.settings, &self.backends.fstab, name, spec);
            self.backends.mounter.is_mounted(&point).await?
        };

        if !mounted
            && let Some(kind) =
                not_mounted_kind(spec.auto_mount_expected(), spec.method, referenced, strictness)
        {
            push(kind);
        }
        Ok(())
    }

    async fn check_remote_mount(
        &self,
        name: &str,
        spec: &RemoteMountSpec,
        strictness: Strictness,
        errors: &mut Vec<ErrorRecord>,
    ) -> Result<()> {
        if spec.method == Method::Disabled {
            return Ok(());
        }
        let referenced = self.intent.mount_is_referenced(name);
        let mut push = |kind| errors.push(ErrorRecord::new(ObjectKind::RemoteMount, name, kind));

        if !self.backends.tools.available(spec.fstype.helper()) {
            push(ErrorKind::Unavailable);
        } else {
            let point = paths::remote_mount_point(self.settings, &self.backends.fstab, name, spec);
            if !self.backends.mounter.is_mounted(&point).await? {
                let reachable = match host_of_url(&spec.url()) {
                    Some(host) => {
                        self.backends
                            .hosts
                            .ping(&host, self.settings.ping_timeout())
                            .await
                    }
                    None => false,
                };
                if !reachable {
                    // An absent host is normal for dynamic entries nobody needs
                    if !spec.method.is_dynamic() || referenced {
                        push(ErrorKind::HostUnreachable);
                    }
                } else if let Some(kind) = not_mounted_kind(
                    spec.auto_mount_expected(),
                    spec.method,
                    referenced,
                    strictness,
                ) {
                    push(kind);
                }
            }
        }

        if !spec.has_option("_netdev") {
            push(ErrorKind::MissingNetdevOption);
        }
        if spec.fstype.uses_credentials() && spec.is_guest() == spec.has_credentials() {
            push(ErrorKind::MissingCredentials);
        }
        Ok(())
    }

    /// Returns the names of shares that are enabled and sourced.
    async fn check_shares(&self, errors: &mut Vec<ErrorRecord>) -> BTreeSet<String> {
        let mut available = BTreeSet::new();
        for (name, spec) in &self.intent.shares {
            let mut push = |kind| errors.push(ErrorRecord::new(ObjectKind::Share, name, kind));
            let target = paths::share_target(self.settings, &self.backends.fstab, self.intent, name);
            let sourced = match &target {
                Some(t) => tokio::fs::try_exists(t).await.unwrap_or(false),
                None => false,
            };
            let link = self.settings.share_link(name);
            let referenced = self.intent.share_is_referenced(name);

            if spec.enabled {
                let Some(target) = target.filter(|_| sourced) else {
                    push(ErrorKind::Unavailable);
                    continue;
                };
                available.insert(name.clone());
                if !shares::is_linked(&link, &target).await {
                    push(if referenced {
                        ErrorKind::ReferencedNotLinked
                    } else {
                        ErrorKind::EnabledNotLinked
                    });
                }
            } else {
                if shares::link_exists(&link).await {
                    push(ErrorKind::DisabledLinked);
                }
                if referenced {
                    push(ErrorKind::DisabledButReferenced);
                }
            }
        }
        available
    }

    fn check_netshares(&self, available_shares: &BTreeSet<String>, errors: &mut Vec<ErrorRecord>) {
        for (name, spec) in &self.intent.netshares {
            if spec.enabled && !available_shares.contains(&spec.share) {
                errors.push(ErrorRecord::new(
                    ObjectKind::Netshare,
                    name,
                    ErrorKind::Unavailable,
                ));
            }
        }
    }
}
