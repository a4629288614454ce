use super::AutoFixer;
use crate::config::AutofixSettings;
use crate::health::{ErrorRecord, Strictness};
use crate::orchestrator::{Core, MountOrchestrator, RemoteMountOrchestrator, SharedCore};
use crate::platform::common::SHUTDOWN_JOIN_TIMEOUT;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Scheduled,
    Running,
    Terminated,
}

/// Fix attempts left before the supervisor stops fixing.
///
/// A bounded budget pins once a run converges or the attempts run out; from
/// then on sweeps are light and only report. An unlimited budget never pins.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    enabled: bool,
    /// `None` means unlimited.
    limit: Option<u32>,
    spent: u32,
    pinned: bool,
}

impl RetryBudget {
    pub fn new(settings: &AutofixSettings) -> Self {
        Self {
            enabled: settings.enabled,
            limit: (settings.retries > 0).then_some(settings.retries),
            spent: 0,
            pinned: false,
        }
    }

    pub fn available(&self) -> bool {
        self.enabled && !self.pinned && self.limit.is_none_or(|limit| self.spent < limit)
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    fn spend(&mut self) {
        self.spent = self.spent.saturating_add(1);
    }

    fn pin(&mut self) {
        if self.limit.is_some() {
            self.pinned = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing left to fix.
    Converged,
    /// Problems remain and budget is left; try again.
    Retrying(Vec<ErrorRecord>),
    /// Problems remain and fixing is over; only reported from now on.
    Exhausted(Vec<ErrorRecord>),
}

/// One sweep: check, fix what the budget allows, check again.
pub async fn run_once(core: &mut Core, budget: &mut RetryBudget) -> RunOutcome {
    let strictness = if budget.available() {
        Strictness::Full
    } else {
        Strictness::Light
    };
    let errors = core.checker().check(strictness).await;
    if errors.is_empty() {
        budget.pin();
        return RunOutcome::Converged;
    }

    if !budget.available() {
        debug!("{} problem(s) reported, not fixing", errors.len());
        return RunOutcome::Exhausted(errors);
    }

    budget.spend();
    info!(
        "Fixing {} problem(s), attempt {}",
        errors.len(),
        budget.spent()
    );
    let mut fixer = AutoFixer::new();
    fixer.fix(core, &errors).await;

    let remaining = core.checker().check(strictness).await;
    if remaining.is_empty() {
        budget.pin();
        RunOutcome::Converged
    } else if budget.available() {
        RunOutcome::Retrying(remaining)
    } else {
        warn!(
            "Giving up after {} attempt(s); {} problem(s) remain",
            budget.spent(),
            remaining.len()
        );
        budget.pin();
        RunOutcome::Exhausted(remaining)
    }
}

/// Periodic reload, check and fix loop.
pub struct AutoFixSupervisor {
    state: watch::Receiver<SupervisorState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AutoFixSupervisor {
    pub fn start(
        core: SharedCore,
        local: Arc<MountOrchestrator>,
        remote: Arc<RemoteMountOrchestrator>,
        settings: AutofixSettings,
    ) -> Self {
        let (state_tx, state) = watch::channel(SupervisorState::Idle);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            core,
            local,
            remote,
            settings,
            state_tx,
            cancel.clone(),
        ));
        Self {
            state,
            cancel,
            task: Some(task),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Cancel any pending run and wait for a running one to finish.
    pub async fn terminate(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Auto-fix supervisor stopped"),
                Ok(Err(e)) => warn!("Auto-fix supervisor panicked: {}", e),
                Err(_) => warn!("Auto-fix supervisor did not stop in time"),
            }
        }
    }
}

impl Drop for AutoFixSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise(
    core: SharedCore,
    local: Arc<MountOrchestrator>,
    remote: Arc<RemoteMountOrchestrator>,
    settings: AutofixSettings,
    state: watch::Sender<SupervisorState>,
    cancel: CancellationToken,
) {
    let mut budget = RetryBudget::new(&settings);
    let mut delay = settings.first_run_delay();

    loop {
        state.send_replace(SupervisorState::Scheduled);
        if !sleep_or_cancel(delay, &cancel).await {
            break;
        }

        state.send_replace(SupervisorState::Running);
        let outcome = {
            let mut core = core.lock().await;
            if let Err(e) = core.reload().await {
                warn!("Keeping previous configuration: {}", e);
            }
            local.update_list(core.intent().monitored_pools());
            remote.update_url_list(core.intent().monitored_urls());
            run_once(&mut core, &mut budget).await
        };

        delay = match outcome {
            RunOutcome::Retrying(_) if settings.retries > 0 => settings.retry_interval(),
            _ => settings.interval(),
        };
        state.send_replace(SupervisorState::Idle);
        if cancel.is_cancelled() {
            break;
        }
    }

    state.send_replace(SupervisorState::Terminated);
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
