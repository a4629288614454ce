//! Remediation of health problems and the supervisor that schedules it.

mod fixer;
mod supervisor;

pub use fixer::{AutoFixer, FixLevel, FixMessage};
pub use supervisor::{AutoFixSupervisor, RetryBudget, RunOutcome, SupervisorState, run_once};
