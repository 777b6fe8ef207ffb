//! Reconciliation steps and the policy-driven step runner.
//!
//! Each step is an idempotent, independently retryable unit that reports an
//! explicit [`StepOutcome`]. Failure handling is not inlined into the steps;
//! the runner applies each step's declared [`FailurePolicy`] uniformly.

pub(crate) mod enable_apis;
pub(crate) mod grants;
pub(crate) mod identity;
pub(crate) mod impersonation;
pub(crate) mod verify;

use std::future::Future;

use log::{info, warn};

use crate::errors::Result;

/// Outcome of a single reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed remote state
    Applied,
    /// The desired state was already in place; nothing was written
    AlreadySatisfied,
    /// The step did not run to completion, with the reason
    Skipped(String),
}

/// What the runner does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailurePolicy {
    /// Abort the run; prior steps stay applied (each is safe to leave)
    Fatal,
    /// Log and continue; a re-run converges whatever was missed
    BestEffort,
}

/// Run one step under its failure policy, logging start and outcome.
pub(crate) async fn run_step<F>(
    name: &'static str,
    policy: FailurePolicy,
    step: F,
) -> Result<StepOutcome>
where
    F: Future<Output = Result<StepOutcome>>,
{
    info!("step '{name}': starting");
    match step.await {
        Ok(outcome) => {
            match &outcome {
                StepOutcome::Applied => info!("step '{name}': applied"),
                StepOutcome::AlreadySatisfied => info!("step '{name}': already satisfied"),
                StepOutcome::Skipped(reason) => info!("step '{name}': skipped ({reason})"),
            }
            Ok(outcome)
        }
        Err(err) => match policy {
            FailurePolicy::Fatal => Err(err),
            FailurePolicy::BestEffort => {
                warn!("step '{name}': failed, continuing: {err}");
                Ok(StepOutcome::Skipped(err.to_string()))
            }
        },
    }
}
