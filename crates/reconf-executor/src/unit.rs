use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::actuator::Actuator;
use crate::error::ActuationError;

// ─── Identifiers and reports ──────────────────────────────────────────────

/// Identity of one dispatch. Never reused within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct DispatchId(pub(crate) u64);

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispatch-{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Failed(ActuationError),
    TimedOut,
}

/// What a unit (or its watchdog) tells the coordinator.
#[derive(Debug)]
pub(crate) struct Report {
    pub(crate) dispatch: DispatchId,
    pub(crate) outcome: Outcome,
}

pub(crate) type ReportSender = mpsc::UnboundedSender<Report>;

// ─── Claim ────────────────────────────────────────────────────────────────

/// Single-assignment flag deciding which of completion and timeout reports.
#[derive(Debug, Clone, Default)]
pub(crate) struct Claim(Arc<AtomicBool>);

impl Claim {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `true` for exactly one caller over the claim's lifetime.
    pub(crate) fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ─── Watchdog ─────────────────────────────────────────────────────────────

/// Timer task that reports [`Outcome::TimedOut`] if it wins the claim.
///
/// Dropping the watchdog cancels it; cancelling a watchdog that already fired
/// is a no-op.
pub(crate) struct Watchdog {
    task: JoinHandle<()>,
}

impl Watchdog {
    pub(crate) fn arm(
        dispatch: DispatchId,
        timeout: Duration,
        claim: Claim,
        reports: ReportSender,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if claim.try_claim() {
                debug!(%dispatch, ?timeout, "watchdog fired");
                let _ = reports.send(Report {
                    dispatch,
                    outcome: Outcome::TimedOut,
                });
            }
        });
        Self { task }
    }

    pub(crate) fn cancel(self) {}
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─── Execution unit ───────────────────────────────────────────────────────

/// Run `actuator` on the blocking pool once a permit from `limiter` is
/// available, supervised by a watchdog armed once `execute()` has started.
///
/// The timeout counts from the moment a blocking thread picks the actuator
/// up, not from the moment it was queued on the pool.
///
/// Exactly one report is sent per dispatch, by whichever of the unit and the
/// watchdog wins `claim`. Aborting the returned task drops the watchdog; a
/// blocking `execute()` already running is left to finish on its own.
pub(crate) fn spawn(
    dispatch: DispatchId,
    actuator: Box<dyn Actuator>,
    claim: Claim,
    limiter: Arc<Semaphore>,
    reports: ReportSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(_permit) = limiter.acquire_owned().await else {
            return;
        };

        let timeout = actuator.timeout();
        let label = actuator.label();

        let (started_tx, started_rx) = oneshot::channel();
        let mut actuator = actuator;
        let running = tokio::task::spawn_blocking(move || {
            let _ = started_tx.send(());
            actuator.execute()
        });

        // An error means the closure was dropped unrun; `running` reports it.
        let watchdog = match started_rx.await {
            Ok(()) => {
                debug!(%dispatch, actuator = %label, "start");
                Some(Watchdog::arm(dispatch, timeout, claim.clone(), reports.clone()))
            }
            Err(_) => None,
        };

        let outcome = match running.await {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(join) => Outcome::Failed(ActuationError::Panicked(join.to_string())),
        };

        if claim.try_claim() {
            if let Some(watchdog) = watchdog {
                watchdog.cancel();
            }
            trace!(%dispatch, actuator = %label, "reporting");
            let _ = reports.send(Report { dispatch, outcome });
        } else {
            warn!(
                %dispatch,
                actuator = %label,
                ?outcome,
                "outcome discarded: the watchdog fired first"
            );
        }
    })
}
