use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::time::MissedTickBehavior;

use crate::application::commission::{CommissionLedger, CommissionRunReport};
use crate::domain::errors::OrderError;
use crate::domain::ports::OrderStore;

/// Spawns `task` with no completion signal. A failure is logged and dropped;
/// it is never retried.
pub fn spawn_detached<F, T, E>(name: &'static str, task: F)
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!("background task {name} failed: {e}");
        }
    });
}

/// One commission run on the blocking pool.
pub async fn run_commission_once<S: OrderStore>(
    ledger: Arc<CommissionLedger<S>>,
) -> Result<CommissionRunReport, OrderError> {
    tokio::task::spawn_blocking(move || ledger.run())
        .await
        .map_err(|e| OrderError::store(format!("commission task aborted: {e}")))?
}

/// Runs the commission ledger immediately and then every `every`, until
/// `shutdown` resolves.
///
/// Runs never overlap: a tick waits for the previous run, and ticks missed
/// meanwhile are delayed rather than bunched. A failed run is only logged;
/// the next tick starts over from its own window. Shutdown is observed
/// between runs.
pub async fn run_commission_schedule<S, F>(
    ledger: Arc<CommissionLedger<S>>,
    every: Duration,
    shutdown: F,
) where
    S: OrderStore,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("order commission schedule started, every {every:?}");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("order commission schedule stopped");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_commission_once(Arc::clone(&ledger)).await {
                    error!("order commission run failed: {e}");
                }
            }
        }
    }
}
