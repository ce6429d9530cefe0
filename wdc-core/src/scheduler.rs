use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    Config,
    cycle::{CollectionCycle, CycleOutcome},
    fetch::FieldFetcher,
};

/// Runs the collection cycle at a fixed period, one cycle at a time.
///
/// The cycle lives behind an async mutex that hands out access in FIFO
/// order: the timer loop and any caller of [`Scheduler::run_once`] queue on
/// it, so a slow cycle delays the next one instead of overlapping it.
#[derive(Debug)]
pub struct Scheduler {
    cycle: Mutex<CollectionCycle>,
    interval: Duration,
    initial_delay: Duration,
}

impl Scheduler {
    pub fn new(cycle: CollectionCycle, interval: Duration, initial_delay: Duration) -> Self {
        Self { cycle: Mutex::new(cycle), interval, initial_delay }
    }

    pub fn from_config(config: &Config, fetcher: Arc<dyn FieldFetcher>) -> Result<Self> {
        Ok(Self::new(
            CollectionCycle::from_config(config, fetcher)?,
            config.interval(),
            config.initial_delay(),
        ))
    }

    /// Run one cycle, waiting for a running one to finish first.
    pub async fn run_once(&self) -> CycleOutcome {
        let mut cycle = self.cycle.lock().await;
        cycle.run().await
    }

    /// Tick until `cancel` fires. A cycle that already started is allowed
    /// to complete; cancellation is only observed between cycles.
    pub async fn run(&self, cancel: CancellationToken) {
        log::info!(
            "Collecting every {} minutes, first run in {} ms",
            self.interval.as_secs() / 60,
            self.initial_delay.as_millis()
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // cancellation wins over a tick that is already due
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Collection timer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.run_once().await;
                    log::info!(
                        "*** Collection run finished: {outcome}. Next run in '{}' minutes.",
                        self.interval.as_secs() / 60
                    );
                }
            }
        }
    }

    /// Run the timer loop on its own task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
