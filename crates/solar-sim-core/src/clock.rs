//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation clock advancing every farm once per tick."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::aggregator::FarmMetrics;
use crate::farm::FarmStore;

/// Receiver of freshly computed snapshots.
pub trait MetricsSink: Send + Sync + 'static {
    /// Overwrite the published values for `metrics.farm`.
    fn publish(&self, metrics: &FarmMetrics);

    /// Called once after every farm of a tick has been published.
    fn tick_completed(&self, _summary: &TickSummary) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Zero for the priming tick.
    pub tick: u64,
    pub farms_updated: usize,
}

/// Stopped clock. Ticks can be driven by hand until [`SimulationClock::start`]
/// hands it to a background task.
pub struct SimulationClock {
    store: FarmStore,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(store: FarmStore, sink: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        Self {
            store,
            sink,
            interval,
            ticks: 0,
        }
    }

    pub fn state(&self) -> ClockState {
        ClockState::Stopped
    }

    /// Publish every farm at its current position, then advance it by one.
    pub fn tick(&mut self) -> TickSummary {
        let tick = self.ticks;
        let sink = &self.sink;
        let farms_updated = self.store.with_farms_mut(|farms| {
            for state in farms.values_mut() {
                let snapshot = state.snapshot();
                sink.publish(&snapshot);
                state.advance();
            }
            farms.len()
        });
        self.ticks += 1;
        let summary = TickSummary {
            tick,
            farms_updated,
        };
        self.sink.tick_completed(&summary);
        debug!(tick, farms_updated, "metrics updated");
        summary
    }

    /// Zero-th tick run before scheduling so metrics are populated at startup.
    pub fn prime(&mut self) -> TickSummary {
        let summary = self.tick();
        info!(farms = summary.farms_updated, "initial metrics published");
        summary
    }

    /// Schedule ticks every `interval`, the first one a full interval from now.
    pub fn start(mut self) -> ClockHandle {
        let period = self.interval;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        info!(interval_ms = period.as_millis() as u64, "starting simulation clock");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        self.tick();
                    }
                }
            }
            info!(ticks = self.ticks, "simulation clock stopped");
            self.ticks
        });

        ClockHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl fmt::Debug for SimulationClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationClock")
            .field("interval", &self.interval)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

/// Running clock. Dropping the handle without calling [`ClockHandle::shutdown`]
/// also stops scheduling.
#[derive(Debug)]
pub struct ClockHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl ClockHandle {
    pub fn state(&self) -> ClockState {
        ClockState::Running
    }

    /// Stop scheduling further ticks and return the total number of ticks run.
    pub async fn shutdown(mut self) -> Result<u64> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let ticks = (&mut self.task).await?;
        Ok(ticks)
    }
}
