//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Aggregation and playback runtime module exports."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Farm metrics aggregation and the simulated clock that replays each farm's
//! history one reading per tick.

pub mod aggregator;
pub mod clock;
pub mod farm;

pub use aggregator::{
    average_efficiency, compute_snapshot, performance_ratio, AnomalyCounts, FarmMetrics,
};
pub use clock::{ClockHandle, ClockState, MetricsSink, SimulationClock, TickSummary};
pub use farm::{FarmState, FarmStore, FarmView};
