//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-farm playback state and the shared farm store."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use solar_sim_data::{FarmId, Reading, Series};

use crate::aggregator::{average_efficiency, compute_snapshot, performance_ratio, FarmMetrics};

/// A farm's series and its playback position, kept together so they cannot drift.
#[derive(Debug, Clone)]
pub struct FarmState {
    id: FarmId,
    series: Series,
    position: usize,
}

impl FarmState {
    pub fn new(id: FarmId, series: Series) -> Self {
        Self {
            id,
            series,
            position: 0,
        }
    }

    pub fn id(&self) -> &FarmId {
        &self.id
    }

    /// Unwrapped number of ticks this farm has been advanced.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Reading the next tick will report, if the series is non-empty.
    pub fn current_reading(&self) -> Option<&Reading> {
        if self.series.is_empty() {
            return None;
        }
        self.series.get(self.position % self.series.len())
    }

    pub fn snapshot(&self) -> FarmMetrics {
        compute_snapshot(&self.id, &self.series, self.position)
    }

    pub fn advance(&mut self) {
        self.position += 1;
    }

    /// Readings replayed so far in the current loop, up to the current reading.
    fn replayed_prefix(&self) -> &[Reading] {
        if self.series.is_empty() {
            return &[];
        }
        &self.series[..=self.position % self.series.len()]
    }

    pub fn view(&self) -> FarmView {
        let current = self.current_reading();
        let prefix = self.replayed_prefix();
        FarmView {
            farm: self.id.clone(),
            total_records: self.series.len(),
            current_index: self.position,
            current_timestamp: current.and_then(|reading| reading.timestamp),
            current_power: current.map(|reading| reading.power_production_kw),
            average_efficiency: average_efficiency(prefix),
            performance_ratio: performance_ratio(prefix),
        }
    }
}

/// Debug view of one farm's playback state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmView {
    pub farm: FarmId,
    pub total_records: usize,
    pub current_index: usize,
    pub current_timestamp: Option<DateTime<Utc>>,
    pub current_power: Option<f64>,
    pub average_efficiency: f64,
    pub performance_ratio: f64,
}

/// Shared, lock-protected collection of loaded farms in configuration order.
#[derive(Debug, Clone, Default)]
pub struct FarmStore {
    farms: Arc<RwLock<IndexMap<FarmId, FarmState>>>,
}

impl FarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded series at position 0. Replaces any previous state.
    pub fn install(&self, id: FarmId, series: Series) {
        let state = FarmState::new(id.clone(), series);
        self.farms.write().insert(id, state);
    }

    pub fn len(&self) -> usize {
        self.farms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.farms.read().is_empty()
    }

    pub fn farm_ids(&self) -> Vec<FarmId> {
        self.farms.read().keys().cloned().collect()
    }

    pub fn view(&self, id: &FarmId) -> Option<FarmView> {
        self.farms.read().get(id).map(FarmState::view)
    }

    pub fn views(&self) -> Vec<FarmView> {
        self.farms.read().values().map(FarmState::view).collect()
    }

    /// Run `f` with exclusive access to every farm.
    pub(crate) fn with_farms_mut<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<FarmId, FarmState>) -> R,
    ) -> R {
        let mut farms = self.farms.write();
        f(&mut farms)
    }
}
