//! Ambient scheduling configuration (SPEC_FULL §2 "config").
//!
//! Bundles the knobs `driver::schedule` needs beyond the structural graph
//! itself: the `now` cursor that separates projection's ground truth from
//! the computed future (spec §4.G), cooperative cancellation and
//! deadlines (spec §5), and whether independent scenarios may run in
//! parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::ids::SlotIndex;

/// Options for one `schedule` call. Cheaply `Clone`-able: the `cancel`
/// flag is an `Arc`, so a caller can hold a handle to flip it from
/// another thread while a scenario runs.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// The slot projection mode treats as "now" — bookings before it are
    /// ground truth, the scheduler fills from it forward.
    pub now: SlotIndex,
    pub cancel: Arc<AtomicBool>,
    pub deadline: Option<Instant>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        ScheduleOptions { now: 0, cancel: Arc::new(AtomicBool::new(false)), deadline: None }
    }
}

impl ScheduleOptions {
    pub fn at(now: SlotIndex) -> Self {
        ScheduleOptions { now, ..Default::default() }
    }

    /// `true` once cancellation was requested, or the deadline (if any)
    /// has passed. Checked by the driver between passes (spec §5) —
    /// never mid-pass, since scheduling a single task is not a
    /// suspension point.
    pub fn should_abort(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Project-wide options that govern multiple scenarios at once, as
/// opposed to `ScheduleOptions` which is per-call. `serde`-derived so an
/// embedding application can load it from a config file, matching the
/// teacher's JSON-driven configuration style.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ProjectScheduleConfig {
    /// Whether independent scenarios may be scheduled concurrently via
    /// `rayon` (spec §5). Disabled by default so callers opt in
    /// explicitly once they've confirmed no scenario shares mutable
    /// state with another (always true for this engine's data model,
    /// but left as an explicit switch for embedding applications that
    /// want deterministic single-threaded runs for debugging).
    pub parallel_scenarios: bool,
    /// Default `sloppy` relaxation applied to a scenario's tasks that
    /// don't declare their own (spec §4.G).
    pub default_sloppy: crate::model::SloppyLevel,
}

impl Default for ProjectScheduleConfig {
    fn default() -> Self {
        ProjectScheduleConfig { parallel_scenarios: false, default_sloppy: crate::model::SloppyLevel::Strict }
    }
}
