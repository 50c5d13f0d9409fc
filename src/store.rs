//! The property store (spec §4.B): per-scenario derived attributes.
//!
//! Only attributes the scheduler itself writes live here — start, end,
//! bookings, completion, assigned resources, accrued cost/revenue. All
//! user-supplied attributes are frozen on [`crate::model::Task`] /
//! [`crate::model::Resource`] directly and are read-only to the scheduler.
//!
//! Per-scenario inheritance (resolution order: explicit on (entity,
//! scenario) -> scenario's parent -> default) is realized by copying the
//! parent scenario's fully materialized [`ScenarioState`] at the moment a
//! child scenario begins scheduling (`ScenarioState::branch_from`). This is
//! an eager copy rather than a lazy per-read overlay walk, but it satisfies
//! the same contract: after the copy, scheduling the child never mutates
//! the parent's stored values (invariant 6).

use std::collections::{BTreeSet, HashMap};

use crate::ids::{AccountId, ResourceId, SlotIndex, TaskId};
use crate::model::{ProjectGraph, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Init,
    Ready,
    Running,
    PendingChildren,
    Scheduled,
    Blocked,
    Infeasible,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub resource: ResourceId,
    pub slot: SlotIndex,
    pub share: f64,
}

#[derive(Debug, Clone)]
pub struct DerivedTaskState {
    pub status: TaskStatus,
    pub start: Option<SlotIndex>,
    pub end: Option<SlotIndex>,
    pub assignments: Vec<Assignment>,
    /// Resource-slots of work still owed; fractional because efficiency is
    /// (spec §3 invariant 5 tolerates rounding within one slot at the end).
    pub remaining_effort: f64,
    pub booked_effort: f64,
    pub complete_percent: f64,
    pub cost: f64,
    pub revenue: f64,
    /// Next slot the forward sweep should try (or, for backward tasks, the
    /// next slot going downward).
    pub cursor: Option<SlotIndex>,
    /// Resource bound per allocation-candidate-set index, for `persistent`.
    pub persistent_resource: HashMap<usize, ResourceId>,
}

impl DerivedTaskState {
    pub fn default_for(task: &Task) -> Self {
        DerivedTaskState {
            status: TaskStatus::Init,
            start: task.bounds.start,
            end: task.bounds.end,
            assignments: Vec::new(),
            remaining_effort: task.effort as f64,
            booked_effort: 0.0,
            complete_percent: task.user_complete.unwrap_or(0.0),
            cost: 0.0,
            revenue: 0.0,
            cursor: None,
            persistent_resource: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    pub cost: f64,
    pub revenue: f64,
}

/// The fully materialized derived state of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioState {
    pub tasks: HashMap<TaskId, DerivedTaskState>,
    /// Sum of assigned efficiency shares per (resource, slot) — the
    /// invariant-4 ledger the allocator consults and updates.
    pub resource_load: HashMap<(ResourceId, SlotIndex), f64>,
    /// Slots each resource carries any load at, kept sorted so the
    /// allocator can range-query a day/week/month window in O(log n +
    /// window size) rather than scanning every (resource, slot) pair.
    pub assigned_slots: HashMap<ResourceId, BTreeSet<SlotIndex>>,
    pub accounts: HashMap<AccountId, AccountLedger>,
}

impl ScenarioState {
    pub fn init(graph: &ProjectGraph) -> Self {
        let tasks = graph.tasks().iter().map(|t| (t.id, DerivedTaskState::default_for(t))).collect();
        ScenarioState { tasks, resource_load: HashMap::new(), assigned_slots: HashMap::new(), accounts: HashMap::new() }
    }

    pub fn branch_from(parent: &ScenarioState) -> Self {
        parent.clone()
    }

    pub fn load_at(&self, resource: ResourceId, slot: SlotIndex) -> f64 {
        self.resource_load.get(&(resource, slot)).copied().unwrap_or(0.0)
    }

    pub fn add_load(&mut self, resource: ResourceId, slot: SlotIndex, share: f64) {
        *self.resource_load.entry((resource, slot)).or_insert(0.0) += share;
        self.assigned_slots.entry(resource).or_default().insert(slot);
    }

    /// Count of distinct assigned slots for `resource` within `[start, end)`.
    pub fn assigned_count_in(&self, resource: ResourceId, start: SlotIndex, end: SlotIndex) -> usize {
        self.assigned_slots.get(&resource).map_or(0, |set| set.range(start..end).count())
    }

    /// Total distinct slots ever assigned to `resource` across the whole
    /// scenario (every task), used by the `minloaded`/`maxloaded` policies'
    /// tie-breaking and by callers that want scenario-wide utilization.
    pub fn total_allocated(&self, resource: ResourceId) -> usize {
        self.assigned_slots.get(&resource).map_or(0, BTreeSet::len)
    }

    /// Count of slots already booked to `resource` on `task` specifically
    /// (spec §4.D: `minallocated` — "least booked slots on *this* task
    /// wins" — distinct from `minloaded`'s scenario-wide view).
    pub fn task_allocated_count(&self, task: TaskId, resource: ResourceId) -> usize {
        self.tasks.get(&task).map_or(0, |derived| derived.assignments.iter().filter(|a| a.resource == resource).count())
    }
}
