use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, CalendarId, ResourceId, SlotIndex, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// duration = work / allocated efficiency
    Effort,
    /// elapsed wall-clock slots
    Duration,
    /// working-time slots
    Length,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// ASAP from earliest start.
    Forward,
    /// ALAP from latest end.
    Backward,
}

/// User-declared fixed dates and flexible bounds. `None` means unconstrained.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskBounds {
    pub start: Option<SlotIndex>,
    pub end: Option<SlotIndex>,
    pub min_start: Option<SlotIndex>,
    pub max_start: Option<SlotIndex>,
    pub min_end: Option<SlotIndex>,
    pub max_end: Option<SlotIndex>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DependencyAnchor {
    OnStart,
    OnEnd,
}

/// A single `depends`/`precedes` edge, with gap and anchoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dependency {
    pub other: TaskId,
    /// Wall-clock gap, in slots (`gapDuration`).
    pub gap_duration: SlotIndex,
    /// Working-time gap, in slots (`gapLength`), evaluated against the
    /// dependent task's calendar.
    pub gap_length: SlotIndex,
    pub anchor: DependencyAnchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    Order,
    MinLoaded,
    MaxLoaded,
    MinAllocated,
    Random { seed: u64 },
    /// Supplemental policy (see SPEC_FULL §3): breaks ties by the task's
    /// declared `priority` before falling back to declaration order.
    OrderByPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationCandidateSet {
    pub candidates: Vec<ResourceId>,
    pub policy: SelectionPolicy,
    /// Reuse the same chosen resource for the whole task.
    pub persistent: bool,
    /// Fail the task (at this slot) if unavailable, rather than skip it.
    pub mandatory: bool,
}

/// A user-supplied `(resource, interval[, overhead])` booking. Immovable by
/// the allocator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Booking {
    pub resource: ResourceId,
    pub start: SlotIndex,
    pub end: SlotIndex,
    pub overhead: SlotIndex,
    /// Whether this booking was already marked complete/scheduled by the
    /// user (`actual:scheduled`).
    pub actual_scheduled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeTiming {
    OnStart,
    OnEnd,
    PerSlot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChargeEvent {
    pub account: AccountId,
    pub timing: ChargeTiming,
    /// Positive for a charge (cost), negative for a credit (revenue), or
    /// use separate sign conventions per the reporter's taste; the engine
    /// only sums what it is given.
    pub amount: f64,
}

/// Relaxation level for projected bookings, per spec §4.G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SloppyLevel {
    Strict = 0,
    SameSlotPartial = 1,
    NonWorkingHours = 2,
    Vacation = 3,
}

impl Default for SloppyLevel {
    fn default() -> Self {
        SloppyLevel::Strict
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub note: Option<String>,

    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,

    pub kind: TaskKind,
    pub direction: Direction,
    pub bounds: TaskBounds,

    /// Calendar used for working-time legality of this task's own slots;
    /// `None` means the project's default calendar.
    pub calendar: Option<CalendarId>,

    pub depends: Vec<Dependency>,
    pub precedes: Vec<Dependency>,

    /// Resource-slots of work required (`effort` kind only).
    pub effort: i64,
    /// Wall-clock slots (`duration` kind) or working-time slots (`length` kind).
    pub length: i64,
    /// Reporting-only user-supplied completion percentage.
    pub user_complete: Option<f64>,

    pub allocations: Vec<AllocationCandidateSet>,
    pub bookings: Vec<Booking>,
    pub charges: Vec<ChargeEvent>,
    pub linked_account: Option<AccountId>,

    /// Final, fourth-order allocator tie-break (see SPEC_FULL §3). Lower
    /// values are scheduled with higher priority under `OrderByPriority`.
    pub priority: i32,

    /// Relaxation level applied to this task's own bookings when in
    /// projection mode (spec §4.G). Ignored outside projection.
    pub sloppy: SloppyLevel,
}

impl Task {
    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }
}
