use serde::{Deserialize, Serialize};

use crate::ids::{CalendarId, ResourceId, SlotIndex};

/// Per-day/week/month caps on assigned slots for a resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_slots_per_day: Option<i64>,
    pub max_slots_per_week: Option<i64>,
    pub max_slots_per_month: Option<i64>,
}

/// Currency-per-slot rate; flat for the engine's purposes (the reporter
/// layer is responsible for currency-precision rendering).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rate {
    pub per_slot: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceKind {
    Leaf,
    /// A group's children are its members; a group has no own bookings
    /// but can be allocated, expanding to members (spec §3).
    Group { members: Vec<ResourceId> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,

    /// A non-negative rational, typically 1.0.
    pub efficiency: f64,
    pub calendar: CalendarId,
    pub vacations: Vec<(SlotIndex, SlotIndex)>,
    pub limits: ResourceLimits,
    pub rate: Rate,
    pub linked_account: Option<crate::ids::AccountId>,
}

impl Resource {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, ResourceKind::Group { .. })
    }

    pub fn on_vacation(&self, slot: SlotIndex) -> bool {
        self.vacations.iter().any(|&(s, e)| slot >= s && slot < e)
    }
}
