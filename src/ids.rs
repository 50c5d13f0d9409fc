//! Stable integer ids addressing the frozen structural graph.
//!
//! Per the "shared mutable project tree" design note, entities never hold
//! owning references to each other: every relation (dependency, allocation
//! candidate, booking, account link) is stored as one of these ids and
//! resolved through [`crate::model::ProjectGraph`].

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                $name(v as u32)
            }
        }
    };
}

entity_id!(TaskId);
entity_id!(ResourceId);
entity_id!(CalendarId);
entity_id!(AccountId);
entity_id!(ScenarioId);

/// A slot index; the unit of all scheduled time, per the project's
/// configured slot width (default one hour).
pub type SlotIndex = i64;
