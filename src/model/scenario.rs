use serde::{Deserialize, Serialize};

use crate::ids::ScenarioId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub parent: Option<ScenarioId>,

    /// Use bookings as ground truth up to `now`; the scheduler fills the
    /// future.
    pub projection: bool,
    /// A booking beyond declared effort is an error rather than silently
    /// over-consuming effort.
    pub strict_bookings: bool,
    /// Do not schedule this scenario.
    pub disabled: bool,
}
