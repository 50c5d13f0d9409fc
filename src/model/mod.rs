//! The frozen structural graph and its entity types (spec §3).

pub mod account;
pub mod calendar;
pub mod graph;
pub mod project;
pub mod resource;
pub mod scenario;
pub mod task;

pub use account::Account;
pub use calendar::{AbsoluteInterval, Calendar, CalendarBitmap, DayRange, WeeklyTemplate};
pub use graph::{ProjectGraph, ProjectGraphBuilder};
pub use project::Project;
pub use resource::{Rate, Resource, ResourceKind, ResourceLimits};
pub use scenario::Scenario;
pub use task::{
    AllocationCandidateSet, Booking, ChargeEvent, ChargeTiming, Dependency, DependencyAnchor, SelectionPolicy, SloppyLevel, Task, TaskBounds,
    TaskKind,
};
