//! Booking & projection layer (spec §4.G).
//!
//! Runs once per scenario, before [`crate::bounds::resolve_bounds`] and the
//! driver's fixed-point loop: pre-loads every task's user-supplied
//! [`crate::model::Booking`]s into its derived state, advances the cursor
//! past them, and decrements remaining effort. Only scenarios flagged
//! `projection` treat bookings as authoritative ground truth; scenarios
//! without the flag still accept bookings (they're just additional
//! pre-placed assignments the task scheduler picks up from, since a
//! booking is "immovable" regardless of projection mode per spec §3).

use crate::diagnostics::{Diagnostic, EntityRef, Kind};
use crate::ids::{ScenarioId, SlotIndex};
use crate::model::{Booking, ProjectGraph, SloppyLevel, Task};
use crate::store::{Assignment, ScenarioState, TaskStatus};

/// Whether `booking`'s interval is legal under `task`'s effective sloppy
/// level: `Strict` requires every slot to be a working slot for both the
/// task calendar and the resource calendar and off vacation; each level
/// above relaxes one more check, per spec §4.G / DESIGN NOTES §9.
fn booking_is_legal(graph: &ProjectGraph, task: &Task, booking: &Booking, sloppy: SloppyLevel) -> bool {
    let resource = graph.resource(booking.resource);
    let task_cal = graph.task_calendar(task);
    let resource_cal = graph.resource_calendar(resource);

    for slot in booking.start..booking.end {
        let task_working = task_cal.working(slot);
        let resource_working = resource_cal.working(slot);
        let on_vacation = resource.on_vacation(slot);

        if sloppy < SloppyLevel::NonWorkingHours && !(task_working && resource_working) {
            return false;
        }
        if sloppy < SloppyLevel::Vacation && on_vacation {
            return false;
        }
    }
    true
}

/// Applies every booking declared on `task` to `state`, in projection
/// mode. Emits an advisory if a relaxed booking needed `sloppy` to pass,
/// and an advisory (never fatal) if a `strict-bookings` scenario finds a
/// booking that overruns declared effort unless `actual:scheduled` is
/// also set, per DESIGN NOTES §9's resolved open question.
fn apply_task(graph: &ProjectGraph, state: &mut ScenarioState, scenario: ScenarioId, task: &Task, strict_bookings: bool, diagnostics: &mut Vec<Diagnostic>) {
    if task.bookings.is_empty() {
        return;
    }

    let mut max_end: SlotIndex = SlotIndex::MIN;
    let mut booked: f64 = 0.0;
    let mut forced_scheduled = false;

    for booking in &task.bookings {
        let resource = graph.resource(booking.resource);
        let legal_strict = booking_is_legal(graph, task, booking, SloppyLevel::Strict);
        if !legal_strict {
            if !booking_is_legal(graph, task, booking, task.sloppy) {
                diagnostics.push(Diagnostic::constraint(
                    scenario,
                    Kind::MandatoryAllocationUnsatisfiable,
                    vec![EntityRef::Task(task.id)],
                    format!("booking on task '{}' for resource '{}' falls outside even the declared sloppy level", task.name, resource.name),
                ));
            } else {
                diagnostics.push(Diagnostic::advisory(
                    scenario,
                    Kind::SloppyBookingRelaxed,
                    vec![EntityRef::Task(task.id), EntityRef::Resource(resource.id)],
                    format!("booking on task '{}' for resource '{}' only legal under sloppy level {:?}", task.name, resource.name, task.sloppy),
                ));
            }
        }

        for slot in booking.start..booking.end {
            state.add_load(resource.id, slot, resource.efficiency);
        }
        let derived = state.tasks.get_mut(&task.id).expect("task present");
        derived.assignments.extend((booking.start..booking.end).map(|slot| Assignment { resource: resource.id, slot, share: resource.efficiency }));

        let slots = (booking.end - booking.start).max(0) as f64;
        booked += slots * resource.efficiency;
        max_end = max_end.max(booking.end);
        forced_scheduled |= booking.actual_scheduled;
    }

    let derived = state.tasks.get_mut(&task.id).expect("task present");
    if derived.start.is_none() {
        derived.start = task.bookings.iter().map(|b| b.start).min();
    }
    derived.cursor = Some(max_end);
    derived.booked_effort += booked;
    derived.remaining_effort = (derived.remaining_effort - booked).max(0.0);

    let overruns_effort = booked > task.effort as f64 + 1.0;
    if overruns_effort && strict_bookings && !forced_scheduled {
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::StrictBookingExceedsEffort,
            vec![EntityRef::Task(task.id)],
            format!("bookings on task '{}' ({booked:.1} slots) exceed declared effort ({}) under strict-bookings", task.name, task.effort),
        ));
    } else if overruns_effort {
        diagnostics.push(Diagnostic::advisory(
            scenario,
            Kind::StrictBookingExceedsEffort,
            vec![EntityRef::Task(task.id)],
            format!("bookings on task '{}' ({booked:.1} slots) exceed declared effort ({})", task.name, task.effort),
        ));
    }

    if forced_scheduled {
        let derived = state.tasks.get_mut(&task.id).expect("task present");
        derived.end = Some(max_end);
        derived.remaining_effort = 0.0;
        derived.status = TaskStatus::Scheduled;
    }
}

/// Preloads bookings for every task in the scenario. Called once by the
/// driver before bounds resolution, regardless of whether the scenario
/// is flagged `projection` (a non-projection scenario's explicit
/// bookings are still immovable, per spec §3's "Bookings" entity note —
/// projection only changes whether the *cutoff* semantics around `now`
/// additionally apply, which is [`crate::ledger::accrue_costs`]'s job).
pub fn apply_bookings(graph: &ProjectGraph, state: &mut ScenarioState, scenario: ScenarioId, strict_bookings: bool, diagnostics: &mut Vec<Diagnostic>) {
    for task in graph.tasks() {
        if task.is_container() {
            continue;
        }
        apply_task(graph, state, scenario, task, strict_bookings, diagnostics);
    }
}

/// Spec §3 invariant 7: bookings accepted as ground truth precede `now`;
/// computed slots follow `now`. Returns `true` if every booking recorded
/// for `task` lies strictly before `now`, which is the condition under
/// which a task is safe to treat as "actuals only, schedule the rest".
/// Bookings at or after `now` are still accepted (§4.G: "authoritative as
/// user-forced future assignments") — this just flags the ordinary case
/// for callers that want to distinguish it (e.g. completion reporting).
pub fn bookings_precede_now(task: &Task, now: SlotIndex) -> bool {
    task.bookings.iter().all(|b| b.end <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CalendarId, ResourceId, TaskId};
    use crate::model::{Calendar, Project, ProjectGraphBuilder, Rate, Resource, ResourceKind, ResourceLimits, TaskBounds, TaskKind};

    fn base_project() -> Project {
        Project { start_epoch_seconds: 0, end_epoch_seconds: 3600 * 24 * 30, slot_seconds: 3600, timezone: chrono_tz::UTC, currency_precision: 2, seed: 1 }
    }

    fn resource(id: u32) -> Resource {
        Resource {
            id: ResourceId(id),
            name: format!("r{id}"),
            kind: ResourceKind::Leaf,
            efficiency: 1.0,
            calendar: CalendarId(0),
            vacations: Vec::new(),
            limits: ResourceLimits::default(),
            rate: Rate { per_slot: 1.0 },
            linked_account: None,
        }
    }

    fn booked_task(effort: i64, bookings: Vec<Booking>) -> Task {
        Task {
            id: TaskId(0),
            name: "impl".into(),
            note: None,
            parent: None,
            children: Vec::new(),
            kind: TaskKind::Effort,
            direction: crate::model::Direction::Forward,
            bounds: TaskBounds::default(),
            calendar: None,
            depends: Vec::new(),
            precedes: Vec::new(),
            effort,
            length: 0,
            user_complete: None,
            allocations: Vec::new(),
            bookings,
            charges: Vec::new(),
            linked_account: None,
            priority: 0,
            sloppy: SloppyLevel::Strict,
        }
    }

    #[test]
    fn booking_decrements_remaining_effort_and_moves_cursor() {
        let booking = Booking { resource: ResourceId(0), start: 0, end: 8, overhead: 0, actual_scheduled: false };
        let task = booked_task(16, vec![booking]);
        let graph =
            ProjectGraphBuilder { project: Some(base_project()), calendars: vec![Calendar::default()], resources: vec![resource(0)], tasks: vec![task], accounts: Vec::new(), scenarios: Vec::new() }
                .freeze()
                .unwrap();
        let mut state = ScenarioState::init(&graph);
        let mut diagnostics = Vec::new();

        apply_bookings(&graph, &mut state, crate::ids::ScenarioId(0), false, &mut diagnostics);

        let derived = &state.tasks[&TaskId(0)];
        assert_eq!(derived.remaining_effort, 8.0);
        assert_eq!(derived.cursor, Some(8));
        assert_eq!(derived.assignments.len(), 8);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn actual_scheduled_forces_scheduled_regardless_of_remaining_effort() {
        let booking = Booking { resource: ResourceId(0), start: 0, end: 4, overhead: 0, actual_scheduled: true };
        let task = booked_task(100, vec![booking]);
        let graph =
            ProjectGraphBuilder { project: Some(base_project()), calendars: vec![Calendar::default()], resources: vec![resource(0)], tasks: vec![task], accounts: Vec::new(), scenarios: Vec::new() }
                .freeze()
                .unwrap();
        let mut state = ScenarioState::init(&graph);
        let mut diagnostics = Vec::new();

        apply_bookings(&graph, &mut state, crate::ids::ScenarioId(0), false, &mut diagnostics);

        let derived = &state.tasks[&TaskId(0)];
        assert_eq!(derived.status, TaskStatus::Scheduled);
        assert_eq!(derived.end, Some(4));
    }
}
