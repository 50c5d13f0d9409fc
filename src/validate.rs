//! Post-schedule validation (spec §4.I).
//!
//! Runs once per scenario, after the driver's fixed-point loop and the
//! ledger pass have both settled. Everything here is read-only: it
//! inspects [`ScenarioState`] and appends [`Diagnostic`]s, it never
//! mutates scheduled slots.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, EntityRef, Kind};
use crate::ids::{ResourceId, ScenarioId, SlotIndex};
use crate::model::ProjectGraph;
use crate::store::ScenarioState;

const EFFORT_TOLERANCE_SLOTS: f64 = 1.0;

/// Spec §8 invariant 3 / §4.I "container hull invariant": a container's
/// scheduled start/end must equal the min/max of its children's.
fn check_container_hull(graph: &ProjectGraph, state: &ScenarioState, scenario: ScenarioId, out: &mut Vec<Diagnostic>) {
    for task in graph.tasks() {
        if !task.is_container() {
            continue;
        }
        let derived = &state.tasks[&task.id];
        let expected_start = task.children.iter().filter_map(|c| state.tasks[c].start).min();
        let expected_end = task.children.iter().filter_map(|c| state.tasks[c].end).max();

        if derived.start != expected_start || derived.end != expected_end {
            out.push(Diagnostic::constraint(
                scenario,
                Kind::ContainerHullViolation,
                vec![EntityRef::Task(task.id)],
                format!("container '{}' interval [{:?}, {:?}) does not match children hull [{:?}, {:?})", task.name, derived.start, derived.end, expected_start, expected_end),
            ));
        }
    }
}

/// Spec §8 invariant 2 / §3 invariant 4: for every resource and slot, the
/// sum of assigned efficiency shares never exceeds the resource's
/// effective efficiency (its productivity-adjusted calendar value, or
/// plain `efficiency` when no calendar-level multiplier is active).
fn check_resource_oversubscription(graph: &ProjectGraph, state: &ScenarioState, scenario: ScenarioId, out: &mut Vec<Diagnostic>) {
    let mut per_slot: HashMap<(ResourceId, SlotIndex), f64> = HashMap::new();
    for derived in state.tasks.values() {
        for assignment in &derived.assignments {
            *per_slot.entry((assignment.resource, assignment.slot)).or_insert(0.0) += assignment.share;
        }
    }

    for ((resource_id, slot), total) in per_slot {
        let resource = graph.resource(resource_id);
        let calendar = graph.resource_calendar(resource);
        let effective_efficiency = resource.efficiency * if calendar.working(slot) { graph.calendar(resource.calendar).productivity } else { 1.0 };
        if total > effective_efficiency + 1e-9 {
            out.push(Diagnostic::constraint(
                scenario,
                Kind::ResourceOversubscribed,
                vec![EntityRef::Resource(resource_id)],
                format!("resource '{}' oversubscribed at slot {slot}: {total:.3} assigned > {effective_efficiency:.3} effective efficiency", resource.name),
            ).with_slot(slot));
        }
    }
}

/// Spec §4.I "mandatory allocation coverage": every task with at least
/// one `mandatory` allocation set must, if `Scheduled`, carry at least
/// one assignment from that set's resources (the task scheduler already
/// refuses to finish otherwise, so this is a defense-in-depth check, not
/// the primary enforcement mechanism).
fn check_mandatory_coverage(graph: &ProjectGraph, state: &ScenarioState, scenario: ScenarioId, out: &mut Vec<Diagnostic>) {
    use crate::store::TaskStatus;

    for task in graph.tasks() {
        let derived = &state.tasks[&task.id];
        if derived.status != TaskStatus::Scheduled {
            continue;
        }
        for set in task.allocations.iter().filter(|s| s.mandatory) {
            let leaves: Vec<ResourceId> = set.candidates.iter().flat_map(|&c| graph.expand_leaves(c)).collect();
            let covered = derived.assignments.iter().any(|a| leaves.contains(&a.resource));
            if !covered {
                out.push(Diagnostic::constraint(
                    scenario,
                    Kind::MandatoryAllocationUnsatisfiable,
                    vec![EntityRef::Task(task.id)],
                    format!("task '{}' scheduled without any assignment from a mandatory allocation set", task.name),
                ));
            }
        }
    }
}

/// Spec §8 invariant 4: `|sum(assignments) - effort| <= 1 slot * max
/// efficiency`, for effort tasks without `actual:scheduled` bookings.
fn check_effort_balance(graph: &ProjectGraph, state: &ScenarioState, scenario: ScenarioId, out: &mut Vec<Diagnostic>) {
    use crate::model::TaskKind;
    use crate::store::TaskStatus;

    for task in graph.tasks() {
        if task.kind != TaskKind::Effort || task.is_container() {
            continue;
        }
        let derived = &state.tasks[&task.id];
        if derived.status != TaskStatus::Scheduled {
            continue;
        }
        let any_actual_scheduled = task.bookings.iter().any(|b| b.actual_scheduled);
        if any_actual_scheduled {
            continue;
        }

        let max_efficiency = derived.assignments.iter().map(|a| graph.resource(a.resource).efficiency).fold(1.0_f64, f64::max);
        let diff = (derived.booked_effort - task.effort as f64).abs();
        if diff > EFFORT_TOLERANCE_SLOTS * max_efficiency {
            out.push(Diagnostic::constraint(
                scenario,
                Kind::NegativeRemainingEffort,
                vec![EntityRef::Task(task.id)],
                format!("task '{}' booked {:.2} slots of effort vs declared {} (tolerance {:.2})", task.name, derived.booked_effort, task.effort, EFFORT_TOLERANCE_SLOTS * max_efficiency),
            ));
        }
    }
}

/// Runs every post-schedule structural check and returns the combined
/// diagnostic list (spec §4.I). Called by the driver after the ledger
/// pass (§4.H), once the scenario has reached a terminal state.
pub fn validate(graph: &ProjectGraph, state: &ScenarioState, scenario: ScenarioId) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    check_container_hull(graph, state, scenario, &mut out);
    check_resource_oversubscription(graph, state, scenario, &mut out);
    check_mandatory_coverage(graph, state, scenario, &mut out);
    check_effort_balance(graph, state, scenario, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CalendarId, TaskId};
    use crate::model::{AllocationCandidateSet, Calendar, Direction, Project, ProjectGraphBuilder, Rate, Resource, ResourceKind, ResourceLimits, SelectionPolicy, Task, TaskBounds, TaskKind};
    use crate::store::Assignment;

    fn base_project() -> Project {
        Project { start_epoch_seconds: 0, end_epoch_seconds: 3600 * 24 * 7, slot_seconds: 3600, timezone: chrono_tz::UTC, currency_precision: 2, seed: 1 }
    }

    fn resource(id: u32, efficiency: f64) -> Resource {
        Resource {
            id: ResourceId(id),
            name: format!("r{id}"),
            kind: ResourceKind::Leaf,
            efficiency,
            calendar: CalendarId(0),
            vacations: Vec::new(),
            limits: ResourceLimits::default(),
            rate: Rate { per_slot: 1.0 },
            linked_account: None,
        }
    }

    fn task(id: u32, effort: i64, allocations: Vec<AllocationCandidateSet>) -> Task {
        Task {
            id: TaskId(id),
            name: format!("t{id}"),
            note: None,
            parent: None,
            children: Vec::new(),
            kind: TaskKind::Effort,
            direction: Direction::Forward,
            bounds: TaskBounds::default(),
            calendar: None,
            depends: Vec::new(),
            precedes: Vec::new(),
            effort,
            length: 0,
            user_complete: None,
            allocations,
            bookings: Vec::new(),
            charges: Vec::new(),
            linked_account: None,
            priority: 0,
            sloppy: Default::default(),
        }
    }

    #[test]
    fn oversubscribed_resource_is_flagged() {
        let t = task(0, 2, Vec::new());
        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![resource(0, 1.0)],
            tasks: vec![t],
            accounts: Vec::new(),
            scenarios: Vec::new(),
        }
        .freeze()
        .unwrap();
        let mut state = ScenarioState::init(&graph);
        state.tasks.get_mut(&TaskId(0)).unwrap().assignments = vec![
            Assignment { resource: ResourceId(0), slot: 0, share: 0.7 },
            Assignment { resource: ResourceId(0), slot: 0, share: 0.6 },
        ];

        let diagnostics = validate(&graph, &state, crate::ids::ScenarioId(0));
        assert!(diagnostics.iter().any(|d| d.kind == Kind::ResourceOversubscribed));
    }

    #[test]
    fn scheduled_without_mandatory_assignment_is_flagged() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true };
        let t = task(0, 1, vec![set]);
        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![resource(0, 1.0)],
            tasks: vec![t],
            accounts: Vec::new(),
            scenarios: Vec::new(),
        }
        .freeze()
        .unwrap();
        let mut state = ScenarioState::init(&graph);
        state.tasks.get_mut(&TaskId(0)).unwrap().status = crate::store::TaskStatus::Scheduled;

        let diagnostics = validate(&graph, &state, crate::ids::ScenarioId(0));
        assert!(diagnostics.iter().any(|d| d.kind == Kind::MandatoryAllocationUnsatisfiable));
    }
}
