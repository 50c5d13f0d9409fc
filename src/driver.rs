//! Project scheduler driver (spec §4.F): the fixed-point loop that drives
//! every task of one scenario to a terminal state.
//!
//! `schedule` is the crate's single public entry point (spec §6): given a
//! frozen [`ProjectGraph`] and a scenario id, it runs projection, resolves
//! bounds, loops the task scheduler to quiescence, then folds in cost and
//! validation, and returns a [`ScheduleResult`] that always carries every
//! diagnostic collected along the way, alongside whatever partial
//! per-task results exist.

use std::collections::HashMap;

use tracing::{info, info_span};

use crate::bounds::{self, Bounds};
use crate::config::ScheduleOptions;
use crate::diagnostics::{Diagnostic, EntityRef, Kind};
use crate::error::Result;
use crate::ids::{ResourceId, ScenarioId, SlotIndex, TaskId};
use crate::ledger;
use crate::model::ProjectGraph;
use crate::projection;
use crate::store::{ScenarioState, TaskStatus};
use crate::task_scheduler::{self, StepOutcome};
use crate::validate;

/// Per-(task, scenario) output, matching spec §6's external-interface
/// contract verbatim.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskResult {
    pub task: TaskId,
    pub start: Option<SlotIndex>,
    pub end: Option<SlotIndex>,
    pub assignments: Vec<(ResourceId, SlotIndex, f64)>,
    pub booked_effort: f64,
    pub remaining_effort: f64,
    pub complete_percent: f64,
    pub cost: f64,
    pub revenue: f64,
    pub state: TaskState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TaskState {
    Scheduled,
    Infeasible,
    Aborted,
}

impl From<TaskStatus> for TaskState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Scheduled => TaskState::Scheduled,
            TaskStatus::Aborted => TaskState::Aborted,
            _ => TaskState::Infeasible,
        }
    }
}

/// Per-(resource, scenario) utilization summary (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceUtilization {
    pub resource: ResourceId,
    pub assigned_slots: Vec<SlotIndex>,
    pub utilization: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduleResult {
    pub scenario: ScenarioId,
    pub tasks: Vec<TaskResult>,
    pub resources: Vec<ResourceUtilization>,
    pub diagnostics: Vec<Diagnostic>,
    pub aborted: bool,
}

fn task_result(task_id: TaskId, state: &ScenarioState) -> TaskResult {
    let derived = &state.tasks[&task_id];
    TaskResult {
        task: task_id,
        start: derived.start,
        end: derived.end,
        assignments: derived.assignments.iter().map(|a| (a.resource, a.slot, a.share)).collect(),
        booked_effort: derived.booked_effort,
        remaining_effort: derived.remaining_effort,
        complete_percent: derived.complete_percent,
        cost: derived.cost,
        revenue: derived.revenue,
        state: derived.status.into(),
    }
}

fn resource_utilizations(graph: &ProjectGraph, state: &ScenarioState) -> Vec<ResourceUtilization> {
    let total_slots = graph.project.total_slots().max(1) as f64;
    graph
        .resources()
        .iter()
        .map(|r| {
            let slots: Vec<SlotIndex> = state.assigned_slots.get(&r.id).map(|s| s.iter().copied().collect()).unwrap_or_default();
            let utilization = slots.len() as f64 / total_slots;
            ResourceUtilization { resource: r.id, assigned_slots: slots, utilization }
        })
        .collect()
}

/// One pass over every non-`Scheduled` leaf/container task, in graph
/// declaration order (stable; the dependency/containment ordering itself
/// is enforced dynamically by [`task_scheduler::advance`]'s predecessor
/// check, not by the iteration order here). Returns the number of tasks
/// that made progress this pass.
fn run_pass(graph: &ProjectGraph, state: &mut ScenarioState, scenario: ScenarioId, bounds: &HashMap<TaskId, Bounds>, diagnostics: &mut Vec<Diagnostic>) -> usize {
    let mut advanced = 0;

    for task in graph.tasks() {
        let status = state.tasks[&task.id].status;
        if status == TaskStatus::Scheduled || status == TaskStatus::Infeasible {
            continue;
        }

        let outcome = if task.is_container() {
            task_scheduler::advance_container(state, task)
        } else {
            let task_bounds = bounds[&task.id];
            task_scheduler::advance(graph, state, scenario, task, &task_bounds, diagnostics)
        };

        match outcome {
            StepOutcome::Scheduled | StepOutcome::Infeasible => advanced += 1,
            StepOutcome::Blocked | StepOutcome::Pending => {}
        }
    }

    advanced
}

/// Schedules one scenario end to end (spec §4.F). Structural errors
/// (malformed graph) were already rejected at `ProjectGraph::freeze`
/// time; this only returns `Err` if the graph itself disagrees with
/// `scenario`.
pub fn schedule(graph: &ProjectGraph, scenario: ScenarioId, options: ScheduleOptions) -> Result<ScheduleResult> {
    let (result, _state) = schedule_with_state(graph, scenario, options)?;
    Ok(result)
}

/// Same as [`schedule`] but also hands back the scenario's fully
/// materialized [`ScenarioState`], so a dependent (child) scenario can
/// `branch_from` it (spec §4.F step 1, §3 invariant 6). Resolves
/// `Scenario.parent` itself: a child scenario is preceded by scheduling
/// its parent first, and its own state starts as a copy-on-write clone of
/// the parent's settled state rather than an empty one.
fn schedule_with_state(graph: &ProjectGraph, scenario: ScenarioId, options: ScheduleOptions) -> Result<(ScheduleResult, ScenarioState)> {
    let _span = info_span!("schedule_scenario", scenario = scenario.0).entered();
    info!(now = options.now, "starting scenario schedule");

    let scenario_decl = graph.scenario(scenario);
    if scenario_decl.disabled {
        let empty = ScheduleResult { scenario, tasks: Vec::new(), resources: Vec::new(), diagnostics: Vec::new(), aborted: false };
        return Ok((empty, ScenarioState::init(graph)));
    }

    let mut state = match scenario_decl.parent {
        Some(parent) => {
            let (_, parent_state) = schedule_with_state(graph, parent, options.clone())?;
            ScenarioState::branch_from(&parent_state)
        }
        None => ScenarioState::init(graph),
    };
    let mut diagnostics = Vec::new();

    projection::apply_bookings(graph, &mut state, scenario, scenario_decl.strict_bookings, &mut diagnostics);

    let bounds = bounds::resolve_bounds(graph)?;

    let mut aborted = false;
    loop {
        if options.should_abort() {
            diagnostics.push(Diagnostic::runtime(scenario, Kind::Cancelled, "scenario cancelled or deadline exceeded; partial state discarded"));
            aborted = true;
            break;
        }

        let advanced = run_pass(graph, &mut state, scenario, &bounds, &mut diagnostics);

        let remaining = graph.tasks().iter().filter(|t| state.tasks[&t.id].status != TaskStatus::Scheduled).count();
        if remaining == 0 {
            break;
        }
        if advanced == 0 {
            mark_remaining_infeasible(graph, &mut state, scenario, &mut diagnostics);
            break;
        }
    }

    if aborted {
        for derived in state.tasks.values_mut() {
            if derived.status != TaskStatus::Scheduled {
                derived.status = TaskStatus::Aborted;
            }
        }
        let result = ScheduleResult {
            scenario,
            tasks: graph.tasks().iter().map(|t| task_result(t.id, &state)).collect(),
            resources: resource_utilizations(graph, &state),
            diagnostics,
            aborted: true,
        };
        return Ok((result, state));
    }

    ledger::accrue_costs(graph, &mut state, options.now);
    diagnostics.extend(validate::validate(graph, &state, scenario));

    let tasks = graph.tasks().iter().map(|t| task_result(t.id, &state)).collect();
    let resources = resource_utilizations(graph, &state);

    info!(diagnostics = diagnostics.len(), "scenario schedule complete");
    let result = ScheduleResult { scenario, tasks, resources, diagnostics, aborted: false };
    Ok((result, state))
}

/// Every task left non-`Scheduled` after a quiescent pass is marked
/// `Infeasible`, with a diagnostic naming the blocking predecessor (if
/// any is itself non-`Scheduled`) or noting resource starvation
/// otherwise (spec §4.F step 5).
fn mark_remaining_infeasible(graph: &ProjectGraph, state: &mut ScenarioState, scenario: ScenarioId, diagnostics: &mut Vec<Diagnostic>) {
    for task in graph.tasks() {
        let status = state.tasks[&task.id].status;
        if status == TaskStatus::Scheduled || status == TaskStatus::Infeasible {
            continue;
        }

        let blocking: Vec<TaskId> = task.depends.iter().map(|d| d.other).filter(|p| state.tasks[p].status != TaskStatus::Scheduled).collect();

        let message = if !blocking.is_empty() {
            format!("task '{}' never unblocked: predecessors not scheduled: {:?}", task.name, blocking)
        } else if task.is_container() {
            format!("container '{}' never unblocked: a child never scheduled", task.name)
        } else {
            format!("task '{}' never unblocked: resources saturated or constraints unsatisfiable", task.name)
        };

        diagnostics.push(Diagnostic::constraint(scenario, Kind::MandatoryAllocationUnsatisfiable, vec![EntityRef::Task(task.id)], message));
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
    }
}

/// Schedules every non-`disabled` scenario of `graph`. When
/// `config.parallel_scenarios` is set, independent scenarios run
/// concurrently via `rayon`: each owns its own copy-on-write
/// [`ScenarioState`] and only reads the shared frozen structural graph
/// (spec §5), so there is nothing to lock.
pub fn schedule_project(graph: &ProjectGraph, config: &crate::config::ProjectScheduleConfig, options: ScheduleOptions) -> Result<Vec<ScheduleResult>> {
    let scenarios: Vec<ScenarioId> = graph.scenarios().iter().filter(|s| !s.disabled).map(|s| s.id).collect();

    if config.parallel_scenarios {
        use rayon::prelude::*;
        scenarios.par_iter().map(|&id| schedule(graph, id, options.clone())).collect()
    } else {
        scenarios.iter().map(|&id| schedule(graph, id, options.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CalendarId;
    use crate::model::{
        AllocationCandidateSet, Calendar, Dependency, DependencyAnchor, Direction, Project, ProjectGraphBuilder, Rate, Resource, ResourceKind, ResourceLimits, Scenario, SelectionPolicy, Task,
        TaskBounds, TaskKind,
    };

    fn base_project() -> Project {
        Project { start_epoch_seconds: 0, end_epoch_seconds: 3600 * 24 * 30, slot_seconds: 3600, timezone: chrono_tz::UTC, currency_precision: 2, seed: 7 }
    }

    fn leaf_resource(id: u32) -> Resource {
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

    fn effort_task(id: u32, effort: i64, allocations: Vec<AllocationCandidateSet>, depends: Vec<Dependency>) -> Task {
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
            depends,
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

    fn scenario(id: u32) -> Scenario {
        Scenario { id: ScenarioId(id), name: format!("s{id}"), parent: None, projection: false, strict_bookings: false, disabled: false }
    }

    #[test]
    fn two_tasks_with_dependency_gap_schedule_in_order() {
        let a = effort_task(0, 3, vec![AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true }], Vec::new());
        let dep = Dependency { other: TaskId(0), gap_duration: 2, gap_length: 0, anchor: DependencyAnchor::OnEnd };
        let b = effort_task(1, 2, vec![AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true }], vec![dep]);

        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![leaf_resource(0)],
            tasks: vec![a, b],
            accounts: Vec::new(),
            scenarios: vec![scenario(0)],
        }
        .freeze()
        .unwrap();

        let result = schedule(&graph, ScenarioId(0), ScheduleOptions::default()).unwrap();

        let a_result = result.tasks.iter().find(|t| t.task == TaskId(0)).unwrap();
        let b_result = result.tasks.iter().find(|t| t.task == TaskId(1)).unwrap();
        assert_eq!(a_result.state, TaskState::Scheduled);
        assert_eq!(b_result.state, TaskState::Scheduled);
        assert!(b_result.start.unwrap() >= a_result.end.unwrap() + 2);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn a_cycle_of_three_tasks_is_a_single_structural_diagnostic() {
        let dep01 = Dependency { other: TaskId(1), gap_duration: 0, gap_length: 0, anchor: DependencyAnchor::OnEnd };
        let dep12 = Dependency { other: TaskId(2), gap_duration: 0, gap_length: 0, anchor: DependencyAnchor::OnEnd };
        let dep20 = Dependency { other: TaskId(0), gap_duration: 0, gap_length: 0, anchor: DependencyAnchor::OnEnd };
        let a = effort_task(0, 1, Vec::new(), vec![dep01]);
        let b = effort_task(1, 1, Vec::new(), vec![dep12]);
        let c = effort_task(2, 1, Vec::new(), vec![dep20]);

        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: Vec::new(),
            tasks: vec![a, b, c],
            accounts: Vec::new(),
            scenarios: vec![scenario(0)],
        }
        .freeze()
        .unwrap();

        let result = schedule(&graph, ScenarioId(0), ScheduleOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn idempotent_reschedule_yields_identical_results() {
        let t = effort_task(0, 2, vec![AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true }], Vec::new());
        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![leaf_resource(0)],
            tasks: vec![t],
            accounts: Vec::new(),
            scenarios: vec![scenario(0)],
        }
        .freeze()
        .unwrap();

        let first = schedule(&graph, ScenarioId(0), ScheduleOptions::default()).unwrap();
        let second = schedule(&graph, ScenarioId(0), ScheduleOptions::default()).unwrap();

        assert_eq!(first.tasks.len(), second.tasks.len());
        for (a, b) in first.tasks.iter().zip(second.tasks.iter()) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.assignments.len(), b.assignments.len());
        }
    }

    #[test]
    fn child_scenario_inherits_parents_settled_allocations() {
        let t = effort_task(0, 2, vec![AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true }], Vec::new());
        let mut child = scenario(1);
        child.parent = Some(ScenarioId(0));

        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![leaf_resource(0)],
            tasks: vec![t],
            accounts: Vec::new(),
            scenarios: vec![scenario(0), child],
        }
        .freeze()
        .unwrap();

        let parent = schedule(&graph, ScenarioId(0), ScheduleOptions::default()).unwrap();
        let child_result = schedule(&graph, ScenarioId(1), ScheduleOptions::default()).unwrap();

        let parent_task = parent.tasks.iter().find(|t| t.task == TaskId(0)).unwrap();
        let child_task = child_result.tasks.iter().find(|t| t.task == TaskId(0)).unwrap();
        assert_eq!(parent_task.start, child_task.start);
        assert_eq!(parent_task.end, child_task.end);
        assert_eq!(parent_task.assignments, child_task.assignments);
    }

    #[test]
    fn self_referential_scenario_parent_is_rejected_at_freeze() {
        let mut cyclic = scenario(0);
        cyclic.parent = Some(ScenarioId(0));

        let result = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: Vec::new(),
            tasks: Vec::new(),
            accounts: Vec::new(),
            scenarios: vec![cyclic],
        }
        .freeze();

        assert!(result.is_err());
    }
}
