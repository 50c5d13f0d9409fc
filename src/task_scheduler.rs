//! Task scheduler (spec §4.E): drives one task forward/backward slot by
//! slot to completion.
//!
//! This module is deliberately ignorant of the driver's retry loop (§4.F):
//! [`advance`] makes exactly one pass over a task — placing as many slots
//! as it can without waiting on anything — and reports whether it finished,
//! blocked, or went infeasible. The driver decides when to call it again.

use crate::allocator;
use crate::bounds::Bounds;
use crate::diagnostics::{Diagnostic, EntityRef, Kind};
use crate::ids::{ScenarioId, SlotIndex, TaskId};
use crate::model::{Direction, ProjectGraph, Task, TaskKind};
use crate::store::{Assignment, ScenarioState, TaskStatus};

/// Outcome of one [`advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The task reached a terminal `Scheduled` state this call.
    Scheduled,
    /// At least one predecessor isn't `Scheduled` yet; this task made no
    /// attempt to place anything and should be retried next pass once
    /// that predecessor finishes.
    Blocked,
    /// `ES > LF`, or a `mandatory` allocation could never be satisfied
    /// before `LF`; the task will never schedule. Terminal.
    Infeasible,
    /// Neither finished nor blocked nor infeasible — a container still
    /// waiting on children, reported so the driver doesn't count it as
    /// an advance when nothing actually moved.
    Pending,
}

/// `true` if every predecessor of `t` (via `depends`, or via `precedes`
/// pointing back at `t`) has reached `Scheduled` in `state`.
fn predecessors_ready(graph: &ProjectGraph, state: &ScenarioState, task: &Task) -> bool {
    task.depends.iter().all(|d| state.tasks[&d.other].status == TaskStatus::Scheduled)
        && graph
            .tasks()
            .iter()
            .filter(|other| other.precedes.iter().any(|d| d.other == task.id))
            .all(|other| state.tasks[&other.id].status == TaskStatus::Scheduled)
}

/// The effective earliest slot `task` may start at, given its static ES
/// (§4.C) and the actual computed end of every `depends` predecessor
/// (the dynamic half of dependency enforcement, per `bounds`'s doc
/// comment — not a fixed bound, so it is recomputed on every call).
fn dynamic_earliest_start(graph: &ProjectGraph, state: &ScenarioState, task: &Task, es: SlotIndex) -> SlotIndex {
    let mut floor = es;
    for dep in &task.depends {
        let pred = &state.tasks[&dep.other];
        let Some(pred_end) = pred.end else { continue };
        let Some(pred_start) = pred.start else { continue };
        let anchor = match dep.anchor {
            crate::model::DependencyAnchor::OnEnd => pred_end,
            crate::model::DependencyAnchor::OnStart => pred_start,
        };
        let gap_length = graph.task_calendar(task).count_working(anchor, anchor + dep.gap_length.max(0));
        let padded = anchor + dep.gap_duration.max(0) + gap_length;
        floor = floor.max(padded);
    }
    for other in graph.tasks() {
        for dep in &other.precedes {
            if dep.other != task.id {
                continue;
            }
            let pred = &state.tasks[&other.id];
            let (Some(pred_end), Some(pred_start)) = (pred.end, pred.start) else { continue };
            let anchor = match dep.anchor {
                crate::model::DependencyAnchor::OnEnd => pred_end,
                crate::model::DependencyAnchor::OnStart => pred_start,
            };
            let gap_length = graph.task_calendar(task).count_working(anchor, anchor + dep.gap_length.max(0));
            floor = floor.max(anchor + dep.gap_duration.max(0) + gap_length);
        }
    }
    floor
}

/// Mirror of [`dynamic_earliest_start`] for backward tasks: the latest
/// slot `task` may end at, given successors' actual computed starts.
fn dynamic_latest_finish(graph: &ProjectGraph, state: &ScenarioState, task: &Task, lf: SlotIndex) -> SlotIndex {
    let mut ceiling = lf;
    for dep in &task.precedes {
        let succ = &state.tasks[&dep.other];
        let Some(succ_start) = succ.start else { continue };
        let gap_length = graph.task_calendar(task).count_working(succ_start - dep.gap_length.max(0), succ_start);
        ceiling = ceiling.min(succ_start - dep.gap_duration.max(0) - gap_length);
    }
    for other in graph.tasks() {
        for dep in &other.depends {
            if dep.other != task.id {
                continue;
            }
            let succ = &state.tasks[&other.id];
            let Some(succ_start) = succ.start else { continue };
            let gap_length = graph.task_calendar(task).count_working(succ_start - dep.gap_length.max(0), succ_start);
            ceiling = ceiling.min(succ_start - dep.gap_duration.max(0) - gap_length);
        }
    }
    ceiling
}

/// Attempts to schedule mandatory allocations at `slot`; returns `None` if
/// any mandatory set can't currently place, else the assignments made
/// (possibly empty, if only non-mandatory sets exist and all failed).
fn try_allocate_slot(graph: &ProjectGraph, state: &mut ScenarioState, task: &Task, slot: SlotIndex) -> Option<Vec<Assignment>> {
    let mut placed = Vec::new();
    for (set_index, set) in task.allocations.iter().enumerate() {
        match allocator::allocate(graph, state, task, set_index, slot) {
            Some((resource, share)) => placed.push(Assignment { resource, slot, share }),
            None if set.mandatory => return None,
            None => {}
        }
    }
    Some(placed)
}

fn finish(state: &mut ScenarioState, task_id: TaskId, start: SlotIndex, end: SlotIndex) {
    let derived = state.tasks.get_mut(&task_id).expect("task present");
    derived.start = Some(start);
    derived.end = Some(end);
    derived.status = TaskStatus::Scheduled;
}

/// Advances a single leaf task by one scheduler pass. See module docs.
pub fn advance(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    scenario: ScenarioId,
    task: &Task,
    bounds: &Bounds,
    diagnostics: &mut Vec<Diagnostic>,
) -> StepOutcome {
    debug_assert!(!task.is_container(), "containers are driven by advance_container");

    if bounds.es > bounds.lf {
        let derived = state.tasks.get_mut(&task.id).expect("task present");
        derived.status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::EsAfterLf,
            vec![EntityRef::Task(task.id)],
            format!("task '{}' has ES ({}) after LF ({})", task.name, bounds.es, bounds.lf),
        ));
        return StepOutcome::Infeasible;
    }

    if bounds.max_start.is_some_and(|max_start| bounds.es > max_start) || bounds.min_end.is_some_and(|min_end| bounds.lf < min_end) {
        let derived = state.tasks.get_mut(&task.id).expect("task present");
        derived.status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::EsAfterLf,
            vec![EntityRef::Task(task.id)],
            format!("task '{}' has no start/end satisfying both its computed envelope and its declared maxStart/minEnd", task.name),
        ));
        return StepOutcome::Infeasible;
    }

    if !predecessors_ready(graph, state, task) {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Blocked;
        return StepOutcome::Blocked;
    }

    match task.direction {
        Direction::Forward => advance_forward(graph, state, scenario, task, bounds, diagnostics),
        Direction::Backward => advance_backward(graph, state, scenario, task, bounds, diagnostics),
    }
}

fn advance_forward(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    scenario: ScenarioId,
    task: &Task,
    bounds: &Bounds,
    diagnostics: &mut Vec<Diagnostic>,
) -> StepOutcome {
    let es = dynamic_earliest_start(graph, state, task, bounds.es);
    if es > bounds.lf {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::EsAfterLf,
            vec![EntityRef::Task(task.id)],
            format!("task '{}' has no predecessor-consistent slot before LF", task.name),
        ));
        return StepOutcome::Infeasible;
    }

    match task.kind {
        TaskKind::Milestone => {
            finish(state, task.id, es, es);
            StepOutcome::Scheduled
        }

        TaskKind::Duration => {
            let end = es + task.length;
            if end > bounds.lf + 1 {
                state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
                diagnostics.push(Diagnostic::constraint(scenario, Kind::EsAfterLf, vec![EntityRef::Task(task.id)], format!("task '{}' duration overruns LF", task.name)));
                return StepOutcome::Infeasible;
            }
            finish(state, task.id, es, end);
            StepOutcome::Scheduled
        }

        TaskKind::Length => {
            // A full sweep to LF is run in one call: no other task's
            // progress changes what slots this task's own calendar calls
            // working, so there's nothing to gain by returning `Blocked`
            // and retrying later — either the working-time target fits
            // before LF or it never will.
            let calendar = graph.task_calendar(task);
            let mut cursor = state.tasks[&task.id].cursor.unwrap_or(es).max(es);
            let target = task.length;
            let mut worked = state.tasks[&task.id].booked_effort as i64;
            let mut last_working = cursor;

            while worked < target && cursor <= bounds.lf {
                if calendar.working(cursor) {
                    worked += 1;
                    last_working = cursor;
                }
                cursor += 1;
            }

            state.tasks.get_mut(&task.id).expect("task present").cursor = Some(cursor);
            state.tasks.get_mut(&task.id).expect("task present").booked_effort = worked as f64;

            if worked >= target {
                finish(state, task.id, es, last_working + 1);
                StepOutcome::Scheduled
            } else {
                state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
                diagnostics.push(Diagnostic::constraint(scenario, Kind::EsAfterLf, vec![EntityRef::Task(task.id)], format!("task '{}' cannot reach its length before LF", task.name)));
                StepOutcome::Infeasible
            }
        }

        TaskKind::Effort => advance_effort_forward(graph, state, scenario, task, bounds, es, diagnostics),
    }
}

fn advance_effort_forward(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    scenario: ScenarioId,
    task: &Task,
    bounds: &Bounds,
    es: SlotIndex,
    diagnostics: &mut Vec<Diagnostic>,
) -> StepOutcome {
    let calendar = graph.task_calendar(task);
    let prior_cursor = state.tasks[&task.id].cursor;
    let mut cursor = prior_cursor.unwrap_or(es).max(es);
    // If bookings already swept the cursor past `es`, the last slot they
    // covered (one before the cursor) is the task's last worked slot until
    // this sweep places one of its own; falling back to `start` would lose
    // booking-only coverage entirely when remaining effort is already zero.
    let mut last_worked_slot = prior_cursor.map(|c| c - 1).or(state.tasks[&task.id].start);

    while state.tasks[&task.id].remaining_effort > 1e-9 && cursor <= bounds.lf {
        if !calendar.working(cursor) {
            cursor += 1;
            continue;
        }

        match try_allocate_slot(graph, state, task, cursor) {
            None => {
                // mandatory allocation unsatisfiable at this slot; try the next one.
                cursor += 1;
            }
            Some(placed) if placed.is_empty() && !task.allocations.is_empty() => {
                cursor += 1;
            }
            Some(placed) => {
                let share: f64 = placed.iter().map(|a| a.share).sum::<f64>().max(if task.allocations.is_empty() { 1.0 } else { 0.0 });
                let derived = state.tasks.get_mut(&task.id).expect("task present");
                if derived.start.is_none() {
                    derived.start = Some(cursor);
                }
                derived.assignments.extend(placed);
                derived.remaining_effort -= share;
                derived.booked_effort += share;
                last_worked_slot = Some(cursor);
                cursor += 1;
            }
        }
    }

    state.tasks.get_mut(&task.id).expect("task present").cursor = Some(cursor);

    // The loop above only exits early on `remaining_effort <= 0`; any other
    // exit means `cursor` ran past `bounds.lf` with effort still owed,
    // which this same pass already proved unplaceable before LF.
    let remaining = state.tasks[&task.id].remaining_effort;
    if remaining <= 1e-9 {
        let start = state.tasks[&task.id].start.unwrap_or(es);
        let end = last_worked_slot.map(|s| s + 1).unwrap_or(start);
        finish(state, task.id, start, end);
        StepOutcome::Scheduled
    } else {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::MandatoryAllocationUnsatisfiable,
            vec![EntityRef::Task(task.id)],
            format!("task '{}' could not place all effort before LF ({:.1} slots remain)", task.name, remaining),
        ));
        StepOutcome::Infeasible
    }
}

fn advance_backward(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    scenario: ScenarioId,
    task: &Task,
    bounds: &Bounds,
    diagnostics: &mut Vec<Diagnostic>,
) -> StepOutcome {
    let lf = dynamic_latest_finish(graph, state, task, bounds.lf);
    if lf < bounds.es {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(scenario, Kind::EsAfterLf, vec![EntityRef::Task(task.id)], format!("task '{}' has no successor-consistent slot after ES", task.name)));
        return StepOutcome::Infeasible;
    }

    match task.kind {
        TaskKind::Milestone => {
            finish(state, task.id, lf, lf);
            StepOutcome::Scheduled
        }

        TaskKind::Duration => {
            let start = lf - task.length;
            if start < bounds.es {
                state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
                diagnostics.push(Diagnostic::constraint(scenario, Kind::EsAfterLf, vec![EntityRef::Task(task.id)], format!("task '{}' duration underruns ES", task.name)));
                return StepOutcome::Infeasible;
            }
            finish(state, task.id, start, lf);
            StepOutcome::Scheduled
        }

        TaskKind::Length => {
            let calendar = graph.task_calendar(task);
            let mut cursor = state.tasks[&task.id].cursor.unwrap_or(lf).min(lf);
            let target = task.length;
            let mut worked = state.tasks[&task.id].booked_effort as i64;
            let mut first_working = cursor;

            while worked < target && cursor >= bounds.es {
                if calendar.working(cursor) {
                    worked += 1;
                    first_working = cursor;
                }
                cursor -= 1;
            }

            state.tasks.get_mut(&task.id).expect("task present").cursor = Some(cursor);
            state.tasks.get_mut(&task.id).expect("task present").booked_effort = worked as f64;

            if worked >= target {
                finish(state, task.id, first_working, lf + 1);
                StepOutcome::Scheduled
            } else {
                state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
                diagnostics.push(Diagnostic::constraint(scenario, Kind::EsAfterLf, vec![EntityRef::Task(task.id)], format!("task '{}' cannot reach its length after ES", task.name)));
                StepOutcome::Infeasible
            }
        }

        TaskKind::Effort => advance_effort_backward(graph, state, scenario, task, bounds, lf, diagnostics),
    }
}

fn advance_effort_backward(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    scenario: ScenarioId,
    task: &Task,
    bounds: &Bounds,
    lf: SlotIndex,
    diagnostics: &mut Vec<Diagnostic>,
) -> StepOutcome {
    let calendar = graph.task_calendar(task);
    let mut cursor = state.tasks[&task.id].cursor.unwrap_or(lf).min(lf);
    let mut first_worked_slot = state.tasks[&task.id].end.map(|e| e - 1);

    while state.tasks[&task.id].remaining_effort > 1e-9 && cursor >= bounds.es {
        if !calendar.working(cursor) {
            cursor -= 1;
            continue;
        }

        match try_allocate_slot(graph, state, task, cursor) {
            None => cursor -= 1,
            Some(placed) if placed.is_empty() && !task.allocations.is_empty() => cursor -= 1,
            Some(placed) => {
                let share: f64 = placed.iter().map(|a| a.share).sum::<f64>().max(if task.allocations.is_empty() { 1.0 } else { 0.0 });
                let derived = state.tasks.get_mut(&task.id).expect("task present");
                if derived.end.is_none() {
                    derived.end = Some(cursor + 1);
                }
                derived.assignments.extend(placed);
                derived.remaining_effort -= share;
                derived.booked_effort += share;
                first_worked_slot = Some(cursor);
                cursor -= 1;
            }
        }
    }

    state.tasks.get_mut(&task.id).expect("task present").cursor = Some(cursor);

    let remaining = state.tasks[&task.id].remaining_effort;
    if remaining <= 1e-9 {
        let end = state.tasks[&task.id].end.unwrap_or(lf + 1);
        let start = first_worked_slot.unwrap_or(end - 1);
        finish(state, task.id, start, end);
        StepOutcome::Scheduled
    } else {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::Infeasible;
        diagnostics.push(Diagnostic::constraint(
            scenario,
            Kind::MandatoryAllocationUnsatisfiable,
            vec![EntityRef::Task(task.id)],
            format!("task '{}' could not place all effort after ES ({:.1} slots remain)", task.name, remaining),
        ));
        StepOutcome::Infeasible
    }
}

/// Containers never place their own slots; they simply take the hull of
/// their children once every child is `Scheduled` (spec §3 invariant 3,
/// §4.E container state machine).
pub fn advance_container(state: &mut ScenarioState, task: &Task) -> StepOutcome {
    debug_assert!(task.is_container());

    let all_scheduled = task.children.iter().all(|c| state.tasks[c].status == TaskStatus::Scheduled);
    if !all_scheduled {
        state.tasks.get_mut(&task.id).expect("task present").status = TaskStatus::PendingChildren;
        return StepOutcome::Pending;
    }

    let start = task.children.iter().filter_map(|c| state.tasks[c].start).min();
    let end = task.children.iter().filter_map(|c| state.tasks[c].end).max();

    let derived = state.tasks.get_mut(&task.id).expect("task present");
    derived.start = start;
    derived.end = end;
    derived.status = TaskStatus::Scheduled;
    StepOutcome::Scheduled
}
