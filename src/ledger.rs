//! Cost/revenue & derived attributes (spec §4.H).
//!
//! Runs once per scenario after the driver's fixed-point loop (§4.F) has
//! settled: folds every scheduled resource slot into task cost and the
//! linked account, applies declared `charge` events, and recomputes
//! `complete` from effort-consumed-before-`now`.

use std::collections::HashMap;

use crate::ids::{ResourceId, SlotIndex};
use crate::model::{ChargeTiming, ProjectGraph};
use crate::store::{AccountLedger, ScenarioState};

fn accrue(graph: &ProjectGraph, resource_id: ResourceId, share: f64) -> f64 {
    graph.resource(resource_id).rate.per_slot * share
}

/// Folds per-slot resource cost into each task and its linked account,
/// applies `charge` events at the matching timing, and recomputes
/// `complete` (clamped 0-100). Must run after every task in the scenario
/// has reached a terminal state (`Scheduled` or `Infeasible`).
pub fn accrue_costs(graph: &ProjectGraph, state: &mut ScenarioState, now: SlotIndex) {
    let mut account_deltas: HashMap<_, AccountLedger> = HashMap::new();

    for task in graph.tasks() {
        let Some(derived) = state.tasks.get_mut(&task.id) else { continue };

        let mut cost = 0.0;
        let mut consumed_before_now = 0.0;
        let mut total_effort = task.effort as f64;

        for assignment in &derived.assignments {
            cost += accrue(graph, assignment.resource, assignment.share);
            if assignment.slot < now {
                consumed_before_now += assignment.share;
            }
        }

        let mut revenue = 0.0;
        for charge in &task.charges {
            let applies = match charge.timing {
                ChargeTiming::OnStart => derived.start.is_some(),
                ChargeTiming::OnEnd => derived.end.is_some(),
                ChargeTiming::PerSlot => true,
            };
            if !applies {
                continue;
            }
            let amount = match charge.timing {
                ChargeTiming::PerSlot => charge.amount * derived.assignments.len() as f64,
                _ => charge.amount,
            };
            if amount >= 0.0 {
                cost += amount;
            } else {
                revenue += -amount;
            }
            let entry = account_deltas.entry(charge.account).or_default();
            if amount >= 0.0 {
                entry.cost += amount;
            } else {
                entry.revenue += -amount;
            }
        }

        derived.cost = cost;
        derived.revenue = revenue;

        if task.is_container() {
            // Open Question (spec §9): user-supplied `complete` on a
            // container is ignored; it is purely derived from children.
            total_effort = 0.0;
        }

        if total_effort > 0.0 {
            derived.complete_percent = (consumed_before_now / total_effort * 100.0).clamp(0.0, 100.0);
        } else if !task.bookings.is_empty() {
            derived.complete_percent = 0.0;
        } else if let Some(user) = task.user_complete {
            if !task.is_container() {
                derived.complete_percent = user.clamp(0.0, 100.0);
            }
        }

        if let Some(linked) = task.linked_account {
            let entry = account_deltas.entry(linked).or_default();
            entry.cost += cost;
            entry.revenue += revenue;
        }
    }

    if graph.tasks().iter().any(|t| t.is_container()) {
        apply_container_complete(graph, state);
    }

    for (account, delta) in account_deltas {
        let entry = state.accounts.entry(account).or_default();
        entry.cost += delta.cost;
        entry.revenue += delta.revenue;
    }
}

fn apply_container_complete(graph: &ProjectGraph, state: &mut ScenarioState) {
    // Post-order so a grandparent sees its children's already-resolved values.
    fn visit(graph: &ProjectGraph, state: &mut ScenarioState, task_id: crate::ids::TaskId) -> (f64, f64) {
        let task = graph.task(task_id);
        if !task.is_container() {
            let derived = &state.tasks[&task_id];
            return (task.effort as f64, derived.complete_percent * task.effort as f64 / 100.0);
        }
        let mut total_effort = 0.0;
        let mut total_done = 0.0;
        for &child in &task.children {
            let (e, d) = visit(graph, state, child);
            total_effort += e;
            total_done += d;
        }
        let pct = if total_effort > 0.0 { (total_done / total_effort * 100.0).clamp(0.0, 100.0) } else { 0.0 };
        state.tasks.get_mut(&task_id).expect("task present").complete_percent = pct;
        (total_effort, total_done)
    }

    for task in graph.tasks() {
        if task.parent.is_none() {
            visit(graph, state, task.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CalendarId, ResourceId, ScenarioId, TaskId};
    use crate::model::{Account, Calendar, ChargeEvent, Direction, Project, ProjectGraphBuilder, Rate, Resource, ResourceKind, ResourceLimits, Task, TaskBounds, TaskKind};
    use crate::store::Assignment;

    fn base_project() -> Project {
        Project { start_epoch_seconds: 0, end_epoch_seconds: 3600 * 24 * 7, slot_seconds: 3600, timezone: chrono_tz::UTC, currency_precision: 2, seed: 1 }
    }

    fn resource(id: u32, rate: f64) -> Resource {
        Resource {
            id: ResourceId(id),
            name: format!("r{id}"),
            kind: ResourceKind::Leaf,
            efficiency: 1.0,
            calendar: CalendarId(0),
            vacations: Vec::new(),
            limits: ResourceLimits::default(),
            rate: Rate { per_slot: rate },
            linked_account: None,
        }
    }

    fn task(id: u32, effort: i64, linked_account: Option<crate::ids::AccountId>, charges: Vec<ChargeEvent>) -> Task {
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
            allocations: Vec::new(),
            bookings: Vec::new(),
            charges,
            linked_account,
            priority: 0,
            sloppy: Default::default(),
        }
    }

    #[test]
    fn cost_accrues_to_task_and_linked_account() {
        let account_id = crate::ids::AccountId(0);
        let account = Account { id: account_id, name: "acct".into(), parent: None };
        let t = task(0, 4, Some(account_id), Vec::new());
        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![resource(0, 10.0)],
            tasks: vec![t],
            accounts: vec![account],
            scenarios: Vec::new(),
        }
        .freeze()
        .unwrap();
        let mut state = ScenarioState::init(&graph);
        state.tasks.get_mut(&TaskId(0)).unwrap().assignments = (0..4).map(|s| Assignment { resource: ResourceId(0), slot: s, share: 1.0 }).collect();
        state.tasks.get_mut(&TaskId(0)).unwrap().start = Some(0);
        state.tasks.get_mut(&TaskId(0)).unwrap().end = Some(4);

        accrue_costs(&graph, &mut state, 2);

        let derived = &state.tasks[&TaskId(0)];
        assert_eq!(derived.cost, 40.0);
        assert_eq!(derived.complete_percent, 50.0);
        assert_eq!(state.accounts[&account_id].cost, 40.0);
        let _ = ScenarioId(0);
    }
}
