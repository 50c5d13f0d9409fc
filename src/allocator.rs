//! Resource allocator (spec §4.D).
//!
//! Picks one resource for one task at one slot out of an
//! [`AllocationCandidateSet`], honouring vacation, shift calendar,
//! per-day/week/month limits, the already-accrued load ledger, and the
//! chosen [`SelectionPolicy`]. Does not decide *whether* a task should try
//! this slot at all — that is the task scheduler's job (§4.E); this module
//! only answers "of these candidates, who's free and who wins."
//!
//! Group candidates are expanded to their leaf members before filtering
//! (spec §3: a group "has no own bookings but can be allocated, expanding
//! to members"); the policy then picks among the flattened leaf set.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ids::{ResourceId, SlotIndex, TaskId};
use crate::model::{ProjectGraph, Resource, SelectionPolicy, Task};
use crate::store::ScenarioState;

/// A resource is available for one more full-slot assignment if it isn't
/// on vacation, the slot falls inside its working calendar, it isn't
/// already saturated for this slot, and none of its day/week/month caps
/// would be exceeded by adding this slot.
fn is_available(graph: &ProjectGraph, state: &ScenarioState, resource: &Resource, slot: SlotIndex) -> bool {
    if resource.on_vacation(slot) {
        return false;
    }
    if !graph.resource_calendar(resource).working(slot) {
        return false;
    }
    if state.load_at(resource.id, slot) >= 1.0 {
        return false;
    }

    let already_has_slot = state.assigned_slots.get(&resource.id).is_some_and(|s| s.contains(&slot));
    if !already_has_slot {
        if let Some(cap) = resource.limits.max_slots_per_day {
            let (start, end) = graph.project.day_window(slot);
            if state.assigned_count_in(resource.id, start, end) as i64 >= cap {
                return false;
            }
        }
        if let Some(cap) = resource.limits.max_slots_per_week {
            let (start, end) = graph.project.week_window(slot);
            if state.assigned_count_in(resource.id, start, end) as i64 >= cap {
                return false;
            }
        }
        if let Some(cap) = resource.limits.max_slots_per_month {
            let (start, end) = graph.project.month_window(slot);
            if state.assigned_count_in(resource.id, start, end) as i64 >= cap {
                return false;
            }
        }
    }

    true
}

fn flattened_candidates(graph: &ProjectGraph, candidates: &[ResourceId]) -> Vec<ResourceId> {
    let mut out = Vec::new();
    for &c in candidates {
        for leaf in graph.expand_leaves(c) {
            if !out.contains(&leaf) {
                out.push(leaf);
            }
        }
    }
    out
}

fn pick(policy: SelectionPolicy, graph: &ProjectGraph, state: &ScenarioState, task_id: TaskId, slot: SlotIndex, available: &[ResourceId]) -> Option<ResourceId> {
    match policy {
        // Priority-based contention across competing tasks is resolved by
        // the driver's task processing order (§4.F); within one task's own
        // candidate list there is nothing left to break a tie on but
        // declaration order, same as `order`.
        SelectionPolicy::Order | SelectionPolicy::OrderByPriority => available.first().copied(),

        // Spec §4.D: "least/most already-allocated effort across the whole
        // scenario" — ranked by total distinct slots ever assigned to the
        // resource, not its load at this one slot (which every candidate
        // that already passed `is_available` ties on almost always).
        SelectionPolicy::MinLoaded => available.iter().copied().min_by_key(|&r| state.total_allocated(r)),

        SelectionPolicy::MaxLoaded => available.iter().copied().max_by_key(|&r| state.total_allocated(r)),

        SelectionPolicy::MinAllocated => available.iter().copied().min_by_key(|&r| state.task_allocated_count(task_id, r)),

        SelectionPolicy::Random { seed } => {
            if available.is_empty() {
                return None;
            }
            let reseed = graph.project.seed ^ seed ^ (task_id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (slot as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            let mut rng = SmallRng::seed_from_u64(reseed);
            let idx = rng.random_range(0..available.len());
            Some(available[idx])
        }
    }
}

/// Attempts to assign a resource from `task.allocations[set_index]` at
/// `slot`. On success, records the load and (for `persistent` sets) the
/// binding, and returns the chosen resource together with the efficiency
/// share it contributes this slot (spec §4.D step 4: "decrement remaining
/// effort by `efficiency × slot-duration`"; §3 invariant 5 requires the
/// sum of these shares to equal declared `effort`). Returns `None` if no
/// candidate is currently available; the caller (task scheduler) decides
/// whether that is fatal (`mandatory`) or just means skip this slot.
pub fn allocate(graph: &ProjectGraph, state: &mut ScenarioState, task: &Task, set_index: usize, slot: SlotIndex) -> Option<(ResourceId, f64)> {
    let set = &task.allocations[set_index];

    if set.persistent {
        if let Some(&bound) = state.tasks[&task.id].persistent_resource.get(&set_index) {
            let resource = graph.resource(bound);
            return if is_available(graph, state, resource, slot) {
                state.add_load(bound, slot, resource.efficiency);
                Some((bound, resource.efficiency))
            } else {
                None
            };
        }
    }

    let candidates = flattened_candidates(graph, &set.candidates);
    let available: Vec<ResourceId> = candidates.into_iter().filter(|&r| is_available(graph, state, graph.resource(r), slot)).collect();

    let chosen = pick(set.policy, graph, state, task.id, slot, &available)?;
    let efficiency = graph.resource(chosen).efficiency;

    state.add_load(chosen, slot, efficiency);
    if set.persistent {
        state.tasks.get_mut(&task.id).expect("task present in scenario state").persistent_resource.insert(set_index, chosen);
    }
    Some((chosen, efficiency))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CalendarId;
    use crate::model::{Calendar, ProjectGraphBuilder, Project, Rate, ResourceKind, ResourceLimits};
    use crate::model::{AllocationCandidateSet, Direction, TaskBounds, TaskKind};

    fn base_project() -> Project {
        Project {
            start_epoch_seconds: 0,
            end_epoch_seconds: 3600 * 24 * 7,
            slot_seconds: 3600,
            timezone: chrono_tz::UTC,
            currency_precision: 2,
            seed: 42,
        }
    }

    fn leaf_resource(id: u32, cap_per_day: Option<i64>) -> Resource {
        Resource {
            id: ResourceId(id),
            name: format!("r{id}"),
            kind: ResourceKind::Leaf,
            efficiency: 1.0,
            calendar: CalendarId(0),
            vacations: Vec::new(),
            limits: ResourceLimits { max_slots_per_day: cap_per_day, ..Default::default() },
            rate: Rate { per_slot: 1.0 },
            linked_account: None,
        }
    }

    fn bare_task(allocations: Vec<AllocationCandidateSet>) -> Task {
        Task {
            id: TaskId(0),
            name: "t".into(),
            note: None,
            parent: None,
            children: Vec::new(),
            kind: TaskKind::Effort,
            direction: Direction::Forward,
            bounds: TaskBounds::default(),
            calendar: None,
            depends: Vec::new(),
            precedes: Vec::new(),
            effort: 8,
            length: 0,
            user_complete: None,
            allocations,
            bookings: Vec::new(),
            charges: Vec::new(),
            linked_account: None,
            priority: 0,
            sloppy: crate::model::SloppyLevel::Strict,
        }
    }

    fn build_graph(resources: Vec<Resource>, task: Task) -> ProjectGraph {
        ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources,
            tasks: vec![task],
            accounts: Vec::new(),
            scenarios: Vec::new(),
        }
        .freeze()
        .unwrap()
    }

    #[test]
    fn order_policy_picks_first_available() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0), ResourceId(1)], policy: SelectionPolicy::Order, persistent: false, mandatory: true };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![leaf_resource(0, None), leaf_resource(1, None)], task);
        let mut state = ScenarioState::init(&graph);

        let chosen = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 5);
        assert_eq!(chosen, Some((ResourceId(0), 1.0)));
        assert_eq!(state.load_at(ResourceId(0), 5), 1.0);
    }

    #[test]
    fn saturated_resource_is_skipped() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0), ResourceId(1)], policy: SelectionPolicy::Order, persistent: false, mandatory: true };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![leaf_resource(0, None), leaf_resource(1, None)], task);
        let mut state = ScenarioState::init(&graph);
        state.add_load(ResourceId(0), 5, 1.0);

        let chosen = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 5);
        assert_eq!(chosen, Some((ResourceId(1), 1.0)));
    }

    #[test]
    fn daily_cap_blocks_further_assignment() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![leaf_resource(0, Some(1))], task);
        let mut state = ScenarioState::init(&graph);

        assert_eq!(allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 0), Some((ResourceId(0), 1.0)));
        assert_eq!(allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 1), None);
    }

    #[test]
    fn persistent_set_reuses_same_resource() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0), ResourceId(1)], policy: SelectionPolicy::MinLoaded, persistent: true, mandatory: true };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![leaf_resource(0, None), leaf_resource(1, None)], task);
        let mut state = ScenarioState::init(&graph);

        let (first, _) = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 0).unwrap();
        let (second, _) = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn efficiency_scales_the_placed_share_and_load() {
        let mut half = leaf_resource(0, None);
        half.efficiency = 0.5;
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0)], policy: SelectionPolicy::Order, persistent: false, mandatory: true };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![half], task);
        let mut state = ScenarioState::init(&graph);

        let chosen = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 0);
        assert_eq!(chosen, Some((ResourceId(0), 0.5)));
        assert_eq!(state.load_at(ResourceId(0), 0), 0.5);
    }

    #[test]
    fn min_allocated_is_scoped_to_the_current_task_not_the_whole_scenario() {
        // r0 already carries heavy load on a *different* task; r1 is
        // scenario-wide idle. `minloaded` would prefer r1. `minallocated`
        // must ignore the other task's load entirely and still prefer r0,
        // since r0 has zero slots booked on *this* task so far.
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0), ResourceId(1)], policy: SelectionPolicy::MinAllocated, persistent: false, mandatory: true };
        let task_a = bare_task(vec![set]);
        let mut task_b = bare_task(Vec::new());
        task_b.id = TaskId(1);

        let graph = ProjectGraphBuilder {
            project: Some(base_project()),
            calendars: vec![Calendar::default()],
            resources: vec![leaf_resource(0, None), leaf_resource(1, None)],
            tasks: vec![task_a, task_b],
            accounts: Vec::new(),
            scenarios: Vec::new(),
        }
        .freeze()
        .unwrap();
        let mut state = ScenarioState::init(&graph);
        for slot in 0..5 {
            state.add_load(ResourceId(0), slot, 1.0);
            state.tasks.get_mut(&TaskId(1)).unwrap().assignments.push(crate::store::Assignment { resource: ResourceId(0), slot, share: 1.0 });
        }

        let chosen = allocate(&graph, &mut state, graph.task(TaskId(0)), 0, 10);
        assert_eq!(chosen, Some((ResourceId(0), 1.0)));
    }

    #[test]
    fn random_policy_is_deterministic_for_same_inputs() {
        let set = AllocationCandidateSet { candidates: vec![ResourceId(0), ResourceId(1)], policy: SelectionPolicy::Random { seed: 7 }, persistent: false, mandatory: false };
        let task = bare_task(vec![set]);
        let graph = build_graph(vec![leaf_resource(0, None), leaf_resource(1, None)], task);

        let mut state_a = ScenarioState::init(&graph);
        let mut state_b = ScenarioState::init(&graph);
        let a = allocate(&graph, &mut state_a, graph.task(TaskId(0)), 0, 3);
        let b = allocate(&graph, &mut state_b, graph.task(TaskId(0)), 0, 3);
        assert_eq!(a, b);
    }
}
