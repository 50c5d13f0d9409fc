//! Dependency & constraint resolver (spec §4.C).
//!
//! Computes a static `(ES, LF)` envelope per task from the project window,
//! fixed dates, `minStart`/`maxEnd`, and container containment — the floor
//! and ceiling every scheduled slot must respect. The *dynamic* half of
//! dependency enforcement (a successor must not start before a specific
//! predecessor's actual computed end) is not a fixed bound computable in
//! one upfront pass, since predecessors are scheduled concurrently with
//! everyone else by the driver's fixed-point loop (§4.F); the task
//! scheduler (§4.E) enforces it directly against each predecessor's
//! current [`crate::store::DerivedTaskState`], retrying (`Blocked`) until
//! the predecessor is `Scheduled`. This split is what lets `resolve_bounds`
//! run once, upfront, before any task has been placed.

use std::collections::HashMap;

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Error, Result};
use crate::ids::{SlotIndex, TaskId};
use crate::model::{ProjectGraph, Task};

#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub es: SlotIndex,
    pub lf: SlotIndex,
    /// `maxStart`: the task may never actually start after this slot, even
    /// though it plays no part in the ES/LF envelope itself (spec §3).
    /// `None` for containers, which only carry a derived ES/LF.
    pub max_start: Option<SlotIndex>,
    /// `minEnd`: the task may never actually end before this slot.
    pub min_end: Option<SlotIndex>,
}

/// Builds the combined `depends`/`precedes`/containment graph purely to
/// detect cycles and name every task in an offending one (structural
/// error, spec §4.C / §7).
fn check_acyclic(graph: &ProjectGraph) -> Result<()> {
    let mut dag: DiGraph<TaskId, ()> = DiGraph::new();
    let mut index_of: HashMap<TaskId, NodeIndex> = HashMap::new();

    for task in graph.tasks() {
        index_of.insert(task.id, dag.add_node(task.id));
    }
    for task in graph.tasks() {
        for dep in &task.depends {
            dag.add_edge(index_of[&dep.other], index_of[&task.id], ());
        }
        for dep in &task.precedes {
            dag.add_edge(index_of[&task.id], index_of[&dep.other], ());
        }
        for &child in &task.children {
            dag.add_edge(index_of[&child], index_of[&task.id], ());
        }
    }

    if toposort(&dag, None).is_err() {
        let cyclic: Vec<String> = kosaraju_scc(&dag)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.iter().map(|&n| dag[n].to_string()).collect())
            .unwrap_or_default();
        return Err(Error::DependencyCycle(cyclic));
    }

    Ok(())
}

fn leaf_bounds(task: &Task, es_floor: SlotIndex, lf_ceiling: SlotIndex) -> Bounds {
    let mut es = es_floor.max(task.bounds.min_start.unwrap_or(es_floor));
    if let Some(fixed_start) = task.bounds.start {
        es = es.max(fixed_start);
    }

    let mut lf = lf_ceiling.min(task.bounds.max_end.unwrap_or(lf_ceiling));
    if let Some(fixed_end) = task.bounds.end {
        lf = lf.min(fixed_end);
    }

    Bounds { es, lf, max_start: task.bounds.max_start, min_end: task.bounds.min_end }
}

/// Post-order (children before parent) aggregation of container bounds:
/// `ES = min(children.ES)`, `LF = max(children.LF)` (spec §4.C, invariant 3).
fn aggregate_container(task_id: TaskId, graph: &ProjectGraph, bounds: &mut HashMap<TaskId, Bounds>) {
    if bounds.contains_key(&task_id) {
        return;
    }
    let task = graph.task(task_id);
    for &child in &task.children {
        aggregate_container(child, graph, bounds);
    }
    if task.is_container() {
        let es = task.children.iter().map(|c| bounds[c].es).min().expect("container has children");
        let lf = task.children.iter().map(|c| bounds[c].lf).max().expect("container has children");
        bounds.insert(task_id, Bounds { es, lf, max_start: None, min_end: None });
    }
}

pub fn resolve_bounds(graph: &ProjectGraph) -> Result<HashMap<TaskId, Bounds>> {
    check_acyclic(graph)?;

    let es_floor = 0;
    let lf_ceiling = graph.project.total_slots();

    let mut bounds = HashMap::new();
    for task in graph.tasks() {
        if !task.is_container() {
            bounds.insert(task.id, leaf_bounds(task, es_floor, lf_ceiling));
        }
    }
    // Roots only (parent == None); the recursion fills every container
    // bottom-up regardless of which root we start from.
    for task in graph.tasks() {
        if task.parent.is_none() {
            aggregate_container(task.id, graph, &mut bounds);
        }
    }

    Ok(bounds)
}
