//! Booking export & re-ingestion (spec §6 "Persisted artefacts", §8
//! "Booking export fixed point").
//!
//! Produces a deterministic, re-ingestible textual form of every
//! computed assignment as `(task, resource, interval, sloppy)` triples.
//! Re-reading a freshly exported set and re-scheduling with it injected
//! as forced bookings must reproduce the same `(start, end, assignments)`
//! for every task — the round-trip property this module exists to make
//! checkable.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{ResourceId, SlotIndex, TaskId};
use crate::model::{Booking, SloppyLevel, Task};
use crate::store::ScenarioState;

/// One `(task, resource, interval, sloppy)` triple, collapsed from
/// contiguous same-resource assignment slots so the export doesn't blow
/// up into one record per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub task: TaskId,
    pub resource: ResourceId,
    pub start: SlotIndex,
    pub end: SlotIndex,
    pub sloppy: SloppyLevel,
}

/// Collapses `state`'s assignments for `task_id` into minimal contiguous
/// `(resource, [start, end))` runs, sorted by `(resource, start)` so the
/// output is deterministic regardless of the order slots were placed in.
fn collapse_runs(task_id: TaskId, state: &ScenarioState, sloppy: SloppyLevel) -> Vec<BookingRecord> {
    let derived = &state.tasks[&task_id];
    let mut slots: Vec<(ResourceId, SlotIndex)> = derived.assignments.iter().map(|a| (a.resource, a.slot)).collect();
    slots.sort_unstable_by_key(|&(r, s)| (r.0, s));
    slots.dedup();

    let mut records = Vec::new();
    let mut iter = slots.into_iter().peekable();
    while let Some((resource, start)) = iter.next() {
        let mut end = start + 1;
        while let Some(&(next_resource, next_slot)) = iter.peek() {
            if next_resource == resource && next_slot == end {
                end += 1;
                iter.next();
            } else {
                break;
            }
        }
        records.push(BookingRecord { task: task_id, resource, start, end, sloppy });
    }
    records
}

/// Exports every scheduled task's assignments as a flat, deterministically
/// ordered list of [`BookingRecord`]s (spec §4.H output, §6 persisted
/// artefacts).
pub fn export_bookings(graph: &crate::model::ProjectGraph, state: &ScenarioState, sloppy: SloppyLevel) -> Vec<BookingRecord> {
    let mut out = Vec::new();
    for task in graph.tasks() {
        if task.is_container() {
            continue;
        }
        out.extend(collapse_runs(task.id, state, sloppy));
    }
    out.sort_unstable_by_key(|r| (r.task.0, r.resource.0, r.start));
    out
}

/// Serializes `records` as JSON (the teacher already depends on
/// `serde_json`; this mirrors its `parser::parse_json_file` convention
/// one layer up, for writing rather than reading).
pub fn to_json(records: &[BookingRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn from_json(text: &str) -> Result<Vec<BookingRecord>> {
    Ok(serde_json::from_str(text)?)
}

/// Re-ingests `records` into `tasks`, replacing each task's `bookings`
/// with forced, `actual:scheduled` bookings built from the export. This
/// is what a caller does before re-running `schedule` to check the
/// fixed-point property: the second run should reproduce the same
/// `(start, end, assignments)` because every slot is now an immovable,
/// already-satisfied booking rather than something the allocator has to
/// re-derive.
pub fn import_bookings(tasks: &mut [Task], records: &[BookingRecord]) {
    use std::collections::HashMap;

    let mut by_task: HashMap<TaskId, Vec<Booking>> = HashMap::new();
    for record in records {
        by_task.entry(record.task).or_default().push(Booking {
            resource: record.resource,
            start: record.start,
            end: record.end,
            overhead: 0,
            actual_scheduled: true,
        });
    }

    for task in tasks.iter_mut() {
        if let Some(bookings) = by_task.remove(&task.id) {
            task.bookings = bookings;
        }
    }
}
