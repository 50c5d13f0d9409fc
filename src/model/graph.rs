use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ids::{AccountId, CalendarId, ResourceId, ScenarioId, TaskId};
use crate::model::account::Account;
use crate::model::calendar::{Calendar, CalendarBitmap};
use crate::model::project::Project;
use crate::model::resource::{Resource, ResourceKind};
use crate::model::scenario::Scenario;
use crate::model::task::Task;

/// Everything needed to build a [`ProjectGraph`]. Plain, freely mutable
/// data; `freeze` performs the structural checks spec §4.A and §7 call
/// fatal and hands back an immutable graph.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraphBuilder {
    pub project: Option<Project>,
    pub calendars: Vec<Calendar>,
    pub resources: Vec<Resource>,
    pub tasks: Vec<Task>,
    pub accounts: Vec<Account>,
    pub scenarios: Vec<Scenario>,
}

/// The frozen, immutable structural graph: entities addressed by stable
/// integer ids, shared read-only across every scenario's scheduling run.
/// No mutation is possible after `freeze` — there is deliberately no
/// `&mut` accessor on this type, which is what makes §5's cross-scenario
/// parallelism sound without locks.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    pub project: Project,
    calendars: Vec<Calendar>,
    calendar_bitmaps: Vec<CalendarBitmap>,
    resources: Vec<Resource>,
    tasks: Vec<Task>,
    accounts: Vec<Account>,
    scenarios: Vec<Scenario>,
}

impl ProjectGraphBuilder {
    pub fn freeze(self) -> Result<ProjectGraph> {
        let project = self.project.ok_or_else(|| Error::UnknownReference("project".into(), "ProjectGraphBuilder"))?;

        if project.start_epoch_seconds >= project.end_epoch_seconds {
            return Err(Error::EmptyProjectWindow { start: project.start_epoch_seconds, end: project.end_epoch_seconds });
        }
        if 86_400 % project.slot_seconds.max(1) != 0 {
            return Err(Error::SlotDoesNotDivideDay { slot_seconds: project.slot_seconds });
        }

        for task in &self.tasks {
            if task.is_container() && (task.effort != 0 || !task.bookings.is_empty() || !task.allocations.is_empty()) {
                return Err(Error::ContainerCarriesOwnWork(task.name.clone()));
            }
            for dep in task.depends.iter().chain(task.precedes.iter()) {
                if self.tasks.get(dep.other.index()).is_none() {
                    return Err(Error::UnknownReference(dep.other.to_string(), "Task.depends/precedes"));
                }
            }
            for set in &task.allocations {
                for &r in &set.candidates {
                    if self.resources.get(r.index()).is_none() {
                        return Err(Error::UnknownReference(r.to_string(), "AllocationCandidateSet.candidates"));
                    }
                }
            }
        }

        for scenario in &self.scenarios {
            if let Some(parent) = scenario.parent {
                if self.scenarios.get(parent.index()).is_none() {
                    return Err(Error::UnknownReference(parent.to_string(), "Scenario.parent"));
                }
            }
        }
        for scenario in &self.scenarios {
            let mut current = scenario.id;
            let mut chain = vec![current];
            while let Some(parent) = self.scenarios[current.index()].parent {
                if chain.contains(&parent) {
                    return Err(Error::ScenarioCycle(chain.iter().map(|s| self.scenarios[s.index()].name.clone()).collect()));
                }
                chain.push(parent);
                current = parent;
            }
        }

        let total_slots = project.total_slots();
        let calendar_bitmaps: Vec<CalendarBitmap> =
            self.calendars.iter().map(|c| CalendarBitmap::build(c, total_slots, |s| project.local_day_position(s))).collect();

        Ok(ProjectGraph {
            project,
            calendars: self.calendars,
            calendar_bitmaps,
            resources: self.resources,
            tasks: self.tasks,
            accounts: self.accounts,
            scenarios: self.scenarios,
        })
    }
}

impl ProjectGraph {
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.index()]
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn account(&self, id: AccountId) -> &Account {
        &self.accounts[id.index()]
    }

    pub fn scenario(&self, id: ScenarioId) -> &Scenario {
        &self.scenarios[id.index()]
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn calendar_bitmap(&self, id: CalendarId) -> &CalendarBitmap {
        &self.calendar_bitmaps[id.index()]
    }

    pub fn calendar(&self, id: CalendarId) -> &Calendar {
        &self.calendars[id.index()]
    }

    /// The calendar bitmap a task's own slots must satisfy: the task's own
    /// shift if declared, else the project's default (calendar 0).
    pub fn task_calendar(&self, task: &Task) -> &CalendarBitmap {
        self.calendar_bitmap(task.calendar.unwrap_or(CalendarId(0)))
    }

    pub fn resource_calendar(&self, resource: &Resource) -> &CalendarBitmap {
        self.calendar_bitmap(resource.calendar)
    }

    /// Expands a resource (leaf or group) into the leaves it ultimately
    /// denotes, in declaration order.
    pub fn expand_leaves(&self, id: ResourceId) -> Vec<ResourceId> {
        match &self.resource(id).kind {
            ResourceKind::Leaf => vec![id],
            ResourceKind::Group { members } => members.iter().flat_map(|&m| self.expand_leaves(m)).collect(),
        }
    }
}
