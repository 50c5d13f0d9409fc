//! Structured diagnostics (spec §4.I, §6, §7).

use serde::{Deserialize, Serialize};

use crate::ids::{ResourceId, ScenarioId, SlotIndex, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Collected, never aborts.
    Advisory,
    /// Per-task; marks that task infeasible but other tasks keep scheduling.
    Constraint,
    /// Aborts the whole scenario; partial state is discarded.
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    Task(TaskId),
    Resource(ResourceId),
    Tasks(Vec<TaskId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    EsAfterLf,
    MandatoryAllocationUnsatisfiable,
    ContainerHullViolation,
    ResourceOversubscribed,
    NegativeRemainingEffort,
    UnusedResource,
    UnderUtilization,
    SloppyBookingRelaxed,
    Cancelled,
    DeadlineExceeded,
    StrictBookingExceedsEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: Kind,
    pub refs: Vec<EntityRef>,
    pub scenario: ScenarioId,
    pub slot: Option<SlotIndex>,
    pub message: String,
}

impl Diagnostic {
    pub fn constraint(scenario: ScenarioId, kind: Kind, refs: Vec<EntityRef>, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Constraint, kind, refs, scenario, slot: None, message: message.into() }
    }

    pub fn advisory(scenario: ScenarioId, kind: Kind, refs: Vec<EntityRef>, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Advisory, kind, refs, scenario, slot: None, message: message.into() }
    }

    pub fn runtime(scenario: ScenarioId, kind: Kind, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Runtime, kind, refs: Vec::new(), scenario, slot: None, message: message.into() }
    }

    pub fn with_slot(mut self, slot: SlotIndex) -> Self {
        self.slot = Some(slot);
        self
    }
}
