use thiserror::Error;

/// Errors that abort construction of the structural graph itself.
///
/// These correspond to spec §7's "structural" error kind: they are fatal
/// before any scenario is scheduled, as opposed to `Diagnostic`s (see
/// [`crate::diagnostics`]) which are collected per scenario and never abort
/// other scenarios.
#[derive(Debug, Error)]
pub enum Error {
    #[error("project window is empty or inverted: start {start} >= end {end}")]
    EmptyProjectWindow { start: i64, end: i64 },

    #[error("slot duration {slot_seconds}s does not evenly divide one day")]
    SlotDoesNotDivideDay { slot_seconds: i64 },

    #[error("dependency cycle detected among tasks: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("scenario inheritance cycle detected: {0:?}")]
    ScenarioCycle(Vec<String>),

    #[error("unknown reference '{0}' in {1}")]
    UnknownReference(String, &'static str),

    #[error("container task '{0}' carries its own effort/bookings/allocations")]
    ContainerCarriesOwnWork(String),

    #[error("failed to serialize/deserialize booking export: {0}")]
    Export(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
