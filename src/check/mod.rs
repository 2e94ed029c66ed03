//! Subgraph schema checks.
//!
//! A check runs in three steps: [`CheckPoller`] submits a [`CheckRequest`]
//! and polls the resulting workflow until it is terminal, then
//! [`classify::extract`] turns the terminal [`WorkflowSnapshot`] into a
//! [`CheckReport`].

pub mod classify;
pub mod model;
pub mod poller;
pub mod report;

pub use classify::extract;
pub use model::{
    CheckRequest, GitContext, HistoricParameters, SubmitOutcome, TaskKind, TaskResult,
    TaskStatus, WorkflowHandle, WorkflowSnapshot, WorkflowStatus,
};
pub use poller::CheckPoller;
pub use report::{CheckReport, ReportLine, Severity, TaskReport};
