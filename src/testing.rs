//! Testing utilities for code built on the check workflow.
//!
//! [`ScriptedCheckApi`] and [`MemoryRegistry`] stand in for the Platform API
//! so the poller and the subgraph update can be exercised without a network.
//! Combine them with `#[tokio::test(start_paused = true)]` so poll intervals
//! cost no wall time.
//!
//! # Example
//!
//! ```
//! use apollo_studio_provider::check::{CheckPoller, CheckRequest, WorkflowSnapshot, WorkflowStatus};
//! use apollo_studio_provider::testing::ScriptedCheckApi;
//! use apollo_studio_provider::types::GraphRef;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let api = ScriptedCheckApi::accepting("wf-1")
//!     .with_snapshots(vec![WorkflowSnapshot::new(WorkflowStatus::Passed, vec![])]);
//! let poller = CheckPoller::new(api);
//!
//! let request = CheckRequest::new(GraphRef::new("my-graph", "current"), "products", "type Query { a: Int }");
//! let report = poller.run_check(&request, &CancellationToken::new()).await.unwrap();
//! assert!(!report.has_errors());
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::check::model::{CheckRequest, SubmitOutcome, WorkflowHandle, WorkflowSnapshot};
use crate::check::report::CheckReport;
use crate::client::CheckApi;
use crate::diagnostic::{Diagnostic, DiagnosticSeverity};
use crate::error::{Rejection, RegistryError, Result};
use crate::subgraph::SubgraphRegistry;
use crate::types::{GraphRef, PartialSchema, PublishOutcome, Subgraph, SubgraphPublish};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`CheckApi`] that replays scripted responses.
///
/// Snapshots are returned in order; once the script is exhausted the last
/// snapshot repeats (a pending one if none was scripted).
pub struct ScriptedCheckApi {
    submit: Submit,
    snapshots: Mutex<VecDeque<WorkflowSnapshot>>,
    last: Mutex<Option<WorkflowSnapshot>>,
    submitted: Mutex<Vec<CheckRequest>>,
    submits: AtomicUsize,
    fetches: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
    fail_after: Option<(usize, String)>,
    hang_after: Option<usize>,
}

enum Submit {
    Accept(String),
    Reject(Rejection),
}

impl ScriptedCheckApi {
    /// Accept every submission with the given workflow id.
    pub fn accepting(workflow_id: impl Into<String>) -> Self {
        Self::with_submit(Submit::Accept(workflow_id.into()))
    }

    /// Reject every submission.
    pub fn rejecting(rejection: Rejection) -> Self {
        Self::with_submit(Submit::Reject(rejection))
    }

    fn with_submit(submit: Submit) -> Self {
        Self {
            submit,
            snapshots: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            submits: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            cancel_after: None,
            fail_after: None,
            hang_after: None,
        }
    }

    /// Script the snapshots returned by successive fetches.
    pub fn with_snapshots(self, snapshots: Vec<WorkflowSnapshot>) -> Self {
        lock(&self.snapshots).extend(snapshots);
        self
    }

    /// Cancel `token` once `fetches` fetches have completed.
    pub fn cancel_after_fetches(mut self, fetches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, token));
        self
    }

    /// Fail every fetch after the first `fetches` with a transport error.
    pub fn failing_fetch_after(mut self, fetches: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((fetches, message.into()));
        self
    }

    /// Never answer any fetch after the first `fetches`; the call stays in
    /// flight until the caller drops it.
    pub fn hanging_fetch_after(mut self, fetches: usize) -> Self {
        self.hang_after = Some(fetches);
        self
    }

    /// Number of submissions so far.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Number of fetches so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Every submitted request, in order.
    pub fn submitted(&self) -> Vec<CheckRequest> {
        lock(&self.submitted).clone()
    }

    fn next_snapshot(&self) -> WorkflowSnapshot {
        let mut last = lock(&self.last);
        match lock(&self.snapshots).pop_front() {
            Some(snapshot) => {
                *last = Some(snapshot.clone());
                snapshot
            }
            None => last.clone().unwrap_or_else(WorkflowSnapshot::pending),
        }
    }
}

#[async_trait]
impl CheckApi for ScriptedCheckApi {
    async fn submit(&self, request: &CheckRequest) -> Result<SubmitOutcome> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        lock(&self.submitted).push(request.clone());
        Ok(match &self.submit {
            Submit::Accept(workflow_id) => SubmitOutcome::Accepted(WorkflowHandle::new(
                request.graph_ref().graph_id(),
                workflow_id.clone(),
            )),
            Submit::Reject(rejection) => SubmitOutcome::Rejected(rejection.clone()),
        })
    }

    async fn fetch(&self, _handle: &WorkflowHandle) -> Result<WorkflowSnapshot> {
        let fetches = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if matches!(self.hang_after, Some(after) if fetches > after) {
            std::future::pending::<()>().await;
        }
        if let Some((after, message)) = &self.fail_after {
            if fetches > *after {
                return Err(RegistryError::Http(message.clone()));
            }
        }
        let snapshot = self.next_snapshot();
        if let Some((after, token)) = &self.cancel_after {
            if fetches >= *after {
                token.cancel();
            }
        }
        Ok(snapshot)
    }
}

/// An in-memory [`SubgraphRegistry`] that records every publish.
///
/// Subgraphs start at revision `1`; each publish to an existing subgraph
/// bumps the revision by one.
#[derive(Default)]
pub struct MemoryRegistry {
    subgraphs: Mutex<HashMap<(String, String), Subgraph>>,
    publishes: Mutex<Vec<SubgraphPublish>>,
}

impl MemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subgraph at revision `1`.
    pub fn with_subgraph(self, graph_ref: &GraphRef, name: &str, sdl: &str, url: &str) -> Self {
        lock(&self.subgraphs).insert(
            (graph_ref.to_string(), name.to_string()),
            subgraph(name, sdl, url, "1"),
        );
        self
    }

    /// Every publish, in order.
    pub fn publishes(&self) -> Vec<SubgraphPublish> {
        lock(&self.publishes).clone()
    }
}

fn subgraph(name: &str, sdl: &str, url: &str, revision: &str) -> Subgraph {
    Subgraph {
        name: name.to_string(),
        revision: revision.to_string(),
        url: Some(url.to_string()),
        active_partial_schema: PartialSchema {
            sdl: sdl.to_string(),
            created_at: None,
            is_live: true,
        },
    }
}

#[async_trait]
impl SubgraphRegistry for MemoryRegistry {
    async fn publish_subgraph(&self, publish: &SubgraphPublish) -> Result<PublishOutcome> {
        lock(&self.publishes).push(publish.clone());

        let key = (publish.graph_ref.to_string(), publish.name.clone());
        let mut subgraphs = lock(&self.subgraphs);
        let was_created = match subgraphs.get_mut(&key) {
            Some(existing) => {
                let revision = existing.revision.parse::<u64>().unwrap_or(0) + 1;
                *existing = subgraph(&publish.name, &publish.schema, &publish.url, &revision.to_string());
                false
            }
            None => {
                subgraphs.insert(key, subgraph(&publish.name, &publish.schema, &publish.url, "1"));
                true
            }
        };
        Ok(PublishOutcome {
            was_created,
            was_updated: !was_created,
            updated_gateway: true,
        })
    }

    async fn get_subgraph(&self, graph_ref: &GraphRef, name: &str) -> Result<Subgraph> {
        lock(&self.subgraphs)
            .get(&(graph_ref.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("subgraph '{}:{}'", graph_ref, name)))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect()
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = errors(diagnostics);
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        !errors(diagnostics).is_empty(),
        "Expected at least one error, but got none"
    );
}

/// Assert that an error diagnostic mentions `substring` in its summary or
/// detail.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = errors(diagnostics);
    let matches = errors.iter().any(|d| {
        d.summary.contains(substring)
            || d.detail.as_deref().is_some_and(|detail| detail.contains(substring))
    });
    assert!(
        matches,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        errors
            .iter()
            .map(|d| (&d.summary, &d.detail))
            .collect::<Vec<_>>()
    );
}

/// Assert that a check report has no error line.
///
/// # Panics
///
/// Panics if any line is an error.
pub fn assert_report_clean(report: &CheckReport) {
    let errors: Vec<_> = report.errors().map(|(_, line)| &line.message).collect();
    assert!(
        errors.is_empty(),
        "Expected a clean check report, but got {} error line(s): {:?}",
        errors.len(),
        errors
    );
}

/// Assert that a check report has an error line containing `substring`.
///
/// # Panics
///
/// Panics if no error line matches.
pub fn assert_report_error_contains(report: &CheckReport, substring: &str) {
    assert!(
        report
            .errors()
            .any(|(_, line)| line.message.contains(substring)),
        "Expected an error line containing '{}', got: {:?}",
        substring,
        report
            .errors()
            .map(|(kind, line)| format!("[{}] {}", kind, line.message))
            .collect::<Vec<_>>()
    );
}
