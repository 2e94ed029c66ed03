//! Submits subgraph checks and polls their workflow until it completes.
//!
//! The registry exposes no push mechanism for check results, so the poller
//! fetches the workflow at a fixed interval (see [`PollOptions`]) until its
//! status is terminal. Cancellation is cooperative: the token is observed
//! before each fetch, while a fetch is in flight and while sleeping.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::check::classify;
use crate::check::model::{CheckRequest, WorkflowHandle, WorkflowSnapshot, WorkflowStatus};
use crate::check::report::CheckReport;
use crate::client::CheckApi;
use crate::config::PollOptions;
use crate::error::{RegistryError, Result};

/// Runs subgraph checks against a [`CheckApi`].
#[derive(Debug, Clone)]
pub struct CheckPoller<C> {
    api: C,
    options: PollOptions,
}

impl<C: CheckApi> CheckPoller<C> {
    /// Create a poller with default options.
    pub fn new(api: C) -> Self {
        Self::with_options(api, PollOptions::default())
    }

    /// Create a poller with custom options.
    pub fn with_options(api: C, options: PollOptions) -> Self {
        Self { api, options }
    }

    /// The underlying API.
    pub fn api(&self) -> &C {
        &self.api
    }

    /// The poll options.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Submit a check, wait for its workflow to complete and classify the
    /// result.
    ///
    /// A report is returned for every terminal workflow, including failed
    /// ones; check [`CheckReport::has_errors`] to decide whether to proceed.
    /// Errors are reserved for transport failures, rejected submissions and
    /// cancellation.
    #[instrument(skip_all, fields(graph_ref = %request.graph_ref(), subgraph = %request.subgraph_name()))]
    pub async fn run_check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckReport> {
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);
        let handle = self.submit(request, cancel, deadline).await?;
        info!(workflow_id = %handle, target_url = ?handle.target_url(), "Check submitted");

        let snapshot = self.wait_until_complete(&handle, cancel, deadline).await?;
        let report = classify::extract(&snapshot);
        info!(
            workflow_id = %handle,
            status = %report.status,
            has_errors = report.has_errors(),
            "Check completed"
        );
        Ok(report)
    }

    /// Poll a submitted workflow until it reaches a terminal status.
    pub async fn wait_for(
        &self,
        handle: &WorkflowHandle,
        cancel: &CancellationToken,
    ) -> Result<WorkflowSnapshot> {
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);
        self.wait_until_complete(handle, cancel, deadline).await
    }

    async fn submit(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<WorkflowHandle> {
        let outcome = self
            .abortable(self.api.submit(request), cancel, deadline)
            .await?;
        outcome.into_handle().inspect_err(|err| {
            warn!(error = %err, "Check submission rejected");
        })
    }

    async fn wait_until_complete(
        &self,
        handle: &WorkflowHandle,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<WorkflowSnapshot> {
        let mut round: u32 = 0;
        let mut unrecognized_rounds: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }
            self.check_deadline(deadline)?;

            let snapshot = self
                .abortable(self.api.fetch(handle), cancel, deadline)
                .await?;
            info!(workflow_id = %handle, round, status = %snapshot.status, "Polled check workflow");

            match snapshot.status {
                WorkflowStatus::Passed => return Ok(snapshot),
                WorkflowStatus::Failed => {
                    info!(workflow_id = %handle, "Check workflow failed");
                    return Ok(snapshot);
                }
                WorkflowStatus::Blocked => {
                    warn!(workflow_id = %handle, "Check workflow blocked, reporting it as failed");
                    return Ok(snapshot);
                }
                WorkflowStatus::Pending => {
                    debug!(workflow_id = %handle, "Waiting for check workflow to complete");
                }
                WorkflowStatus::Unrecognized if unrecognized_rounds == 0 => {
                    unrecognized_rounds += 1;
                    warn!(workflow_id = %handle, "Unrecognized check workflow status, still waiting");
                }
                WorkflowStatus::Unrecognized => {
                    unrecognized_rounds += 1;
                    debug!(workflow_id = %handle, unrecognized_rounds, "Workflow status still unrecognized");
                }
            }

            round += 1;
            self.abortable(
                async {
                    tokio::time::sleep(self.options.interval).await;
                    Ok::<_, RegistryError>(())
                },
                cancel,
                deadline,
            )
            .await?;
        }
    }

    /// Run `operation` unless the token is cancelled or the deadline passes
    /// first; the losing future is dropped.
    async fn abortable<T>(
        &self,
        operation: impl Future<Output = Result<T>>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RegistryError::Cancelled),
            _ = deadline_elapsed(deadline) => Err(self.deadline_error()),
            result = operation => result,
        }
    }

    fn check_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.deadline_error()),
            _ => Ok(()),
        }
    }

    fn deadline_error(&self) -> RegistryError {
        RegistryError::DeadlineExceeded(self.options.timeout.unwrap_or(Duration::ZERO))
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::model::{
        ChangeSeverity, CompositionCheckTask, CompositionError, CompositionResult, Change,
        DownstreamCheckTask, OperationsCheckResult, OperationsCheckTask, TaskResult, TaskStatus,
    };
    use crate::check::report::{ReportLine, Severity};
    use crate::error::{Rejection, RejectionKind};
    use crate::testing::ScriptedCheckApi;
    use crate::types::GraphRef;

    fn request() -> CheckRequest {
        CheckRequest::new(
            GraphRef::new("my-graph", "current"),
            "products",
            "type Query { products: [String] }",
        )
    }

    fn composition_failure(message: &str) -> TaskResult {
        TaskResult::CompositionCheck(CompositionCheckTask {
            status: TaskStatus::Failed,
            result: Some(CompositionResult {
                errors: vec![CompositionError {
                    code: None,
                    message: message.to_string(),
                    locations: vec![],
                }],
            }),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_passed_with_composition_error() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::new(
                WorkflowStatus::Passed,
                vec![composition_failure("field X already exists")],
            ),
        ]);
        let poller = CheckPoller::new(api);

        let started = Instant::now();
        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(poller.api().fetch_count(), 2);
        assert_eq!(started.elapsed().as_secs(), 2);
        let errors: Vec<_> = report.errors().map(|(_, line)| line.clone()).collect();
        assert_eq!(errors, vec![ReportLine::error("field X already exists")]);
        assert_eq!(report.lines().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_ticks_wait_for_interval_each() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::new(WorkflowStatus::Passed, vec![]),
        ]);
        let poller = CheckPoller::with_options(
            api,
            PollOptions::new().with_interval(Duration::from_secs(5)),
        );

        let started = Instant::now();
        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(poller.api().fetch_count(), 4);
        assert_eq!(started.elapsed().as_secs(), 15);
        assert_eq!(report.status, WorkflowStatus::Passed);
        assert!(!report.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_statuses_stop_polling() {
        for status in [
            WorkflowStatus::Passed,
            WorkflowStatus::Failed,
            WorkflowStatus::Blocked,
        ] {
            let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
                WorkflowSnapshot::new(status, vec![]),
                WorkflowSnapshot::pending(),
            ]);
            let poller = CheckPoller::new(api);

            let report = poller
                .run_check(&request(), &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(poller.api().fetch_count(), 1, "status {}", status);
            assert_eq!(report.status, status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_status_keeps_polling() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
            WorkflowSnapshot::new(WorkflowStatus::Unrecognized, vec![]),
            WorkflowSnapshot::new(WorkflowStatus::Failed, vec![]),
        ]);
        let poller = CheckPoller::new(api);

        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(poller.api().fetch_count(), 2);
        assert!(report.workflow_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_unrecognized_run_still_completes() {
        let mut snapshots = vec![WorkflowSnapshot::new(WorkflowStatus::Unrecognized, vec![]); 20];
        snapshots.push(WorkflowSnapshot::new(WorkflowStatus::Passed, vec![]));
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(snapshots);
        let poller = CheckPoller::new(api);

        let started = Instant::now();
        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(poller.api().fetch_count(), 21);
        assert_eq!(started.elapsed().as_secs(), 40);
        assert_eq!(report.status, WorkflowStatus::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_status_bounded_by_timeout() {
        let api = ScriptedCheckApi::accepting("wf-1")
            .with_snapshots(vec![WorkflowSnapshot::new(WorkflowStatus::Unrecognized, vec![])]);
        let poller = CheckPoller::with_options(
            api,
            PollOptions::new().with_timeout(Duration::from_secs(9)),
        );

        let err = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::DeadlineExceeded(_)));
        // Fetches at t=0s, 2s, 4s, 6s and 8s.
        assert_eq!(poller.api().fetch_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_existing_workflow() {
        let api = ScriptedCheckApi::accepting("unused").with_snapshots(vec![
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::new(WorkflowStatus::Failed, vec![composition_failure("bad type")]),
        ]);
        let poller = CheckPoller::new(api);
        let handle = WorkflowHandle::new("my-graph", "wf-9");

        let snapshot = poller
            .wait_for(&handle, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Failed);
        assert_eq!(poller.api().fetch_count(), 3);
        assert_eq!(poller.api().submit_count(), 0);
        assert!(classify::extract(&snapshot).has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_honours_timeout() {
        let api = ScriptedCheckApi::accepting("unused");
        let poller = CheckPoller::with_options(
            api,
            PollOptions::new().with_timeout(Duration::from_secs(3)),
        );
        let handle = WorkflowHandle::new("my-graph", "wf-9");

        let err = poller
            .wait_for(&handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::DeadlineExceeded(_)));
        assert_eq!(poller.api().fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_never_polls() {
        let api = ScriptedCheckApi::rejecting(Rejection::new(
            RejectionKind::InvalidInput,
            "schema must not be empty",
        ));
        let poller = CheckPoller::new(api);

        let err = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RegistryError::Rejected(rejection) => {
                assert_eq!(rejection.kind, RejectionKind::InvalidInput);
                assert_eq!(rejection.message, "schema must not be empty");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(poller.api().fetch_count(), 0);
        assert_eq!(poller.api().submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_pending() {
        let cancel = CancellationToken::new();
        let api = ScriptedCheckApi::accepting("wf-1")
            .with_snapshots(vec![WorkflowSnapshot::pending(); 10])
            .cancel_after_fetches(3, cancel.clone());
        let poller = CheckPoller::new(api);

        let err = poller.run_check(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, RegistryError::Cancelled));
        assert!(err.is_aborted());
        assert_eq!(poller.api().fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_while_fetch_in_flight() {
        let cancel = CancellationToken::new();
        let api = ScriptedCheckApi::accepting("wf-1").hanging_fetch_after(0);
        let poller = CheckPoller::new(api);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = poller.run_check(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, RegistryError::Cancelled));
        assert_eq!(started.elapsed().as_secs(), 7);
        assert_eq!(poller.api().fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_fetch_in_flight() {
        let api = ScriptedCheckApi::accepting("wf-1").hanging_fetch_after(0);
        let poller = CheckPoller::with_options(
            api,
            PollOptions::new().with_timeout(Duration::from_secs(3)),
        );

        let started = Instant::now();
        let err = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::DeadlineExceeded(after) if after == Duration::from_secs(3)
        ));
        assert_eq!(started.elapsed().as_secs(), 3);
        assert_eq!(poller.api().fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_submit() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
            WorkflowSnapshot::new(WorkflowStatus::Passed, vec![]),
        ]);
        let poller = CheckPoller::new(api);

        let err = poller.run_check(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, RegistryError::Cancelled));
        assert_eq!(poller.api().submit_count(), 0);
        assert_eq!(poller.api().fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let api = ScriptedCheckApi::accepting("wf-1")
            .with_snapshots(vec![WorkflowSnapshot::pending(); 100]);
        let poller = CheckPoller::with_options(
            api,
            PollOptions::new().with_timeout(Duration::from_secs(5)),
        );

        let err = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::DeadlineExceeded(after) if after == Duration::from_secs(5)
        ));
        // Fetches at t=0s, 2s and 4s; the deadline fires during the next sleep.
        assert_eq!(poller.api().fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_propagates() {
        let api = ScriptedCheckApi::accepting("wf-1")
            .with_snapshots(vec![WorkflowSnapshot::pending()])
            .failing_fetch_after(1, "connection reset");
        let poller = CheckPoller::new(api);

        let err = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.message(), "connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_downstream_task_reports_dashboard_hint() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Failed,
            vec![TaskResult::DownstreamCheck(DownstreamCheckTask {
                status: TaskStatus::Failed,
                results: vec![],
            })],
        )]);
        let poller = CheckPoller::new(api);

        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1.severity, Severity::Error);
        assert!(lines[0].1.message.contains("dashboard"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_change_is_info_only() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Passed,
            vec![TaskResult::OperationsCheck(OperationsCheckTask {
                status: TaskStatus::Passed,
                result: Some(OperationsCheckResult {
                    changes: vec![Change {
                        code: "FIELD_ADDED".to_string(),
                        description: "Field `Query.reviews` added".to_string(),
                        severity: ChangeSeverity::Notice,
                        category: "ADDITION".to_string(),
                    }],
                    ..Default::default()
                }),
            })],
        )]);
        let poller = CheckPoller::new(api);

        let report = poller
            .run_check(&request(), &CancellationToken::new())
            .await
            .unwrap();

        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1.severity, Severity::Info);
        assert!(!report.has_errors());
    }
}
