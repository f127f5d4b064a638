//! The task registry: local job list, submission draft and the
//! operations that keep them in step with the runner.

use std::sync::Arc;

use chrono::Utc;
use crawldeck_core::error::{validate_job_id, CoreError, TransportFailure};
use crawldeck_core::form::SubmissionForm;
use crawldeck_core::job::{Job, JobReport, JobStatus, TaskStats};
use crawldeck_gateway::api::JobGateway;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::events::{RegistryEvent, RegistryEvents};
use crate::loading::{LoadingFlags, LoadingKind, LoadingSnapshot};
use crate::refresh::RefreshSummary;

/// Storage backend queried by `list_all` unless overridden.
pub const DEFAULT_DATABASE: &str = "sqlite";

/// Used when the runner rejects a submission without saying why.
const REJECTED_WITHOUT_MESSAGE: &str = "Task submission failed";

/// Backend health as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub status: String,
    pub message: String,
}

impl SystemStatus {
    /// Before the first health check.
    pub fn unknown() -> Self {
        Self {
            status: "unknown".into(),
            message: "Status unknown".into(),
        }
    }

    /// The health check itself failed.
    pub fn connection_failed() -> Self {
        Self {
            status: "error".into(),
            message: "System connection failed".into(),
        }
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Result of a synchronous crawl. Never stored in the job list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    jobs: Vec<Job>,
    form: SubmissionForm,
    current_job: Option<Job>,
    system_status: SystemStatus,
}

/// Client-side view of the runner's jobs.
///
/// Share it with `Arc<TaskRegistry>`. State sits behind an async `RwLock`
/// that is never held across a gateway call, so every mutation of the job
/// list is applied in one step. Readers get cloned snapshots.
pub struct TaskRegistry {
    gateway: Arc<dyn JobGateway>,
    database: String,
    state: RwLock<State>,
    loading: LoadingFlags,
    events: RegistryEvents,
}

impl TaskRegistry {
    pub fn new(gateway: Arc<dyn JobGateway>) -> Self {
        Self {
            gateway,
            database: DEFAULT_DATABASE.to_string(),
            state: RwLock::new(State::default()),
            loading: LoadingFlags::default(),
            events: RegistryEvents::default(),
        }
    }

    /// Query `database` (`sqlite`, `mysql` or `all`) in `list_all`.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.read().await.jobs.clone()
    }

    /// First local job with `job_id`.
    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.state
            .read()
            .await
            .jobs
            .iter()
            .find(|job| job.id() == Some(job_id))
            .cloned()
    }

    pub async fn running_jobs(&self) -> Vec<Job> {
        self.jobs_with_status(JobStatus::Running).await
    }

    pub async fn completed_jobs(&self) -> Vec<Job> {
        self.jobs_with_status(JobStatus::Completed).await
    }

    pub async fn failed_jobs(&self) -> Vec<Job> {
        self.jobs_with_status(JobStatus::Failed).await
    }

    pub async fn stats(&self) -> TaskStats {
        TaskStats::from_jobs(&self.state.read().await.jobs)
    }

    pub async fn system_status(&self) -> SystemStatus {
        self.state.read().await.system_status.clone()
    }

    pub fn loading(&self) -> LoadingSnapshot {
        self.loading.snapshot()
    }

    pub fn is_loading(&self, kind: LoadingKind) -> bool {
        self.loading.is_loading(kind)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Vec<Job> {
        self.state
            .read()
            .await
            .jobs
            .iter()
            .filter(|job| job.status == status)
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Draft and selection
    // -----------------------------------------------------------------------

    pub async fn form(&self) -> SubmissionForm {
        self.state.read().await.form.clone()
    }

    pub async fn update_form(&self, form: SubmissionForm) {
        self.state.write().await.form = form;
    }

    /// Put the draft back to its canonical defaults.
    pub async fn reset_form(&self) {
        self.state.write().await.form.reset();
        self.events.publish(RegistryEvent::FormReset);
    }

    pub async fn current_job(&self) -> Option<Job> {
        self.state.read().await.current_job.clone()
    }

    pub async fn set_current_job(&self, job: Option<Job>) {
        self.state.write().await.current_job = job;
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Run a crawl to completion. The result is returned, not stored.
    pub async fn submit_sync(&self, form: &SubmissionForm) -> Result<SyncOutcome, CoreError> {
        let _loading = self.loading.begin(LoadingKind::Submit);

        let response = self
            .gateway
            .submit_sync(form)
            .await
            .map_err(|e| transport("Failed to submit sync task", None, e))?;

        if !response.success {
            return Err(rejected(response.message));
        }

        tracing::info!(platform = %form.platform.as_str(), "Sync task finished");
        Ok(SyncOutcome {
            success: true,
            data: response.data,
            message: response.message,
        })
    }

    /// Queue a crawl and track it locally as a new running job at the
    /// front of the list.
    pub async fn submit_async(&self, form: &SubmissionForm) -> Result<Job, CoreError> {
        let _loading = self.loading.begin(LoadingKind::Submit);

        let response = self
            .gateway
            .submit_async(form)
            .await
            .map_err(|e| transport("Failed to submit async task", None, e))?;

        if !response.success {
            return Err(rejected(response.message));
        }

        let job = Job::submitted(
            response.task_times_id,
            response.message.unwrap_or_default(),
            form,
            Utc::now(),
        );
        if !job.has_valid_id() {
            tracing::warn!(job_id = ?job.job_id, "Runner accepted a task without a usable id");
        }

        self.state.write().await.jobs.insert(0, job.clone());
        self.events.publish(RegistryEvent::JobAdded(job.clone()));
        tracing::info!(job_id = ?job.job_id, platform = %form.platform.as_str(), "Async task queued");
        Ok(job)
    }

    /// Fetch one job's status and merge it into the local record with the
    /// same id, if there is one. The report is returned either way.
    pub async fn get_status(&self, job_id: &str) -> Result<JobReport, CoreError> {
        let job_id = validate_job_id(job_id)?;

        let report = self
            .gateway
            .get_status(job_id)
            .await
            .map_err(|e| transport("Failed to fetch task status", Some(job_id), e))?;

        if self.merge_by_id(job_id, &report).await.is_none() {
            tracing::debug!(job_id, "Status fetched for a task not in the local list");
        }
        Ok(report)
    }

    /// Replace the local list with the runner's. Failures are logged and
    /// leave the list as it was. Returns the new job count on success.
    pub async fn list_all(&self) -> Option<usize> {
        let _loading = self.loading.begin(LoadingKind::Tasks);

        match self.gateway.list_all(&self.database).await {
            Ok(reports) => {
                let now = Utc::now();
                let jobs: Vec<Job> = reports
                    .into_iter()
                    .map(|report| Job::from_report(report, now))
                    .collect();
                let count = jobs.len();
                self.state.write().await.jobs = jobs;
                self.events.publish(RegistryEvent::JobsReplaced { count });
                tracing::info!(count, database = %self.database, "Task list loaded");
                Some(count)
            }
            Err(e) => {
                tracing::error!(error = %e, database = %self.database, "Failed to load task list");
                None
            }
        }
    }

    /// Delete a job on the runner, then drop the local record.
    pub async fn delete(&self, job_id: &str) -> Result<(), CoreError> {
        let job_id = validate_job_id(job_id)?;

        self.gateway
            .delete(job_id)
            .await
            .map_err(|e| transport("Failed to delete task", Some(job_id), e))?;

        let removed = {
            let mut state = self.state.write().await;
            let removed = match state.jobs.iter().position(|job| job.id() == Some(job_id)) {
                Some(index) => {
                    state.jobs.remove(index);
                    true
                }
                None => false,
            };
            if state.current_job.as_ref().and_then(Job::id) == Some(job_id) {
                state.current_job = None;
            }
            removed
        };

        if removed {
            self.events.publish(RegistryEvent::JobRemoved {
                job_id: job_id.to_string(),
            });
        }
        tracing::info!(job_id, removed, "Task deleted");
        Ok(())
    }

    /// Re-fetch every local running job concurrently. Each result merges
    /// as it arrives; one failure does not affect the others.
    pub async fn refresh_running_tasks(&self) -> RefreshSummary {
        let ids: Vec<String> = {
            let state = self.state.read().await;
            state
                .jobs
                .iter()
                .filter(|job| job.status == JobStatus::Running && job.has_valid_id())
                .filter_map(|job| job.job_id.clone())
                .collect()
        };

        if ids.is_empty() {
            tracing::debug!("No running tasks to refresh");
            return RefreshSummary::default();
        }

        let results = join_all(ids.into_iter().map(|job_id| async move {
            let result = self.get_status(&job_id).await;
            (job_id, result)
        }))
        .await;

        let summary = RefreshSummary::from_results(results);
        for failure in &summary.failed {
            tracing::warn!(job_id = %failure.job_id, error = %failure.message, "Task refresh failed");
        }
        tracing::info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "Running tasks refreshed",
        );
        summary
    }

    /// Merge a report pushed over the realtime channel. Reports without a
    /// usable id, or for jobs not held locally, are ignored.
    pub async fn apply_report(&self, report: &JobReport) -> bool {
        let Some(job_id) = report.job_id.as_deref().filter(|id| validate_job_id(id).is_ok())
        else {
            tracing::debug!("Ignoring pushed report without a usable task id");
            return false;
        };
        self.merge_by_id(job_id, report).await.is_some()
    }

    /// Ask the runner for its health. A failed check records the
    /// connection-failed status instead of returning an error.
    pub async fn refresh_system_status(&self) -> SystemStatus {
        let _loading = self.loading.begin(LoadingKind::Status);

        let status = match self.gateway.health().await {
            Ok(health) => SystemStatus {
                status: health.status,
                message: health.message,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch system status");
                SystemStatus::connection_failed()
            }
        };

        self.state.write().await.system_status = status.clone();
        status
    }

    /// Merge `report` into the first local job keyed `job_id`. Returns the
    /// merged record, or `None` when no such job exists.
    async fn merge_by_id(&self, job_id: &str, report: &JobReport) -> Option<Job> {
        let now = Utc::now();
        let merged = {
            let mut state = self.state.write().await;
            let job = state.jobs.iter_mut().find(|job| job.id() == Some(job_id))?;
            job.merge_report(report, now);
            let merged = job.clone();
            if state.current_job.as_ref().and_then(Job::id) == Some(job_id) {
                state.current_job = Some(merged.clone());
            }
            merged
        };

        tracing::debug!(job_id, status = %merged.status, "Task merged");
        self.events.publish(RegistryEvent::JobUpdated(merged.clone()));
        Some(merged)
    }
}

fn transport(context: &str, job_id: Option<&str>, failure: TransportFailure) -> CoreError {
    tracing::warn!(job_id = ?job_id, error = %failure, "{context}");
    CoreError::Transport(failure)
}

fn rejected(message: Option<String>) -> CoreError {
    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| REJECTED_WITHOUT_MESSAGE.to_string());
    tracing::warn!(message = %message, "Task submission rejected");
    CoreError::SubmissionRejected(message)
}
