//! Job records as held locally and as reported by the job runner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::form::SubmissionForm;
use crate::types::{is_valid_job_id, lenient_timestamp, Timestamp};

/// Lifecycle state of a crawl job.
///
/// `Pending` is what the runner reports before the crawler process starts;
/// jobs created by this client start at `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Terminal states only "transition" to themselves.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() || self == next
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Unknown status strings become `None` so one odd record cannot fail a
/// whole task list.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<JobStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match s.parse() {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring job status");
            None
        }
    }))
}

/// A `formData` object that does not decode becomes `None`; the rest of
/// the report still applies.
fn lenient_form<'de, D>(deserializer: D) -> Result<Option<SubmissionForm>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(form) => Some(form),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring undecodable formData");
            None
        }
    }))
}

/// A job record exactly as the runner reports it.
///
/// Returned by `GET /crawler/task/{id}` and, as list items, by
/// `GET /crawler/tasks`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    #[serde(rename = "task_times_id", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<Timestamp>,
    #[serde(rename = "formData", default, deserialize_with = "lenient_form")]
    pub form: Option<SubmissionForm>,
}

/// A job as tracked locally. Both timestamps are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "task_times_id")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub message: String,
    pub result: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Parameters that produced the job, copied at submit time.
    #[serde(rename = "formData")]
    pub form_snapshot: Option<SubmissionForm>,
}

impl Job {
    /// Synthesize the local record for a freshly accepted async submission.
    pub fn submitted(
        job_id: Option<String>,
        message: impl Into<String>,
        form: &SubmissionForm,
        now: Timestamp,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            message: message.into(),
            result: None,
            created_at: now,
            updated_at: now,
            form_snapshot: Some(form.clone()),
        }
    }

    /// Build a local record from a server report, back-filling missing
    /// timestamps with `now`.
    pub fn from_report(report: JobReport, now: Timestamp) -> Self {
        Self {
            job_id: report.job_id,
            status: report.status.unwrap_or(JobStatus::Pending),
            message: report.message.unwrap_or_default(),
            result: report.result,
            created_at: report.created_at.unwrap_or(now),
            updated_at: report.updated_at.unwrap_or(now),
            form_snapshot: report.form,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Whether this job's id can key status and delete requests.
    pub fn has_valid_id(&self) -> bool {
        self.id().is_some_and(is_valid_job_id)
    }

    /// Overlay the fields present in `report` onto this record.
    ///
    /// The id is never overwritten. `updated_at` becomes the reported time
    /// (or `now`) but never moves backwards. A status change out of a
    /// terminal state is ignored; returns `false` in that case.
    pub fn merge_report(&mut self, report: &JobReport, now: Timestamp) -> bool {
        let mut status_applied = true;
        if let Some(next) = report.status {
            if self.status.can_transition_to(next) {
                self.status = next;
            } else {
                tracing::warn!(
                    job_id = ?self.job_id,
                    current = %self.status,
                    reported = %next,
                    "Ignoring status change out of terminal state",
                );
                status_applied = false;
            }
        }
        if let Some(message) = &report.message {
            self.message = message.clone();
        }
        if let Some(result) = &report.result {
            self.result = Some(result.clone());
        }
        if let Some(created_at) = report.created_at {
            self.created_at = created_at;
        }
        if let Some(form) = &report.form {
            self.form_snapshot = Some(form.clone());
        }
        self.updated_at = self.updated_at.max(report.updated_at.unwrap_or(now));
        status_applied
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStats {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        jobs.iter().fold(
            Self {
                total: jobs.len(),
                ..Default::default()
            },
            |mut stats, job| {
                match job.status {
                    JobStatus::Running => stats.running += 1,
                    JobStatus::Completed => stats.completed += 1,
                    JobStatus::Failed => stats.failed += 1,
                    JobStatus::Pending => {}
                }
                stats
            },
        )
    }
}
