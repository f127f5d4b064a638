//! Result of a bulk status refresh.

use crawldeck_core::error::CoreError;
use crawldeck_core::job::{JobReport, JobStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshedJob {
    pub job_id: String,
    /// Status the runner reported, if it sent a recognizable one.
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRefresh {
    pub job_id: String,
    pub message: String,
}

/// Per-job outcomes of `refresh_running_tasks`. Individual failures never
/// fail the refresh as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub refreshed: Vec<RefreshedJob>,
    pub failed: Vec<FailedRefresh>,
}

impl RefreshSummary {
    pub fn from_results(results: Vec<(String, Result<JobReport, CoreError>)>) -> Self {
        let mut summary = Self::default();
        for (job_id, result) in results {
            match result {
                Ok(report) => summary.refreshed.push(RefreshedJob {
                    job_id,
                    status: report.status,
                }),
                Err(e) => summary.failed.push(FailedRefresh {
                    job_id,
                    message: e.to_string(),
                }),
            }
        }
        summary
    }

    /// Number of jobs a status fetch was issued for.
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
