use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use crate::kestra::{Execution, TaskRun};

/// Task ids of the remediation attempts, in order. The flow retries the core
/// fix step at most once, under exactly these two ids; later entries override
/// earlier ones when deriving the attempt count and exit code.
const ATTEMPT_TASK_IDS: [&str; 2] = ["attempt_0", "attempt_1"];
/// Task id of the verification step that gates pipeline success.
const GUARD_TASK_ID: &str = "guard_checks";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    Failed,
    Running,
    Pending,
}

impl PipelineStatus {
    /// Map an engine state token to a display status. Unknown or missing
    /// tokens read as pending.
    fn from_engine(token: Option<&str>) -> Self {
        match token {
            Some("SUCCESS") => Self::Success,
            Some("FAILED") => Self::Failed,
            Some("RUNNING") => Self::Running,
            _ => Self::Pending,
        }
    }
}

/// Flat, display-ready view of one execution. Built fresh on every request
/// and never persisted.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub id: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub repo: String,
    pub status: PipelineStatus,
    pub attempts: u32,
    pub exit_code: Option<i64>,
    pub guard_status: PipelineStatus,
    pub created_at: String,
}

impl PipelineSummary {
    /// Flatten a raw execution record. Total for any well-formed record, no
    /// matter which nested objects are missing.
    pub fn from_execution(exec: &Execution) -> Self {
        let state = exec.state.as_ref();
        let status = PipelineStatus::from_engine(state.and_then(|s| s.current.as_deref()));

        let payload = exec.inputs.as_ref().and_then(|i| i.payload.as_ref());
        let issue = payload.and_then(|p| p.issue.as_ref());
        let issue_number = issue.and_then(|i| i.number).unwrap_or(0);
        let issue_title = issue
            .and_then(|i| i.title.as_deref())
            .filter(|t| !t.is_empty())
            .unwrap_or("Unknown issue")
            .to_string();
        let repo = payload
            .and_then(|p| p.repository.as_ref())
            .and_then(|r| r.full_name.as_deref())
            .filter(|r| !r.is_empty())
            .unwrap_or("unknown/repo")
            .to_string();

        // Single scan; a duplicate taskId overwrites the earlier entry. The
        // engine treats task ids as unique per execution, so the last write
        // winning is the upstream contract, not a tie-break we invented.
        let mut by_task: HashMap<&str, &TaskRun> = HashMap::new();
        for run in exec.task_run_list.as_deref().unwrap_or(&[]) {
            if let Some(task_id) = run.task_id.as_deref() {
                if !task_id.is_empty() {
                    by_task.insert(task_id, run);
                }
            }
        }

        let mut attempts = 0;
        let mut exit_code = None;
        for (index, task_id) in ATTEMPT_TASK_IDS.iter().enumerate() {
            if let Some(run) = by_task.get(task_id) {
                attempts = index as u32 + 1;
                // Unconditional: a later attempt without an exit code clears
                // the earlier one.
                exit_code = run
                    .outputs
                    .as_ref()
                    .and_then(|o| o.outputs.as_ref())
                    .and_then(|o| o.exit_code);
            }
        }

        // A guard that has started but not concluded reads as running, while
        // a guard the engine has not scheduled at all is still pending.
        let guard_status = match by_task.get(GUARD_TASK_ID) {
            None => PipelineStatus::Pending,
            Some(run) => match run.state.as_ref().and_then(|s| s.current.as_deref()) {
                Some("SUCCESS") => PipelineStatus::Success,
                Some("FAILED") => PipelineStatus::Failed,
                _ => PipelineStatus::Running,
            },
        };

        let created_at = state
            .and_then(|s| s.start_date.as_deref())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        Self {
            id: exec.id.clone(),
            issue_number,
            issue_title,
            repo,
            status,
            attempts,
            exit_code,
            guard_status,
            created_at,
        }
    }
}

/// Headline counts for the dashboard tiles. Pending executions only show up
/// in the total.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub success: usize,
    pub running: usize,
    pub failed: usize,
}

impl DashboardStats {
    pub fn tally(pipelines: &[PipelineSummary]) -> Self {
        let mut stats = Self { total: pipelines.len(), ..Default::default() };
        for pipeline in pipelines {
            match pipeline.status {
                PipelineStatus::Success => stats.success += 1,
                PipelineStatus::Running => stats.running += 1,
                PipelineStatus::Failed => stats.failed += 1,
                PipelineStatus::Pending => {}
            }
        }
        stats
    }
}
