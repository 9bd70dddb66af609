use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::forge::ForgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Recorded result of one workflow step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub total_steps: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Successful step result: the value later steps consume, plus what to record
pub struct Completed<T> {
    pub value: T,
    pub message: String,
    pub data: Option<Value>,
}

impl<T> Completed<T> {
    pub fn new(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone)]
pub struct StepError {
    pub message: String,
    pub data: Option<Value>,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<ForgeError> for StepError {
    fn from(error: ForgeError) -> Self {
        StepError::new(error.to_string())
    }
}

/// Ordered log of step outcomes for one workflow invocation
pub struct WorkflowRun {
    workflow: &'static str,
    steps: Vec<StepOutcome>,
    started: Instant,
}

impl WorkflowRun {
    pub fn new(workflow: &'static str) -> Self {
        info!("Starting workflow {}", workflow);
        Self {
            workflow,
            steps: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Run one step and record its outcome. Returns the step's value on success.
    pub async fn step<T, F>(&mut self, name: &str, work: F) -> Option<T>
    where
        F: Future<Output = Result<Completed<T>, StepError>>,
    {
        debug!("{}: running step {}", self.workflow, name);
        let timer = Instant::now();
        match work.await {
            Ok(completed) => {
                self.record(
                    name,
                    StepStatus::Success,
                    completed.message,
                    completed.data,
                    timer.elapsed(),
                );
                Some(completed.value)
            }
            Err(error) => {
                self.record(
                    name,
                    StepStatus::Failed,
                    error.message,
                    error.data,
                    timer.elapsed(),
                );
                None
            }
        }
    }

    /// Record a step that cannot run because `prerequisite` did not succeed
    pub fn skip(&mut self, name: &str, prerequisite: &str) {
        self.record(
            name,
            StepStatus::Skipped,
            format!("skipped: prerequisite step {} failed", prerequisite),
            None,
            Duration::ZERO,
        );
    }

    pub fn record(
        &mut self,
        name: &str,
        status: StepStatus,
        message: impl Into<String>,
        data: Option<Value>,
        elapsed: Duration,
    ) {
        let message = message.into();
        if status == StepStatus::Failed {
            warn!("{}: step {} failed: {}", self.workflow, name, message);
        }
        self.steps.push(StepOutcome {
            name: name.to_string(),
            status,
            message,
            data,
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    pub fn summary(&self) -> StepSummary {
        let count = |status| self.steps.iter().filter(|s| s.status == status).count();
        StepSummary {
            total_steps: self.steps.len(),
            successful: count(StepStatus::Success),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
        }
    }

    /// True when every recorded step succeeded
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Success)
    }

    /// Freeze the run into its ordered outcomes
    pub fn finish(self) -> Vec<StepOutcome> {
        let summary = self.summary();
        info!(
            "Workflow {} finished in {}ms: {} succeeded, {} failed, {} skipped",
            self.workflow,
            self.started.elapsed().as_millis(),
            summary.successful,
            summary.failed,
            summary.skipped
        );
        self.steps
    }
}
