//! Record of one scenario run.
//!
//! The verifier appends a [`StepRecord`] as each step finishes, so a failed
//! run still shows how far it got. Reports serialize to JSON for the CLI's
//! `--format json` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The scenario's steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    LaunchApp,
    TapPlay,
    ReadCount,
    Wait,
    NavigateBack,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::LaunchApp => "launch_app",
            Step::TapPlay => "tap_play",
            Step::ReadCount => "read_count",
            Step::Wait => "wait",
            Step::NavigateBack => "navigate_back",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub at: DateTime<Utc>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Still running.
    Pending,
    Passed,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    /// Counter value read right after playback started.
    pub initial_count: Option<u64>,
    /// Counter value read after the wait.
    pub final_count: Option<u64>,
    pub outcome: Outcome,
    /// Base64 PNG captured when the run failed, if one could be taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl ScenarioReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            initial_count: None,
            final_count: None,
            outcome: Outcome::Pending,
            screenshot: None,
        }
    }

    pub fn record(&mut self, step: Step, detail: impl Into<String>) {
        self.steps.push(StepRecord { step, at: Utc::now(), detail: detail.into() });
    }

    pub fn pass(&mut self) {
        self.outcome = Outcome::Passed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.outcome = Outcome::Failed { message: message.into() };
        self.finished_at = Some(Utc::now());
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    /// Human-readable summary, one line per step.
    pub fn to_text(&self) -> String {
        let mut out = format!("run {}\n", self.run_id);
        for record in &self.steps {
            out.push_str(&format!(
                "  {} {:<14} {}\n",
                record.at.format("%H:%M:%S%.3f"),
                record.step.name(),
                record.detail
            ));
        }
        match &self.outcome {
            Outcome::Pending => out.push_str("PENDING\n"),
            Outcome::Passed => out.push_str("PASSED\n"),
            Outcome::Failed { message } => out.push_str(&format!("FAILED: {message}\n")),
        }
        out
    }
}

impl Default for ScenarioReport {
    fn default() -> Self {
        Self::new()
    }
}
