//! The loop-count check.
//!
//! [`LoopCountVerifier`] starts the looping video, reads the on-screen loop
//! counter, waits a fixed real-time interval and reads it again. The check
//! passes when the first reading is positive and the second is strictly
//! larger. Every failure surfaces immediately; nothing is retried.
//!
//! ```no_run
//! use std::sync::Arc;
//! use loopcheck_core::agent_driver::AgentDriver;
//! use loopcheck_core::config::ScenarioConfig;
//! use loopcheck_core::verifier::LoopCountVerifier;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScenarioConfig::load();
//! let driver = AgentDriver::connect(&config.agent_host, config.agent_port).await?;
//!
//! let verifier = LoopCountVerifier::new(Arc::new(driver), config);
//! let report = verifier.run_scenario().await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use base64::Engine;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::{AppError, AppManager};
use crate::config::ScenarioConfig;
use crate::driver::{AutomationDriver, DriverError};
use crate::element::ElementQuery;
use crate::loop_count::extract_count;
use crate::report::{ScenarioReport, Step};
use crate::wait::{wait_for_element, WaitOutcome};

/// Why a scenario stopped.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// The app could not be launched; nothing else was attempted.
    #[error("setup failed: {0}")]
    Setup(#[from] AppError),

    /// The automation backend failed a command or lost its connection.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The counter label never appeared within the timeout.
    #[error("'{identifier}' was not visible within {timeout_ms}ms")]
    ElementNotFound { identifier: String, timeout_ms: u64 },

    /// A reading did not meet its expectation.
    #[error("{message} (first: {first}, second: {second:?})")]
    Assertion { message: String, first: u64, second: Option<u64> },
}

impl ScenarioError {
    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ScenarioError::Assertion { .. } => 1,
            ScenarioError::ElementNotFound { .. } => 2,
            ScenarioError::Setup(_) | ScenarioError::Driver(_) => 3,
        }
    }
}

/// A failed run: the error plus the report up to the point of failure.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ScenarioFailure {
    #[source]
    pub error: ScenarioError,
    pub report: ScenarioReport,
}

/// The counter is a text view; containers that inherit its identifier are skipped.
pub const COUNTER_ELEMENT_TYPE: &str = "StaticText";

pub struct LoopCountVerifier {
    driver: Arc<dyn AutomationDriver>,
    config: ScenarioConfig,
    app: Option<Arc<AppManager>>,
}

impl LoopCountVerifier {
    pub fn new(driver: Arc<dyn AutomationDriver>, config: ScenarioConfig) -> Self {
        Self { driver, config, app: None }
    }

    /// Launch the app through `app` (if it is not already up) before each run.
    pub fn with_app_manager(mut self, app: Arc<AppManager>) -> Self {
        self.app = Some(app);
        self
    }

    /// Waits for the loop counter label and returns the number in it.
    ///
    /// Blocks until the label is present or the element timeout passes.
    pub async fn read_loop_count(&self) -> Result<u64, ScenarioError> {
        let query = ElementQuery::id(&self.config.loop_counter_identifier).of_type(COUNTER_ELEMENT_TYPE);
        let outcome = wait_for_element(
            self.driver.as_ref(),
            &query,
            self.config.element_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        match outcome {
            WaitOutcome::Found { element, elapsed } => {
                let text = element.display_text();
                let count = extract_count(text);
                debug!(label = text, count, waited_ms = elapsed.as_millis() as u64, "loop counter read");
                Ok(count)
            }
            WaitOutcome::NotFound { .. } => Err(ScenarioError::ElementNotFound {
                identifier: query.identifier,
                timeout_ms: self.config.element_timeout_ms,
            }),
        }
    }

    /// Runs the whole check and returns its report.
    ///
    /// Steps: launch the app if a manager is attached, tap the play button,
    /// read the counter (must be > 0), sleep, read again (must be greater
    /// than the first reading), navigate back.
    pub async fn run_scenario(&self) -> Result<ScenarioReport, ScenarioFailure> {
        let mut report = ScenarioReport::new();
        let span = info_span!("loop_scenario", run_id = %report.run_id);

        match self.run_steps(&mut report).instrument(span).await {
            Ok(()) => {
                report.pass();
                info!(run_id = %report.run_id, "loop count check passed");
                Ok(report)
            }
            Err(error) => {
                warn!(run_id = %report.run_id, %error, "loop count check failed");
                if matches!(error, ScenarioError::Assertion { .. } | ScenarioError::ElementNotFound { .. }) {
                    report.screenshot = self.capture_screenshot().await;
                }
                report.fail(error.to_string());
                Err(ScenarioFailure { error, report })
            }
        }
    }

    async fn run_steps(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        if let Some(app) = &self.app {
            app.launch_if_needed().await?;
            report.record(Step::LaunchApp, app.bundle_id());
        }

        let label = &self.config.play_button_label;
        self.driver
            .tap_label(label, Some(self.config.tap_timeout()))
            .instrument(info_span!("scenario_step", step = Step::TapPlay.name()))
            .await?;
        report.record(Step::TapPlay, format!("tapped '{label}'"));

        let first = self
            .read_loop_count()
            .instrument(info_span!("scenario_step", step = Step::ReadCount.name()))
            .await?;
        report.initial_count = Some(first);
        report.record(Step::ReadCount, first.to_string());
        if first == 0 {
            return Err(ScenarioError::Assertion {
                message: "loop count should be greater than zero after some time playing".to_string(),
                first,
                second: None,
            });
        }

        let wait = self.config.playback_wait();
        info!(wait_secs = wait.as_secs_f64(), "letting the video loop");
        tokio::time::sleep(wait).await;
        report.record(Step::Wait, format!("{}s", wait.as_secs_f64()));

        let second = self
            .read_loop_count()
            .instrument(info_span!("scenario_step", step = Step::ReadCount.name()))
            .await?;
        report.final_count = Some(second);
        report.record(Step::ReadCount, second.to_string());
        if second <= first {
            return Err(ScenarioError::Assertion {
                message: "loop count should increase while the video keeps playing".to_string(),
                first,
                second: Some(second),
            });
        }

        self.driver
            .navigate_back()
            .instrument(info_span!("scenario_step", step = Step::NavigateBack.name()))
            .await?;
        report.record(Step::NavigateBack, "returned to previous screen");
        Ok(())
    }

    async fn capture_screenshot(&self) -> Option<String> {
        match self.driver.screenshot().await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                debug!(error = %e, "no failure screenshot");
                None
            }
        }
    }
}
