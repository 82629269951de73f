//! Scenario configuration.
//!
//! Settings live in `~/.loopcheck/config.json`. Every field is optional in
//! the file; missing ones take the defaults below, which match the example
//! video player app.
//!
//! ```no_run
//! use loopcheck_core::config::ScenarioConfig;
//!
//! let config = ScenarioConfig::load();
//! println!("agent at {}:{}", config.agent_host, config.agent_port);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "config.json";

/// Directory holding loopcheck's config and logs (`~/.loopcheck`).
///
/// Falls back to the system temp directory when no home directory is known.
pub fn loopcheck_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".loopcheck");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Everything the loop-count scenario needs to know about the app under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Host the accessibility agent listens on.
    pub agent_host: String,
    pub agent_port: u16,
    /// Bundle identifier of the video player app.
    pub bundle_id: String,
    /// Simulator to launch on; the booted one when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_udid: Option<String>,
    /// Label of the button that opens the looping video.
    pub play_button_label: String,
    /// Accessibility identifier of the loop counter text.
    pub loop_counter_identifier: String,
    /// How long the agent may wait for the play button before tapping.
    pub tap_timeout_ms: u64,
    /// How long a counter read waits for the label to appear.
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Real-time gap between the two counter reads.
    pub playback_wait_secs: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            agent_host: "localhost".to_string(),
            agent_port: 8080,
            bundle_id: "com.example.swiftui-loop-videoplayer".to_string(),
            device_udid: None,
            play_button_label: "Video11".to_string(),
            loop_counter_identifier: "loopCounterLabel".to_string(),
            tap_timeout_ms: 8_000,
            element_timeout_ms: 5_000,
            poll_interval_ms: 100,
            playback_wait_secs: 10,
        }
    }
}

impl ScenarioConfig {
    /// Path of the user config file.
    pub fn default_path() -> PathBuf {
        loopcheck_dir().join(CONFIG_FILENAME)
    }

    /// Load `~/.loopcheck/config.json`, or defaults if it is missing or malformed.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path, or defaults if it is missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn tap_timeout(&self) -> Duration {
        Duration::from_millis(self.tap_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn playback_wait(&self) -> Duration {
        Duration::from_secs(self.playback_wait_secs)
    }
}
