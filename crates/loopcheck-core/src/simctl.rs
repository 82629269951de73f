//! `xcrun simctl` calls: list simulators, launch the app under test.
//! Needs Xcode on the host.
//!
//! ```no_run
//! use loopcheck_core::simctl::{Simctl, BOOTED};
//!
//! for device in Simctl::list_devices().unwrap() {
//!     println!("{} {}", device.udid, device.state);
//! }
//! Simctl::launch(BOOTED, "com.example.swiftui-loop-videoplayer").unwrap();
//! ```

use std::collections::HashMap;
use std::process::{Command, Output};

use serde::Deserialize;
use thiserror::Error;

/// Device target that simctl resolves to the booted simulator.
pub const BOOTED: &str = "booted";

#[derive(Error, Debug)]
pub enum SimctlError {
    /// simctl ran and exited non-zero; holds its stderr.
    #[error("simctl failed: {0}")]
    CommandFailed(String),

    #[error("unreadable simctl output: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("could not run xcrun: {0}")]
    Io(#[from] std::io::Error),
}

/// One simulator as reported by `xcrun simctl list devices -j`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorDevice {
    pub udid: String,
    /// Human-readable name, e.g. "iPhone 15 Pro".
    pub name: String,
    /// "Booted", "Shutdown", ...
    pub state: String,
    #[serde(rename = "deviceTypeIdentifier")]
    pub device_type: Option<String>,
}

impl SimulatorDevice {
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

/// `simctl list devices -j` groups devices by runtime identifier.
#[derive(Deserialize)]
struct ListOutput {
    devices: HashMap<String, Vec<SimulatorDevice>>,
}

fn run_simctl(args: &[&str]) -> Result<Output, SimctlError> {
    let output = Command::new("xcrun").arg("simctl").args(args).output()?;
    if !output.status.success() {
        return Err(SimctlError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(output)
}

/// Namespace for simctl invocations. All calls block on the child process.
pub struct Simctl;

impl Simctl {
    /// All simulators across every installed runtime.
    pub fn list_devices() -> Result<Vec<SimulatorDevice>, SimctlError> {
        let output = run_simctl(&["list", "devices", "-j"])?;
        Self::parse_device_list(&output.stdout)
    }

    /// Launch an installed app. `udid` may be [`BOOTED`].
    ///
    /// An already running app is brought to the foreground. Returns the pid
    /// when simctl prints one.
    pub fn launch(udid: &str, bundle_id: &str) -> Result<Option<u32>, SimctlError> {
        let output = run_simctl(&["launch", udid, bundle_id])?;
        Ok(Self::parse_launch_pid(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Flattens `simctl list devices -j` output into one list.
    pub fn parse_device_list(json: &[u8]) -> Result<Vec<SimulatorDevice>, SimctlError> {
        let ListOutput { devices } = serde_json::from_slice(json)?;
        Ok(devices.into_values().flatten().collect())
    }

    /// Extracts the pid from launch output of the form `"<bundle_id>: <pid>"`.
    pub fn parse_launch_pid(stdout: &str) -> Option<u32> {
        stdout
            .trim()
            .rsplit_once(':')
            .and_then(|(_, pid)| pid.trim().parse().ok())
    }
}
