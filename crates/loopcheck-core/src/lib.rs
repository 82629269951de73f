//! # loopcheck-core
//!
//! UI check for a looping video player on the iOS Simulator: start the video,
//! read the on-screen loop counter twice across a fixed wait, and require it
//! to go up.
//!
//! ## Modules
//!
//! - [`verifier`] - The loop-count scenario and its error type
//! - [`loop_count`] - Digit extraction from the counter label
//! - [`wait`] - Bounded polling for an element to appear
//! - [`driver`] - The [`AutomationDriver`](driver::AutomationDriver) trait and back navigation
//! - [`agent_driver`] - Driver backed by the TCP accessibility agent
//! - [`agent_client`] - Framed transport to the agent
//! - [`protocol`] - Agent wire format
//! - [`element`] - Accessibility tree nodes and identifier lookups
//! - [`app`] - Launch-once handling for the app under test
//! - [`simctl`] - `xcrun simctl` wrapper
//! - [`config`] - `~/.loopcheck/config.json`
//! - [`report`] - Step-by-step run record
//!
//! ## External Dependencies
//!
//! - **Xcode** (for `xcrun simctl`)
//! - An accessibility agent running on the simulator, reachable over TCP
//!
//! ## Example
//!
//! ```
//! use loopcheck_core::loop_count::extract_count;
//!
//! assert_eq!(extract_count("Loop count 12"), 12);
//! ```

pub mod agent_client;
pub mod agent_driver;
pub mod app;
pub mod config;
pub mod driver;
pub mod element;
pub mod loop_count;
pub mod protocol;
pub mod report;
pub mod simctl;
pub mod verifier;
pub mod wait;
