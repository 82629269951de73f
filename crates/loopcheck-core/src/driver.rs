//! Backend-agnostic UI automation driver.
//!
//! [`AutomationDriver`] is the seam between the loop-count check and whatever
//! actually talks to the device. The production implementation is
//! [`AgentDriver`](crate::agent_driver::AgentDriver); tests substitute
//! in-memory drivers.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{find_first, ElementQuery, UIElement};

/// Errors from any automation backend.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Not connected to automation backend")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

pub const NAVIGATION_BAR_TYPE: &str = "NavigationBar";
pub const BUTTON_TYPE: &str = "Button";

/// Locates the back button: the first button inside the first navigation bar.
pub fn find_back_button(tree: &[UIElement]) -> Option<&UIElement> {
    let bar = find_first(tree, &|el| el.is_type(NAVIGATION_BAR_TYPE))?;
    find_first(&bar.children, &|el| el.is_type(BUTTON_TYPE))
}

/// Device-facing UI automation primitives.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Tap at screen coordinates, in points.
    async fn tap_at(&self, x: i32, y: i32) -> Result<(), DriverError>;

    /// Tap the element whose accessibility label is `label`.
    ///
    /// With `wait`, the backend keeps looking for the element that long
    /// before giving up.
    async fn tap_label(&self, label: &str, wait: Option<Duration>) -> Result<(), DriverError>;

    /// Root elements of the accessibility tree for the current screen.
    async fn dump_tree(&self) -> Result<Vec<UIElement>, DriverError>;

    /// Raw PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// One lookup of `query` on the current screen. `Ok(None)` means not there.
    ///
    /// `budget` is how long the caller will wait for this answer; backends
    /// that talk to a device should not block longer than that.
    async fn find_element(&self, query: &ElementQuery, budget: Duration) -> Result<Option<UIElement>, DriverError> {
        let _ = budget;
        let tree = self.dump_tree().await?;
        Ok(query.first_in(&tree).cloned())
    }

    /// Pop the current screen by tapping the navigation bar's back button.
    async fn navigate_back(&self) -> Result<(), DriverError> {
        let tree = self.dump_tree().await?;
        let button = find_back_button(&tree)
            .ok_or_else(|| DriverError::CommandFailed("no back button in navigation bar".to_string()))?;

        if let Some(frame) = button.frame {
            let (x, y) = frame.center();
            return self.tap_at(x, y).await;
        }
        match button.label.as_deref() {
            Some(label) => self.tap_label(label, None).await,
            None => Err(DriverError::CommandFailed("back button has neither frame nor label".to_string())),
        }
    }
}
