//! Launching the app under test, at most once per run.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::simctl::{Simctl, SimctlError, BOOTED};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to launch {bundle_id}: {source}")]
    LaunchFailed {
        bundle_id: String,
        #[source]
        source: SimctlError,
    },

    #[error("launch of {bundle_id} did not complete: {source}")]
    LaunchAborted {
        bundle_id: String,
        #[source]
        source: JoinError,
    },
}

/// Starts an app by bundle identifier. Implementations may block.
pub trait AppLauncher: Send + Sync {
    fn launch(&self, bundle_id: &str) -> Result<(), SimctlError>;
}

/// Launches through `xcrun simctl launch` on one simulator.
#[derive(Debug, Clone)]
pub struct SimctlLauncher {
    device: String,
}

impl SimctlLauncher {
    /// Target a specific simulator, or the booted one when `udid` is `None`.
    pub fn new(udid: Option<String>) -> Self {
        Self { device: udid.unwrap_or_else(|| BOOTED.to_string()) }
    }
}

impl AppLauncher for SimctlLauncher {
    fn launch(&self, bundle_id: &str) -> Result<(), SimctlError> {
        let pid = Simctl::launch(&self.device, bundle_id)?;
        debug!(device = %self.device, bundle_id, ?pid, "simctl launch");
        Ok(())
    }
}

/// Owns the "is the app up yet" state for one run.
///
/// [`launch_if_needed`](Self::launch_if_needed) launches on the first call
/// and is a no-op afterwards. A failed launch leaves the manager unlaunched.
/// The launcher runs on the blocking pool.
pub struct AppManager {
    bundle_id: String,
    launcher: Arc<dyn AppLauncher>,
    launched: Mutex<bool>,
}

impl AppManager {
    pub fn new(bundle_id: impl Into<String>, launcher: impl AppLauncher + 'static) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            launcher: Arc::new(launcher),
            launched: Mutex::new(false),
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub async fn launch_if_needed(&self) -> Result<(), AppError> {
        // Held across the launch so concurrent callers wait for its outcome.
        let mut launched = self.launched.lock().await;
        if *launched {
            debug!(bundle_id = %self.bundle_id, "app already launched");
            return Ok(());
        }

        let launcher = Arc::clone(&self.launcher);
        let bundle_id = self.bundle_id.clone();
        tokio::task::spawn_blocking(move || launcher.launch(&bundle_id))
            .await
            .map_err(|source| AppError::LaunchAborted { bundle_id: self.bundle_id.clone(), source })?
            .map_err(|source| AppError::LaunchFailed { bundle_id: self.bundle_id.clone(), source })?;

        *launched = true;
        info!(bundle_id = %self.bundle_id, "app launched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct CountingLauncher {
        calls: Arc<AtomicU32>,
        fail_first: bool,
    }

    impl AppLauncher for CountingLauncher {
        fn launch(&self, _bundle_id: &str) -> Result<(), SimctlError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(SimctlError::CommandFailed("app not installed".into()));
            }
            Ok(())
        }
    }

    struct PanickingLauncher;

    impl AppLauncher for PanickingLauncher {
        fn launch(&self, _bundle_id: &str) -> Result<(), SimctlError> {
            panic!("simctl went away");
        }
    }

    #[tokio::test]
    async fn launches_only_once() {
        let launcher = CountingLauncher::default();
        let calls = launcher.calls.clone();
        let manager = AppManager::new("com.example.player", launcher);

        manager.launch_if_needed().await.unwrap();
        manager.launch_if_needed().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_callers_share_one_launch() {
        let launcher = CountingLauncher::default();
        let calls = launcher.calls.clone();
        let manager = Arc::new(AppManager::new("com.example.player", launcher));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.launch_if_needed().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_launch_is_retried_on_next_call() {
        let launcher = CountingLauncher { fail_first: true, ..Default::default() };
        let calls = launcher.calls.clone();
        let manager = AppManager::new("com.example.player", launcher);

        let err = manager.launch_if_needed().await.unwrap_err();
        assert!(matches!(err, AppError::LaunchFailed { .. }));
        assert!(err.to_string().contains("com.example.player"));

        manager.launch_if_needed().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_launcher_is_an_error() {
        let manager = AppManager::new("com.example.player", PanickingLauncher);
        let err = manager.launch_if_needed().await.unwrap_err();
        assert!(matches!(err, AppError::LaunchAborted { .. }));
    }

    #[test]
    fn simctl_launcher_defaults_to_booted() {
        assert_eq!(SimctlLauncher::new(None).device, "booted");
        assert_eq!(SimctlLauncher::new(Some("ABC-123".into())).device, "ABC-123");
    }
}
