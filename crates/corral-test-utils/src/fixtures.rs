//! Reusable pool test fixtures.
//!
//! - [`CleanupRecorder`]: builds cleanup actions that log a tag when run.
//! - [`request_sizes`]: a fixed mix of small and large request sizes.

use std::sync::{Arc, Mutex};

use corral_pool::CleanupAction;

/// Records the tags of cleanup actions in the order they run.
#[derive(Clone, Debug, Default)]
pub struct CleanupRecorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl CleanupRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An action that appends `tag` to the log when run.
    pub fn action(&self, tag: impl Into<String>) -> CleanupAction {
        let log = Arc::clone(&self.log);
        let tag = tag.into();
        CleanupAction::callback(move |_| {
            if let Ok(mut log) = log.lock() {
                log.push(tag);
            }
            Ok(())
        })
    }

    /// An action that appends `tag` and the cleanup's data bytes.
    pub fn action_with_data(&self, tag: impl Into<String>) -> CleanupAction {
        let log = Arc::clone(&self.log);
        let tag = tag.into();
        CleanupAction::callback(move |data| {
            if let Ok(mut log) = log.lock() {
                log.push(format!("{tag}:{data:?}"));
            }
            Ok(())
        })
    }

    /// Tags recorded so far, in run order.
    pub fn runs(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// Sizes shaped like a request's allocations: mostly small headers and
/// strings, with an occasional body buffer above the small threshold.
pub fn request_sizes() -> Vec<usize> {
    vec![24, 7, 128, 64, 3, 512, 96, 8192, 40, 16, 256, 33, 20_000, 8, 1024]
}
