//! Deferred cleanup actions tied to a pool's destruction.
//!
//! Cleanups are registered with [`Pool::add_cleanup`](crate::Pool::add_cleanup)
//! and run exactly once, most recently registered first, when the pool is
//! destroyed. Resetting a pool never runs them.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use corral_core::CleanupId;
use tracing::Span;

use crate::handle::Region;

/// Handle to a registered cleanup.
pub type CleanupHandle = CleanupId;

/// A user-supplied finalizer. Receives the cleanup's data buffer.
pub type CleanupFn = Box<dyn FnOnce(&mut [u8]) -> io::Result<()> + Send>;

/// What a cleanup does when it runs.
pub enum CleanupAction {
    /// Run a closure with the cleanup's data buffer.
    Callback(CleanupFn),
    /// Close an open file.
    CloseFile(FileCleanup),
    /// Delete a file by name, then close it.
    DeleteFile(FileCleanup),
}

impl CleanupAction {
    /// Wrap a closure as a cleanup action.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(&mut [u8]) -> io::Result<()> + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// The descriptor a close-file action owns, used by keyed early release.
    fn close_file_fd(&self) -> Option<RawFd> {
        match self {
            Self::CloseFile(file) => Some(file.fd()),
            _ => None,
        }
    }

    /// Run the action. Failures are reported to `span`, never returned.
    pub(crate) fn run(self, data: &mut [u8], span: &Span) {
        match self {
            Self::Callback(f) => {
                if let Err(err) = f(data) {
                    tracing::error!(parent: span, error = %err, "cleanup action failed");
                }
            }
            Self::CloseFile(file) => {
                tracing::debug!(parent: span, fd = file.fd(), "file cleanup");
                file.close();
            }
            Self::DeleteFile(file) => {
                tracing::debug!(
                    parent: span,
                    fd = file.fd(),
                    name = %file.name.display(),
                    "file cleanup"
                );
                if let Err(err) = std::fs::remove_file(&file.name) {
                    if err.kind() != io::ErrorKind::NotFound {
                        tracing::error!(
                            parent: span,
                            error = %err,
                            name = %file.name.display(),
                            "delete failed"
                        );
                    }
                }
                file.close();
            }
        }
    }
}

impl fmt::Debug for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::CloseFile(file) => f.debug_tuple("CloseFile").field(file).finish(),
            Self::DeleteFile(file) => f.debug_tuple("DeleteFile").field(file).finish(),
        }
    }
}

/// An open file whose descriptor a cleanup releases.
#[derive(Debug)]
pub struct FileCleanup {
    file: File,
    name: PathBuf,
}

impl FileCleanup {
    /// Take ownership of `file`, remembering the path it was opened from.
    pub fn new(file: File, name: impl Into<PathBuf>) -> Self {
        Self {
            file,
            name: name.into(),
        }
    }

    /// The raw descriptor, used as the key for early release.
    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Path the file was opened from.
    pub fn name(&self) -> &Path {
        &self.name
    }

    fn close(self) {
        drop(self.file);
    }
}

/// A registered cleanup. `action == None` means nothing left to run.
struct CleanupEntry {
    action: Option<CleanupAction>,
    data: Option<Region>,
}

/// The pool's cleanup list, in registration order.
///
/// Logically a stack: the most recent entry is the head and runs first.
#[derive(Default)]
pub struct CleanupList {
    entries: Vec<CleanupEntry>,
}

impl CleanupList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry with no action yet.
    pub(crate) fn push(&mut self, data: Option<Region>) -> CleanupHandle {
        self.entries.push(CleanupEntry { action: None, data });
        CleanupId(self.entries.len() as u32 - 1)
    }

    /// Install `action` on `handle`, replacing any previous action.
    ///
    /// Returns `false` if the handle is unknown.
    pub(crate) fn set(&mut self, handle: CleanupHandle, action: CleanupAction) -> bool {
        match self.entries.get_mut(handle.index()) {
            Some(entry) => {
                entry.action = Some(action);
                true
            }
            None => false,
        }
    }

    /// The data buffer registered with `handle`.
    pub(crate) fn data(&self, handle: CleanupHandle) -> Option<Region> {
        self.entries.get(handle.index()).and_then(|entry| entry.data)
    }

    /// Detach the head-most close-file action owning `fd`.
    ///
    /// The entry stays registered with no action, so it will not run again.
    pub(crate) fn take_close_file(&mut self, fd: RawFd) -> Option<CleanupAction> {
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| entry.action.as_ref().and_then(CleanupAction::close_file_fd) == Some(fd))?
            .action
            .take()
    }

    /// Remove every pending action, head first.
    pub(crate) fn drain(&mut self) -> Vec<(CleanupHandle, CleanupAction, Option<Region>)> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .enumerate()
            .rev()
            .filter_map(|(index, CleanupEntry { action, data })| {
                action.map(|action| (CleanupId(index as u32), action, data))
            })
            .collect()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was ever registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that still have an action to run.
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|e| e.action.is_some()).count()
    }
}
