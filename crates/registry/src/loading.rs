//! Loading flags for in-flight registry operations.
//!
//! Each flag is raised by a [`LoadingGuard`] and lowered when the guard
//! drops, so every exit path (success, error, early return) clears it.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingKind {
    /// A submission is in flight.
    Submit,
    /// The job list is being fetched.
    Tasks,
    /// The health check is in flight.
    Status,
}

#[derive(Debug, Default)]
pub struct LoadingFlags {
    submit: AtomicBool,
    tasks: AtomicBool,
    status: AtomicBool,
}

/// Point-in-time copy of the flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadingSnapshot {
    pub submit: bool,
    pub tasks: bool,
    pub status: bool,
}

impl LoadingFlags {
    /// Raise `kind` until the returned guard drops.
    pub fn begin(&self, kind: LoadingKind) -> LoadingGuard<'_> {
        let flag = self.flag(kind);
        flag.store(true, Ordering::SeqCst);
        LoadingGuard { flag }
    }

    pub fn is_loading(&self, kind: LoadingKind) -> bool {
        self.flag(kind).load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> LoadingSnapshot {
        LoadingSnapshot {
            submit: self.is_loading(LoadingKind::Submit),
            tasks: self.is_loading(LoadingKind::Tasks),
            status: self.is_loading(LoadingKind::Status),
        }
    }

    fn flag(&self, kind: LoadingKind) -> &AtomicBool {
        match kind {
            LoadingKind::Submit => &self.submit,
            LoadingKind::Tasks => &self.tasks,
            LoadingKind::Status => &self.status,
        }
    }
}

/// Lowers its flag on drop.
#[must_use = "the flag is lowered as soon as the guard is dropped"]
pub struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
