//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::CalcError;

/// Shared flag polled by long computations
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One progress report: `current` of `total` steps done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub label: String,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f64 / self.total as f64
        }
    }
}

pub type ProgressFn<'a> = dyn FnMut(&Progress) + Send + 'a;

/// Suspension point handle passed through every long-running loop
///
/// Each call to [`Checkpoint::step`] reports progress and observes the
/// cancel token; a set token turns into [`CalcError::Cancelled`].
pub struct Checkpoint<'a> {
    cancel: CancelToken,
    progress: Option<Box<ProgressFn<'a>>>,
}

impl<'a> Checkpoint<'a> {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Checkpoint that reports nothing and is never cancelled
    pub fn none() -> Self {
        Self::new(CancelToken::new())
    }

    pub fn with_progress(mut self, f: impl FnMut(&Progress) + Send + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fail with `Cancelled` if the token is set
    pub fn check(&self) -> Result<(), CalcError> {
        if self.cancel.is_cancelled() {
            Err(CalcError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report progress, then check for cancellation
    pub fn step(&mut self, current: usize, total: usize, label: &str) -> Result<(), CalcError> {
        if let Some(f) = self.progress.as_mut() {
            f(&Progress {
                current,
                total,
                label: label.to_string(),
            });
        }
        self.check()
    }
}
