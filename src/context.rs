//! Cancellation and deadline carrier passed to context-aware operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    deadline: Option<Instant>,
    canceled: AtomicBool,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_canceled())
    }

    fn deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.deadline());
        match (self.deadline, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Request-scoped cancellation state.
///
/// Cloning a context shares its cancellation; deriving one with
/// [`Context::with_timeout`] or [`Context::with_deadline`] creates a child that
/// is canceled together with its parent but can be canceled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// An empty context: never canceled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: Some(deadline),
                canceled: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that can be canceled without touching this context.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: None,
                canceled: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline()
    }

    /// Why this context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.inner.is_canceled() {
            return Some(Error::Canceled);
        }
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
