//! Per-operation cancellation signal.
//!
//! Every store operation receives a [`Context`]. If the context is already
//! done when the operation starts, the operation changes nothing and
//! returns its "not found" sentinel. The check happens on entry only.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A cancellation token with an optional deadline.
///
/// Cloning a context shares its token; [`Context::child`] derives a context
/// that is cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wraps an existing token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derives a context cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context that is also done once `deadline` passes.
    ///
    /// The earlier of the parent's deadline and `deadline` wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the context was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }

    /// The underlying token, for `select!`-style waiting.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
