// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A one-shot, many-consumer cancellation latch.
//!
//! A single producer trips the [`Token`] (on peer-vanish, or on an explicit
//! cancel request); any number of consumers poll it at I/O boundaries. Once
//! tripped it stays tripped - there is no way to reset a [`Token`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, cheap to clone and safe to poll from a blocking
/// worker thread while the producer lives on the async event loop.
#[derive(Debug, Clone, Default)]
pub struct Token(Arc<AtomicBool>);

impl Token {
    /// Create a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. Idempotent: tripping an already-tripped token is a no-op.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`Token::cancel`] has been called at least once.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Convenience checkpoint for worker loops: returns [`Error::Cancelled`]
    /// if the token has been tripped, `Ok(())` otherwise.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marker error returned by [`Token::check`]; callers map this onto their own
/// error type's `Cancelled` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = Token::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = Token::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn clones_observe_cancellation() {
        let token = Token::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
