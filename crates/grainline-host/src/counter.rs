//! Staleness tokens for work the caller drives itself.
//!
//! Decodes started from the interactive side (file pick, paste, drop) do
//! not go through the host, so they cannot use request ids. Each one
//! takes a token from an [`OperationCounter`] when it starts; starting a
//! newer operation invalidates every older token. After each suspension
//! point the operation checks its token and, if stale, returns without
//! publishing anything.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use grainline_pipeline::{PipelineError, PixelSurface};

/// Identifies one started operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationToken(u64);

/// Shared counter of started operations. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct OperationCounter(Arc<AtomicU64>);

impl OperationCounter {
    /// A counter with no operations started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an operation, superseding all earlier ones.
    #[must_use]
    pub fn begin(&self) -> OperationToken {
        OperationToken(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Whether `token` belongs to the most recently started operation.
    #[must_use]
    pub fn is_current(&self, token: OperationToken) -> bool {
        self.0.load(Ordering::Acquire) == token.0
    }

    /// Run `work` if `token` is still current, and keep its result only
    /// if the token is still current afterwards.
    pub fn run_if_current<T>(&self, token: OperationToken, work: impl FnOnce() -> T) -> Option<T> {
        if !self.is_current(token) {
            return None;
        }
        let output = work();
        self.is_current(token).then_some(output)
    }

    /// Decode `bytes` unless superseded before or during the decode.
    ///
    /// `None` means a newer operation started and nothing should be
    /// published, not even an error.
    pub fn decode_if_current(
        &self,
        token: OperationToken,
        bytes: &[u8],
        declared_mime: &str,
        file_name: Option<&str>,
    ) -> Option<Result<PixelSurface, PipelineError>> {
        let result = self.run_if_current(token, || {
            grainline_pipeline::decode_named(bytes, declared_mime, file_name)
        });
        if result.is_none() {
            tracing::debug!(?token, "decode superseded");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn newer_operation_supersedes_older() {
        let counter = OperationCounter::new();
        let first = counter.begin();
        assert!(counter.is_current(first));
        let second = counter.begin();
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }

    #[test]
    fn clones_share_the_count() {
        let counter = OperationCounter::new();
        let token = counter.begin();
        counter.clone().begin();
        assert!(!counter.is_current(token));
    }

    #[test]
    fn stale_token_skips_work() {
        let counter = OperationCounter::new();
        let token = counter.begin();
        let _ = counter.begin();
        let mut ran = false;
        assert!(counter.run_if_current(token, || ran = true).is_none());
        assert!(!ran);
    }

    #[test]
    fn superseded_during_work_drops_result() {
        let counter = OperationCounter::new();
        let token = counter.begin();
        let result = counter.run_if_current(token, || {
            let _ = counter.begin();
            42
        });
        assert_eq!(result, None);
    }

    #[test]
    fn current_decode_publishes_errors_too() {
        let counter = OperationCounter::new();
        let token = counter.begin();
        let result = counter.decode_if_current(token, b"", "image/png", None).unwrap();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn stale_decode_publishes_nothing() {
        let counter = OperationCounter::new();
        let token = counter.begin();
        let _ = counter.begin();
        assert!(counter.decode_if_current(token, b"", "image/png", None).is_none());
    }
}
