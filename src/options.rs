//! Uniform option bag consumed by every primitive engine (§6).
//!
//! A consuming-builder idiom, generalized across all primitives instead
//! of being specific to one.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options threaded through acquire/lock/wait-style calls.
///
/// `timeout == Duration::ZERO` means "no timeout" (§5): the call blocks
/// until success or cancellation.
#[derive(Clone, Debug)]
pub struct Options {
    pub ttl: Option<Duration>,
    pub timeout: Duration,
    pub priority: Option<i32>,
    pub holder: Option<String>,
    pub quorum: Option<i32>,
    pub cancel: CancellationToken,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ttl: None,
            timeout: Duration::ZERO,
            priority: None,
            holder: None,
            quorum: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    #[must_use]
    pub fn with_quorum(mut self, quorum: i32) -> Self {
        self.quorum = Some(quorum);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolves the holder identity from this option bag (§4.4).
    pub fn resolve_holder(&self) -> String {
        crate::identity::resolve_holder(self.holder.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_unbounded() {
        assert_eq!(Options::default().timeout, Duration::ZERO);
    }

    #[test]
    fn builders_chain() {
        let opts = Options::new()
            .with_ttl(Duration::from_secs(30))
            .with_timeout(Duration::from_secs(5))
            .with_priority(10)
            .with_holder("alice")
            .with_quorum(3);
        assert_eq!(opts.ttl, Some(Duration::from_secs(30)));
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.priority, Some(10));
        assert_eq!(opts.holder.as_deref(), Some("alice"));
        assert_eq!(opts.quorum, Some(3));
    }
}
