//! Per-class retirement policy (`spec.md` §3 "RecycleOption").

use std::time::Duration;

/// Controls when a node is eligible for retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleOption {
    /// The node is never retired by the idle sweeper; only an explicit
    /// unregistration of its class removes it.
    Never,
    /// The node is retired `timeout` after the last dispatch or the loss of
    /// its last subscriber, whichever is later. A zero duration makes the
    /// node ephemeral: it is discarded immediately after the dispatch that
    /// created it returns, unless a subscription is holding it.
    IdleTimeout(Duration),
    /// Equivalent to `IdleTimeout(Duration::ZERO)` for the "retained only by
    /// subscription" idiom named in the spec; kept as a distinct variant so
    /// call sites read as intent rather than a magic zero duration.
    SubscribeRetained,
}

impl RecycleOption {
    /// Whether a class using this policy should ever be registered in the
    /// idle index at all.
    pub fn is_idle_tracked(&self) -> bool {
        matches!(self, RecycleOption::IdleTimeout(_) | RecycleOption::SubscribeRetained)
    }

    /// The effective idle duration, or `None` for `Never`.
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self {
            RecycleOption::Never => None,
            RecycleOption::IdleTimeout(d) => Some(*d),
            RecycleOption::SubscribeRetained => Some(Duration::ZERO),
        }
    }

    /// True for `IdleTimeout(0)` and `SubscribeRetained`: nodes using this
    /// policy are retired immediately after the dispatch that created them
    /// returns, unless a subscriber is holding them.
    pub fn is_ephemeral(&self) -> bool {
        self.idle_timeout() == Some(Duration::ZERO)
    }
}
