//! Multi-tier rate limiter.
//!
//! Each provider endpoint class enforces both a concurrency ceiling and a
//! steady-state request rate, so every [`Tier`] carries two budgets:
//!
//! - a semaphore of `max_concurrent` slots, held for the life of a [`TierPermit`]
//! - a minimum spacing between grants, tracked by the last-granted instant
//!
//! Tiers are independent; waiting on one never delays another.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use filings_core::{AppConfig, TierLimits};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Named rate-limit budget scoped to one class of remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Search/index queries.
    Search,
    /// Document metadata lookups.
    Query,
    /// Document rendering.
    Render,
    /// Bulk downloads.
    Download,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Search, Tier::Query, Tier::Render, Tier::Download];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Search => "search",
            Tier::Query => "query",
            Tier::Render => "render",
            Tier::Download => "download",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct TierBudget {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    min_interval: Duration,
    last_granted: Mutex<Option<Instant>>,
}

impl TierBudget {
    fn new(limits: TierLimits) -> Self {
        let max_concurrent = limits.max_concurrent.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            min_interval: limits.min_interval(),
            last_granted: Mutex::new(None),
        }
    }
}

/// A granted request slot. The slot is released when the permit is dropped.
#[derive(Debug)]
pub struct TierPermit {
    tier: Tier,
    granted_at: Instant,
    _slot: OwnedSemaphorePermit,
}

impl TierPermit {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

/// Process-wide limiter shared by every client through an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    tiers: HashMap<Tier, TierBudget>,
}

impl RateLimiter {
    /// Create a limiter from per-tier limits. Tiers not listed get one slot
    /// and no pacing.
    pub fn new(limits: impl IntoIterator<Item = (Tier, TierLimits)>) -> Self {
        let mut tiers: HashMap<Tier, TierBudget> =
            limits.into_iter().map(|(tier, l)| (tier, TierBudget::new(l))).collect();
        for tier in Tier::ALL {
            tiers.entry(tier).or_insert_with(|| TierBudget::new(TierLimits::new(1, 0)));
        }
        Self { tiers }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new([
            (Tier::Search, config.search_tier),
            (Tier::Query, config.query_tier),
            (Tier::Render, config.render_tier),
            (Tier::Download, config.download_tier),
        ])
    }

    /// Generous limits and no pacing on every tier, for tests and tooling.
    pub fn unlimited() -> Self {
        Self::new(Tier::ALL.map(|tier| (tier, TierLimits::new(1024, 0))))
    }

    fn budget(&self, tier: Tier) -> &TierBudget {
        // Every tier is inserted at construction.
        &self.tiers[&tier]
    }

    pub fn max_concurrent(&self, tier: Tier) -> usize {
        self.budget(tier).max_concurrent
    }

    pub fn min_interval(&self, tier: Tier) -> Duration {
        self.budget(tier).min_interval
    }

    /// Slots currently free for `tier`.
    pub fn available(&self, tier: Tier) -> usize {
        self.budget(tier).slots.available_permits()
    }

    /// Wait for a slot and for the tier's minimum interval, then grant.
    ///
    /// Never fails. The slot is reserved first; the interval check then runs
    /// under the tier's lock, so two callers cannot both observe a stale
    /// last-granted instant.
    pub async fn acquire(&self, tier: Tier) -> TierPermit {
        let budget = self.budget(tier);

        let slot = match budget.slots.clone().acquire_owned().await {
            Ok(slot) => slot,
            Err(_) => unreachable!("tier semaphores are never closed"),
        };

        let mut last = budget.last_granted.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + budget.min_interval;
            if Instant::now() < ready_at {
                tracing::trace!(%tier, wait = ?(ready_at - Instant::now()), "pacing request");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let granted_at = Instant::now();
        *last = Some(granted_at);
        drop(last);

        TierPermit { tier, granted_at, _slot: slot }
    }
}
