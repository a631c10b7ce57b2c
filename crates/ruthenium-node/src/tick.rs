//! Periodic engines driving the node.
//!
//! A [`TickEngine`] fires at instants aligned on its period, so that every
//! node of the network closes and verifies blocks at the same timestamps.
//! A period can be split into `occurrences` evenly spaced sub-ticks, the
//! first `skipped` of which are not fired.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use ruthenium_core::traits::Clock;

pub struct TickEngine {
    name: &'static str,
    clock: Arc<dyn Clock>,
    period: i64,
    occurrences: u32,
    skipped: u32,
}

impl TickEngine {
    pub fn new(
        name: &'static str,
        clock: Arc<dyn Clock>,
        period: Duration,
        occurrences: u32,
        skipped: u32,
    ) -> Self {
        let period = i64::try_from(period.as_nanos()).unwrap_or(i64::MAX).max(1);
        Self {
            name,
            clock,
            period,
            occurrences: occurrences.max(1),
            skipped,
        }
    }

    /// One tick per period.
    pub fn periodic(name: &'static str, clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self::new(name, clock, period, 1, 0)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Timestamps fired during the first period starting strictly after `now`.
    pub fn ticks_after(&self, now: i64) -> Vec<i64> {
        let start = now - now.rem_euclid(self.period) + self.period;
        let step = self.period / i64::from(self.occurrences);
        (self.skipped..self.occurrences)
            .map(|occurrence| start + i64::from(occurrence) * step)
            .collect()
    }

    /// Call `action` at every tick. Never returns; drop the future to stop.
    ///
    /// Ticks missed while `action` runs late are skipped, not replayed.
    pub async fn run<F, Fut>(&self, mut action: F)
    where
        F: FnMut(i64) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let ticks = self.ticks_after(self.clock.now());
            if ticks.is_empty() {
                self.sleep_until(self.next_period_start()).await;
                continue;
            }
            for timestamp in ticks {
                if self.clock.now() > timestamp.saturating_add(self.period) {
                    continue;
                }
                self.sleep_until(timestamp).await;
                trace!(engine = self.name, timestamp, "tick");
                action(timestamp).await;
            }
        }
    }

    fn next_period_start(&self) -> i64 {
        let now = self.clock.now();
        now - now.rem_euclid(self.period) + self.period
    }

    async fn sleep_until(&self, timestamp: i64) {
        let delay = timestamp.saturating_sub(self.clock.now());
        if delay > 0 {
            tokio::time::sleep(Duration::from_nanos(delay as u64)).await;
        }
    }
}

impl std::fmt::Debug for TickEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickEngine")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("occurrences", &self.occurrences)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
