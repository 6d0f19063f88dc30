//! Periodic sweep of expired keys.
//!
//! Reads already hide expired keys lazily; the sweep bounds the memory held by
//! keys nobody touches again, such as accumulators of metrics that went quiet.

use crate::backend::MemoryBackend;
use crate::clock::Clock;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub struct TtlManager<C: Clock> {
    backend: MemoryBackend<C>,
    period: Duration,
}

impl<C: Clock> TtlManager<C> {
    pub fn new(backend: MemoryBackend<C>, period: Duration) -> Self {
        TtlManager { backend, period }
    }

    pub async fn run(self) {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            let evicted = self.backend.evict_expired();
            if evicted > 0 {
                debug!(evicted, "TTL manager evicted expired keys");
            }
        }
    }
}
