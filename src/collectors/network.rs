//! Interface byte counters (cross-platform via sysinfo), polled on a fixed interval.
//! This is the degraded source: no per-packet sizes, directions only as rx/tx totals.

use super::{MonotonicClock, SourceError};
use std::time::Duration;
use sysinfo::Networks;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Cumulative counters for one polling interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterInterval {
    pub timestamp_ms: i64,
    pub down_bytes: u64,
    pub up_bytes: u64,
    pub duration_secs: f64,
}

/// Reads cumulative rx/tx byte totals for the device.
pub trait CounterReader: Send {
    fn read(&mut self) -> Result<ByteCounters, SourceError>;
}

pub struct SysinfoCounters {
    networks: Networks,
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_ascii_lowercase().contains("loopback")
}

impl CounterReader for SysinfoCounters {
    fn read(&mut self) -> Result<ByteCounters, SourceError> {
        self.networks.refresh();
        let mut totals = ByteCounters::default();
        let mut interfaces = 0usize;
        for (name, data) in &self.networks {
            if is_loopback(name) {
                continue;
            }
            totals.rx_bytes = totals.rx_bytes.saturating_add(data.total_received());
            totals.tx_bytes = totals.tx_bytes.saturating_add(data.total_transmitted());
            interfaces += 1;
        }
        if interfaces == 0 {
            return Err(SourceError::CountersUnavailable(
                "no non-loopback network interfaces".to_string(),
            ));
        }
        Ok(totals)
    }
}

pub struct CounterPoller {
    reader: Box<dyn CounterReader>,
    ticker: Interval,
    clock: MonotonicClock,
    last: ByteCounters,
    last_ms: i64,
}

impl CounterPoller {
    /// Takes the baseline reading immediately; failing that, the source cannot be acquired.
    pub fn new(
        mut reader: Box<dyn CounterReader>,
        period: Duration,
        clock: MonotonicClock,
    ) -> Result<Self, SourceError> {
        let last = reader.read()?;
        let period = period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self {
            reader,
            ticker,
            clock,
            last,
            last_ms: clock.now_ms(),
        })
    }

    pub fn period(&self) -> Duration {
        self.ticker.period()
    }

    /// Waits for the next tick and returns the counter deltas since the previous poll.
    /// Failed reads and non-positive durations skip the tick.
    pub async fn poll_interval(&mut self) -> CounterInterval {
        loop {
            self.ticker.tick().await;
            let now_ms = self.clock.now_ms();
            let counters = match self.reader.read() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "counter read failed; skipping poll");
                    continue;
                }
            };
            let duration_secs = (now_ms - self.last_ms) as f64 / 1000.0;
            if duration_secs <= 0.0 {
                continue;
            }
            let interval = CounterInterval {
                timestamp_ms: now_ms,
                down_bytes: counters.rx_bytes.saturating_sub(self.last.rx_bytes),
                up_bytes: counters.tx_bytes.saturating_sub(self.last.tx_bytes),
                duration_secs,
            };
            self.last = counters;
            self.last_ms = now_ms;
            return interval;
        }
    }
}
