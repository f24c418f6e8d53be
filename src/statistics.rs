use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Frame counters for both directions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub tx_total: u64,
    pub tx_good: u64,
    pub tx_bad: u64,
    pub rx_total: u64,
    pub rx_good: u64,
    pub rx_bad: u64,
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TX Total={}, TX Good={}, TX Bad={}, RX Total={}, RX Good={}, RX Bad={}",
            self.tx_total, self.tx_good, self.tx_bad, self.rx_total, self.rx_good, self.rx_bad
        )
    }
}

/// Shared counters. Totals move together with their good/bad counter so a snapshot
/// always satisfies `total == good + bad`.
#[derive(Debug, Default)]
pub struct Statistics {
    counters: Mutex<StatisticsSnapshot>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatisticsSnapshot> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_tx(&self, good: bool) {
        let mut counters = self.lock();
        counters.tx_total += 1;
        if good {
            counters.tx_good += 1;
        } else {
            counters.tx_bad += 1;
        }
    }

    pub fn record_rx(&self, good: bool) {
        let mut counters = self.lock();
        counters.rx_total += 1;
        if good {
            counters.rx_good += 1;
        } else {
            counters.rx_bad += 1;
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        *self.lock()
    }

    pub fn clear(&self) {
        *self.lock() = StatisticsSnapshot::default();
    }
}
