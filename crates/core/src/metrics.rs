use crate::snapshot::MetricsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for what happened on the serial line.
#[derive(Debug, Default)]
pub struct LineMetrics {
    bus_cycles: AtomicU64,
    bytes_transmitted: AtomicU64,
    bytes_received: AtomicU64,
    tx_dropped: AtomicU64,
    rx_overruns: AtomicU64,
    framing_errors: AtomicU64,
    sequencing_violations: AtomicU64,
}

impl LineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bus_cycle(&self) {
        self.bus_cycles.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_tx_byte(&self) {
        self.bytes_transmitted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rx_byte(&self) {
        self.bytes_received.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_tx_dropped(&self) {
        self.tx_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rx_overrun(&self) {
        self.rx_overruns.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_sequencing_violation(&self) {
        self.sequencing_violations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get_bus_cycles(&self) -> u64 {
        self.bus_cycles.load(Ordering::SeqCst)
    }

    pub fn get_bytes_transmitted(&self) -> u64 {
        self.bytes_transmitted.load(Ordering::SeqCst)
    }

    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::SeqCst)
    }

    pub fn get_tx_dropped(&self) -> u64 {
        self.tx_dropped.load(Ordering::SeqCst)
    }

    pub fn get_rx_overruns(&self) -> u64 {
        self.rx_overruns.load(Ordering::SeqCst)
    }

    pub fn get_framing_errors(&self) -> u64 {
        self.framing_errors.load(Ordering::SeqCst)
    }

    pub fn get_sequencing_violations(&self) -> u64 {
        self.sequencing_violations.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bus_cycles: self.get_bus_cycles(),
            bytes_transmitted: self.get_bytes_transmitted(),
            bytes_received: self.get_bytes_received(),
            tx_dropped: self.get_tx_dropped(),
            rx_overruns: self.get_rx_overruns(),
            framing_errors: self.get_framing_errors(),
            sequencing_violations: self.get_sequencing_violations(),
        }
    }
}
