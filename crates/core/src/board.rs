use crate::bus::SystemBus;
use crate::metrics::LineMetrics;
use crate::peripherals::usci::{RxOutcome, Usci};
use crate::snapshot::BoardSnapshot;
use crate::{Bus, BusResult, Irq};
use babyboard_config::BoardConfig;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type InterruptHandler = Arc<dyn Fn(&mut Board) + Send + Sync>;

thread_local! {
    // GIE is clear while a handler runs on this thread
    static SERVICING: Cell<bool> = const { Cell::new(false) };
}

/// A simulated MSP430G2553 shared between the code under test and whatever
/// plays the remote end of the serial line.
///
/// Clones refer to the same hardware. Every register access costs one MCLK
/// cycle. Interrupts raised during an access are handled on the calling
/// thread once the access itself has finished; bytes from the peer raise
/// theirs on the thread calling [`Board::deliver`], which makes that thread
/// the asynchronous event source.
#[derive(Clone)]
pub struct Board {
    bus: Arc<Mutex<SystemBus>>,
    handlers: Arc<Mutex<HashMap<Irq, InterruptHandler>>>,
    metrics: Arc<LineMetrics>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self::with_bus(SystemBus::new())
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        Self::with_bus(SystemBus::from_config(config))
    }

    pub fn with_bus(bus: SystemBus) -> Self {
        let metrics = bus.metrics.clone();
        Self {
            bus: Arc::new(Mutex::new(bus)),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SystemBus> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_usci<R>(&self, f: impl FnOnce(&mut Usci) -> R) -> Option<R> {
        let mut bus = self.lock();
        bus.usci_mut().map(f)
    }

    /// Installs the handler run when `irq` fires, replacing any previous one.
    pub fn attach_handler<F>(&self, irq: Irq, handler: F)
    where
        F: Fn(&mut Board) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(irq, Arc::new(handler));
    }

    pub fn detach_handler(&self, irq: Irq) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&irq);
    }

    /// Runs the handlers for `irqs`. Requests raised by accesses made from
    /// inside a handler are not nested; a level-triggered source raises
    /// them again on the next access once the handler has returned.
    fn dispatch(&self, irqs: Vec<Irq>) {
        if irqs.is_empty() || SERVICING.with(Cell::get) {
            return;
        }
        SERVICING.with(|s| s.set(true));
        for irq in irqs {
            let handler = self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&irq)
                .cloned();
            match handler {
                Some(handler) => {
                    tracing::trace!("Board: servicing {:?} (vector {})", irq, irq.vector());
                    let mut board = self.clone();
                    handler(&mut board);
                }
                None => tracing::trace!("Board: {:?} pending, no handler attached", irq),
            }
        }
        SERVICING.with(|s| s.set(false));
    }

    /// Advances simulated time without touching any register.
    pub fn run_cycles(&self, cycles: u64) {
        for _ in 0..cycles {
            let irqs = self.lock().tick_peripherals();
            self.metrics.record_bus_cycle();
            self.dispatch(irqs);
        }
    }

    /// The peer sends one character.
    pub fn deliver(&self, byte: u8) -> RxOutcome {
        let outcome = self
            .with_usci(|u| u.deliver(byte))
            .unwrap_or(RxOutcome::Ignored);
        if outcome == RxOutcome::Interrupt {
            self.dispatch(vec![Irq::UsciAb0Rx]);
        }
        outcome
    }

    /// Sets the peer's nominal bit rate; `None` means it always matches.
    pub fn set_peer_rate(&self, rate: Option<u32>) {
        self.with_usci(|u| u.set_peer_rate(rate));
    }

    /// Characters that left on the TX line so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.with_usci(|u| u.wire().to_vec()).unwrap_or_default()
    }

    pub fn take_transmitted(&self) -> Vec<u8> {
        self.with_usci(|u| u.take_wire()).unwrap_or_default()
    }

    pub fn bit_rate_hz(&self) -> Option<f64> {
        self.with_usci(|u| u.bit_rate_hz()).flatten()
    }

    pub fn metrics(&self) -> Arc<LineMetrics> {
        self.metrics.clone()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let bus = self.lock();
        BoardSnapshot {
            name: bus.name.clone(),
            sfr: bus.sfr.snapshot(),
            ports: bus.ports.iter().map(|p| p.snapshot()).collect(),
            usci: bus.usci().map(Usci::snapshot),
            metrics: bus.metrics.snapshot(),
        }
    }
}

impl Bus for Board {
    fn read_u8(&self, addr: u16) -> BusResult<u8> {
        let (value, irqs) = {
            let mut bus = self.lock();
            let value = bus.read_u8(addr);
            (value, bus.tick_peripherals())
        };
        self.metrics.record_bus_cycle();
        self.dispatch(irqs);
        value
    }

    fn write_u8(&mut self, addr: u16, value: u8) -> BusResult<()> {
        let (result, irqs) = {
            let mut bus = self.lock();
            let result = bus.write_u8(addr, value);
            (result, bus.tick_peripherals())
        };
        self.metrics.record_bus_cycle();
        self.dispatch(irqs);
        result
    }

    fn idle(&self) {
        std::thread::yield_now();
    }
}
