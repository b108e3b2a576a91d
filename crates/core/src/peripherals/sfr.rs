use crate::snapshot::SfrSnapshot;
use crate::{BusResult, Peripheral};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Shared interrupt enable/flag registers. Peripherals raise their flags
/// here directly, the same way the silicon wires them.
#[derive(Debug, Default)]
pub struct SfrState {
    pub ie1: AtomicU8,
    pub ie2: AtomicU8,
    pub ifg1: AtomicU8,
    pub ifg2: AtomicU8,
}

impl SfrState {
    pub fn snapshot(&self) -> SfrSnapshot {
        SfrSnapshot {
            ie1: self.ie1.load(Ordering::SeqCst),
            ie2: self.ie2.load(Ordering::SeqCst),
            ifg1: self.ifg1.load(Ordering::SeqCst),
            ifg2: self.ifg2.load(Ordering::SeqCst),
        }
    }
}

/// Special function registers IE1, IE2, IFG1, IFG2 at 0x0000.
#[derive(Debug, Clone)]
pub struct Sfr {
    pub state: Arc<SfrState>,
}

impl Sfr {
    pub fn new(state: Arc<SfrState>) -> Self {
        Self { state }
    }

    fn reg(&self, offset: u64) -> Option<&AtomicU8> {
        match offset {
            0x0 => Some(&self.state.ie1),
            0x1 => Some(&self.state.ie2),
            0x2 => Some(&self.state.ifg1),
            0x3 => Some(&self.state.ifg2),
            _ => None,
        }
    }
}

impl Peripheral for Sfr {
    fn read(&self, offset: u64) -> BusResult<u8> {
        Ok(self.reg(offset).map_or(0, |r| r.load(Ordering::SeqCst)))
    }

    fn write(&mut self, offset: u64, value: u8) -> BusResult<()> {
        if let Some(reg) = self.reg(offset) {
            reg.store(value, Ordering::SeqCst);
            tracing::trace!("SFR: [{:#x}] <- {:#04x}", offset, value);
        }
        Ok(())
    }
}
