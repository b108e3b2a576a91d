use crate::regs::port;
use crate::snapshot::PortSnapshot;
use crate::{BusResult, Peripheral};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// One 8-pin digital I/O port. Shared so the USCI can see how its pins are
/// routed.
#[derive(Debug, Default)]
pub struct PortState {
    pub input: AtomicU8,
    pub out: AtomicU8,
    pub dir: AtomicU8,
    pub ifg: AtomicU8,
    pub ies: AtomicU8,
    pub ie: AtomicU8,
    pub sel: AtomicU8,
    pub ren: AtomicU8,
    pub sel2: AtomicU8,
}

impl PortState {
    /// True when every pin in `pins` has PxSEL and PxSEL2 set, which hands
    /// the pin to USCI_A0.
    pub fn routed_to_usci(&self, pins: u8) -> bool {
        let sel = self.sel.load(Ordering::SeqCst);
        let sel2 = self.sel2.load(Ordering::SeqCst);
        (sel & sel2 & pins) == pins
    }

    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            out: self.out.load(Ordering::SeqCst),
            dir: self.dir.load(Ordering::SeqCst),
            ifg: self.ifg.load(Ordering::SeqCst),
            ies: self.ies.load(Ordering::SeqCst),
            ie: self.ie.load(Ordering::SeqCst),
            sel: self.sel.load(Ordering::SeqCst),
            ren: self.ren.load(Ordering::SeqCst),
            sel2: self.sel2.load(Ordering::SeqCst),
        }
    }
}

/// PxIN..PxREN, eight consecutive registers.
#[derive(Debug, Clone)]
pub struct Port {
    pub state: Arc<PortState>,
}

impl Port {
    pub fn new(state: Arc<PortState>) -> Self {
        Self { state }
    }

    fn reg(&self, offset: u64) -> Option<&AtomicU8> {
        match offset {
            port::IN => Some(&self.state.input),
            port::OUT => Some(&self.state.out),
            port::DIR => Some(&self.state.dir),
            port::IFG => Some(&self.state.ifg),
            port::IES => Some(&self.state.ies),
            port::IE => Some(&self.state.ie),
            port::SEL => Some(&self.state.sel),
            port::REN => Some(&self.state.ren),
            _ => None,
        }
    }
}

impl Peripheral for Port {
    fn read(&self, offset: u64) -> BusResult<u8> {
        Ok(self.reg(offset).map_or(0, |r| r.load(Ordering::SeqCst)))
    }

    fn write(&mut self, offset: u64, value: u8) -> BusResult<()> {
        // PxIN is read-only
        if offset == port::IN {
            return Ok(());
        }
        if let Some(reg) = self.reg(offset) {
            reg.store(value, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// PxSEL2 for all ports. They sit away from the other port registers.
#[derive(Debug, Clone)]
pub struct PortSel2 {
    pub ports: Vec<Arc<PortState>>,
}

impl PortSel2 {
    pub fn new(ports: Vec<Arc<PortState>>) -> Self {
        Self { ports }
    }
}

impl Peripheral for PortSel2 {
    fn read(&self, offset: u64) -> BusResult<u8> {
        Ok(self
            .ports
            .get(offset as usize)
            .map_or(0, |p| p.sel2.load(Ordering::SeqCst)))
    }

    fn write(&mut self, offset: u64, value: u8) -> BusResult<()> {
        if let Some(p) = self.ports.get(offset as usize) {
            p.sel2.store(value, Ordering::SeqCst);
        }
        Ok(())
    }
}
