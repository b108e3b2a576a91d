use crate::metrics::LineMetrics;
use crate::peripherals::port::{Port, PortSel2, PortState};
use crate::peripherals::sfr::{Sfr, SfrState};
use crate::peripherals::usci::Usci;
use crate::regs::addr;
use crate::{BusError, BusResult, Irq, Peripheral};
use babyboard_config::BoardConfig;
use std::sync::Arc;

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u16,
    pub size: u16,
    pub irq: Option<Irq>,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u16) -> bool {
        addr >= self.base && u32::from(addr) < u32::from(self.base) + u32::from(self.size)
    }
}

/// Address decoder for the simulated peripheral space.
#[derive(Debug)]
pub struct SystemBus {
    pub name: String,
    pub peripherals: Vec<PeripheralEntry>,
    pub sfr: Arc<SfrState>,
    pub ports: Vec<Arc<PortState>>,
    pub metrics: Arc<LineMetrics>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    pub fn new() -> Self {
        Self::from_config(&BoardConfig::default())
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        let sfr = Arc::new(SfrState::default());
        let ports = vec![
            Arc::new(PortState::default()),
            Arc::new(PortState::default()),
        ];
        let metrics = Arc::new(LineMetrics::new());

        let mut usci = Usci::new(
            config.clocks.clone(),
            sfr.clone(),
            ports[0].clone(),
            metrics.clone(),
        );
        usci.set_peer_rate(config.peer.baud_rate);

        let peripherals = vec![
            PeripheralEntry {
                name: "sfr".to_string(),
                base: addr::IE1,
                size: 4,
                irq: None,
                dev: Box::new(Sfr::new(sfr.clone())),
            },
            PeripheralEntry {
                name: "port1".to_string(),
                base: addr::P1IN,
                size: 8,
                irq: None,
                dev: Box::new(Port::new(ports[0].clone())),
            },
            PeripheralEntry {
                name: "port2".to_string(),
                base: addr::P2IN,
                size: 8,
                irq: None,
                dev: Box::new(Port::new(ports[1].clone())),
            },
            PeripheralEntry {
                name: "portsel2".to_string(),
                base: addr::P1SEL2,
                size: 2,
                irq: None,
                dev: Box::new(PortSel2::new(ports.clone())),
            },
            PeripheralEntry {
                name: "usci_a0".to_string(),
                base: addr::UCA0CTL0,
                size: 8,
                irq: Some(Irq::UsciAb0Tx),
                dev: Box::new(usci),
            },
        ];

        Self {
            name: config.name.clone(),
            peripherals,
            sfr,
            ports,
            metrics,
        }
    }

    fn entry(&self, addr: u16) -> BusResult<&PeripheralEntry> {
        self.peripherals
            .iter()
            .find(|p| p.contains(addr))
            .ok_or(BusError::Unmapped(addr))
    }

    pub fn read_u8(&self, addr: u16) -> BusResult<u8> {
        let p = self.entry(addr)?;
        p.dev.read(u64::from(addr - p.base))
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> BusResult<()> {
        let p = self
            .peripherals
            .iter_mut()
            .find(|p| p.contains(addr))
            .ok_or(BusError::Unmapped(addr))?;
        p.dev.write(u64::from(addr - p.base), value)
    }

    /// Advances every peripheral by one cycle and returns the interrupts
    /// they raised.
    pub fn tick_peripherals(&mut self) -> Vec<Irq> {
        let mut irqs = Vec::new();
        for p in &mut self.peripherals {
            if p.dev.tick() {
                if let Some(irq) = p.irq {
                    irqs.push(irq);
                }
            }
        }
        irqs
    }

    pub fn usci(&self) -> Option<&Usci> {
        self.peripherals
            .iter()
            .find(|p| p.name == "usci_a0")
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<Usci>())
    }

    pub fn usci_mut(&mut self) -> Option<&mut Usci> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == "usci_a0")
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<Usci>())
    }
}
