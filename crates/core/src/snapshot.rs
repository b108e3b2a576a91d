use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub name: String,
    pub sfr: SfrSnapshot,
    pub ports: Vec<PortSnapshot>,
    pub usci: Option<UsciSnapshot>,
    pub metrics: MetricsSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfrSnapshot {
    pub ie1: u8,
    pub ie2: u8,
    pub ifg1: u8,
    pub ifg2: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSnapshot {
    pub out: u8,
    pub dir: u8,
    pub ifg: u8,
    pub ies: u8,
    pub ie: u8,
    pub sel: u8,
    pub ren: u8,
    pub sel2: u8,
}

impl PortSnapshot {
    /// Pins whose out/dir/sel/sel2/ren differ between two snapshots.
    pub fn changed_pins(&self, other: &PortSnapshot) -> u8 {
        (self.out ^ other.out)
            | (self.dir ^ other.dir)
            | (self.sel ^ other.sel)
            | (self.sel2 ^ other.sel2)
            | (self.ren ^ other.ren)
            | (self.ie ^ other.ie)
            | (self.ies ^ other.ies)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UsciSnapshot {
    pub ctl0: u8,
    pub ctl1: u8,
    pub br0: u8,
    pub br1: u8,
    pub mctl: u8,
    pub stat: u8,
    pub rxbuf: u8,
    pub tx_busy: bool,
    pub bit_rate_hz: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub bus_cycles: u64,
    pub bytes_transmitted: u64,
    pub bytes_received: u64,
    pub tx_dropped: u64,
    pub rx_overruns: u64,
    pub framing_errors: u64,
    pub sequencing_violations: u64,
}
