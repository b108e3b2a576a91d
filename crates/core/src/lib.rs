// BabyBoard - MSP430 UART Driver
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod bus;
pub mod metrics;
pub mod mmio;
pub mod peripherals;
pub mod regs;
pub mod snapshot;

use std::any::Any;

mod tests;

pub use board::Board;
pub use mmio::Mmio;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Access to unmapped address {0:#06x}")]
    Unmapped(u16),
}

pub type BusResult<T> = Result<T, BusError>;

/// Interrupt sources the UART can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Irq {
    /// USCIAB0TX_VECTOR
    UsciAb0Tx,
    /// USCIAB0RX_VECTOR
    UsciAb0Rx,
}

impl Irq {
    pub fn vector(self) -> u8 {
        match self {
            Irq::UsciAb0Tx => 6,
            Irq::UsciAb0Rx => 7,
        }
    }
}

/// Trait representing a memory-mapped simulated peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> BusResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> BusResult<()>;
    /// Advance by one bus cycle. Returns true when an interrupt is requested.
    fn tick(&mut self) -> bool {
        false
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Byte-wide register access, the only way the driver reaches the hardware.
pub trait Bus {
    fn read_u8(&self, addr: u16) -> BusResult<u8>;
    fn write_u8(&mut self, addr: u16, value: u8) -> BusResult<()>;

    /// Called from inside every wait loop.
    fn idle(&self) {
        std::hint::spin_loop();
    }

    fn set_bits(&mut self, addr: u16, mask: u8) -> BusResult<()> {
        let value = self.read_u8(addr)?;
        self.write_u8(addr, value | mask)
    }

    fn clear_bits(&mut self, addr: u16, mask: u8) -> BusResult<()> {
        let value = self.read_u8(addr)?;
        self.write_u8(addr, value & !mask)
    }

    /// Read-modify-write that leaves every bit outside `mask` as it was.
    fn modify(&mut self, addr: u16, mask: u8, value: u8) -> BusResult<()> {
        let current = self.read_u8(addr)?;
        self.write_u8(addr, (current & !mask) | (value & mask))
    }
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn read_u8(&self, addr: u16) -> BusResult<u8> {
        (**self).read_u8(addr)
    }

    fn write_u8(&mut self, addr: u16, value: u8) -> BusResult<()> {
        (**self).write_u8(addr, value)
    }

    fn idle(&self) {
        (**self).idle()
    }
}
