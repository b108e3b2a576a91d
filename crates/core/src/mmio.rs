use crate::{Bus, BusResult};
use std::sync::atomic::{AtomicBool, Ordering};

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Volatile access to the real peripheral address space.
///
/// At most one `Mmio` is handed out per program, so whoever owns it owns the
/// UART's register set.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Returns the register capability the first time it is called and
    /// `None` afterwards.
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { _private: () })
        }
    }

    /// Second handle for interrupt handlers, which run while the owner is
    /// suspended.
    ///
    /// # Safety
    ///
    /// The caller must only touch registers the owner never accesses
    /// concurrently, e.g. UCA0RXBUF from the receive ISR.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Bus for Mmio {
    fn read_u8(&self, addr: u16) -> BusResult<u8> {
        // SAFETY: peripheral registers in 0x0000..0x0100 are always mapped
        // on the target and reading them has no memory-safety effect.
        Ok(unsafe { core::ptr::read_volatile(addr as usize as *const u8) })
    }

    fn write_u8(&mut self, addr: u16, value: u8) -> BusResult<()> {
        // SAFETY: see read_u8; ownership of `Mmio` serialises writers.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_exclusive() {
        let first = Mmio::take();
        assert!(first.is_some());
        assert!(Mmio::take().is_none());
        assert!(Mmio::take().is_none());
    }
}
