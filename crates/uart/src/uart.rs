use crate::baud::{BaudRate, ClockSource, Divisor};
use crate::latch::RxLatch;
use crate::{UartError, UartResult};
use babyboard_core::regs::{addr, Ctl0, Ctl1, Ie2, Ifg2, Stat, UART_PINS, UART_TXD};
use babyboard_core::{Bus, BusResult};
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

/// Marks the end of a sequence passed to [`Uart::send_sequence`].
pub const TERMINATOR: u8 = 0;

bitflags! {
    /// Interrupt sources enabled once the module leaves reset.
    ///
    /// Transmission always polls UCA0TXIFG. UCA0TXIE is never set: the
    /// transmit interrupt is level-triggered and would fire continuously
    /// whenever the buffer is empty.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Interrupts: u8 {
        const RX = Ie2::UCA0RXIE.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub baud_rate: u32,
    pub clock: ClockSource,
    pub clock_hz: u32,
    pub interrupts: Interrupts,
}

impl UartConfig {
    /// SMCLK from the factory-calibrated 1 MHz DCO, no interrupts.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            clock: ClockSource::Smclk,
            clock_hz: 1_000_000,
            interrupts: Interrupts::empty(),
        }
    }

    pub fn clock(mut self, source: ClockSource, hz: u32) -> Self {
        self.clock = source;
        self.clock_hz = hz;
        self
    }

    /// With [`Interrupts::RX`] only the receive ISR fills the latch, so the
    /// handler from [`Uart::rx_interrupt_handler`] must be attached to
    /// USCIAB0RX or `receive` never sees a byte.
    pub fn interrupts(mut self, interrupts: Interrupts) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// The divisor `initialize` would program, or why there is none.
    pub fn divisor(&self) -> Result<Divisor, crate::ConfigError> {
        let rate = BaudRate::try_from(self.baud_rate)?;
        Divisor::compute(self.clock_hz, rate)
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::new(9600)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxMode {
    /// Return at once, `None` when nothing has arrived.
    Poll,
    /// Wait for a byte. There is no timeout: on a silent line, or with RX
    /// interrupts enabled and no receive ISR attached, this never returns.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Shutdown,
}

/// P1.1/P1.2 configuration found before the driver took the pins.
#[derive(Debug, Clone, Copy, Default)]
struct SavedPins {
    dir: u8,
    sel: u8,
    sel2: u8,
}

/// A failed `initialize`. Carries the bus so the caller can try again.
pub struct InitError<B> {
    error: UartError,
    bus: B,
}

impl<B> InitError<B> {
    pub fn error(&self) -> &UartError {
        &self.error
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

impl<B> fmt::Debug for InitError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<B> fmt::Display for InitError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<B> std::error::Error for InitError<B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<B> From<InitError<B>> for UartError {
    fn from(err: InitError<B>) -> Self {
        err.error
    }
}

/// The USCI_A0 UART. Owning one is owning the peripheral.
#[derive(Debug)]
pub struct Uart<B: Bus> {
    bus: B,
    latch: Arc<RxLatch>,
    divisor: Divisor,
    interrupts: Interrupts,
    saved_pins: SavedPins,
    state: State,
}

impl<B: Bus> Uart<B> {
    /// Brings the UART up with a fixed 8N1 LSB-first frame.
    ///
    /// The module is put in software reset first and all of its registers
    /// are written while it is held. An unsupported rate leaves it held and
    /// the pins untouched.
    pub fn initialize(mut bus: B, config: UartConfig) -> Result<Self, InitError<B>> {
        match Self::configure(&mut bus, &config) {
            Ok((divisor, saved_pins)) => {
                tracing::info!(
                    "UART: {} bit/s from {:?} at {} Hz (effective {:.1}, {} ppm)",
                    config.baud_rate,
                    config.clock,
                    config.clock_hz,
                    divisor.effective_rate_hz(),
                    divisor.error_ppm()
                );
                Ok(Self {
                    bus,
                    latch: Arc::new(RxLatch::new()),
                    divisor,
                    interrupts: config.interrupts,
                    saved_pins,
                    state: State::Active,
                })
            }
            Err(error) => Err(InitError { error, bus }),
        }
    }

    fn configure(bus: &mut B, config: &UartConfig) -> UartResult<(Divisor, SavedPins)> {
        bus.set_bits(addr::UCA0CTL1, Ctl1::UCSWRST.bits())?;
        tracing::debug!("UART: UCSWRST asserted");

        let divisor = config.divisor().map_err(|e| {
            tracing::warn!("UART: rejected configuration: {}", e);
            e
        })?;

        bus.write_u8(
            addr::UCA0CTL1,
            (config.clock.ucssel() | Ctl1::UCSWRST).bits(),
        )?;
        bus.write_u8(addr::UCA0CTL0, Ctl0::empty().bits())?;
        bus.write_u8(addr::UCA0BR0, divisor.br0())?;
        bus.write_u8(addr::UCA0BR1, divisor.br1())?;
        bus.write_u8(addr::UCA0MCTL, divisor.mctl().bits())?;
        tracing::debug!(
            "UART: BR={} BRS={} BRF={} UCOS16={}",
            divisor.br,
            divisor.brs,
            divisor.brf,
            divisor.oversampling
        );

        let saved_pins = SavedPins {
            dir: bus.read_u8(addr::P1DIR)? & UART_PINS,
            sel: bus.read_u8(addr::P1SEL)? & UART_PINS,
            sel2: bus.read_u8(addr::P1SEL2)? & UART_PINS,
        };
        bus.modify(addr::P1SEL, UART_PINS, UART_PINS)?;
        bus.modify(addr::P1SEL2, UART_PINS, UART_PINS)?;
        bus.modify(addr::P1DIR, UART_PINS, UART_TXD)?;
        tracing::debug!("UART: P1.1/P1.2 routed to USCI_A0");

        bus.clear_bits(addr::UCA0CTL1, Ctl1::UCSWRST.bits())?;
        tracing::debug!("UART: UCSWRST released");

        if !config.interrupts.is_empty() {
            bus.set_bits(addr::IE2, config.interrupts.bits())?;
            tracing::debug!("UART: enabled {:?}", config.interrupts);
        }

        Ok((divisor, saved_pins))
    }

    fn ensure_active(&self) -> UartResult<()> {
        match self.state {
            State::Active => Ok(()),
            State::Shutdown => Err(UartError::UseAfterShutdown),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    pub fn divisor(&self) -> Divisor {
        self.divisor
    }

    fn ifg2(&self) -> UartResult<Ifg2> {
        Ok(Ifg2::from_bits_retain(self.bus.read_u8(addr::IFG2)?))
    }

    fn wait_while_busy(&self) -> UartResult<()> {
        while Stat::from_bits_retain(self.bus.read_u8(addr::UCA0STAT)?).contains(Stat::UCBUSY) {
            self.bus.idle();
        }
        Ok(())
    }

    /// Queues one byte, waiting first for the transmit buffer to empty.
    pub fn send_byte(&mut self, byte: u8) -> UartResult<()> {
        self.ensure_active()?;
        while !self.ifg2()?.contains(Ifg2::UCA0TXIFG) {
            self.bus.idle();
        }
        self.bus.write_u8(addr::UCA0TXBUF, byte)?;
        tracing::trace!("UART: tx {:#04x}", byte);
        Ok(())
    }

    /// Sends bytes in order up to, not including, the first [`TERMINATOR`].
    /// Returns how many were sent.
    pub fn send_sequence(&mut self, bytes: &[u8]) -> UartResult<usize> {
        self.ensure_active()?;
        let mut sent = 0;
        for &byte in bytes.iter().take_while(|&&b| b != TERMINATOR) {
            self.send_byte(byte)?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn send_str(&mut self, s: &str) -> UartResult<usize> {
        self.send_sequence(s.as_bytes())
    }

    /// Waits until the last queued byte has left the shift register.
    pub fn flush(&mut self) -> UartResult<()> {
        self.ensure_active()?;
        self.wait_while_busy()
    }

    /// Returns the most recently received byte and marks it consumed.
    ///
    /// Bytes are not queued: one that arrives before the previous one was
    /// read replaces it.
    pub fn receive(&mut self, mode: RxMode) -> UartResult<Option<u8>> {
        self.ensure_active()?;
        loop {
            if !self.interrupts.contains(Interrupts::RX) {
                self.poll_hardware()?;
            }
            if let Some(byte) = self.latch.take() {
                tracing::trace!("UART: rx {:#04x}", byte);
                return Ok(Some(byte));
            }
            if mode == RxMode::Poll {
                return Ok(None);
            }
            self.bus.idle();
        }
    }

    /// Without a receive interrupt, moves a completed byte from RXBUF into
    /// the latch.
    fn poll_hardware(&mut self) -> UartResult<()> {
        if self.ifg2()?.contains(Ifg2::UCA0RXIFG) {
            let byte = self.bus.read_u8(addr::UCA0RXBUF)?;
            self.latch.publish(byte);
        }
        Ok(())
    }

    /// The body of the USCIAB0RX interrupt for this UART.
    pub fn rx_interrupt_handler(&self) -> RxHandler {
        RxHandler {
            latch: self.latch.clone(),
        }
    }

    /// Drains the transmitter, disables the interrupts `initialize` enabled,
    /// puts the module back in reset and hands P1.1/P1.2 back in the state
    /// they were found.
    pub fn shutdown(&mut self) -> UartResult<()> {
        self.ensure_active()?;
        self.wait_while_busy()?;

        if !self.interrupts.is_empty() {
            self.bus.clear_bits(addr::IE2, self.interrupts.bits())?;
        }
        self.bus.set_bits(addr::UCA0CTL1, Ctl1::UCSWRST.bits())?;

        self.bus.modify(addr::P1DIR, UART_PINS, self.saved_pins.dir)?;
        self.bus.modify(addr::P1SEL2, UART_PINS, self.saved_pins.sel2)?;
        self.bus.modify(addr::P1SEL, UART_PINS, self.saved_pins.sel)?;

        self.latch.clear();
        self.state = State::Shutdown;
        tracing::info!("UART: shut down");
        Ok(())
    }

    /// Gives the bus back. Does not shut the peripheral down.
    pub fn release(self) -> B {
        self.bus
    }
}

/// Receive interrupt service routine, detached from the `Uart` so it can run
/// while the owner is suspended.
#[derive(Debug, Clone)]
pub struct RxHandler {
    latch: Arc<RxLatch>,
}

impl RxHandler {
    /// Moves the received byte into the latch. The vector is shared with
    /// USCI_B0, so nothing happens unless UCA0RXIFG is set.
    pub fn service<B: Bus + ?Sized>(&self, bus: &B) -> BusResult<Option<u8>> {
        let ifg2 = Ifg2::from_bits_retain(bus.read_u8(addr::IFG2)?);
        if !ifg2.contains(Ifg2::UCA0RXIFG) {
            return Ok(None);
        }
        let byte = bus.read_u8(addr::UCA0RXBUF)?;
        if self.latch.publish(byte) {
            tracing::trace!("UART: unread byte replaced by {:#04x}", byte);
        }
        Ok(Some(byte))
    }
}
