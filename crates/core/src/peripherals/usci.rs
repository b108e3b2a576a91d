use crate::metrics::LineMetrics;
use crate::peripherals::port::PortState;
use crate::peripherals::sfr::SfrState;
use crate::regs::{usci, Ctl0, Ctl1, Ie2, Ifg2, Mctl, Stat, RATE_TOLERANCE_PPM, UART_RXD, UART_TXD};
use crate::snapshot::UsciSnapshot;
use crate::{BusResult, Peripheral};
use babyboard_config::ClockTree;
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What became of a character the peer sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// Landed in RXBUF, receive interrupt disabled.
    Latched,
    /// Landed in RXBUF and the receive interrupt fired.
    Interrupt,
    /// Module held in reset or RX pin not routed.
    Ignored,
    /// Rate or frame format did not match the peer.
    FramingError,
}

/// A character in the transmit shift register.
#[derive(Debug, Clone, Copy)]
struct Frame {
    byte: u8,
    remaining: u64,
}

/// USCI_A0 in asynchronous UART mode.
///
/// Time advances one MCLK cycle per `tick`. Characters that finish shifting
/// out while P1.2 belongs to the USCI land in `wire`; characters from the
/// peer enter through `deliver`.
#[derive(Debug)]
pub struct Usci {
    ctl0: Ctl0,
    ctl1: Ctl1,
    br0: u8,
    br1: u8,
    mctl: Mctl,
    stat: AtomicU8,
    rxbuf: u8,
    last_tx: u8,
    txbuf: Option<u8>,
    shifter: Option<Frame>,
    wire: Vec<u8>,
    clocks: ClockTree,
    peer_rate: Option<u32>,
    sfr: Arc<SfrState>,
    port: Arc<PortState>,
    metrics: Arc<LineMetrics>,
}

impl Usci {
    pub fn new(
        clocks: ClockTree,
        sfr: Arc<SfrState>,
        port: Arc<PortState>,
        metrics: Arc<LineMetrics>,
    ) -> Self {
        // PUC leaves the module held in reset with the TX buffer empty
        sfr.ifg2.fetch_or(Ifg2::UCA0TXIFG.bits(), Ordering::SeqCst);
        Self {
            ctl0: Ctl0::empty(),
            ctl1: Ctl1::UCSWRST,
            br0: 0,
            br1: 0,
            mctl: Mctl::empty(),
            stat: AtomicU8::new(0),
            rxbuf: 0,
            last_tx: 0,
            txbuf: None,
            shifter: None,
            wire: Vec::new(),
            clocks,
            peer_rate: None,
            sfr,
            port,
            metrics,
        }
    }

    pub fn in_reset(&self) -> bool {
        self.ctl1.contains(Ctl1::UCSWRST)
    }

    pub fn is_busy(&self) -> bool {
        self.shifter.is_some() || self.txbuf.is_some()
    }

    /// Everything that made it onto the TX line so far.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn take_wire(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire)
    }

    pub fn set_peer_rate(&mut self, rate: Option<u32>) {
        self.peer_rate = rate;
    }

    fn brclk_hz(&self) -> Option<u32> {
        let ssel = self.ctl1 & Ctl1::UCSSEL_MASK;
        if ssel == Ctl1::UCSSEL_ACLK {
            Some(self.clocks.aclk_hz)
        } else if ssel == Ctl1::UCSSEL_UCLK {
            // UCLK pin, nothing is attached to it on this board
            None
        } else {
            Some(self.clocks.smclk_hz)
        }
    }

    /// Bit period in eighths of a BRCLK cycle.
    fn bit_period_eighths(&self) -> u64 {
        let br = u64::from(u16::from_le_bytes([self.br0, self.br1]));
        let units = if self.mctl.oversampling() {
            8 * (16 * br + u64::from(self.mctl.brf()))
        } else {
            8 * br + u64::from(self.mctl.brs())
        };
        units.max(1)
    }

    /// The bit rate the current register contents produce.
    pub fn bit_rate_hz(&self) -> Option<f64> {
        let brclk = self.brclk_hz()?;
        Some(f64::from(brclk) * 8.0 / self.bit_period_eighths() as f64)
    }

    fn frame_cycles(&self) -> u64 {
        let Some(brclk) = self.brclk_hz() else {
            return u64::MAX;
        };
        let num = u64::from(self.ctl0.frame_bits())
            * self.bit_period_eighths()
            * u64::from(self.clocks.mclk_hz);
        let den = 8 * u64::from(brclk);
        num.div_ceil(den).max(1)
    }

    fn ifg(&self) -> Ifg2 {
        Ifg2::from_bits_retain(self.sfr.ifg2.load(Ordering::SeqCst))
    }

    fn ie(&self) -> Ie2 {
        Ie2::from_bits_retain(self.sfr.ie2.load(Ordering::SeqCst))
    }

    fn set_ifg(&self, flag: Ifg2) {
        self.sfr.ifg2.fetch_or(flag.bits(), Ordering::SeqCst);
    }

    fn clear_ifg(&self, flag: Ifg2) {
        self.sfr.ifg2.fetch_and(!flag.bits(), Ordering::SeqCst);
    }

    fn set_stat(&self, flags: Stat) {
        self.stat.fetch_or(flags.bits(), Ordering::SeqCst);
    }

    fn check_held(&self, register: &str) {
        if !self.in_reset() {
            self.metrics.record_sequencing_violation();
            tracing::warn!("USCI_A0: {} written while UCSWRST is clear", register);
        }
    }

    fn enter_reset(&mut self) {
        self.sfr.ie2.fetch_and(
            !(Ie2::UCA0RXIE | Ie2::UCA0TXIE).bits(),
            Ordering::SeqCst,
        );
        self.clear_ifg(Ifg2::UCA0RXIFG);
        self.set_ifg(Ifg2::UCA0TXIFG);
        self.stat.store(0, Ordering::SeqCst);
        if let Some(frame) = self.shifter.take() {
            tracing::debug!("USCI_A0: reset aborted frame {:#04x}", frame.byte);
        }
        self.txbuf = None;
    }

    fn start_frame(&mut self, byte: u8) {
        self.shifter = Some(Frame {
            byte,
            remaining: self.frame_cycles(),
        });
    }

    fn transmit(&mut self, byte: u8) {
        self.last_tx = byte;
        if self.in_reset() {
            self.metrics.record_tx_dropped();
            tracing::warn!("USCI_A0: TXBUF write {:#04x} while held in reset", byte);
            return;
        }
        if !self.ifg().contains(Ifg2::UCA0TXIFG) {
            if let Some(lost) = self.txbuf.replace(byte) {
                self.metrics.record_tx_dropped();
                tracing::warn!("USCI_A0: TXBUF overwritten, {:#04x} lost", lost);
            }
            return;
        }
        if self.shifter.is_none() {
            self.start_frame(byte);
        } else {
            self.txbuf = Some(byte);
            self.clear_ifg(Ifg2::UCA0TXIFG);
        }
    }

    fn finish_frame(&mut self, frame: Frame) {
        if self.port.routed_to_usci(UART_TXD) {
            tracing::trace!("USCI_A0: sent {:#04x}", frame.byte);
            self.wire.push(frame.byte);
            self.metrics.record_tx_byte();
        } else {
            self.metrics.record_tx_dropped();
            tracing::warn!("USCI_A0: {:#04x} shifted out but TX pin not routed", frame.byte);
        }

        if let Some(next) = self.txbuf.take() {
            self.start_frame(next);
            self.set_ifg(Ifg2::UCA0TXIFG);
        }
    }

    /// A complete character arrives from the peer on the RX line.
    pub fn deliver(&mut self, byte: u8) -> RxOutcome {
        if self.in_reset() {
            tracing::debug!("USCI_A0: {:#04x} ignored, module held in reset", byte);
            return RxOutcome::Ignored;
        }
        if !self.port.routed_to_usci(UART_RXD) {
            tracing::debug!("USCI_A0: {:#04x} ignored, RX pin not routed", byte);
            return RxOutcome::Ignored;
        }
        if !self.frame_matches_peer() {
            self.set_stat(Stat::UCFE | Stat::UCRXERR);
            self.metrics.record_framing_error();
            tracing::warn!("USCI_A0: framing error receiving {:#04x}", byte);
            return RxOutcome::FramingError;
        }
        if self.ifg().contains(Ifg2::UCA0RXIFG) {
            self.set_stat(Stat::UCOE);
            self.metrics.record_rx_overrun();
            tracing::debug!("USCI_A0: overrun, {:#04x} replaces {:#04x}", byte, self.rxbuf);
        }
        self.rxbuf = byte;
        self.set_ifg(Ifg2::UCA0RXIFG);
        self.metrics.record_rx_byte();
        if self.ie().contains(Ie2::UCA0RXIE) {
            RxOutcome::Interrupt
        } else {
            RxOutcome::Latched
        }
    }

    /// The peer always speaks 8N1, LSB first.
    fn frame_matches_peer(&self) -> bool {
        let foreign = Ctl0::UCPEN
            | Ctl0::UC7BIT
            | Ctl0::UCMSB
            | Ctl0::UCSYNC
            | Ctl0::UCMODE0
            | Ctl0::UCMODE1;
        if self.ctl0.intersects(foreign) {
            return false;
        }
        let Some(peer) = self.peer_rate else {
            return true;
        };
        let Some(rate) = self.bit_rate_hz() else {
            return false;
        };
        let peer = f64::from(peer);
        let error_ppm = ((rate - peer).abs() / peer) * 1_000_000.0;
        error_ppm <= f64::from(RATE_TOLERANCE_PPM)
    }

    pub fn snapshot(&self) -> UsciSnapshot {
        UsciSnapshot {
            ctl0: self.ctl0.bits(),
            ctl1: self.ctl1.bits(),
            br0: self.br0,
            br1: self.br1,
            mctl: self.mctl.bits(),
            stat: self.stat.load(Ordering::SeqCst),
            rxbuf: self.rxbuf,
            tx_busy: self.is_busy(),
            bit_rate_hz: self.bit_rate_hz(),
        }
    }
}

impl Peripheral for Usci {
    fn read(&self, offset: u64) -> BusResult<u8> {
        let value = match offset {
            usci::CTL0 => self.ctl0.bits(),
            usci::CTL1 => self.ctl1.bits(),
            usci::BR0 => self.br0,
            usci::BR1 => self.br1,
            usci::MCTL => self.mctl.bits(),
            usci::STAT => {
                let busy = if self.is_busy() { Stat::UCBUSY.bits() } else { 0 };
                self.stat.load(Ordering::SeqCst) | busy
            }
            usci::RXBUF => {
                self.clear_ifg(Ifg2::UCA0RXIFG);
                self.stat.fetch_and(
                    !(Stat::UCFE | Stat::UCOE | Stat::UCPE | Stat::UCBRK | Stat::UCRXERR).bits(),
                    Ordering::SeqCst,
                );
                self.rxbuf
            }
            usci::TXBUF => self.last_tx,
            _ => 0,
        };
        Ok(value)
    }

    fn write(&mut self, offset: u64, value: u8) -> BusResult<()> {
        match offset {
            usci::CTL0 => {
                self.check_held("UCA0CTL0");
                self.ctl0 = Ctl0::from_bits_retain(value);
            }
            usci::CTL1 => {
                let new = Ctl1::from_bits_retain(value);
                if (new & Ctl1::UCSSEL_MASK) != (self.ctl1 & Ctl1::UCSSEL_MASK) {
                    self.check_held("UCA0CTL1.UCSSEL");
                }
                let was_held = self.in_reset();
                self.ctl1 = new;
                match (was_held, self.in_reset()) {
                    (false, true) => {
                        tracing::debug!("USCI_A0: entering software reset");
                        self.enter_reset();
                    }
                    (true, false) => {
                        tracing::debug!(
                            "USCI_A0: released from reset at {:?} bit/s",
                            self.bit_rate_hz()
                        );
                    }
                    _ => {}
                }
            }
            usci::BR0 => {
                self.check_held("UCA0BR0");
                self.br0 = value;
            }
            usci::BR1 => {
                self.check_held("UCA0BR1");
                self.br1 = value;
            }
            usci::MCTL => {
                self.check_held("UCA0MCTL");
                self.mctl = Mctl::from_bits_retain(value);
            }
            usci::STAT => {
                // Only UCLISTEN is writable
                let keep = self.stat.load(Ordering::SeqCst) & !Stat::UCLISTEN.bits();
                self.stat
                    .store(keep | (value & Stat::UCLISTEN.bits()), Ordering::SeqCst);
            }
            usci::TXBUF => self.transmit(value),
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self) -> bool {
        if let Some(mut frame) = self.shifter.take() {
            frame.remaining = frame.remaining.saturating_sub(1);
            if frame.remaining > 0 {
                self.shifter = Some(frame);
            } else {
                self.finish_frame(frame);
            }
        }
        // Level-triggered: requested for as long as both bits are set
        self.ie().contains(Ie2::UCA0TXIE) && self.ifg().contains(Ifg2::UCA0TXIFG)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
