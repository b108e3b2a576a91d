//! MSP430G2553 register map for the pieces of the chip the UART touches.
//!
//! Only byte-wide peripherals live in this range, so every address fits in a
//! `u16` and every register in a `u8`.

use bitflags::bitflags;

/// Absolute byte addresses.
pub mod addr {
    pub const IE1: u16 = 0x0000;
    pub const IE2: u16 = 0x0001;
    pub const IFG1: u16 = 0x0002;
    pub const IFG2: u16 = 0x0003;

    pub const P1IN: u16 = 0x0020;
    pub const P1OUT: u16 = 0x0021;
    pub const P1DIR: u16 = 0x0022;
    pub const P1IFG: u16 = 0x0023;
    pub const P1IES: u16 = 0x0024;
    pub const P1IE: u16 = 0x0025;
    pub const P1SEL: u16 = 0x0026;
    pub const P1REN: u16 = 0x0027;

    pub const P2IN: u16 = 0x0028;
    pub const P2OUT: u16 = 0x0029;
    pub const P2DIR: u16 = 0x002A;
    pub const P2SEL: u16 = 0x002E;

    pub const P1SEL2: u16 = 0x0041;
    pub const P2SEL2: u16 = 0x0042;

    pub const UCA0CTL0: u16 = 0x0060;
    pub const UCA0CTL1: u16 = 0x0061;
    pub const UCA0BR0: u16 = 0x0062;
    pub const UCA0BR1: u16 = 0x0063;
    pub const UCA0MCTL: u16 = 0x0064;
    pub const UCA0STAT: u16 = 0x0065;
    pub const UCA0RXBUF: u16 = 0x0066;
    pub const UCA0TXBUF: u16 = 0x0067;
}

/// Port register offsets relative to PxIN.
pub mod port {
    pub const IN: u64 = 0x0;
    pub const OUT: u64 = 0x1;
    pub const DIR: u64 = 0x2;
    pub const IFG: u64 = 0x3;
    pub const IES: u64 = 0x4;
    pub const IE: u64 = 0x5;
    pub const SEL: u64 = 0x6;
    pub const REN: u64 = 0x7;
}

/// USCI_A0 register offsets relative to UCA0CTL0.
pub mod usci {
    pub const CTL0: u64 = 0x0;
    pub const CTL1: u64 = 0x1;
    pub const BR0: u64 = 0x2;
    pub const BR1: u64 = 0x3;
    pub const MCTL: u64 = 0x4;
    pub const STAT: u64 = 0x5;
    pub const RXBUF: u64 = 0x6;
    pub const TXBUF: u64 = 0x7;
}

/// P1.1 carries UCA0RXD.
pub const UART_RXD: u8 = 1 << 1;
/// P1.2 carries UCA0TXD.
pub const UART_TXD: u8 = 1 << 2;
pub const UART_PINS: u8 = UART_RXD | UART_TXD;

/// Largest relative deviation between the programmed and the nominal bit
/// rate at which a receiver sampling mid-bit still recovers a 10-bit frame.
pub const RATE_TOLERANCE_PPM: u32 = 20_000;

bitflags! {
    /// UCA0CTL0. All clear selects 8N1, LSB first, asynchronous UART mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ctl0: u8 {
        const UCPEN = 0x80;
        const UCPAR = 0x40;
        const UCMSB = 0x20;
        const UC7BIT = 0x10;
        const UCSPB = 0x08;
        const UCMODE1 = 0x04;
        const UCMODE0 = 0x02;
        const UCSYNC = 0x01;
    }
}

impl Ctl0 {
    /// Bits on the wire per character, start and stop bits included.
    pub fn frame_bits(self) -> u32 {
        let data = if self.contains(Ctl0::UC7BIT) { 7 } else { 8 };
        let parity = u32::from(self.contains(Ctl0::UCPEN));
        let stop = if self.contains(Ctl0::UCSPB) { 2 } else { 1 };
        1 + data + parity + stop
    }
}

bitflags! {
    /// UCA0CTL1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ctl1: u8 {
        const UCSSEL1 = 0x80;
        const UCSSEL0 = 0x40;
        const UCRXEIE = 0x20;
        const UCBRKIE = 0x10;
        const UCDORM = 0x08;
        const UCTXADDR = 0x04;
        const UCTXBRK = 0x02;
        const UCSWRST = 0x01;
    }
}

impl Ctl1 {
    pub const UCSSEL_MASK: Ctl1 = Ctl1::UCSSEL1.union(Ctl1::UCSSEL0);
    pub const UCSSEL_UCLK: Ctl1 = Ctl1::empty();
    pub const UCSSEL_ACLK: Ctl1 = Ctl1::UCSSEL0;
    pub const UCSSEL_SMCLK: Ctl1 = Ctl1::UCSSEL1;
}

bitflags! {
    /// UCA0MCTL. UCBRF and UCBRS are multi-bit fields, see the helpers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mctl: u8 {
        const UCOS16 = 0x01;
        const _ = !0;
    }
}

impl Mctl {
    const BRS_SHIFT: u8 = 1;
    const BRS_MASK: u8 = 0x0E;
    const BRF_SHIFT: u8 = 4;
    const BRF_MASK: u8 = 0xF0;

    pub fn new(brf: u8, brs: u8, oversampling: bool) -> Self {
        let mut bits = ((brf << Self::BRF_SHIFT) & Self::BRF_MASK)
            | ((brs << Self::BRS_SHIFT) & Self::BRS_MASK);
        if oversampling {
            bits |= Mctl::UCOS16.bits();
        }
        Mctl::from_bits_retain(bits)
    }

    /// First-stage modulation (oversampling mode only).
    pub fn brf(self) -> u8 {
        (self.bits() & Self::BRF_MASK) >> Self::BRF_SHIFT
    }

    /// Second-stage modulation.
    pub fn brs(self) -> u8 {
        (self.bits() & Self::BRS_MASK) >> Self::BRS_SHIFT
    }

    pub fn oversampling(self) -> bool {
        self.contains(Mctl::UCOS16)
    }
}

bitflags! {
    /// UCA0STAT.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Stat: u8 {
        const UCLISTEN = 0x80;
        const UCFE = 0x40;
        const UCOE = 0x20;
        const UCPE = 0x10;
        const UCBRK = 0x08;
        const UCRXERR = 0x04;
        const UCADDR = 0x02;
        const UCBUSY = 0x01;
    }
}

bitflags! {
    /// IE2. The UCB0 bits belong to the other USCI and are never touched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ie2: u8 {
        const UCB0TXIE = 0x08;
        const UCB0RXIE = 0x04;
        const UCA0TXIE = 0x02;
        const UCA0RXIE = 0x01;
    }
}

bitflags! {
    /// IFG2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ifg2: u8 {
        const UCB0TXIFG = 0x08;
        const UCB0RXIFG = 0x04;
        const UCA0TXIFG = 0x02;
        const UCA0RXIFG = 0x01;
    }
}
