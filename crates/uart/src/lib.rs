// BabyBoard - MSP430 UART Driver
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Driver for the MSP430G2553 USCI_A0 in UART mode.
//!
//! The frame format is fixed at 8 data bits, no parity, one stop bit, LSB
//! first. TX is P1.2 and RX is P1.1; no other pin is ever touched.

pub mod baud;
pub mod latch;
pub mod uart;

use babyboard_core::BusError;

pub use baud::{BaudRate, ClockSource, Divisor};
pub use latch::RxLatch;
pub use uart::{InitError, Interrupts, RxHandler, RxMode, Uart, UartConfig};

/// Reasons a configuration is refused by `Uart::initialize`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),
    #[error("No divisor reaches {rate} bit/s from a {clock_hz} Hz clock")]
    DivisorOutOfRange { rate: u32, clock_hz: u32 },
    #[error("{rate} bit/s from a {clock_hz} Hz clock is off by {error_ppm} ppm")]
    RateError {
        rate: u32,
        clock_hz: u32,
        error_ppm: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UartError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("UART used after shutdown")]
    UseAfterShutdown,
    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type UartResult<T> = Result<T, UartError>;
