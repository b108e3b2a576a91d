use crate::ConfigError;
use babyboard_core::regs::{Ctl1, Mctl, RATE_TOLERANCE_PPM};
use serde::Serialize;

/// Rates the driver accepts. 9600 and 115200 are the ones the board is
/// required to support, the rest come for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 8] = [
        BaudRate::B1200,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.bits_per_second() == rate)
            .ok_or(ConfigError::UnsupportedBaudRate(rate))
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.bits_per_second()
    }
}

/// BRCLK source for the USCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ClockSource {
    Aclk,
    #[default]
    Smclk,
}

impl ClockSource {
    pub fn ucssel(self) -> Ctl1 {
        match self {
            ClockSource::Aclk => Ctl1::UCSSEL_ACLK,
            ClockSource::Smclk => Ctl1::UCSSEL_SMCLK,
        }
    }
}

/// Contents of UCA0BR0/UCA0BR1/UCA0MCTL for one clock and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Divisor {
    /// UCBRx, the integer prescaler.
    pub br: u16,
    /// UCBRSx, second-stage modulation in eighths of a BRCLK cycle.
    pub brs: u8,
    /// UCBRFx, first-stage modulation in sixteenths of a bit (UCOS16 only).
    pub brf: u8,
    /// UCOS16
    pub oversampling: bool,
    pub clock_hz: u32,
    pub rate: u32,
}

impl Divisor {
    /// Smallest clock-to-rate ratio the low-frequency mode handles.
    const MIN_RATIO: u64 = 3;

    /// Works out the register contents for `rate` from a `clock_hz` BRCLK.
    ///
    /// The integer part of N = clock / rate is truncated and the remainder
    /// rounded to the nearest modulation step. Oversampling is used when
    /// N >= 16 and it keeps the rate inside the receiver's tolerance, with
    /// low-frequency mode as the fallback.
    pub fn compute(clock_hz: u32, rate: BaudRate) -> Result<Self, ConfigError> {
        let bps = rate.bits_per_second();
        let clock = u64::from(clock_hz);
        let rate64 = u64::from(bps);

        if clock < Self::MIN_RATIO * rate64 {
            return Err(ConfigError::DivisorOutOfRange { rate: bps, clock_hz });
        }

        let mut best: Option<Divisor> = None;
        if clock >= 16 * rate64 {
            let candidate = Self::oversampled(clock, rate64, clock_hz, bps);
            if let Some(d) = candidate {
                if d.error_ppm() <= RATE_TOLERANCE_PPM {
                    return Ok(d);
                }
                best = Some(d);
            }
        }

        let low = Self::low_frequency(clock, rate64, clock_hz, bps).ok_or(
            ConfigError::DivisorOutOfRange {
                rate: bps,
                clock_hz,
            },
        )?;
        if low.error_ppm() <= RATE_TOLERANCE_PPM {
            return Ok(low);
        }

        let closest = match best {
            Some(os) if os.error_ppm() < low.error_ppm() => os,
            _ => low,
        };
        Err(ConfigError::RateError {
            rate: bps,
            clock_hz,
            error_ppm: closest.error_ppm(),
        })
    }

    fn oversampled(clock: u64, rate: u64, clock_hz: u32, bps: u32) -> Option<Self> {
        let mut br = clock / (16 * rate);
        let rem = clock - br * 16 * rate;
        // round(rem / (16 * rate) * 16)
        let mut brf = (2 * rem + rate) / (2 * rate);
        if brf >= 16 {
            br += 1;
            brf = 0;
        }
        Some(Self {
            br: u16::try_from(br).ok()?,
            brs: 0,
            brf: brf as u8,
            oversampling: true,
            clock_hz,
            rate: bps,
        })
    }

    fn low_frequency(clock: u64, rate: u64, clock_hz: u32, bps: u32) -> Option<Self> {
        let mut br = clock / rate;
        let rem = clock % rate;
        // round(rem / rate * 8)
        let mut brs = (16 * rem + rate) / (2 * rate);
        if brs >= 8 {
            br += 1;
            brs = 0;
        }
        Some(Self {
            br: u16::try_from(br).ok()?,
            brs: brs as u8,
            brf: 0,
            oversampling: false,
            clock_hz,
            rate: bps,
        })
    }

    pub fn br0(&self) -> u8 {
        self.br.to_le_bytes()[0]
    }

    pub fn br1(&self) -> u8 {
        self.br.to_le_bytes()[1]
    }

    pub fn mctl(&self) -> Mctl {
        Mctl::new(self.brf, self.brs, self.oversampling)
    }

    /// Average bit period in eighths of a BRCLK cycle.
    fn period_eighths(&self) -> u64 {
        let br = u64::from(self.br);
        if self.oversampling {
            8 * (16 * br + u64::from(self.brf))
        } else {
            8 * br + u64::from(self.brs)
        }
    }

    pub fn effective_rate_hz(&self) -> f64 {
        f64::from(self.clock_hz) * 8.0 / self.period_eighths() as f64
    }

    /// Deviation of the effective rate from the nominal one, in ppm.
    pub fn error_ppm(&self) -> u32 {
        let actual = 8 * u64::from(self.clock_hz);
        let nominal = u64::from(self.rate) * self.period_eighths();
        let ppm = actual.abs_diff(nominal) * 1_000_000 / nominal;
        u32::try_from(ppm).unwrap_or(u32::MAX)
    }
}
