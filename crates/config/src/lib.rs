use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest MCLK the MSP430G2553 is rated for.
pub const MAX_MCLK_HZ: u32 = 16_000_000;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClockSelect {
    Aclk,
    #[default]
    Smclk,
}

/// Interrupts the UART may enable. Transmission is always polled.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterruptSource {
    Rx,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClockTree {
    #[serde(default = "default_mclk_hz")]
    pub mclk_hz: u32,
    #[serde(default = "default_mclk_hz")]
    pub smclk_hz: u32,
    #[serde(default = "default_aclk_hz")]
    pub aclk_hz: u32,
}

impl Default for ClockTree {
    fn default() -> Self {
        Self {
            mclk_hz: default_mclk_hz(),
            smclk_hz: default_mclk_hz(),
            aclk_hz: default_aclk_hz(),
        }
    }
}

fn default_mclk_hz() -> u32 {
    // Calibrated DCO (CALBC1_1MHZ / CALDCO_1MHZ)
    1_000_000
}

fn default_aclk_hz() -> u32 {
    // LFXT1 watch crystal
    32_768
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UartSettings {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub clock: ClockSelect,
    #[serde(default)]
    pub interrupts: Vec<InterruptSource>,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            clock: ClockSelect::default(),
            interrupts: Vec::new(),
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

/// The device on the other end of the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PeerSettings {
    /// Nominal rate of the peer. `None` means the peer always matches the board.
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    pub schema_version: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub clocks: ClockTree,
    #[serde(default)]
    pub uart: UartSettings,
    #[serde(default)]
    pub peer: PeerSettings,
}

fn default_name() -> String {
    "msp430g2553".to_string()
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0".to_string(),
            name: default_name(),
            clocks: ClockTree::default(),
            uart: UartSettings::default(),
            peer: PeerSettings::default(),
        }
    }
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open board config at {:?}", path.as_ref()))?;
        let config: Self =
            serde_yaml::from_reader(f).context("Failed to parse Board Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse Board Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.clocks.mclk_hz == 0 || self.clocks.smclk_hz == 0 || self.clocks.aclk_hz == 0 {
            anyhow::bail!("Clock frequencies must be greater than zero");
        }

        if self.clocks.mclk_hz > MAX_MCLK_HZ {
            anyhow::bail!(
                "Clock 'mclk_hz' of {} exceeds the {} Hz device maximum",
                self.clocks.mclk_hz,
                MAX_MCLK_HZ
            );
        }

        if self.uart.baud_rate == 0 {
            anyhow::bail!("UART 'baud_rate' must be greater than zero");
        }

        if self.peer.baud_rate == Some(0) {
            anyhow::bail!("Peer 'baud_rate' must be greater than zero");
        }

        Ok(())
    }

    /// Frequency feeding the UART's BRCLK for the selected source.
    pub fn uart_clock_hz(&self) -> u32 {
        match self.uart.clock {
            ClockSelect::Aclk => self.clocks.aclk_hz,
            ClockSelect::Smclk => self.clocks.smclk_hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let yaml = r#"
schema_version: "1.0"
name: "babyboard"
clocks:
  mclk_hz: 8000000
  smclk_hz: 8000000
uart:
  baud_rate: 115200
  clock: smclk
  interrupts: [rx]
peer:
  baud_rate: 115200
"#;
        let config = BoardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "babyboard");
        assert_eq!(config.clocks.aclk_hz, 32_768);
        assert_eq!(config.uart.baud_rate, 115200);
        assert_eq!(config.uart.interrupts, vec![InterruptSource::Rx]);
        assert_eq!(config.peer.baud_rate, Some(115200));
        assert_eq!(config.uart_clock_hz(), 8_000_000);
    }

    #[test]
    fn test_defaults() {
        let config = BoardConfig::from_yaml("schema_version: \"1.0\"\n").unwrap();
        assert_eq!(config, BoardConfig::default());
        assert_eq!(config.uart.baud_rate, 9600);
        assert_eq!(config.uart.clock, ClockSelect::Smclk);
        assert_eq!(config.uart_clock_hz(), 1_000_000);
        assert!(config.peer.baud_rate.is_none());
    }

    #[test]
    fn test_aclk_selection() {
        let yaml = r#"
schema_version: "1.0"
uart:
  clock: aclk
"#;
        let config = BoardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.uart_clock_hz(), 32_768);
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
"#;
        let config: BoardConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_zero_clock() {
        let yaml = r#"
schema_version: "1.0"
clocks:
  smclk_hz: 0
"#;
        let err = BoardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_mclk_above_maximum() {
        let yaml = r#"
schema_version: "1.0"
clocks:
  mclk_hz: 25000000
"#;
        let err = BoardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("mclk_hz"));
    }

    #[test]
    fn test_zero_baud_rate() {
        let yaml = r#"
schema_version: "1.0"
uart:
  baud_rate: 0
"#;
        let err = BoardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("baud_rate"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
schema_version: "1.0"
uart:
  parity: even
"#;
        assert!(BoardConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_tx_interrupt_rejected() {
        let yaml = r#"
schema_version: "1.0"
uart:
  interrupts: [rx, tx]
"#;
        assert!(BoardConfig::from_yaml(yaml).is_err());
    }
}
