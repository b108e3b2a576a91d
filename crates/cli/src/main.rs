use anyhow::Context;
use babyboard_config::{BoardConfig, ClockSelect, InterruptSource};
use babyboard_core::{Board, Irq};
use babyboard_uart::{BaudRate, ClockSource, Divisor, Interrupts, RxMode, Uart, UartConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable register-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the UCA0BR0/BR1/MCTL settings for every supported rate
    Divisors {
        /// BRCLK frequency in Hz
        #[arg(long, default_value = "1000000")]
        clock_hz: u32,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Bring the UART up on a simulated board and exchange bytes with the peer
    Loopback {
        /// Path to the board config (YAML)
        #[arg(short, long)]
        system: Option<PathBuf>,

        /// Text the board sends
        #[arg(long)]
        send: Option<String>,

        /// Text the peer sends; every byte received is echoed back
        #[arg(long)]
        inject: Option<String>,

        /// Write a JSON snapshot of the board here before shutting down
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

#[derive(Serialize, Debug)]
struct DivisorRow {
    rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    divisor: Option<Divisor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective_rate_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_ppm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Divisors { clock_hz, json } => divisors(clock_hz, json),
        Command::Loopback {
            system,
            send,
            inject,
            snapshot,
        } => loopback(system, send, inject, snapshot),
    }
}

fn divisors(clock_hz: u32, json: bool) -> anyhow::Result<()> {
    let rows: Vec<DivisorRow> = BaudRate::ALL
        .into_iter()
        .map(|rate| match Divisor::compute(clock_hz, rate) {
            Ok(d) => DivisorRow {
                rate: rate.bits_per_second(),
                divisor: Some(d),
                effective_rate_hz: Some(d.effective_rate_hz()),
                error_ppm: Some(d.error_ppm()),
                error: None,
            },
            Err(e) => DivisorRow {
                rate: rate.bits_per_second(),
                divisor: None,
                effective_rate_hz: None,
                error_ppm: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("BRCLK {} Hz", clock_hz);
    println!(
        "{:>7}  {:>4}  {:>4}  {:>4}  {:>6}  {:>12}  {:>7}",
        "rate", "BR0", "BR1", "MCTL", "UCOS16", "effective", "ppm"
    );
    for row in &rows {
        match &row.divisor {
            Some(d) => println!(
                "{:>7}  0x{:02X}  0x{:02X}  0x{:02X}  {:>6}  {:>12.1}  {:>7}",
                row.rate,
                d.br0(),
                d.br1(),
                d.mctl().bits(),
                d.oversampling,
                d.effective_rate_hz(),
                d.error_ppm()
            ),
            None => println!(
                "{:>7}  {}",
                row.rate,
                row.error.as_deref().unwrap_or_default()
            ),
        }
    }
    Ok(())
}

fn uart_config(config: &BoardConfig) -> UartConfig {
    let source = match config.uart.clock {
        ClockSelect::Aclk => ClockSource::Aclk,
        ClockSelect::Smclk => ClockSource::Smclk,
    };
    let interrupts = config
        .uart
        .interrupts
        .iter()
        .fold(Interrupts::empty(), |acc, src| match src {
            InterruptSource::Rx => acc | Interrupts::RX,
        });
    UartConfig::new(config.uart.baud_rate)
        .clock(source, config.uart_clock_hz())
        .interrupts(interrupts)
}

fn loopback(
    system: Option<PathBuf>,
    send: Option<String>,
    inject: Option<String>,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = match system {
        Some(path) => {
            info!("Loading board config: {:?}", path);
            BoardConfig::from_file(&path)?
        }
        None => {
            info!("Using default board configuration");
            BoardConfig::default()
        }
    };

    let board = Board::from_config(&config);
    let uart_config = uart_config(&config);
    let mut uart = Uart::initialize(board.clone(), uart_config)
        .with_context(|| format!("Failed to initialise UART on {}", config.name))?;

    if uart_config.interrupts.contains(Interrupts::RX) {
        let handler = uart.rx_interrupt_handler();
        board.attach_handler(Irq::UsciAb0Rx, move |bus| {
            if let Err(e) = handler.service(&*bus) {
                tracing::error!("RX interrupt failed: {}", e);
            }
        });
    }

    if let Some(text) = &send {
        let sent = uart.send_str(text)?;
        info!("Queued {} bytes", sent);
    }

    let mut received = Vec::new();
    if let Some(text) = &inject {
        for &byte in text.as_bytes() {
            let outcome = board.deliver(byte);
            tracing::debug!("Peer sent {:#04x}: {:?}", byte, outcome);
            if let Some(b) = uart.receive(RxMode::Poll)? {
                received.push(b);
                uart.send_byte(b)?;
            }
        }
    }
    uart.flush()?;

    println!("tx: {}", String::from_utf8_lossy(&board.transmitted()));
    println!("rx: {}", String::from_utf8_lossy(&received));

    if let Some(path) = &snapshot {
        let json = serde_json::to_string_pretty(&board.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        info!("Snapshot written to {:?}", path);
    }

    uart.shutdown()?;

    let metrics = board.metrics();
    info!(
        "Done: {} bytes sent, {} received, {} framing errors, {} bus cycles",
        metrics.get_bytes_transmitted(),
        metrics.get_bytes_received(),
        metrics.get_framing_errors(),
        metrics.get_bus_cycles()
    );
    Ok(())
}
