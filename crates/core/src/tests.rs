#[cfg(test)]
mod tests {
    use crate::peripherals::usci::RxOutcome;
    use crate::regs::{addr, Ctl1, Ie2, Ifg2, Mctl, Stat, UART_PINS};
    use crate::{Board, Bus, BusError, Irq};
    use babyboard_config::BoardConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 9600 baud from a 1 MHz SMCLK, low-frequency mode, pins routed.
    fn configure_9600(board: &mut Board) {
        board
            .write_u8(addr::UCA0CTL1, (Ctl1::UCSWRST | Ctl1::UCSSEL_SMCLK).bits())
            .unwrap();
        board.write_u8(addr::UCA0CTL0, 0).unwrap();
        board.write_u8(addr::UCA0BR0, 104).unwrap();
        board.write_u8(addr::UCA0BR1, 0).unwrap();
        board
            .write_u8(addr::UCA0MCTL, Mctl::new(0, 1, false).bits())
            .unwrap();
        board.set_bits(addr::P1SEL, UART_PINS).unwrap();
        board.set_bits(addr::P1SEL2, UART_PINS).unwrap();
        board.clear_bits(addr::UCA0CTL1, Ctl1::UCSWRST.bits()).unwrap();
    }

    fn ifg2(board: &Board) -> Ifg2 {
        Ifg2::from_bits_retain(board.read_u8(addr::IFG2).unwrap())
    }

    #[test]
    fn test_power_up_state() {
        let board = Board::new();
        let ctl1 = board.read_u8(addr::UCA0CTL1).unwrap();
        assert_eq!(ctl1, Ctl1::UCSWRST.bits());
        assert!(ifg2(&board).contains(Ifg2::UCA0TXIFG));
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
        assert_eq!(board.read_u8(addr::P1SEL).unwrap(), 0);
        assert_eq!(board.read_u8(addr::P1SEL2).unwrap(), 0);
    }

    #[test]
    fn test_unmapped_address() {
        let mut board = Board::new();
        assert_eq!(board.read_u8(0x0100), Err(BusError::Unmapped(0x0100)));
        assert_eq!(board.write_u8(0x0050, 1), Err(BusError::Unmapped(0x0050)));
    }

    #[test]
    fn test_modify_confined_to_mask() {
        let mut board = Board::new();
        board.write_u8(addr::P1DIR, 0b1010_0001).unwrap();
        board.modify(addr::P1DIR, 0b0000_0110, 0b1111_0100).unwrap();
        assert_eq!(board.read_u8(addr::P1DIR).unwrap(), 0b1010_0101);
    }

    #[test]
    fn test_port_in_is_read_only() {
        let mut board = Board::new();
        board.write_u8(addr::P1IN, 0xFF).unwrap();
        assert_eq!(board.read_u8(addr::P1IN).unwrap(), 0);
    }

    #[test]
    fn test_bit_rate_from_registers() {
        let mut board = Board::new();
        configure_9600(&mut board);
        let rate = board.bit_rate_hz().unwrap();
        // 1 MHz / (104 + 1/8)
        assert!((rate - 9603.84).abs() < 0.01, "rate was {}", rate);
    }

    #[test]
    fn test_transmit_reaches_wire() {
        let mut board = Board::new();
        configure_9600(&mut board);

        board.write_u8(addr::UCA0TXBUF, b'H').unwrap();
        // Shift register took it, the buffer is free again
        assert!(ifg2(&board).contains(Ifg2::UCA0TXIFG));
        let stat = Stat::from_bits_retain(board.read_u8(addr::UCA0STAT).unwrap());
        assert!(stat.contains(Stat::UCBUSY));

        // 10 bits at ~104.125 cycles per bit
        board.run_cycles(1100);
        assert_eq!(board.transmitted(), b"H");
        let stat = Stat::from_bits_retain(board.read_u8(addr::UCA0STAT).unwrap());
        assert!(!stat.contains(Stat::UCBUSY));
    }

    #[test]
    fn test_transmit_double_buffer() {
        let mut board = Board::new();
        configure_9600(&mut board);

        board.write_u8(addr::UCA0TXBUF, b'a').unwrap();
        board.write_u8(addr::UCA0TXBUF, b'b').unwrap();
        assert!(!ifg2(&board).contains(Ifg2::UCA0TXIFG));

        // Writing while TXIFG is clear overwrites the waiting byte
        board.write_u8(addr::UCA0TXBUF, b'c').unwrap();
        board.run_cycles(3000);

        assert_eq!(board.transmitted(), b"ac");
        assert_eq!(board.metrics().get_tx_dropped(), 1);
    }

    #[test]
    fn test_transmit_needs_routed_pin() {
        let mut board = Board::new();
        configure_9600(&mut board);
        board.clear_bits(addr::P1SEL2, UART_PINS).unwrap();

        board.write_u8(addr::UCA0TXBUF, b'x').unwrap();
        board.run_cycles(1100);
        assert!(board.transmitted().is_empty());
        assert_eq!(board.metrics().get_tx_dropped(), 1);
    }

    #[test]
    fn test_writes_while_held_are_dropped() {
        let mut board = Board::new();
        board.write_u8(addr::UCA0TXBUF, b'x').unwrap();
        board.run_cycles(10_000);
        assert!(board.transmitted().is_empty());
        assert_eq!(board.metrics().get_tx_dropped(), 1);
    }

    #[test]
    fn test_sequencing_violation_counted() {
        let mut board = Board::new();
        configure_9600(&mut board);
        assert_eq!(board.metrics().get_sequencing_violations(), 0);

        board.write_u8(addr::UCA0BR0, 8).unwrap();
        assert_eq!(board.metrics().get_sequencing_violations(), 1);
    }

    #[test]
    fn test_receive_sets_and_read_clears_flag() {
        let mut board = Board::new();
        configure_9600(&mut board);

        assert_eq!(board.deliver(b'a'), RxOutcome::Latched);
        assert!(ifg2(&board).contains(Ifg2::UCA0RXIFG));
        assert_eq!(board.read_u8(addr::UCA0RXBUF).unwrap(), b'a');
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
    }

    #[test]
    fn test_receive_overrun_keeps_latest() {
        let mut board = Board::new();
        configure_9600(&mut board);

        board.deliver(b'a');
        board.deliver(b'b');
        let stat = Stat::from_bits_retain(board.read_u8(addr::UCA0STAT).unwrap());
        assert!(stat.contains(Stat::UCOE));
        assert_eq!(board.read_u8(addr::UCA0RXBUF).unwrap(), b'b');
        assert_eq!(board.metrics().get_rx_overruns(), 1);

        let stat = Stat::from_bits_retain(board.read_u8(addr::UCA0STAT).unwrap());
        assert!(!stat.contains(Stat::UCOE));
    }

    #[test]
    fn test_receive_ignored_while_held() {
        let board = Board::new();
        assert_eq!(board.deliver(b'a'), RxOutcome::Ignored);
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
    }

    #[test]
    fn test_peer_rate_mismatch_is_framing_error() {
        let mut board = Board::new();
        configure_9600(&mut board);

        board.set_peer_rate(Some(115_200));
        assert_eq!(board.deliver(b'a'), RxOutcome::FramingError);
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
        assert_eq!(board.metrics().get_framing_errors(), 1);

        board.set_peer_rate(Some(9600));
        assert_eq!(board.deliver(b'a'), RxOutcome::Latched);
    }

    #[test]
    fn test_receive_interrupt_dispatch() {
        let mut board = Board::new();
        configure_9600(&mut board);
        board.set_bits(addr::IE2, Ie2::UCA0RXIE.bits()).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        board.attach_handler(Irq::UsciAb0Rx, move |bus| {
            let byte = bus.read_u8(addr::UCA0RXBUF).unwrap();
            counter.store(byte as usize, Ordering::SeqCst);
        });

        assert_eq!(board.deliver(b'z'), RxOutcome::Interrupt);
        assert_eq!(seen.load(Ordering::SeqCst), b'z' as usize);
        // The handler consumed the byte
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
    }

    #[test]
    fn test_transmit_interrupt_is_level_triggered() {
        let mut board = Board::new();
        configure_9600(&mut board);
        board.set_bits(addr::IE2, Ie2::UCA0TXIE.bits()).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        board.attach_handler(Irq::UsciAb0Tx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Buffer empty: requested on every cycle, nothing is being sent
        board.run_cycles(100);
        assert_eq!(count.load(Ordering::SeqCst), 100);

        board.detach_handler(Irq::UsciAb0Tx);
        board.run_cycles(100);
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_handler_bus_accesses_do_not_nest() {
        let mut board = Board::new();
        configure_9600(&mut board);
        board.set_bits(addr::IE2, Ie2::UCA0TXIE.bits()).unwrap();

        let entries = Arc::new(AtomicUsize::new(0));
        let counter = entries.clone();
        board.attach_handler(Irq::UsciAb0Tx, move |bus| {
            counter.fetch_add(1, Ordering::SeqCst);
            bus.clear_bits(addr::IE2, Ie2::UCA0TXIE.bits()).unwrap();
        });

        board.run_cycles(10);
        assert_eq!(entries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uclk_source_has_no_rate() {
        let mut board = Board::new();
        board
            .write_u8(addr::UCA0CTL1, (Ctl1::UCSWRST | Ctl1::UCSSEL_UCLK).bits())
            .unwrap();
        board.write_u8(addr::UCA0BR0, 104).unwrap();
        assert_eq!(board.bit_rate_hz(), None);
    }

    #[test]
    fn test_reset_clears_interrupt_enables() {
        let mut board = Board::new();
        configure_9600(&mut board);
        board
            .set_bits(addr::IE2, (Ie2::UCA0RXIE | Ie2::UCB0RXIE).bits())
            .unwrap();
        board.deliver(b'q');

        board.set_bits(addr::UCA0CTL1, Ctl1::UCSWRST.bits()).unwrap();
        let ie2 = Ie2::from_bits_retain(board.read_u8(addr::IE2).unwrap());
        assert!(!ie2.contains(Ie2::UCA0RXIE));
        assert!(ie2.contains(Ie2::UCB0RXIE));
        assert!(!ifg2(&board).contains(Ifg2::UCA0RXIFG));
        assert!(ifg2(&board).contains(Ifg2::UCA0TXIFG));
    }

    #[test]
    fn test_aclk_source_timing() {
        let config = BoardConfig::default();
        let mut board = Board::from_config(&config);
        board
            .write_u8(addr::UCA0CTL1, (Ctl1::UCSWRST | Ctl1::UCSSEL_ACLK).bits())
            .unwrap();
        board.write_u8(addr::UCA0BR0, 3).unwrap();
        board
            .write_u8(addr::UCA0MCTL, Mctl::new(0, 3, false).bits())
            .unwrap();
        let rate = board.bit_rate_hz().unwrap();
        assert!((rate - 32_768.0 / 3.375).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut board = Board::new();
        configure_9600(&mut board);
        let snapshot = board.snapshot();
        assert_eq!(snapshot.ports.len(), 2);
        assert_eq!(snapshot.ports[0].sel & UART_PINS, UART_PINS);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["name"], "msp430g2553");
        assert_eq!(json["usci"]["br0"], 104);
        assert!(json["metrics"]["bus_cycles"].as_u64().unwrap() > 0);
    }
}
