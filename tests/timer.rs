use pocket_emu_core::timer::Timer;

#[test]
fn div_increment() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.step(256, &mut if_reg);
    assert_eq!(t.read(0xFF04), 1);
    assert_eq!(if_reg, 0);
}

#[test]
fn div_resets_on_write() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0xABCD;
    t.write(0xFF04, 0x12, &mut if_reg);
    assert_eq!(t.read(0xFF04), 0);
    assert_eq!(t.div, 0);
    assert_eq!(if_reg, 0);
}

#[test]
fn div_readback_is_zero_on_next_tick() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x5678;
    t.write(0xFF04, 0xFF, &mut if_reg);
    t.step(1, &mut if_reg);
    assert_eq!(t.read(0xFF04), 0);
}

#[test]
fn div_reset_edge_tick() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x0200; // timer bit high
    t.write(0xFF07, 0x04, &mut if_reg); // enable, bit 9 source
    t.write(0xFF04, 0, &mut if_reg); // reset DIV causes falling edge
    assert_eq!(t.tima, 1);
    assert_eq!(if_reg, 0);
}

#[test]
fn tac_disable_edge_tick() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x0200; // bit 9 high
    t.write(0xFF07, 0x04, &mut if_reg); // enable
    t.write(0xFF07, 0x00, &mut if_reg); // disable -> falling edge
    assert_eq!(t.tima, 1);
    assert_eq!(if_reg, 0);
}

#[test]
fn tima_increments_on_falling_edge() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.write(0xFF07, 0x04, &mut if_reg); // enable, bit 9 source
    t.step(1024, &mut if_reg);
    assert_eq!(t.tima, 1);
    assert_eq!(if_reg, 0);
}

#[test]
fn overflow_reloads_one_m_cycle_late() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x000F; // bit 3 high, falls on the next increment
    t.write(0xFF07, 0x05, &mut if_reg); // enable, bit 3 source (16-cycle period)
    t.tima = 0xFE;
    t.tma = 0x42;

    // First falling edge: 0xFE -> 0xFF.
    t.step(1, &mut if_reg);
    assert_eq!(t.tima, 0xFF);

    // Second falling edge 16 quarter-cycles later overflows.
    t.step(16, &mut if_reg);
    assert_eq!(t.tima, 0x00, "TIMA reads 0 during the reload delay");
    assert_eq!(if_reg & 0x04, 0);

    // Three more quarter-cycles: still pending.
    t.step(3, &mut if_reg);
    assert_eq!(t.tima, 0x00);
    assert_eq!(if_reg & 0x04, 0);

    // The fourth quarter-cycle performs the reload and raises the request.
    t.step(1, &mut if_reg);
    assert_eq!(t.tima, 0x42);
    assert_eq!(if_reg & 0x04, 0x04);
}

#[test]
fn tima_write_during_delay_cancels_reload() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x000F;
    t.write(0xFF07, 0x05, &mut if_reg);
    t.tima = 0xFF;
    t.tma = 0x42;

    t.step(1, &mut if_reg); // overflow, reload pending
    assert_eq!(t.tima, 0x00);
    t.write(0xFF05, 0x55, &mut if_reg);
    t.step(8, &mut if_reg);
    assert_eq!(if_reg & 0x04, 0, "cancelled reload must not interrupt");
    assert_eq!(t.tima, 0x55);
}

#[test]
fn tima_write_in_commit_cycle_is_lost() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x000F;
    t.write(0xFF07, 0x05, &mut if_reg);
    t.tima = 0xFF;
    t.tma = 0x42;

    t.step(1, &mut if_reg); // overflow
    t.step(3, &mut if_reg); // delay exhausted, commit upcoming
    t.write(0xFF05, 0x55, &mut if_reg);
    t.step(1, &mut if_reg);
    assert_eq!(t.tima, 0x42);
    assert_eq!(if_reg & 0x04, 0x04);
}

#[test]
fn tima_write_in_reload_cycle_is_lost() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x000F;
    t.write(0xFF07, 0x05, &mut if_reg);
    t.tima = 0xFF;
    t.tma = 0x42;

    t.step(1, &mut if_reg); // overflow
    t.step(4, &mut if_reg); // reload happens on the last of these
    assert_eq!(t.tima, 0x42);
    t.write(0xFF05, 0x99, &mut if_reg);
    assert_eq!(t.tima, 0x42);
}

#[test]
fn tma_write_same_cycle_as_overflow_uses_old_value() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x03FF; // bit 9 high
    t.write(0xFF07, 0x04, &mut if_reg);
    t.tima = 0xFF;
    t.tma = 0xAA;

    // Write the new TMA in the same cycle the falling edge overflows TIMA.
    t.write(0xFF06, 0xBB, &mut if_reg);
    t.step(1, &mut if_reg);
    assert_eq!(t.tma, 0xBB);

    t.step(4, &mut if_reg);
    assert_eq!(t.tima, 0xAA, "reload must use the TMA value before the write");
    assert_eq!(if_reg & 0x04, 0x04);
}

#[test]
fn tma_write_during_delay_updates_pending_reload() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    t.div = 0x000F;
    t.write(0xFF07, 0x05, &mut if_reg);
    t.tima = 0xFF;
    t.tma = 0x42;

    t.step(1, &mut if_reg); // overflow
    t.write(0xFF06, 0x77, &mut if_reg);
    t.step(4, &mut if_reg);
    assert_eq!(t.tima, 0x77);
}

#[test]
fn rate_field_selects_divider_bit() {
    // Each rate selects div bit 9/3/5/7; a full period is twice the bit.
    for (sel, period) in [(0u8, 1024u32), (1, 16), (2, 64), (3, 256)] {
        let mut t = Timer::new();
        let mut if_reg = 0u8;
        t.write(0xFF07, 0x04 | sel, &mut if_reg);
        t.step(period as u16 * 4, &mut if_reg);
        assert_eq!(t.tima, 4, "rate {sel} should tick every {period} cycles");
    }
}
