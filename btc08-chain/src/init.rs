//! Chain-initialization state machine (spec §4.3): auto-address discovery,
//! ID verification, PLL program+lock, BIST, proportional nonce-range
//! assignment, OON-IRQ arm.

use std::thread::sleep;
use std::time::Duration;
use std::vec::Vec;

use btc08_asic::bist;
use btc08_asic::chip::{Chip, FeatureClass};
use btc08_asic::pll;
use btc08_hal::gpio::GpioPort;
use btc08_hal::transport::Transport;
use btc08_protocol::command::{Command, Destination, OpCode};
use btc08_protocol::response::Response;

use crate::config::ChainConfig;
use crate::error::{Error, Result};

const PLL_LOCK_POLL_ITERS: u32 = 25;
const PLL_LOCK_POLL_PERIOD: Duration = Duration::from_millis(40);
const BIST_POLL_ITERS: u32 = 10;
const BIST_POLL_PERIOD: Duration = Duration::from_millis(200);
const RESET_PULSE: Duration = Duration::from_millis(1);

/// Run the full chain-initialization sequence (spec §4.3 steps 1-12).
/// Returns the discovered, fully-initialized chip roster plus the feature
/// class the chain reported (drives `timeout_oon` and `MAX_NONCE_SIZE`
/// upstream in [`crate::chain::Chain`]).
pub fn init_chain<T: Transport, G: GpioPort>(
    transport: &mut T,
    gpio: &mut G,
    config: &ChainConfig,
) -> Result<(Vec<Chip>, FeatureClass), T::Error, G::Error> {
    // Step 1: toggle RESET low then high.
    gpio.set_reset(false).map_err(Error::Gpio)?;
    sleep(RESET_PULSE);
    gpio.set_reset(true).map_err(Error::Gpio)?;

    // Step 2: RESET broadcast.
    send::<T, G, 4>(transport, OpCode::Reset, Destination::All, &Command::reset(Destination::All))?;

    init_from_auto_address(transport, config)
}

/// Steps 3-12 of the init sequence, reused by [`crate::Chain::flush`] which
/// performs its own hardware-level RESET pulse (spec §4.5: "re-run init from
/// step 3 (AUTO_ADDRESS)") rather than repeating steps 1-2 here.
pub(crate) fn init_from_auto_address<T: Transport, G: GpioPort>(
    transport: &mut T,
    config: &ChainConfig,
) -> Result<(Vec<Chip>, FeatureClass), T::Error, G::Error> {
    // Step 3: AUTO_ADDRESS; fail closed on opcode echo mismatch.
    let mut resp = [0u8; 36];
    transport
        .transfer(&Command::auto_address(), &mut resp)
        .map_err(Error::Transport)?;
    let detected = Response::parse_auto_address(&resp)?;

    // Step 4: READ_ID from N down to 1; refuse to mine on any mismatch
    // rather than attempt the dead `set_last_chip` partial-chain recovery
    // path (spec §9 Open Questions).
    let mut chips = Vec::with_capacity(detected as usize);
    let mut active = 0u8;
    for chip_id in (1..=detected).rev() {
        let cmd = Command::read_id(Destination::Chip(chip_id));
        let mut resp = [0u8; 8];
        transport.transfer(&cmd, &mut resp).map_err(Error::Transport)?;
        match Response::parse_read_id(&resp, Destination::Chip(chip_id)) {
            Ok(echoed) if echoed == chip_id => {
                active += 1;
                chips.push(Chip::new(chip_id));
            }
            _ => {}
        }
    }
    chips.reverse();
    if active != detected {
        return Err(Error::ChipCountMismatch {
            expected: detected,
            detected: active,
        });
    }
    for chip in chips.iter_mut() {
        chip.mark_detected();
    }
    log::info!("chain: auto-address detected {detected} chips");

    // Step 5: FEATURE + REVISION per chip.
    let mut feature_class = FeatureClass::Unknown(0xF);
    for chip in chips.iter_mut() {
        let cmd = Command::read_feature(Destination::Chip(chip.chip_id));
        let mut resp = [0u8; 8];
        transport.transfer(&cmd, &mut resp).map_err(Error::Transport)?;
        let feature = Response::parse_read_feature(&resp, Destination::Chip(chip.chip_id))?;
        chip.feature_class = FeatureClass::from_bits(feature.feature_class);
        chip.hash_depth = feature.hash_depth;
        feature_class = chip.feature_class;

        let cmd = Command::read_revision(Destination::Chip(chip.chip_id));
        let mut resp = [0u8; 8];
        transport.transfer(&cmd, &mut resp).map_err(Error::Transport)?;
        Response::parse_read_revision(&resp, Destination::Chip(chip.chip_id))?;
    }

    // Step 6: ASIC chip-count floor.
    if matches!(feature_class, FeatureClass::Asic) && detected < config.min_chips {
        return Err(Error::NotEnoughChips {
            detected,
            min_chips: config.min_chips,
        });
    }

    // Step 7: PLL program sequence + lock poll, skipped entirely on FPGA.
    if matches!(feature_class, FeatureClass::Asic) {
        program_pll::<T, G>(transport, config.pll_target_mhz)?;
        for chip in chips.iter_mut() {
            match poll_pll_lock::<T, G>(transport, chip.chip_id) {
                Ok(()) => {
                    chip.pll.set_target(config.pll_target_mhz);
                    chip.pll.lock();
                    chip.mark_pll_locked();
                    log::info!("chain: chip {} PLL locked at {} MHz", chip.chip_id, config.pll_target_mhz);
                }
                Err(e) => {
                    log::warn!("chain: chip {} PLL lock timeout", chip.chip_id);
                    return Err(e);
                }
            }
        }
    } else {
        for chip in chips.iter_mut() {
            chip.mark_pll_locked();
        }
    }

    // Step 8-9: BIST broadcast + per-chip poll.
    run_bist_broadcast::<T, G>(transport, config)?;
    for chip in chips.iter_mut() {
        let live_cores = poll_bist::<T, G>(transport, chip.chip_id)?;
        let floor = if matches!(chip.feature_class, FeatureClass::Asic) {
            config.min_cores
        } else {
            0
        };
        if live_cores < floor {
            log::warn!(
                "chain: chip {} BIST live cores {live_cores} below floor {floor}, disabling",
                chip.chip_id
            );
            chip.disable();
        } else {
            chip.mark_bist_passed(live_cores);
            chip.mark_ready();
            log::info!("chain: chip {} BIST passed with {live_cores} live cores", chip.chip_id);
        }
    }

    // Step 10-11: aggregate perf, proportional nonce-range assignment.
    let chain_perf: u64 = chips.iter().map(Chip::perf).sum();
    assign_nonce_ranges::<T, G>(transport, &mut chips, feature_class, chain_perf)?;

    // Step 12: SET_CONTROL broadcast (OON_IRQ_EN | udiv).
    send::<T, G, 8>(
        transport,
        OpCode::SetControl,
        Destination::All,
        &Command::set_control(Destination::All, true, config.udiv),
    )?;

    for chip in chips.iter_mut() {
        if !chip.is_disabled() {
            chip.mark_running();
        }
    }

    Ok((chips, feature_class))
}

/// Fire a broadcast/addressed command whose response carries nothing but the
/// opcode/chip_id echo, validating that echo (spec §7.2 Protocol error).
fn send<T: Transport, G: GpioPort, const N: usize>(
    transport: &mut T,
    opcode: OpCode,
    dest: Destination,
    cmd: &[u8; N],
) -> Result<(), T::Error, G::Error> {
    let mut resp = [0u8; N];
    transport.transfer(cmd, &mut resp).map_err(Error::Transport)?;
    Response::check_echo(&resp, opcode, dest)?;
    Ok(())
}

/// The PLL program sequence (spec §4.3 step 7): disable FOUT, write PMS
/// config, toggle RESETB, wait 1ms, enable FOUT.
fn program_pll<T: Transport, G: GpioPort>(
    transport: &mut T,
    target_mhz: u32,
) -> Result<(), T::Error, G::Error> {
    let entry = pll::lookup(target_mhz).ok_or(Error::PllBelowMinimum {
        requested_mhz: target_mhz,
    })?;
    let word = pll::encode(entry.p, entry.m, entry.s, false, false, false, 0, true, 0);

    send::<T, G, 4>(transport, OpCode::SetPllFoutEn, Destination::All, &Command::set_pll_fout_en(Destination::All, false))?;
    send::<T, G, 8>(transport, OpCode::SetPllConfig, Destination::All, &Command::set_pll_config(Destination::All, word))?;
    send::<T, G, 4>(transport, OpCode::SetPllResetb, Destination::All, &Command::set_pll_resetb(Destination::All, false))?;
    send::<T, G, 4>(transport, OpCode::SetPllResetb, Destination::All, &Command::set_pll_resetb(Destination::All, true))?;
    sleep(Duration::from_millis(1));
    send::<T, G, 4>(transport, OpCode::SetPllFoutEn, Destination::All, &Command::set_pll_fout_en(Destination::All, true))?;
    Ok(())
}

/// Poll `READ_PLL` up to 25 × 40ms for the lock bit (spec §4.3 step 7,
/// §8 scenario 6).
fn poll_pll_lock<T: Transport, G: GpioPort>(transport: &mut T, chip_id: u8) -> Result<(), T::Error, G::Error> {
    let cmd = Command::read_pll(Destination::Chip(chip_id));
    for _ in 0..PLL_LOCK_POLL_ITERS {
        let mut resp = [0u8; 8];
        transport.transfer(&cmd, &mut resp).map_err(Error::Transport)?;
        if Response::parse_read_pll(&resp, Destination::Chip(chip_id))?.locked {
            return Ok(());
        }
        sleep(PLL_LOCK_POLL_PERIOD);
    }
    Err(Error::PllLockTimeout { chip_id })
}

/// Load the golden BIST vector and run it broadcast (spec §4.3 step 8,
/// §8 scenario 2).
fn run_bist_broadcast<T: Transport, G: GpioPort>(
    transport: &mut T,
    config: &ChainConfig,
) -> Result<(), T::Error, G::Error> {
    let dest = Destination::All;
    send::<T, G, 144>(
        transport,
        OpCode::WriteParm,
        dest,
        &Command::write_parm(
            dest,
            &bist::GOLDEN_MIDSTATE,
            &bist::GOLDEN_HEADER_TAIL,
            &bist::GOLDEN_MIDSTATE,
            &bist::GOLDEN_MIDSTATE,
            &bist::GOLDEN_MIDSTATE,
        ),
    )?;

    let nbits = u32::from_be_bytes(bist::GOLDEN_TARGET[0..4].try_into().unwrap());
    let select = [bist::GOLDEN_TARGET[4], bist::GOLDEN_TARGET[5]];
    send::<T, G, 12>(transport, OpCode::WriteTarget, dest, &Command::write_target(dest, nbits, select))?;

    let nonce_start = u32::from_be_bytes(bist::GOLDEN_NONCE_RANGE[0..4].try_into().unwrap());
    let nonce_end = u32::from_be_bytes(bist::GOLDEN_NONCE_RANGE[4..8].try_into().unwrap());
    send::<T, G, 12>(transport, OpCode::WriteNonce, dest, &Command::write_nonce(dest, nonce_start, nonce_end))?;

    send::<T, G, 32>(transport, OpCode::SetDisable, dest, &Command::set_disable(dest, &config.core_disable_mask))?;
    send::<T, G, 4>(transport, OpCode::RunBist, dest, &Command::run_bist(dest))?;
    Ok(())
}

/// Poll `READ_BIST` up to 10 × 200ms for idle, returning the live core count
/// (spec §4.3 step 9).
fn poll_bist<T: Transport, G: GpioPort>(transport: &mut T, chip_id: u8) -> Result<u8, T::Error, G::Error> {
    let cmd = Command::read_bist(Destination::Chip(chip_id));
    for _ in 0..BIST_POLL_ITERS {
        let mut resp = [0u8; 8];
        transport.transfer(&cmd, &mut resp).map_err(Error::Transport)?;
        let bist_resp = Response::parse_read_bist(&resp, Destination::Chip(chip_id))?;
        if !bist_resp.busy {
            return Ok(bist_resp.core_count);
        }
        sleep(BIST_POLL_PERIOD);
    }
    Err(Error::BistTimeout { chip_id })
}

/// Proportionally split `[0, MAX_NONCE_SIZE]` across the non-disabled chips
/// (spec §4.3 step 11, §3 invariant, §8 "for every chain ... partition").
fn assign_nonce_ranges<T: Transport, G: GpioPort>(
    transport: &mut T,
    chips: &mut [Chip],
    feature_class: FeatureClass,
    chain_perf: u64,
) -> Result<(), T::Error, G::Error> {
    let max_nonce = feature_class.max_nonce();
    let live: Vec<usize> = chips
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_disabled())
        .map(|(i, _)| i)
        .collect();
    if live.is_empty() {
        return Ok(());
    }

    let mut cursor = 0u32;
    for (pos, &idx) in live.iter().enumerate() {
        let is_last = pos + 1 == live.len();
        chips[idx].start_nonce = cursor;
        let end = if is_last {
            max_nonce
        } else {
            let perf = chips[idx].perf();
            let span = (max_nonce as u64).saturating_mul(perf) / chain_perf.max(1);
            cursor.saturating_add(span as u32)
        };
        chips[idx].end_nonce = end;

        let chip_dest = Destination::Chip(chips[idx].chip_id);
        let cmd = Command::write_nonce(chip_dest, chips[idx].start_nonce, end);
        send::<T, G, 12>(transport, OpCode::WriteNonce, chip_dest, &cmd)?;
        log::info!(
            "chain: chip {} assigned nonce range [{:#010x}, {:#010x}]",
            chips[idx].chip_id,
            chips[idx].start_nonce,
            end
        );
        cursor = end.saturating_add(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use btc08_hal::gpio::GpioPort as _;
    use btc08_hal::test_transport::MockTransport;

    #[derive(Default)]
    struct MockGpio {
        reset_high: bool,
    }

    #[derive(Debug, PartialEq)]
    struct MockGpioError;

    impl GpioPort for MockGpio {
        type Error = MockGpioError;
        fn plugged(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(true)
        }
        fn body_detected(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(true)
        }
        fn gn_asserted(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(false)
        }
        fn oon_asserted(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(false)
        }
        fn set_reset(&mut self, high: bool) -> core::result::Result<(), Self::Error> {
            self.reset_high = high;
            Ok(())
        }
        fn set_power_enable(&mut self, _on: bool) -> core::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    fn echo_response<const N: usize>(opcode: OpCode, extra: impl FnOnce(&mut [u8; N])) -> Vec<u8> {
        let mut data = [0u8; N];
        data[0] = opcode as u8;
        extra(&mut data);
        for b in data.iter_mut() {
            *b = !*b;
        }
        data.to_vec()
    }

    #[test]
    fn boots_a_chain_of_three_fpga_chips() {
        let mut transport = MockTransport::new();
        let mut gpio = MockGpio::default();
        let config = ChainConfig {
            test_mode: true,
            ..ChainConfig::default()
        };

        // RESET broadcast.
        transport.push_response(&echo_response::<4>(OpCode::Reset, |_| {}));
        // AUTO_ADDRESS -> 3 chips.
        transport.push_response(&echo_response::<36>(OpCode::AutoAddress, |d| d[3] = 3));
        // READ_ID chip 3, 2, 1.
        for chip_id in [3u8, 2, 1] {
            transport.push_response(&echo_response::<8>(OpCode::ReadId, |d| {
                d[1] = chip_id;
                d[5] = chip_id;
            }));
        }
        // FEATURE + REVISION per chip (ascending order after re-sort): chip 1, 2, 3.
        for chip_id in [1u8, 2, 3] {
            transport.push_response(&echo_response::<8>(OpCode::ReadFeature, |d| {
                d[1] = chip_id;
                d[5] = 0; // FPGA class
            }));
            transport.push_response(&echo_response::<8>(OpCode::ReadRevision, |d| d[1] = chip_id));
        }
        // BIST broadcast frames.
        transport.push_response(&echo_response::<144>(OpCode::WriteParm, |_| {}));
        transport.push_response(&echo_response::<12>(OpCode::WriteTarget, |_| {}));
        transport.push_response(&echo_response::<12>(OpCode::WriteNonce, |_| {}));
        transport.push_response(&echo_response::<32>(OpCode::SetDisable, |_| {}));
        transport.push_response(&echo_response::<4>(OpCode::RunBist, |_| {}));
        // READ_BIST per chip: idle, 2 live cores.
        for chip_id in [1u8, 2, 3] {
            transport.push_response(&echo_response::<8>(OpCode::ReadBist, |d| {
                d[1] = chip_id;
                d[3] = 2;
            }));
        }
        // WRITE_NONCE per chip (range assignment).
        for chip_id in [1u8, 2, 3] {
            transport.push_response(&echo_response::<12>(OpCode::WriteNonce, |d| d[1] = chip_id));
        }
        // SET_CONTROL broadcast.
        transport.push_response(&echo_response::<8>(OpCode::SetControl, |_| {}));

        let (chips, feature_class) = init_chain(&mut transport, &mut gpio, &config).unwrap();
        assert_eq!(feature_class, FeatureClass::Fpga);
        assert_eq!(chips.len(), 3);
        assert_eq!((chips[0].start_nonce, chips[0].end_nonce), (0, 0x02AA_AAAA));
        assert_eq!((chips[1].start_nonce, chips[1].end_nonce), (0x02AA_AAAB, 0x0555_5555));
        assert_eq!((chips[2].start_nonce, chips[2].end_nonce), (0x0555_5556, 0x07FF_FFFF));
        assert!(gpio.reset_high);
    }

    /// Spec §8 scenario 6: `READ_PLL` never reports the lock bit within the
    /// 25 × 40ms poll budget, and `init_chain` fails closed with
    /// `PllLockTimeout` rather than continuing into BIST.
    #[test]
    fn pll_lock_timeout_fails_closed() {
        let mut transport = MockTransport::new();
        let mut gpio = MockGpio::default();
        let config = ChainConfig {
            test_mode: true,
            min_chips: 1,
            ..ChainConfig::default()
        };

        transport.push_response(&echo_response::<4>(OpCode::Reset, |_| {}));
        transport.push_response(&echo_response::<36>(OpCode::AutoAddress, |d| d[3] = 1));
        transport.push_response(&echo_response::<8>(OpCode::ReadId, |d| {
            d[1] = 1;
            d[5] = 1;
        }));
        transport.push_response(&echo_response::<8>(OpCode::ReadFeature, |d| {
            d[1] = 1;
            d[5] = 5; // ASIC class
        }));
        transport.push_response(&echo_response::<8>(OpCode::ReadRevision, |d| d[1] = 1));
        // PLL program sequence.
        transport.push_response(&echo_response::<4>(OpCode::SetPllFoutEn, |_| {}));
        transport.push_response(&echo_response::<8>(OpCode::SetPllConfig, |_| {}));
        transport.push_response(&echo_response::<4>(OpCode::SetPllResetb, |_| {}));
        transport.push_response(&echo_response::<4>(OpCode::SetPllResetb, |_| {}));
        transport.push_response(&echo_response::<4>(OpCode::SetPllFoutEn, |_| {}));
        // READ_PLL, locked bit never set, for the whole poll budget.
        for _ in 0..PLL_LOCK_POLL_ITERS {
            transport.push_response(&echo_response::<8>(OpCode::ReadPll, |d| d[1] = 1));
        }

        let err = init_chain(&mut transport, &mut gpio, &config).unwrap_err();
        assert!(matches!(err, Error::PllLockTimeout { chip_id: 1 }));
    }
}
