//! Flush, abort and chip disablement (spec §4.5).

use std::thread::sleep;
use std::time::Duration;

use btc08_asic::chip::FeatureClass;
use btc08_hal::adc::AdcPort;
use btc08_hal::gpio::GpioPort;
use btc08_hal::transport::Transport;

use crate::chain::{Chain, ChainInner};
use crate::init::init_from_auto_address;
use crate::work::{Upstream, Work, WorkQueue};

const RESET_PULSE: Duration = Duration::from_millis(1);
/// In-flight job count at which a chip is a disablement candidate, once its
/// PLL is already at the floor (spec §4.5).
const OON_INT_MAXJOB: u8 = 2;
const PLL_REDUCTION_STEP_MHZ: u32 = 50;

impl<T: Transport, G: GpioPort, A: AdcPort, W: Work> Chain<T, G, A, W> {
    /// Requested by upstream when the block changes (spec §4.5): hardware
    /// reset, discard every job-slot reference and whatever the upstream
    /// queue is still holding, then re-run init from `AUTO_ADDRESS`. Clears
    /// `sdiff` so the next `set_work` re-sends `WRITE_TARGET`.
    pub fn flush(&self, queue: &mut impl WorkQueue<W>, upstream: &mut impl Upstream<W>) {
        let mut inner = self.inner.lock().unwrap();
        log::info!("chain {}: flush requested", self.id);

        inner.jobs.drain(|work| upstream.work_completed(work));
        while let Some(work) = queue.dequeue() {
            upstream.work_completed(work);
        }
        inner.sdiff = None;
        inner.primed = false;

        if let Err(e) = inner.gpio.set_reset(false) {
            log::error!("chain {}: flush reset pulse failed: {e:?}", self.id);
            inner.disabled = true;
            return;
        }
        sleep(RESET_PULSE);
        if let Err(e) = inner.gpio.set_reset(true) {
            log::error!("chain {}: flush reset pulse failed: {e:?}", self.id);
            inner.disabled = true;
            return;
        }

        match init_from_auto_address(&mut inner.transport, &self.config) {
            Ok((chips, feature_class)) => {
                inner.chain_perf = chips.iter().map(btc08_asic::chip::Chip::perf).sum();
                inner.oon_timeout_ms = match feature_class {
                    FeatureClass::Fpga => self.config.oon_timeout_ms_fpga,
                    _ => self.config.oon_timeout_ms_asic,
                };
                inner.feature_class = feature_class;
                inner.chips = chips;
                inner.disabled = false;
                log::info!("chain {}: flush re-init complete, {} chips", self.id, inner.chips.len());
            }
            Err(e) => {
                log::error!("chain {}: flush re-init failed: {e:?}", self.id);
                inner.disabled = true;
            }
        }
    }

    /// Chip disablement (spec §4.5): called from [`crate::pipeline`]'s
    /// `READ_JOB_ID` handling whenever the in-flight count reaches
    /// [`OON_INT_MAXJOB`]. If the chip's PLL isn't at the floor yet, its
    /// clock is stepped down by [`PLL_REDUCTION_STEP_MHZ`] and
    /// `inner.needs_reinit` is set so `scanwork` re-inits before the next
    /// pass; only once the floor is reached does this disable the chip
    /// permanently. Returns `true` iff the chip was disabled.
    pub(crate) fn consider_chip_disablement(inner: &mut ChainInner<T, G, A, W>, chip_id: u8, in_flight: u8) -> bool {
        let floor_mhz = btc08_asic::pll::PLL_FREQ_MIN_MHZ;
        let Some(chip) = inner.chips.iter_mut().find(|c| c.chip_id == chip_id) else {
            return false;
        };
        if in_flight < OON_INT_MAXJOB {
            return false;
        }
        let current_mhz = chip.pll.frequency_mhz();
        if current_mhz > floor_mhz {
            let reduced = current_mhz.saturating_sub(PLL_REDUCTION_STEP_MHZ).max(floor_mhz);
            log::warn!(
                "chain: chip {chip_id} OON_INT_MAXJOB reached, reducing PLL {current_mhz} -> {reduced} MHz before re-init"
            );
            chip.pll.set_target(reduced);
            inner.needs_reinit = true;
            false
        } else {
            log::warn!("chain: chip {chip_id} OON_INT_MAXJOB reached at PLL floor, disabling permanently");
            chip.disable();
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btc08_asic::chip::Chip;
    use btc08_asic::pll::PLL_FREQ_MIN_MHZ;
    use btc08_chain_test_support::{new_inner, NoAdc, NoGpio, NoTransport};

    #[test]
    fn below_threshold_is_a_no_op() {
        let mut inner = new_inner();
        inner.chips.push(Chip::new(1));
        assert!(!Chain::<NoTransport, NoGpio, NoAdc, u32>::consider_chip_disablement(
            &mut inner, 1, 1
        ));
        assert!(!inner.chips[0].is_disabled());
        assert!(!inner.needs_reinit);
    }

    #[test]
    fn steps_pll_down_and_requests_reinit_before_the_floor() {
        let mut inner = new_inner();
        let mut chip = Chip::new(1);
        chip.pll.set_target(500);
        inner.chips.push(chip);

        assert!(!Chain::<NoTransport, NoGpio, NoAdc, u32>::consider_chip_disablement(
            &mut inner, 1, 2
        ));
        assert!(!inner.chips[0].is_disabled());
        assert!(inner.needs_reinit);
        assert_eq!(inner.chips[0].pll.frequency_mhz(), 500 - PLL_REDUCTION_STEP_MHZ);
    }

    #[test]
    fn disables_permanently_once_already_at_the_floor() {
        let mut inner = new_inner();
        let mut chip = Chip::new(1);
        chip.pll.set_target(PLL_FREQ_MIN_MHZ);
        inner.chips.push(chip);

        assert!(Chain::<NoTransport, NoGpio, NoAdc, u32>::consider_chip_disablement(
            &mut inner, 1, 2
        ));
        assert!(inner.chips[0].is_disabled());
        assert!(!inner.needs_reinit);
    }
}

/// Minimal no-op `Transport`/`GpioPort`/`AdcPort` plus a bare [`ChainInner`]
/// builder, shared by this module's tests — they exercise
/// [`Chain::consider_chip_disablement`] as a pure state transition and never
/// touch the wire.
#[cfg(test)]
mod btc08_chain_test_support {
    use btc08_asic::chip::FeatureClass;
    use btc08_hal::adc::AdcPort;
    use btc08_hal::gpio::GpioPort;
    use btc08_hal::transport::{FrameIo, Transport};

    use crate::chain::ChainInner;
    use crate::job::JobRing;

    pub struct NoTransport;
    impl Transport for NoTransport {
        type Error = core::convert::Infallible;
        fn transfer(&mut self, _tx: &[u8], _rx: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn transfer_fast(&mut self, _tx: &[u8], _rx: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn transfer_batch(&mut self, _frames: &mut [FrameIo<'_>]) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    pub struct NoGpio;
    impl GpioPort for NoGpio {
        type Error = core::convert::Infallible;
        fn plugged(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn body_detected(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn gn_asserted(&mut self) -> Result<bool, Self::Error> {
            Ok(false)
        }
        fn oon_asserted(&mut self) -> Result<bool, Self::Error> {
            Ok(false)
        }
        fn set_reset(&mut self, _high: bool) -> Result<(), Self::Error> {
            Ok(())
        }
        fn set_power_enable(&mut self, _on: bool) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    pub struct NoAdc;
    impl AdcPort for NoAdc {
        type Error = core::convert::Infallible;
        fn read_raw(&mut self) -> Result<u16, Self::Error> {
            Ok(0)
        }
    }

    pub fn new_inner() -> ChainInner<NoTransport, NoGpio, NoAdc, u32> {
        ChainInner {
            transport: NoTransport,
            gpio: NoGpio,
            adc: NoAdc,
            chips: Vec::new(),
            jobs: JobRing::new(),
            sdiff: None,
            chain_perf: 0,
            feature_class: FeatureClass::Unknown(0xF),
            oon_timeout_ms: 0,
            disabled: false,
            primed: false,
            nonce_ranges_processed: 0,
            last_temperature_mv: 0,
            needs_reinit: false,
        }
    }
}
