//! The steady-state Job Pipeline (spec §2 component 4, §4.4): priming the
//! first four job slots, servicing the golden-nonce and out-of-nonce lines,
//! and the `set_work` contract shared by priming, OON refill and
//! [`Chain::queue_full`].

use btc08_asic::chip::Chip;
use btc08_hal::adc::AdcPort;
use btc08_hal::gpio::GpioPort;
use btc08_hal::transport::{FrameIo, Transport};
use btc08_protocol::command::{Command, Destination, OpCode};
use btc08_protocol::response::Response;

use crate::chain::{Chain, ChainInner};
use crate::error::Error;
use crate::job::{MAX_IN_FLIGHT, OON_REFILL};
use crate::nbits;
use crate::work::{Upstream, Work, WorkQueue};

impl<T: Transport, G: GpioPort, A: AdcPort, W: Work> Chain<T, G, A, W> {
    /// One scan pass (spec §4.4). On the first call after [`Chain::detect`]
    /// this primes the job ring; afterwards it services GN then OON, and
    /// cooperatively yields if neither line is asserted (spec §5). Returns
    /// the pass's hash-accounting estimate: completed nonce ranges times the
    /// full 32-bit space times the four ASIC-boost midstates.
    pub fn scanwork(&self, queue: &mut impl WorkQueue<W>, upstream: &mut impl Upstream<W>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        if inner.disabled {
            return 0;
        }

        if !inner.primed {
            if let Err(e) = self.prime(&mut inner, queue, upstream) {
                log::warn!("chain {}: prime incomplete: {e:?}", self.id);
                return 0;
            }
        }

        let ranges_before = inner.nonce_ranges_processed;
        let mut penalty: u64 = 0;

        match inner.gpio.gn_asserted() {
            Ok(true) => match self.poll_gn(&mut inner, upstream) {
                Ok(p) => penalty = p,
                Err(e) => {
                    log::error!("chain {}: GN poll failed: {e:?}", self.id);
                    self.disable_locked(&mut inner);
                    return 0;
                }
            },
            Ok(false) => {}
            Err(e) => {
                log::error!("chain {}: GN line read failed: {e:?}", self.id);
                self.disable_locked(&mut inner);
                return 0;
            }
        }

        let mut serviced_oon = false;
        match inner.gpio.oon_asserted() {
            Ok(true) => {
                serviced_oon = true;
                if let Err(e) = self.poll_oon(&mut inner, queue, upstream) {
                    log::error!("chain {}: OON service failed: {e:?}", self.id);
                    self.disable_locked(&mut inner);
                    return 0;
                }
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("chain {}: OON line read failed: {e:?}", self.id);
                self.disable_locked(&mut inner);
                return 0;
            }
        }

        if inner.needs_reinit {
            inner.needs_reinit = false;
            drop(inner);
            log::warn!("chain {}: re-initializing after PLL step-down", self.id);
            self.flush(queue, upstream);
            return 0;
        }

        let completed = inner.nonce_ranges_processed.saturating_sub(ranges_before);
        if completed == 0 && !serviced_oon {
            drop(inner);
            std::thread::yield_now();
        }

        completed.saturating_sub(penalty) * (1u64 << 32) * 4
    }

    /// Framework entry point (spec §5: "the sole way new work enters the
    /// chain" outside of GN/OON servicing). Dequeues and sets exactly one
    /// work item if the job ring has room. Returns `true` when the chain
    /// doesn't want more work right now.
    pub fn queue_full(&self, queue: &mut impl WorkQueue<W>, upstream: &mut impl Upstream<W>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.disabled || inner.jobs.occupied_count() >= MAX_IN_FLIGHT {
            return true;
        }
        match queue.dequeue() {
            Some(work) => {
                if let Err(e) = self.set_work(&mut inner, work, upstream) {
                    log::error!("chain {}: queue_full set_work failed: {e:?}", self.id);
                    self.disable_locked(&mut inner);
                }
                false
            }
            None => true,
        }
    }

    /// Bootstrap fill of the job ring after `detect` (spec §4.4 step 1).
    /// Bails with `Error::Underflow` if the upstream queue can't supply the
    /// initial four, leaving whatever was already placed and `primed` unset
    /// so the next scan pass resumes filling.
    fn prime(
        &self,
        inner: &mut ChainInner<T, G, A, W>,
        queue: &mut impl WorkQueue<W>,
        upstream: &mut impl Upstream<W>,
    ) -> Result<(), Error<T::Error, G::Error>> {
        while inner.jobs.occupied_count() < MAX_IN_FLIGHT {
            let work = queue.dequeue().ok_or(Error::Underflow)?;
            self.set_work(inner, work, upstream)?;
        }
        inner.primed = true;
        Ok(())
    }

    /// Service the golden-nonce line (spec §4.4 step 2): `READ_JOB_ID` every
    /// live chip, `READ_RESULT` the ones with `gn` set, hand each of the up
    /// to four ASIC-boost nonces to `upstream`. Returns the number of nonce
    /// ranges to deduct from this pass's hash-accounting estimate (spec §7.3:
    /// "deduct one nonce range from the pass's accounting" per rejected
    /// nonce).
    fn poll_gn(
        &self,
        inner: &mut ChainInner<T, G, A, W>,
        upstream: &mut impl Upstream<W>,
    ) -> Result<u64, Error<T::Error, G::Error>> {
        let mut penalty = 0u64;
        let chip_ids: Vec<u8> = inner
            .chips
            .iter()
            .filter(|c| !c.is_disabled())
            .map(|c| c.chip_id)
            .collect();

        for chip_id in chip_ids {
            let dest = Destination::Chip(chip_id);
            let cmd = Command::read_job_id(dest);
            let mut rx = [0u8; 8];
            inner.transport.transfer(&cmd, &mut rx).map_err(Error::Transport)?;
            let job_resp = Response::parse_read_job_id(&rx, dest)?;
            if Self::consider_chip_disablement(inner, chip_id, job_resp.in_flight) {
                continue;
            }
            if !job_resp.gn {
                continue;
            }

            let cmd = Command::read_result(dest);
            let mut rx = [0u8; 24];
            inner.transport.transfer(&cmd, &mut rx).map_err(Error::Transport)?;
            let result = Response::parse_read_result(&rx, dest)?;

            let slot = job_resp.job_id.wrapping_sub(1) as usize;
            for micro_job_id in 0u8..4 {
                if result.micro_job_mask & (1 << micro_job_id) == 0 {
                    continue;
                }
                let nonce = result.nonces[micro_job_id as usize];
                match inner.jobs.get(slot).cloned() {
                    Some(work) => {
                        if upstream.submit_nonce(&work, nonce, micro_job_id) {
                            bump_stat(&mut inner.chips, chip_id, |c| c.stats.nonces_found += 1);
                        } else {
                            bump_stat(&mut inner.chips, chip_id, |c| c.stats.hw_errors += 1);
                            penalty += 1;
                        }
                    }
                    None => bump_stat(&mut inner.chips, chip_id, |c| c.stats.stales += 1),
                }
            }
        }
        Ok(penalty)
    }

    /// Service the out-of-nonce line (spec §4.4 step 3): `CLEAR_OON`
    /// broadcast at fast-path speed, then refill up to [`OON_REFILL`] slots
    /// directly (bypassing `queue_full`'s occupancy gate — the on-chip FIFO
    /// just freed the capacity even though the host ring still shows those
    /// slots occupied until `JobRing::store` evicts them).
    fn poll_oon(
        &self,
        inner: &mut ChainInner<T, G, A, W>,
        queue: &mut impl WorkQueue<W>,
        upstream: &mut impl Upstream<W>,
    ) -> Result<(), Error<T::Error, G::Error>> {
        let cmd = Command::clear_oon(Destination::All);
        let mut rx = [0u8; 4];
        inner.transport.transfer_fast(&cmd, &mut rx).map_err(Error::Transport)?;
        Response::check_echo(&rx, OpCode::ClearOon, Destination::All)?;

        for _ in 0..OON_REFILL {
            match queue.dequeue() {
                Some(work) => self.set_work(inner, work, upstream)?,
                None => {
                    log::warn!("chain {}: upstream queue underflow during OON refill", self.id);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Push one job into the next on-chip slot: `WRITE_PARM`, an optional
    /// `WRITE_TARGET` if `work.sdiff()` changed, then `RUN_JOB`, all three
    /// streamed as one [`Transport::transfer_batch`] burst (spec §4.4
    /// `set_work`). Evicts whatever the slot held before and retires it
    /// through `upstream.work_completed`.
    fn set_work(
        &self,
        inner: &mut ChainInner<T, G, A, W>,
        work: W,
        upstream: &mut impl Upstream<W>,
    ) -> Result<(), Error<T::Error, G::Error>> {
        let job_id = inner.jobs.next_job_id();
        let midstates = *work.midstates();
        let header_tail = *work.header_tail();

        let write_parm = Command::write_parm(
            Destination::All,
            &midstates[0],
            &header_tail,
            &midstates[1],
            &midstates[2],
            &midstates[3],
        );
        let mut write_parm_rx = [0u8; 144];

        let needs_target = inner.sdiff != Some(work.sdiff());
        let write_target_frame = needs_target.then(|| {
            let nbits = nbits::nbits_from_target(work.target());
            Command::write_target(Destination::All, nbits, nbits::target_select(nbits))
        });
        let mut write_target_rx = [0u8; 12];

        let run_job = Command::run_job(Destination::All, job_id, work.version_rolling());
        let mut run_job_rx = [0u8; 8];

        {
            let mut frames = Vec::with_capacity(3);
            frames.push(FrameIo::new(&write_parm, &mut write_parm_rx, true));
            if let Some(ref write_target) = write_target_frame {
                frames.push(FrameIo::new(write_target, &mut write_target_rx, true));
            }
            frames.push(FrameIo::new(&run_job, &mut run_job_rx, false));
            inner.transport.transfer_batch(&mut frames).map_err(Error::Transport)?;
        }

        Response::check_echo(&write_parm_rx, OpCode::WriteParm, Destination::All)?;
        if write_target_frame.is_some() {
            Response::check_echo(&write_target_rx, OpCode::WriteTarget, Destination::All)?;
            inner.sdiff = Some(work.sdiff());
        }
        Response::check_echo(&run_job_rx, OpCode::RunJob, Destination::All)?;

        if let Some(evicted) = inner.jobs.store(work) {
            upstream.work_completed(evicted);
            inner.nonce_ranges_processed += 1;
        }
        Ok(())
    }
}

fn bump_stat(chips: &mut [Chip], chip_id: u8, f: impl FnOnce(&mut Chip)) {
    if let Some(chip) = chips.iter_mut().find(|c| c.chip_id == chip_id) {
        f(chip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btc08_asic::chip::Chip as AsicChip;
    use btc08_hal::test_transport::MockTransport;
    use std::cell::Cell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedGpio {
        gn: Cell<VecDeque<bool>>,
        oon: Cell<VecDeque<bool>>,
    }

    impl ScriptedGpio {
        fn new(gn: &[bool], oon: &[bool]) -> Self {
            ScriptedGpio {
                gn: Cell::new(gn.iter().copied().collect()),
                oon: Cell::new(oon.iter().copied().collect()),
            }
        }
    }

    impl GpioPort for ScriptedGpio {
        type Error = core::convert::Infallible;
        fn plugged(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn body_detected(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn gn_asserted(&mut self) -> Result<bool, Self::Error> {
            let mut q = self.gn.take();
            let v = q.pop_front().unwrap_or(false);
            self.gn.set(q);
            Ok(v)
        }
        fn oon_asserted(&mut self) -> Result<bool, Self::Error> {
            let mut q = self.oon.take();
            let v = q.pop_front().unwrap_or(false);
            self.oon.set(q);
            Ok(v)
        }
        fn set_reset(&mut self, _high: bool) -> Result<(), Self::Error> {
            Ok(())
        }
        fn set_power_enable(&mut self, _on: bool) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct NoAdc;
    impl AdcPort for NoAdc {
        type Error = core::convert::Infallible;
        fn read_raw(&mut self) -> Result<u16, Self::Error> {
            Ok(0)
        }
    }

    #[derive(Clone, PartialEq, Debug)]
    struct TestWork {
        id: u32,
        sdiff: f64,
    }
    impl Work for TestWork {
        fn midstates(&self) -> &[[u8; 32]; 4] {
            &[[0u8; 32]; 4]
        }
        fn header_tail(&self) -> &[u8; 12] {
            &[0u8; 12]
        }
        fn target(&self) -> &[u8; 32] {
            &[0xFFu8; 32]
        }
        fn sdiff(&self) -> f64 {
            self.sdiff
        }
        fn version_rolling(&self) -> bool {
            false
        }
    }

    struct FixedQueue(VecDeque<TestWork>);
    impl WorkQueue<TestWork> for FixedQueue {
        fn dequeue(&mut self) -> Option<TestWork> {
            self.0.pop_front()
        }
    }

    #[derive(Default)]
    struct RecordingUpstream {
        completed: Vec<TestWork>,
        submitted: Vec<(u32, u8, bool)>,
        accept: bool,
    }
    impl Upstream<TestWork> for RecordingUpstream {
        fn work_completed(&mut self, work: TestWork) {
            self.completed.push(work);
        }
        fn submit_nonce(&mut self, _work: &TestWork, nonce: u32, micro_job_id: u8) -> bool {
            self.submitted.push((nonce, micro_job_id, self.accept));
            self.accept
        }
    }

    fn chain_with_one_ready_chip() -> Chain<MockTransport, ScriptedGpio, NoAdc, TestWork> {
        chain_with_chips(&[1])
    }

    fn chain_with_chips(chip_ids: &[u8]) -> Chain<MockTransport, ScriptedGpio, NoAdc, TestWork> {
        let chain = Chain::new(
            0,
            MockTransport::new(),
            ScriptedGpio::new(&[], &[]),
            NoAdc,
            crate::config::ChainConfig::default(),
        );
        {
            let mut inner = chain.inner.lock().unwrap();
            for &id in chip_ids {
                let mut chip = AsicChip::new(id);
                chip.mark_ready();
                inner.chips.push(chip);
            }
            inner.primed = true;
        }
        chain
    }

    fn echo<const N: usize>(opcode: OpCode, extra: impl FnOnce(&mut [u8; N])) -> Vec<u8> {
        let mut data = [0u8; N];
        data[0] = opcode as u8;
        extra(&mut data);
        for b in data.iter_mut() {
            *b = !*b;
        }
        data.to_vec()
    }

    /// Spec §8 scenario 2 (adapted to steady state rather than the BIST
    /// window): a `READ_JOB_ID` with the GN bit set is serviced by
    /// `READ_RESULT`, and the nonce is forwarded upstream via `submit_nonce`.
    #[test]
    fn golden_nonce_is_harvested_and_forwarded_upstream() {
        let chain = chain_with_one_ready_chip();
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.jobs.store(TestWork { id: 1, sdiff: 1.0 });
        }

        {
            let mut inner = chain.inner.lock().unwrap();
            inner
                .transport
                .push_response(&echo::<8>(OpCode::ReadJobId, |d| {
                    d[1] = 1; // chip_id echo
                    d[3] = 1; // job_id
                    d[4] = 0x01; // gn bit
                    d[5] = 1; // chip_id
                }));
            inner.transport.push_response(&echo::<24>(OpCode::ReadResult, |d| {
                d[1] = 1; // chip_id echo
                d[2..6].copy_from_slice(&0x0D47_3A59u32.to_be_bytes());
                d[19] = 0b0001; // micro_job_id mask, bit 0
            }));
        }

        let mut queue = FixedQueue(VecDeque::new());
        let mut upstream = RecordingUpstream {
            accept: true,
            ..Default::default()
        };
        let gn_gpio = ScriptedGpio::new(&[true], &[false]);
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.gpio = gn_gpio;
        }

        chain.scanwork(&mut queue, &mut upstream);

        assert_eq!(upstream.submitted, vec![(0x0D47_3A59, 0, true)]);
        let inner = chain.inner.lock().unwrap();
        assert_eq!(inner.chips[0].stats.nonces_found, 1);
        assert_eq!(inner.chips[0].stats.hw_errors, 0);
    }

    /// Spec §7 error 3 / §8: upstream rejecting a nonce counts as a hardware
    /// error and deducts one nonce range from the pass's hash-accounting
    /// estimate, but scanwork does not panic or disable the chain.
    #[test]
    fn rejected_nonce_counts_as_hardware_error() {
        let chain = chain_with_one_ready_chip();
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.jobs.store(TestWork { id: 1, sdiff: 1.0 });
            inner.gpio = ScriptedGpio::new(&[true], &[false]);
            inner.transport.push_response(&echo::<8>(OpCode::ReadJobId, |d| {
                d[1] = 1;
                d[3] = 1;
                d[4] = 0x01;
                d[5] = 1;
            }));
            inner.transport.push_response(&echo::<24>(OpCode::ReadResult, |d| {
                d[1] = 1;
                d[19] = 0b0001;
            }));
        }

        let mut queue = FixedQueue(VecDeque::new());
        let mut upstream = RecordingUpstream {
            accept: false,
            ..Default::default()
        };
        chain.scanwork(&mut queue, &mut upstream);

        let inner = chain.inner.lock().unwrap();
        assert_eq!(inner.chips[0].stats.hw_errors, 1);
        assert_eq!(inner.chips[0].stats.nonces_found, 0);
    }

    /// Spec §8 scenario 4: a GN for a job slot whose work reference was
    /// already cleared (e.g. by a flush) is a stale nonce, not forwarded
    /// upstream.
    #[test]
    fn stale_nonce_after_flush_is_counted_not_forwarded() {
        let chain = chain_with_one_ready_chip();
        {
            let mut inner = chain.inner.lock().unwrap();
            // Job slot 0 (job_id 1) is empty, as if flushed.
            inner.gpio = ScriptedGpio::new(&[true], &[false]);
            inner.transport.push_response(&echo::<8>(OpCode::ReadJobId, |d| {
                d[1] = 1;
                d[3] = 1;
                d[4] = 0x01;
                d[5] = 1;
            }));
            inner.transport.push_response(&echo::<24>(OpCode::ReadResult, |d| {
                d[1] = 1;
                d[19] = 0b0001;
            }));
        }

        let mut queue = FixedQueue(VecDeque::new());
        let mut upstream = RecordingUpstream::default();
        chain.scanwork(&mut queue, &mut upstream);

        assert!(upstream.submitted.is_empty());
        let inner = chain.inner.lock().unwrap();
        assert_eq!(inner.chips[0].stats.stales, 1);
    }

    /// Spec §8 scenario 3: OON asserted issues exactly one `CLEAR_OON`
    /// broadcast and refills up to [`OON_REFILL`] slots.
    #[test]
    fn oon_refills_up_to_two_slots() {
        let chain = chain_with_one_ready_chip();
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.sdiff = Some(1.0); // no WRITE_TARGET needed for either refill
            inner.gpio = ScriptedGpio::new(&[false], &[true]);
            inner.transport.push_response(&echo::<4>(OpCode::ClearOon, |_| {}));
            for _ in 0..2 {
                inner.transport.push_response(&echo::<144>(OpCode::WriteParm, |_| {}));
                inner.transport.push_response(&echo::<8>(OpCode::RunJob, |_| {}));
            }
        }

        let mut queue = FixedQueue(VecDeque::from([
            TestWork { id: 1, sdiff: 1.0 },
            TestWork { id: 2, sdiff: 1.0 },
            TestWork { id: 3, sdiff: 1.0 },
        ]));
        let mut upstream = RecordingUpstream::default();
        chain.scanwork(&mut queue, &mut upstream);

        // Exactly two dequeued; the third stays queued.
        assert_eq!(queue.0.len(), 1);
        assert_eq!(queue.0.front().unwrap().id, 3);
    }

    /// Spec §8 scenario 5: `WRITE_TARGET` is sent iff `work.sdiff() !=
    /// chain.sdiff_before_pass`, not on every `set_work`.
    #[test]
    fn write_target_sent_only_on_difficulty_change() {
        let chain = chain_with_one_ready_chip();
        {
            let mut inner = chain.inner.lock().unwrap();
            inner.sdiff = Some(1.0);
            // First set_work: same sdiff, no WRITE_TARGET frame expected.
            inner.transport.push_response(&echo::<144>(OpCode::WriteParm, |_| {}));
            inner.transport.push_response(&echo::<8>(OpCode::RunJob, |_| {}));
            // Second set_work: sdiff changes 1.0 -> 2.0, WRITE_TARGET expected.
            inner.transport.push_response(&echo::<144>(OpCode::WriteParm, |_| {}));
            inner.transport.push_response(&echo::<12>(OpCode::WriteTarget, |_| {}));
            inner.transport.push_response(&echo::<8>(OpCode::RunJob, |_| {}));
        }

        let mut upstream = RecordingUpstream::default();
        {
            let mut inner = chain.inner.lock().unwrap();
            chain.set_work(&mut inner, TestWork { id: 1, sdiff: 1.0 }, &mut upstream).unwrap();
            assert_eq!(inner.sdiff, Some(1.0));
            chain.set_work(&mut inner, TestWork { id: 2, sdiff: 2.0 }, &mut upstream).unwrap();
            assert_eq!(inner.sdiff, Some(2.0));
        }
    }
}
