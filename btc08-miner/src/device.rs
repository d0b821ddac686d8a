//! A single BTC08 chain as the framework sees it: one opaque handle plus a
//! [`DriverTable`] of free functions (spec §9 REDESIGN FLAGS), instead of a
//! device struct the framework inherits from.

use btc08_chain::{Chain, ChainConfig, ChainStats, Upstream, Work, WorkQueue};
use btc08_hal::adc::AdcPort;
use btc08_hal::gpio::GpioPort;
use btc08_hal::transport::Transport;

/// One attached hash board, as registered into the framework's device table.
/// Construction mirrors [`Chain::new`] directly — this type adds no state of
/// its own, only the free-function surface below.
pub struct Btc08Device<T, G, A, W> {
    chain: Chain<T, G, A, W>,
}

impl<T: Transport, G: GpioPort, A: AdcPort, W: Work> Btc08Device<T, G, A, W> {
    pub fn new(id: u8, transport: T, gpio: G, adc: A, config: ChainConfig) -> Self {
        Btc08Device {
            chain: Chain::new(id, transport, gpio, adc, config),
        }
    }

    pub fn chain(&self) -> &Chain<T, G, A, W> {
        &self.chain
    }
}

/// Bring a newly-registered device up (spec §4.3 init sequence). Returns
/// `false` if the chain couldn't reach a usable state and stays disabled.
pub fn detect<T: Transport, G: GpioPort, A: AdcPort, W: Work>(dev: &Btc08Device<T, G, A, W>) -> bool {
    dev.chain.detect()
}

/// One cooperative scan pass (spec §4.4, §5). Returns the pass's
/// hash-accounting estimate in hashes, zero if the chain is disabled or made
/// no progress this call.
///
/// Takes `queue`/`upstream` as trait objects, not `impl Trait`, so this free
/// function has a concrete, nameable `fn` pointer type — the shape
/// [`DriverTable`] needs to hold it without a framework-side generic.
pub fn scanwork<T: Transport, G: GpioPort, A: AdcPort, W: Work>(
    dev: &Btc08Device<T, G, A, W>,
    queue: &mut dyn WorkQueue<W>,
    upstream: &mut dyn Upstream<W>,
) -> u64 {
    dev.chain.scanwork(queue, upstream)
}

/// The sole entry point through which new work reaches the chain outside of
/// GN/OON servicing (spec §5). Returns `true` when the chain doesn't want
/// more work queued right now.
pub fn queue_full<T: Transport, G: GpioPort, A: AdcPort, W: Work>(
    dev: &Btc08Device<T, G, A, W>,
    queue: &mut dyn WorkQueue<W>,
    upstream: &mut dyn Upstream<W>,
) -> bool {
    dev.chain.queue_full(queue, upstream)
}

/// Requested by upstream when the block changes (spec §4.5).
pub fn flush<T: Transport, G: GpioPort, A: AdcPort, W: Work>(
    dev: &Btc08Device<T, G, A, W>,
    queue: &mut dyn WorkQueue<W>,
    upstream: &mut dyn Upstream<W>,
) {
    dev.chain.flush(queue, upstream)
}

/// Aggregate stats snapshot for the framework's status display.
pub fn stats<T: Transport, G: GpioPort, A: AdcPort, W: Work>(dev: &Btc08Device<T, G, A, W>) -> ChainStats {
    dev.chain.stats()
}

/// A record of function pointers matching the five free functions above,
/// the shape spec §9 asks for in place of virtual dispatch. A framework can
/// build one of these per device type it supports and store it in its device
/// table instead of an object-safe trait object.
pub struct DriverTable<T, G, A, W> {
    pub detect: fn(&Btc08Device<T, G, A, W>) -> bool,
    pub scanwork: fn(&Btc08Device<T, G, A, W>, &mut dyn WorkQueue<W>, &mut dyn Upstream<W>) -> u64,
    pub queue_full: fn(&Btc08Device<T, G, A, W>, &mut dyn WorkQueue<W>, &mut dyn Upstream<W>) -> bool,
    pub flush: fn(&Btc08Device<T, G, A, W>, &mut dyn WorkQueue<W>, &mut dyn Upstream<W>),
    pub stats: fn(&Btc08Device<T, G, A, W>) -> ChainStats,
}

impl<T: Transport, G: GpioPort, A: AdcPort, W: Work> Default for DriverTable<T, G, A, W> {
    fn default() -> Self {
        DriverTable {
            detect,
            scanwork,
            queue_full,
            flush,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btc08_chain::ChainConfig;
    use btc08_hal::test_transport::MockTransport;
    use std::collections::VecDeque;

    struct FixedGpio {
        gn: bool,
        oon: bool,
    }
    impl GpioPort for FixedGpio {
        type Error = core::convert::Infallible;
        fn plugged(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn body_detected(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
        fn gn_asserted(&mut self) -> Result<bool, Self::Error> {
            Ok(self.gn)
        }
        fn oon_asserted(&mut self) -> Result<bool, Self::Error> {
            Ok(self.oon)
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

    #[derive(Clone)]
    struct DummyWork(u32);
    impl Work for DummyWork {
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
            1.0
        }
        fn version_rolling(&self) -> bool {
            false
        }
    }

    struct FixedQueue(VecDeque<DummyWork>);
    impl WorkQueue<DummyWork> for FixedQueue {
        fn dequeue(&mut self) -> Option<DummyWork> {
            self.0.pop_front()
        }
    }

    struct CountingUpstream {
        completed: u32,
    }
    impl Upstream<DummyWork> for CountingUpstream {
        fn work_completed(&mut self, _work: DummyWork) {
            self.completed += 1;
        }
        fn submit_nonce(&mut self, _work: &DummyWork, _nonce: u32, _micro_job_id: u8) -> bool {
            true
        }
    }

    #[test]
    fn driver_table_default_dispatches_through_free_functions() {
        let transport = MockTransport::new();
        let gpio = FixedGpio { gn: false, oon: false };
        let dev = Btc08Device::new(0, transport, gpio, NoAdc, ChainConfig::default());
        let table: DriverTable<_, _, _, DummyWork> = DriverTable::default();

        // Chain hasn't been detect()-ed successfully (no scripted responses),
        // so it stays disabled and every call is a harmless no-op / zero.
        assert!(!(table.detect)(&dev));
        let mut queue = FixedQueue(VecDeque::new());
        let mut upstream = CountingUpstream { completed: 0 };
        assert_eq!((table.scanwork)(&dev, &mut queue, &mut upstream), 0);
        assert!((table.queue_full)(&dev, &mut queue, &mut upstream));
        let stats = (table.stats)(&dev);
        assert!(stats.disabled);
    }
}
