//! The Chain Controller (spec §2 component 3, §3 "Chain"): owns per-chain
//! state behind one mutex (spec §5) and exposes the free-function-shaped
//! surface `btc08-miner` links against (spec §9 REDESIGN FLAGS: "a record of
//! function pointers supplied at registration — detect, scanwork,
//! queue_full, flush, stats").

use std::sync::Mutex;

use btc08_asic::chip::{Chip, FeatureClass};
use btc08_hal::adc::AdcPort;
use btc08_hal::gpio::GpioPort;
use btc08_hal::transport::Transport;

use crate::config::ChainConfig;
use crate::job::JobRing;
use crate::work::Work;

/// Snapshot of a chain's aggregate state, returned by [`Chain::stats`]
/// (spec §9 "stats" free function).
#[derive(Debug, Clone, Default)]
pub struct ChainStats {
    pub chip_count: u8,
    pub active_chip_count: u8,
    pub chain_perf: u64,
    pub nonce_ranges_processed: u64,
    pub hw_errors: u32,
    pub stales: u32,
    pub nonces_found: u32,
    pub last_temperature_mv: u32,
    pub disabled: bool,
}

pub(crate) struct ChainInner<T, G, A, W> {
    pub(crate) transport: T,
    pub(crate) gpio: G,
    pub(crate) adc: A,
    pub(crate) chips: Vec<Chip>,
    pub(crate) jobs: JobRing<W>,
    pub(crate) sdiff: Option<f64>,
    pub(crate) chain_perf: u64,
    pub(crate) feature_class: FeatureClass,
    pub(crate) oon_timeout_ms: u32,
    pub(crate) disabled: bool,
    pub(crate) primed: bool,
    pub(crate) nonce_ranges_processed: u64,
    pub(crate) last_temperature_mv: u32,
    /// Set by [`Chain::consider_chip_disablement`] when a chip's PLL was
    /// stepped down rather than disabled outright; the rest of the current
    /// `scanwork` pass re-inits to apply the new target (spec §4.5: "retries
    /// via re-init").
    pub(crate) needs_reinit: bool,
}

/// One attached hash board (spec §3 "Chain"). Generic over the transport,
/// GPIO, ADC and upstream-work types so the whole stack stays `no_std`
/// friendly up through `btc08-asic`/`btc08-protocol` even though this crate
/// itself is host-side (spec §5).
pub struct Chain<T, G, A, W> {
    pub id: u8,
    pub(crate) config: ChainConfig,
    pub(crate) inner: Mutex<ChainInner<T, G, A, W>>,
}

impl<T: Transport, G: GpioPort, A: AdcPort, W: Work> Chain<T, G, A, W> {
    /// Construct an as-yet-uninitialized chain (spec §3 Lifecycle: "A chain
    /// is created on process start (never hot-plugged)"). Call [`Chain::detect`]
    /// before [`Chain::scanwork`]/[`Chain::queue_full`].
    pub fn new(id: u8, transport: T, gpio: G, adc: A, config: ChainConfig) -> Self {
        let oon_timeout_ms = config.oon_timeout_ms_asic;
        Chain {
            id,
            config,
            inner: Mutex::new(ChainInner {
                transport,
                gpio,
                adc,
                chips: Vec::new(),
                jobs: JobRing::new(),
                sdiff: None,
                chain_perf: 0,
                feature_class: FeatureClass::Unknown(0xF),
                oon_timeout_ms,
                disabled: false,
                primed: false,
                nonce_ranges_processed: 0,
                last_temperature_mv: 0,
                needs_reinit: false,
            }),
        }
    }

    /// Run the chain-initialization state machine (spec §4.3). Returns
    /// `true` on success, `false` (and leaves the chain disabled) on any
    /// unrecoverable init failure — this is the `detect` free function of
    /// spec §9's device-table record.
    pub fn detect(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match crate::init::init_chain(&mut inner.transport, &mut inner.gpio, &self.config) {
            Ok((chips, feature_class)) => {
                inner.chain_perf = chips.iter().map(Chip::perf).sum();
                inner.oon_timeout_ms = match feature_class {
                    FeatureClass::Fpga => self.config.oon_timeout_ms_fpga,
                    _ => self.config.oon_timeout_ms_asic,
                };
                inner.feature_class = feature_class;
                inner.chips = chips;
                inner.disabled = false;
                inner.primed = false;
                log::info!(
                    "chain {}: detected {} chips, {:?}, {} timeout_oon ms",
                    self.id,
                    inner.chips.len(),
                    feature_class,
                    inner.oon_timeout_ms
                );
                true
            }
            Err(e) => {
                log::error!("chain {}: init failed: {e:?}", self.id);
                inner.disabled = true;
                false
            }
        }
    }

    /// Aggregate stats snapshot (spec §9 "stats" free function).
    pub fn stats(&self) -> ChainStats {
        let mut inner = self.inner.lock().unwrap();
        if let Ok(raw) = inner.adc.read_raw() {
            inner.last_temperature_mv = btc08_hal::adc::raw_to_mv(raw);
        }
        let active = inner.chips.iter().filter(|c| !c.is_disabled()).count() as u8;
        let (hw_errors, stales, nonces_found) = inner.chips.iter().fold((0, 0, 0), |(h, s, n), c| {
            (h + c.stats.hw_errors, s + c.stats.stales, n + c.stats.nonces_found)
        });
        ChainStats {
            chip_count: inner.chips.len() as u8,
            active_chip_count: active,
            chain_perf: inner.chain_perf,
            nonce_ranges_processed: inner.nonce_ranges_processed,
            hw_errors,
            stales,
            nonces_found,
            last_temperature_mv: inner.last_temperature_mv,
            disabled: inner.disabled,
        }
    }

    /// Mark the chain disabled without tearing down state (spec §4.5 Abort:
    /// "mark the chain disabled; the scanwork function returns 0 on the next
    /// call"). Recovery is a fresh [`Chain::flush`].
    pub(crate) fn disable_locked(&self, inner: &mut ChainInner<T, G, A, W>) {
        inner.disabled = true;
    }
}
