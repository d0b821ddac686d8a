//! Immutable per-chain configuration (spec §9 DESIGN NOTES: "re-architect as
//! an immutable configuration value passed by reference into each chain
//! constructor; no process-wide singletons"; SPEC_FULL §4.9).
//!
//! Parsing these values out of a CLI or config file is the collaborator's
//! job (spec §1 "out of scope"); this struct is just the destination shape.

use btc08_protocol::command::CORE_DISABLE_MASK_LEN;

/// `SET_CONTROL`'s default divider (spec §4.3 step 12).
pub const DEFAULT_UDIV: u8 = 17;

/// Nominal chip count a full chain carries; `min_chips` defaults to 90% of
/// this (spec §4.3 step 6).
pub const NOMINAL_CHIPS: u8 = 22;
/// Nominal per-chip core count; `min_cores` defaults to 90% of this
/// (spec §4.3 step 9).
pub const NOMINAL_CORES: u8 = btc08_asic::chip::MAX_CORES_ASIC;

/// `timeout_oon` defaults (spec §5 "Cancellation and timeouts").
pub const DEFAULT_OON_TIMEOUT_MS_ASIC: u32 = 4_000;
pub const DEFAULT_OON_TIMEOUT_MS_FPGA: u32 = 120_000;

const fn floor_90_percent(n: u8) -> u8 {
    ((n as u16 * 9) / 10) as u8
}

/// Built once by the caller and passed by `&ChainConfig` into [`crate::Chain::new`]
/// (spec §6 CLI surface: `spi_clk_khz:pll_mhz:udiv`, `min_cores`, `min_chips`,
/// `test_mode`, `num_chips:num_cores`, dump-traffic).
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub bus_speed_hz: u32,
    pub pll_target_mhz: u32,
    pub udiv: u8,
    pub min_chips: u8,
    pub min_cores: u8,
    pub test_mode: bool,
    /// Per-core disable mask sent with `SET_DISABLE` during BIST, computed
    /// upstream from the configured `num_cores` (spec §4.3 step 8).
    pub core_disable_mask: [u8; CORE_DISABLE_MASK_LEN],
    pub dump_traffic: bool,
    pub oon_timeout_ms_asic: u32,
    pub oon_timeout_ms_fpga: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            bus_speed_hz: btc08_hal::transport::DEFAULT_BUS_SPEED_HZ,
            pll_target_mhz: 500,
            udiv: DEFAULT_UDIV,
            min_chips: floor_90_percent(NOMINAL_CHIPS),
            min_cores: floor_90_percent(NOMINAL_CORES),
            test_mode: false,
            core_disable_mask: [0u8; CORE_DISABLE_MASK_LEN],
            dump_traffic: false,
            oon_timeout_ms_asic: DEFAULT_OON_TIMEOUT_MS_ASIC,
            oon_timeout_ms_fpga: DEFAULT_OON_TIMEOUT_MS_FPGA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_floors() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.min_chips, 19); // 90% of 22, truncated
        assert_eq!(cfg.min_cores, 185); // 90% of 206, truncated
    }
}
