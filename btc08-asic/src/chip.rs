//! Per-chip state record (spec §3 "Chip") and its protocol state machine
//! (spec §4.6).

use crate::pll::Pll;

/// Surviving cores on a fully healthy ASIC chip; an FPGA emulator has only 2.
pub const MAX_CORES_ASIC: u8 = 206;
pub const MAX_CORES_FPGA: u8 = 2;

/// Largest nonce a chip's range can reach. FPGA emulators must finish a job
/// inside 1s of wall clock, hence the much smaller space.
pub const MAX_NONCE_ASIC: u32 = 0xFFFF_FFFF;
pub const MAX_NONCE_FPGA: u32 = 0x07FF_FFFF;

/// Decoded `READ_FEATURE` class: bits 8..11 of the feature dword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureClass {
    Fpga,
    Asic,
    Unknown(u8),
}

impl FeatureClass {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => FeatureClass::Fpga,
            5 => FeatureClass::Asic,
            other => FeatureClass::Unknown(other),
        }
    }

    pub const fn max_nonce(&self) -> u32 {
        match self {
            FeatureClass::Fpga => MAX_NONCE_FPGA,
            _ => MAX_NONCE_ASIC,
        }
    }
}

/// Per-chip protocol state machine (spec §4.6).
///
/// `UNINITIALIZED → DETECTED → PLL_LOCKED → BIST_PASSED → READY →
/// (RUNNING ↔ READY) → DISABLED`. `Disabled` is terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipState {
    #[default]
    Uninitialized,
    Detected,
    PllLocked,
    BistPassed,
    Ready,
    Running,
    Disabled,
}

/// Per-pass hardware/error counters (spec §3 "stats").
#[derive(Debug, Clone, Copy, Default)]
pub struct ChipStats {
    pub hw_errors: u32,
    pub stales: u32,
    pub nonces_found: u32,
    pub nonce_ranges_done: u32,
}

/// One discovered chip on a chain (spec §3 "Chip").
#[derive(Debug, Clone)]
pub struct Chip {
    /// 1-based wire chip_id; 0 is reserved for broadcast.
    pub chip_id: u8,
    pub state: ChipState,
    pub feature_class: FeatureClass,
    pub num_cores: u8,
    pub hash_depth: u8,
    pub pll: Pll,
    pub start_nonce: u32,
    pub end_nonce: u32,
    pub stats: ChipStats,
    /// 0 = not cooling; otherwise the timestamp (ms) cooldown began.
    pub cooldown_begin_ms: u64,
    pub fail_count: u8,
    pub disabled: bool,
}

impl Chip {
    pub fn new(chip_id: u8) -> Self {
        Chip {
            chip_id,
            state: ChipState::Uninitialized,
            feature_class: FeatureClass::Unknown(0xF),
            num_cores: 0,
            hash_depth: 0,
            pll: Pll::default(),
            start_nonce: 0,
            end_nonce: 0,
            stats: ChipStats::default(),
            cooldown_begin_ms: 0,
            fail_count: 0,
            disabled: false,
        }
    }

    pub fn mark_detected(&mut self) {
        self.state = ChipState::Detected;
    }

    pub fn mark_pll_locked(&mut self) {
        self.state = ChipState::PllLocked;
    }

    pub fn mark_bist_passed(&mut self, live_core_count: u8) {
        self.num_cores = live_core_count;
        self.state = ChipState::BistPassed;
    }

    pub fn mark_ready(&mut self) {
        self.state = ChipState::Ready;
    }

    pub fn mark_running(&mut self) {
        self.state = ChipState::Running;
    }

    /// Permanently disable the chip for the remainder of the session
    /// (spec §4.5 "Chip disablement"): zero its clock and cores so it drops
    /// out of `perf()`/nonce-range accounting.
    pub fn disable(&mut self) {
        self.disabled = true;
        self.state = ChipState::Disabled;
        self.num_cores = 0;
    }

    /// `num_cores × mhz`, the weight used to proportion nonce ranges
    /// (spec §4.3 step 10). The PLL program sequence is skipped entirely on
    /// FPGA (spec §4.3 step 7, §8 scenario 1), so an FPGA chip's weight
    /// reduces to its core count alone via a nominal 1 MHz.
    pub fn perf(&self) -> u64 {
        if self.disabled {
            0
        } else {
            let mhz = match self.feature_class {
                FeatureClass::Fpga => 1,
                _ => self.pll.frequency_mhz(),
            };
            self.num_cores as u64 * mhz as u64
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_class_decodes_known_and_unknown_bits() {
        assert_eq!(FeatureClass::from_bits(0), FeatureClass::Fpga);
        assert_eq!(FeatureClass::from_bits(5), FeatureClass::Asic);
        assert_eq!(FeatureClass::from_bits(0xF), FeatureClass::Unknown(0xF));
    }

    #[test]
    fn max_nonce_differs_fpga_vs_asic() {
        assert_eq!(FeatureClass::Fpga.max_nonce(), MAX_NONCE_FPGA);
        assert_eq!(FeatureClass::Asic.max_nonce(), MAX_NONCE_ASIC);
        assert_eq!(FeatureClass::Unknown(0xF).max_nonce(), MAX_NONCE_ASIC);
    }

    #[test]
    fn perf_weighs_cores_by_frequency_on_asic_and_is_nominal_on_fpga() {
        let mut asic = Chip::new(1);
        asic.feature_class = FeatureClass::Asic;
        asic.num_cores = 100;
        asic.pll.set_target(500);
        assert_eq!(asic.perf(), 100 * asic.pll.frequency_mhz() as u64);

        let mut fpga = Chip::new(2);
        fpga.feature_class = FeatureClass::Fpga;
        fpga.num_cores = 2;
        assert_eq!(fpga.perf(), 2);
    }

    #[test]
    fn disable_zeroes_perf_and_marks_terminal_state() {
        let mut chip = Chip::new(1);
        chip.feature_class = FeatureClass::Asic;
        chip.num_cores = 100;
        chip.pll.set_target(500);
        assert!(chip.perf() > 0);

        chip.disable();
        assert!(chip.is_disabled());
        assert_eq!(chip.state, ChipState::Disabled);
        assert_eq!(chip.num_cores, 0);
        assert_eq!(chip.perf(), 0);
    }

    #[test]
    fn state_transitions_follow_the_spec_sequence() {
        let mut chip = Chip::new(3);
        assert_eq!(chip.state, ChipState::Uninitialized);
        chip.mark_detected();
        assert_eq!(chip.state, ChipState::Detected);
        chip.mark_pll_locked();
        assert_eq!(chip.state, ChipState::PllLocked);
        chip.mark_bist_passed(150);
        assert_eq!(chip.state, ChipState::BistPassed);
        assert_eq!(chip.num_cores, 150);
        chip.mark_ready();
        assert_eq!(chip.state, ChipState::Ready);
        chip.mark_running();
        assert_eq!(chip.state, ChipState::Running);
    }
}
