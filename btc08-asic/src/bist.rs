//! Golden built-in self-test vectors (spec §4.3 step 8, §8 scenario 2).
//!
//! These are the fixed inputs loaded into every chip before `RUN_BIST`; the
//! resulting golden nonce is checked against [`expected_golden_nonce`] to
//! confirm the whole WRITE_PARM/WRITE_TARGET/WRITE_NONCE/RUN_BIST path is
//! wired correctly, with or without real silicon attached.

use btc08_protocol::command::CORE_DISABLE_MASK_LEN;

/// Big-endian decoded base of the expected golden nonce; the live value is
/// offset by `hash_depth * num_cores` (spec §8 scenario 2).
pub const GOLDEN_NONCE_BASE: u32 = 0x0D47_3A59;

/// `WRITE_TARGET` parameter for the golden vector: nbits (big-endian) + select.
pub const GOLDEN_TARGET: [u8; 6] = [0x17, 0x37, 0x6F, 0x56, 0x05, 0x00];

/// `WRITE_NONCE` parameter for the golden vector: start (4B) + end (4B).
pub const GOLDEN_NONCE_RANGE: [u8; 8] = [0x66, 0xCB, 0x34, 0x26, 0x66, 0xCB, 0x34, 0x26];

/// All cores enabled: the golden vector exercises every surviving core.
pub const GOLDEN_DISABLE_MASK: [u8; CORE_DISABLE_MASK_LEN] = [0u8; CORE_DISABLE_MASK_LEN];

/// `WRITE_PARM` midstate/header-tail pattern for the golden vector.
pub const GOLDEN_MIDSTATE: [u8; 32] = [0u8; 32];
pub const GOLDEN_HEADER_TAIL: [u8; 12] = [0u8; 12];

/// Expected golden nonce for a chip with `hash_depth` and `num_cores`
/// (spec §8 scenario 2).
///
/// ## Example
/// ```
/// use btc08_asic::bist::{expected_golden_nonce, GOLDEN_NONCE_BASE};
///
/// assert_eq!(expected_golden_nonce(0, 0), GOLDEN_NONCE_BASE);
/// assert_eq!(expected_golden_nonce(2, 100), GOLDEN_NONCE_BASE + 200);
/// ```
pub const fn expected_golden_nonce(hash_depth: u8, num_cores: u8) -> u32 {
    GOLDEN_NONCE_BASE.wrapping_add(hash_depth as u32 * num_cores as u32)
}
