//! BTC08 command frame encoding.
//!
//! Every frame is `[opcode | chip_id | params | zero-fill for the response |
//! 2 dummy bytes]`, padded to a 4-byte boundary, then bit-inverted before it
//! goes on the wire (the chain inverts everything it shifts back out, so the
//! host pre-inverts everything it shifts in).

use crate::{align4, bit_invert};

/// A command addresses either every chip on the chain or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    All,
    Chip(u8),
}

impl Destination {
    pub(crate) fn chip_id(self) -> u8 {
        match self {
            Destination::All => 0,
            Destination::Chip(c) => c,
        }
    }
}

/// The BTC08 command opcode set (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    ReadId = 0x00,
    AutoAddress = 0x01,
    RunBist = 0x02,
    ReadBist = 0x03,
    Reset = 0x04,
    SetPllConfig = 0x05,
    ReadPll = 0x06,
    WriteParm = 0x07,
    ReadParm = 0x08,
    WriteTarget = 0x09,
    ReadTarget = 0x0A,
    RunJob = 0x0B,
    ReadJobId = 0x0C,
    ReadResult = 0x0D,
    ClearOon = 0x0E,
    SetDisable = 0x0F,
    ReadDisable = 0x10,
    SetControl = 0x11,
    Debug = 0x12,
    WriteNonce = 0x13,
    WriteCoreCfg = 0x14,
    ReadDebugCnt = 0x15,
    ReadHash = 0x16,
    WriteIoCtrl = 0x17,
    ReadIoCtrl = 0x18,
    ReadFeature = 0x19,
    ReadRevision = 0x1A,
    SetPllFoutEn = 0x1B,
    SetPllResetb = 0x1C,
    WriteCoreDepth = 0x1D,
    SetTmode = 0x1E,
}

/// Disable mask width: `ceil(206 cores / 8)` rounded up to a whole word count.
pub const CORE_DISABLE_MASK_LEN: usize = 26;

/// Build a frame of `params.len() + resp_len + 4` bytes (2-byte header + 2
/// dummy bytes), rounded up to a 4-byte boundary, then bit-invert it in place.
fn build<const N: usize>(opcode: OpCode, dest: Destination, params: &[u8], resp_len: usize) -> [u8; N] {
    let mut data = [0u8; N];
    debug_assert_eq!(N, align4(2 + params.len() + resp_len + 2));
    data[0] = opcode as u8;
    data[1] = dest.chip_id();
    data[2..2 + params.len()].copy_from_slice(params);
    bit_invert(&mut data);
    data
}

pub struct Command;

impl Command {
    /// # Reset Command
    ///
    /// Pulses the chain-wide reset path at the protocol level (the GPIO-level
    /// RESET pulse happens before this is sent).
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let cmd = Command::reset(Destination::All);
    /// assert_eq!(cmd, [!0x04, !0x00, !0x00, !0x00]);
    /// ```
    pub fn reset(dest: Destination) -> [u8; 4] {
        build::<4>(OpCode::Reset, dest, &[], 0)
    }

    /// # Auto-Address Command
    ///
    /// Broadcasts a 32-byte zero parameter; every chip on the chain latches a
    /// sequential `chip_id` and relays the command onward. The response's
    /// second byte carries the total chip count (spec §4.3 step 3).
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::Command;
    ///
    /// let cmd = Command::auto_address();
    /// assert_eq!(cmd.len(), 36);
    /// assert_eq!(cmd[0], !0x01);
    /// assert_eq!(cmd[1], !0x00);
    /// ```
    pub fn auto_address() -> [u8; 36] {
        build::<36>(OpCode::AutoAddress, Destination::All, &[0u8; 32], 0)
    }

    /// # Read ID Command
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let cmd = Command::read_id(Destination::Chip(3));
    /// assert_eq!(cmd, [!0x00, !0x03, !0x00, !0x00, !0x00, !0x00, !0x00, !0x00]);
    /// ```
    pub fn read_id(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadId, dest, &[], 4)
    }

    /// # Run BIST Command
    pub fn run_bist(dest: Destination) -> [u8; 4] {
        build::<4>(OpCode::RunBist, dest, &[], 0)
    }

    /// # Read BIST Command
    pub fn read_bist(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadBist, dest, &[], 2)
    }

    /// # Set PLL Config Command
    ///
    /// `word` is the explicit PMS encoding from spec §9:
    /// `(p<<26)|(m<<16)|(s<<13)|(bypass<<12)|(div_sel<<11)|(afc_enb<<10)|(extafc<<5)|(feed_en<<4)|(fsel<<3)`.
    pub fn set_pll_config(dest: Destination, word: u32) -> [u8; 8] {
        build::<8>(OpCode::SetPllConfig, dest, &word.to_be_bytes(), 0)
    }

    /// # Read PLL Command
    pub fn read_pll(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadPll, dest, &[], 4)
    }

    /// # Set PLL FOUT Enable Command
    pub fn set_pll_fout_en(dest: Destination, enable: bool) -> [u8; 4] {
        build::<4>(OpCode::SetPllFoutEn, dest, &[enable as u8], 0)
    }

    /// # Set PLL RESETB Command
    pub fn set_pll_resetb(dest: Destination, resetb: bool) -> [u8; 4] {
        build::<4>(OpCode::SetPllResetb, dest, &[resetb as u8], 0)
    }

    /// # Write Parameter Command
    ///
    /// Formats the 140-byte ASIC-boost job payload: `midstate0 || data[64..76]
    /// (merkle_root+timestamp+nbits) || midstate1 || midstate2 || midstate3`
    /// (spec §4.4 `set_work`).
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let midstates = [[0u8; 32]; 4];
    /// let cmd = Command::write_parm(Destination::All, &midstates[0], &[0u8; 12], &midstates[1], &midstates[2], &midstates[3]);
    /// assert_eq!(cmd.len(), 144);
    /// assert_eq!(cmd[0], !0x07);
    /// ```
    pub fn write_parm(
        dest: Destination,
        midstate0: &[u8; 32],
        header_tail: &[u8; 12],
        midstate1: &[u8; 32],
        midstate2: &[u8; 32],
        midstate3: &[u8; 32],
    ) -> [u8; 144] {
        let mut params = [0u8; 140];
        params[0..32].copy_from_slice(midstate0);
        params[32..44].copy_from_slice(header_tail);
        params[44..76].copy_from_slice(midstate1);
        params[76..108].copy_from_slice(midstate2);
        params[108..140].copy_from_slice(midstate3);
        build::<144>(OpCode::WriteParm, dest, &params, 0)
    }

    /// # Read Parameter Command
    pub fn read_parm(dest: Destination) -> [u8; 144] {
        build::<144>(OpCode::ReadParm, dest, &[], 140)
    }

    /// # Write Target Command
    ///
    /// `nbits` is big-endian on the wire; `select` packs `(select0, select1)`
    /// as derived in spec §4.4.
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let cmd = Command::write_target(Destination::All, 0x1707_9E15, [0x05, 0x10]);
    /// assert_eq!(cmd.len(), 12);
    /// ```
    pub fn write_target(dest: Destination, nbits: u32, select: [u8; 2]) -> [u8; 12] {
        let mut params = [0u8; 6];
        params[0..4].copy_from_slice(&nbits.to_be_bytes());
        params[4..6].copy_from_slice(&select);
        build::<12>(OpCode::WriteTarget, dest, &params, 0)
    }

    /// # Read Target Command
    pub fn read_target(dest: Destination) -> [u8; 12] {
        build::<12>(OpCode::ReadTarget, dest, &[], 6)
    }

    /// # Write Nonce Range Command
    ///
    /// `start`/`end` are inclusive bounds of the 32-bit nonce range assigned
    /// to the chip addressed by `dest` (spec §4.3 step 11, §8 golden vector).
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let cmd = Command::write_nonce(Destination::Chip(1), 0, 0x02AA_AAAA);
    /// assert_eq!(cmd.len(), 12);
    /// ```
    pub fn write_nonce(dest: Destination, start: u32, end: u32) -> [u8; 12] {
        let mut params = [0u8; 8];
        params[0..4].copy_from_slice(&start.to_be_bytes());
        params[4..8].copy_from_slice(&end.to_be_bytes());
        build::<12>(OpCode::WriteNonce, dest, &params, 0)
    }

    /// # Run Job Command
    ///
    /// `job_id` is 1-based (slot index + 1); `asic_boost` sets the 4-midstate
    /// enable bit iff the pool supports the version-rolling mask.
    pub fn run_job(dest: Destination, job_id: u8, asic_boost: bool) -> [u8; 8] {
        build::<8>(OpCode::RunJob, dest, &[asic_boost as u8, job_id], 0)
    }

    /// # Read Job ID Command
    pub fn read_job_id(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadJobId, dest, &[], 4)
    }

    /// # Read Result Command
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::{Command, Destination};
    ///
    /// let cmd = Command::read_result(Destination::Chip(5));
    /// assert_eq!(cmd.len(), 24);
    /// ```
    pub fn read_result(dest: Destination) -> [u8; 24] {
        build::<24>(OpCode::ReadResult, dest, &[], 18)
    }

    /// # Clear OON Command
    pub fn clear_oon(dest: Destination) -> [u8; 4] {
        build::<4>(OpCode::ClearOon, dest, &[], 0)
    }

    /// # Set Disable Command
    ///
    /// `mask` marks cores disabled bit-by-bit (spec §4.3 step 8, computed from
    /// the configured `num_cores`).
    pub fn set_disable(dest: Destination, mask: &[u8; CORE_DISABLE_MASK_LEN]) -> [u8; 32] {
        build::<32>(OpCode::SetDisable, dest, mask, 0)
    }

    /// # Read Disable Command
    pub fn read_disable(dest: Destination) -> [u8; 32] {
        build::<32>(OpCode::ReadDisable, dest, &[], CORE_DISABLE_MASK_LEN)
    }

    /// # Set Control Command
    ///
    /// `oon_irq_en` and `udiv` are packed as `(oon_irq_en as u16) << 8 | udiv`.
    pub fn set_control(dest: Destination, oon_irq_en: bool, udiv: u8) -> [u8; 8] {
        let word: u16 = ((oon_irq_en as u16) << 8) | udiv as u16;
        build::<8>(OpCode::SetControl, dest, &word.to_be_bytes(), 0)
    }

    /// # Read Feature Command
    pub fn read_feature(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadFeature, dest, &[], 4)
    }

    /// # Read Revision Command
    pub fn read_revision(dest: Destination) -> [u8; 8] {
        build::<8>(OpCode::ReadRevision, dest, &[], 4)
    }
}
