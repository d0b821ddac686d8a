//! BTC08 response frame decoding.
//!
//! A response frame has the same shape as the command that provoked it: a
//! 2-byte `opcode | chip_id` echo, followed by the response payload at the
//! offset the command reserved for it. The whole frame arrives bit-inverted
//! and must be un-inverted before any field access.

use crate::bit_invert;
use crate::command::{Destination, OpCode, CORE_DISABLE_MASK_LEN};
use crate::{Error, Result};

pub(crate) fn decode<const N: usize>(raw: &[u8; N], opcode: OpCode, dest: Destination) -> Result<[u8; N]> {
    let mut data = *raw;
    bit_invert(&mut data);
    if data[0] != opcode as u8 {
        return Err(Error::OpcodeMismatch {
            expected: opcode as u8,
            actual: data[0],
        });
    }
    let expected_chip_id = dest.chip_id();
    if data[1] != expected_chip_id {
        return Err(Error::ChipIdMismatch {
            expected: expected_chip_id,
            actual: data[1],
        });
    }
    Ok(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobIdResponse {
    pub gn: bool,
    pub oon: bool,
    pub in_flight: u8,
    pub job_id: u8,
    pub chip_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BistResponse {
    pub busy: bool,
    pub core_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllResponse {
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultResponse {
    pub nonces: [u32; 4],
    pub micro_job_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureResponse {
    pub raw: u32,
    pub feature_class: u8,
    pub hash_depth: u8,
}

pub struct Response;

impl Response {
    /// Validate a response's opcode and chip_id echo without extracting any
    /// payload field; used for broadcast commands whose response carries no
    /// interesting data of its own (`RESET`, `SET_PLL_CONFIG`,
    /// `SET_CONTROL`, ...).
    pub fn check_echo<const N: usize>(raw: &[u8; N], opcode: OpCode, dest: Destination) -> Result<()> {
        decode(raw, opcode, dest)?;
        Ok(())
    }

    /// # Read ID Response
    ///
    /// `READ_ID`: 4-byte response, byte 3 (of the response) echoes the
    /// addressed chip's id.
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::Destination;
    /// use btc08_protocol::response::Response;
    ///
    /// let raw = [!0x00u8, !0x03, !0x00, !0x00, !0x00, !0x03, !0x00, !0x00];
    /// assert_eq!(Response::parse_read_id(&raw, Destination::Chip(3)).unwrap(), 3);
    /// ```
    pub fn parse_read_id(raw: &[u8; 8], dest: Destination) -> Result<u8> {
        let data = decode(raw, OpCode::ReadId, dest)?;
        Ok(data[5])
    }

    /// # Auto-Address Response
    ///
    /// `AUTO_ADDRESS`: 2-byte response, byte 1 is the detected chip count.
    /// Always broadcast (spec §4.3 step 3), so the header's chip_id echo is
    /// always 0.
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::response::Response;
    ///
    /// let mut raw = [0u8; 36];
    /// raw[3] = 8; // response byte 1 == frame byte 3
    /// for b in raw.iter_mut() { *b = !*b; }
    /// assert_eq!(Response::parse_auto_address(&raw).unwrap(), 8);
    /// ```
    pub fn parse_auto_address(raw: &[u8; 36]) -> Result<u8> {
        let data = decode(raw, OpCode::AutoAddress, Destination::All)?;
        Ok(data[3])
    }

    /// # Read BIST Response
    ///
    /// `READ_BIST`: byte 0 bit 0 = busy, byte 1 = live core count.
    pub fn parse_read_bist(raw: &[u8; 8], dest: Destination) -> Result<BistResponse> {
        let data = decode(raw, OpCode::ReadBist, dest)?;
        Ok(BistResponse {
            busy: data[2] & 0x01 != 0,
            core_count: data[3],
        })
    }

    /// # Read PLL Response
    ///
    /// `READ_PLL`: byte 1 bit 7 is the lock indicator.
    ///
    /// ## Example
    /// ```
    /// use btc08_protocol::command::Destination;
    /// use btc08_protocol::response::Response;
    ///
    /// let mut raw = [0u8; 8];
    /// raw[1] = 2; // chip_id echo
    /// raw[3] = 0x80;
    /// for b in raw.iter_mut() { *b = !*b; }
    /// assert!(Response::parse_read_pll(&raw, Destination::Chip(2)).unwrap().locked);
    /// ```
    pub fn parse_read_pll(raw: &[u8; 8], dest: Destination) -> Result<PllResponse> {
        let data = decode(raw, OpCode::ReadPll, dest)?;
        Ok(PllResponse {
            locked: data[3] & 0x80 != 0,
        })
    }

    /// # Read Job ID Response
    ///
    /// `READ_JOB_ID`: byte 1 is the job_id carrying a latched golden nonce,
    /// byte 2 bit 0 is the GN flag, bit 1 the OON flag, bits 0..2 the
    /// in-flight job count, byte 3 the echoed chip_id.
    pub fn parse_read_job_id(raw: &[u8; 8], dest: Destination) -> Result<JobIdResponse> {
        let data = decode(raw, OpCode::ReadJobId, dest)?;
        Ok(JobIdResponse {
            job_id: data[3],
            gn: data[4] & 0x01 != 0,
            oon: data[4] & 0x02 != 0,
            in_flight: data[4] & 0x07,
            chip_id: data[5],
        })
    }

    /// # Read Result Response
    ///
    /// `READ_RESULT`: nonces at response offsets 0, 4, 8, 12 (big-endian on
    /// the wire, one per ASIC-boost micro-job), `micro_job_id` mask at offset
    /// 17.
    pub fn parse_read_result(raw: &[u8; 24], dest: Destination) -> Result<ResultResponse> {
        let data = decode(raw, OpCode::ReadResult, dest)?;
        let resp = &data[2..20];
        let mut nonces = [0u32; 4];
        for (i, n) in nonces.iter_mut().enumerate() {
            *n = u32::from_be_bytes(resp[i * 4..i * 4 + 4].try_into().unwrap());
        }
        Ok(ResultResponse {
            nonces,
            micro_job_mask: resp[17],
        })
    }

    /// # Read Feature Response
    ///
    /// `READ_FEATURE`: full dword; `(value >> 8) & 0xF` is the feature class
    /// (0 = FPGA, 5 = ASIC), byte 3 is `hash_depth`.
    pub fn parse_read_feature(raw: &[u8; 8], dest: Destination) -> Result<FeatureResponse> {
        let data = decode(raw, OpCode::ReadFeature, dest)?;
        let resp = &data[2..6];
        let raw_value = u32::from_be_bytes(resp.try_into().unwrap());
        Ok(FeatureResponse {
            raw: raw_value,
            feature_class: ((raw_value >> 8) & 0xF) as u8,
            hash_depth: resp[3],
        })
    }

    /// # Read Revision Response
    ///
    /// `READ_REVISION`: full dword, opaque outside of this codec — the chain
    /// controller only needs to know the read succeeded.
    pub fn parse_read_revision(raw: &[u8; 8], dest: Destination) -> Result<u32> {
        let data = decode(raw, OpCode::ReadRevision, dest)?;
        Ok(u32::from_be_bytes(data[2..6].try_into().unwrap()))
    }

    /// # Read Disable Response
    ///
    /// `READ_DISABLE`: echoes back the per-core disable mask last written by
    /// `SET_DISABLE` (spec §4.3 step 8).
    pub fn parse_read_disable(raw: &[u8; 32], dest: Destination) -> Result<[u8; CORE_DISABLE_MASK_LEN]> {
        let data = decode(raw, OpCode::ReadDisable, dest)?;
        let mut mask = [0u8; CORE_DISABLE_MASK_LEN];
        mask.copy_from_slice(&data[2..2 + CORE_DISABLE_MASK_LEN]);
        Ok(mask)
    }
}
