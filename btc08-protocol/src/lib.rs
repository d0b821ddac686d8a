#![no_std]
//! BTC08 SPI command/response wire protocol.

mod error;

pub mod command;
pub mod response;

pub use self::error::{Error, Result};

/// Broadcast chip address: every chip on the chain answers a command sent here.
pub const BROADCAST_CHIP_ID: u8 = 0;

/// Length of the echoed `opcode | chip_id` header at the front of every response.
pub const CMD_CHIP_ID_LEN: usize = 2;

/// Largest frame this codec builds (`WRITE_PARM`, the biggest payload: 140 bytes
/// of params + 2-byte header + 2 dummy bytes, already a multiple of 4).
pub const MAX_FRAME_LEN: usize = 160;

/// Owned frame buffer, sized for the largest command this codec emits.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Round `len` up to the next multiple of 4, as required by the chain's SPI framing.
pub(crate) const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Flip every bit of every byte; the chain inverts all traffic on the wire.
pub(crate) fn bit_invert(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b = !*b;
    }
}
