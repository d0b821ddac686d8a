//! The SPI transport (spec §4.1): a raw transfer primitive, a fast-path
//! primitive for streaming frames back-to-back at a higher clock rate, and a
//! batched primitive for submitting several frames as one atomic burst.

/// Configured default bus speed (spec §4.1). The chain never goes below
/// [`MIN_BUS_SPEED_HZ`].
pub const DEFAULT_BUS_SPEED_HZ: u32 = 2_000_000;
pub const MIN_BUS_SPEED_HZ: u32 = 1_200_000;

/// Fast-path speed ceiling: 10 MHz for ASIC silicon, 4 MHz for the FPGA
/// emulator.
pub const FAST_SPEED_CEILING_ASIC_HZ: u32 = 10_000_000;
pub const FAST_SPEED_CEILING_FPGA_HZ: u32 = 4_000_000;

/// One leg of a [`Transport::transfer_batch`] burst: its own tx/rx buffers
/// and whether chip-select should toggle between this frame and the next.
pub struct FrameIo<'a> {
    pub tx: &'a [u8],
    pub rx: &'a mut [u8],
    pub cs_change: bool,
}

impl<'a> FrameIo<'a> {
    pub fn new(tx: &'a [u8], rx: &'a mut [u8], cs_change: bool) -> Self {
        FrameIo { tx, rx, cs_change }
    }
}

/// Framed SPI I/O against one hash board's bus/chip-select endpoint.
pub trait Transport {
    type Error;

    /// Exchange `tx.len()` bytes at the configured bus speed. `rx` is
    /// pre-filled with `0xFF` before the exchange.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Identical contract to [`Transport::transfer`] but at 20x the
    /// configured bus speed. `rx.len()` (and `tx.len()`) must be a multiple
    /// of 4 — callers violating this get a length-alignment error back from
    /// the implementation.
    fn transfer_fast(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Submit `frames` as one atomic burst with no host-side gaps, used to
    /// stream `WRITE_PARM` → (optionally) `WRITE_TARGET` → `RUN_JOB`
    /// (spec §4.4 `set_work`).
    fn transfer_batch(&mut self, frames: &mut [FrameIo<'_>]) -> Result<(), Self::Error>;
}
