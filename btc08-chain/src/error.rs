use derive_more::From;

pub type Result<T, TE, GE> = core::result::Result<T, Error<TE, GE>>;

/// Chain-level error taxonomy (spec §7), generic over the transport and GPIO
/// error types it wraps — mirrors the teacher's `bm13xx_chain::Error<IO, G>`.
#[derive(From)]
pub enum Error<TE, GE> {
    /// Transport error (spec §7.1): the SPI transfer itself failed.
    Transport(TE),
    /// GPIO error: a RESET/GN/OON line operation failed.
    Gpio(GE),
    /// Protocol error (spec §7.2): opcode/chip_id echo mismatch or a
    /// malformed response field.
    #[from]
    Protocol(btc08_protocol::Error),
    /// `AUTO_ADDRESS`/`READ_ID` discovered a chip count that doesn't match
    /// what the chain expects (spec §4.3 step 4, "refuse to mine").
    ChipCountMismatch { expected: u8, detected: u8 },
    /// `READ_PLL` never reported the lock bit within the polling budget
    /// (spec §4.3 step 7, §8 scenario 6).
    PllLockTimeout { chip_id: u8 },
    /// `READ_BIST` never reported idle within the polling budget (spec §4.3
    /// step 9).
    BistTimeout { chip_id: u8 },
    /// Requested PLL target is below the table's floor (spec §7.6).
    PllBelowMinimum { requested_mhz: u32 },
    /// Fewer chips survived discovery than `min_chips` (spec §4.3 step 6, §7.6).
    NotEnoughChips { detected: u8, min_chips: u8 },
    /// A chip's live BIST core count fell below `min_cores` (spec §4.3 step 9, §7.6).
    NotEnoughCores {
        chip_id: u8,
        live_cores: u8,
        min_cores: u8,
    },
    /// Upstream work queue was empty when the pipeline needed a refill
    /// (spec §4.4 step 1, §7.5).
    Underflow,
}

#[rustversion::since(1.81)]
impl<TE: core::fmt::Debug, GE: core::fmt::Debug> core::error::Error for Error<TE, GE> {}

#[rustversion::since(1.81)]
impl<TE: core::fmt::Debug, GE: core::fmt::Debug> core::fmt::Display for Error<TE, GE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<TE: core::fmt::Debug, GE: core::fmt::Debug> core::fmt::Debug for Error<TE, GE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Transport(e) => f.debug_tuple("Transport").field(e).finish(),
            Error::Gpio(e) => f.debug_tuple("Gpio").field(e).finish(),
            Error::Protocol(e) => f.debug_tuple("Protocol").field(e).finish(),
            Error::ChipCountMismatch { expected, detected } => f
                .debug_struct("ChipCountMismatch")
                .field("expected", expected)
                .field("detected", detected)
                .finish(),
            Error::PllLockTimeout { chip_id } => {
                f.debug_struct("PllLockTimeout").field("chip_id", chip_id).finish()
            }
            Error::BistTimeout { chip_id } => {
                f.debug_struct("BistTimeout").field("chip_id", chip_id).finish()
            }
            Error::PllBelowMinimum { requested_mhz } => f
                .debug_struct("PllBelowMinimum")
                .field("requested_mhz", requested_mhz)
                .finish(),
            Error::NotEnoughChips { detected, min_chips } => f
                .debug_struct("NotEnoughChips")
                .field("detected", detected)
                .field("min_chips", min_chips)
                .finish(),
            Error::NotEnoughCores {
                chip_id,
                live_cores,
                min_cores,
            } => f
                .debug_struct("NotEnoughCores")
                .field("chip_id", chip_id)
                .field("live_cores", live_cores)
                .field("min_cores", min_cores)
                .finish(),
            Error::Underflow => f.debug_struct("Underflow").finish(),
        }
    }
}
