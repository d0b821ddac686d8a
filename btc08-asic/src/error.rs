use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, PartialEq, From)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// Requested PLL target is below the table's floor (spec §7 Configuration error).
    PllBelowMinimum { requested_mhz: u32 },
    /// `READ_PLL` never reported the lock bit within the polling budget.
    PllLockTimeout { chip_id: u8 },
    /// `READ_BIST` never reported idle within the polling budget.
    BistTimeout { chip_id: u8 },
}

#[rustversion::since(1.81)]
impl core::error::Error for Error {}

#[rustversion::since(1.81)]
impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}
