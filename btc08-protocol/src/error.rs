use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, PartialEq, From)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// The echoed opcode byte in a response did not match the opcode sent.
    OpcodeMismatch { expected: u8, actual: u8 },
    /// The echoed chip_id byte in a response did not match the destination sent.
    ChipIdMismatch { expected: u8, actual: u8 },
    /// A response buffer was shorter than the field layout it was parsed as.
    BufferTooShort { expected: usize, actual: usize },
    /// `transfer_fast` was asked to move a length that isn't a multiple of 4.
    LengthNotAligned { len: usize },
}

#[rustversion::since(1.81)]
impl core::error::Error for Error {}

#[rustversion::since(1.81)]
impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}
