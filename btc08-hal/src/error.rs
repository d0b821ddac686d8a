use derive_more::From;

#[derive(Debug, PartialEq, From)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// `transfer_fast` was asked to move a length that isn't a multiple of 4
    /// (spec §4.1 precondition on `transfer_fast`).
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
