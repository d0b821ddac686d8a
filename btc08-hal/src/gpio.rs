//! The IRQ/GPIO layer (spec §2 component 6, §6): level-polled GN/OON inputs,
//! a driven RESET output, plus the board-presence lines (spec §6 "Four
//! inputs per port ... and two outputs"). No kernel IRQs; the scan loop
//! polls these levels directly.

/// Four digital inputs and two digital outputs per hash board. GN, OON and
/// the two presence lines are active-low.
pub trait GpioPort {
    type Error;

    fn plugged(&mut self) -> Result<bool, Self::Error>;
    fn body_detected(&mut self) -> Result<bool, Self::Error>;

    /// Golden-nonce line asserted (active-low; this returns the logical,
    /// already-inverted level).
    fn gn_asserted(&mut self) -> Result<bool, Self::Error>;
    /// Out-of-nonce line asserted (active-low; logical level).
    fn oon_asserted(&mut self) -> Result<bool, Self::Error>;

    fn set_reset(&mut self, high: bool) -> Result<(), Self::Error>;
    fn set_power_enable(&mut self, on: bool) -> Result<(), Self::Error>;
}
