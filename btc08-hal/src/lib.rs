#![cfg_attr(not(feature = "std"), no_std)]
//! Transport and GPIO/ADC abstractions for a BTC08 hash board (spec §4.1, §6).

mod error;

pub mod adc;
pub mod gpio;
pub mod transport;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(feature = "std")]
pub mod test_transport;

pub use self::error::Error;
pub use self::transport::{FrameIo, Transport};
