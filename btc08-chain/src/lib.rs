//! Host-side chain controller for a BTC08-family hash board: chain
//! initialization, the steady-state job pipeline (golden-nonce harvesting,
//! out-of-nonce refill, ASIC-boost 4-midstate jobs) and flush/abort recovery.
//!
//! Built on top of [`btc08_hal`]'s `Transport`/`GpioPort`/`AdcPort` traits, so
//! the same `Chain` runs against the bundled test-mode [`btc08_hal::test_transport::MockTransport`]
//! or the real Linux SPI/sysfs backend behind the `linux` feature of that crate.
//!
//! # Examples
//!
//! A minimal bring-up against the mock transport:
//!
//! ```
//! use btc08_chain::{Chain, ChainConfig};
//! use btc08_hal::test_transport::MockTransport;
//!
//! struct FixedGpio;
//! impl btc08_hal::gpio::GpioPort for FixedGpio {
//!     type Error = core::convert::Infallible;
//!     fn plugged(&mut self) -> Result<bool, Self::Error> { Ok(true) }
//!     fn body_detected(&mut self) -> Result<bool, Self::Error> { Ok(true) }
//!     fn gn_asserted(&mut self) -> Result<bool, Self::Error> { Ok(false) }
//!     fn oon_asserted(&mut self) -> Result<bool, Self::Error> { Ok(false) }
//!     fn set_reset(&mut self, _high: bool) -> Result<(), Self::Error> { Ok(()) }
//!     fn set_power_enable(&mut self, _on: bool) -> Result<(), Self::Error> { Ok(()) }
//! }
//! struct NoAdc;
//! impl btc08_hal::adc::AdcPort for NoAdc {
//!     type Error = core::convert::Infallible;
//!     fn read_raw(&mut self) -> Result<u16, Self::Error> { Ok(0) }
//! }
//!
//! #[derive(Clone)]
//! struct DummyWork;
//! impl btc08_chain::Work for DummyWork {
//!     fn midstates(&self) -> &[[u8; 32]; 4] { &[[0u8; 32]; 4] }
//!     fn header_tail(&self) -> &[u8; 12] { &[0u8; 12] }
//!     fn target(&self) -> &[u8; 32] { &[0xFFu8; 32] }
//!     fn sdiff(&self) -> f64 { 1.0 }
//!     fn version_rolling(&self) -> bool { true }
//! }
//!
//! // `Chain::<_, _, _, DummyWork>::new(...)` is how the framework wires up a
//! // real board; full init requires a scripted transport (see the crate's
//! // tests) so it is omitted from this doctest.
//! let _ = ChainConfig::default();
//! ```

mod chain;
mod config;
mod error;
mod flush;
mod init;
mod job;
mod nbits;
mod pipeline;
mod work;

pub use chain::{Chain, ChainStats};
pub use config::ChainConfig;
pub use error::{Error, Result};
pub use work::{Upstream, Work, WorkQueue};
