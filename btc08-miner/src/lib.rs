//! Framework integration surface (spec §9 REDESIGN FLAGS): "replace virtual
//! dispatch with a record of function pointers supplied at registration
//! (`detect`, `scanwork`, `queue_full`, `flush`, `stats`). The core exports
//! these as free functions taking a chain handle."
//!
//! This crate owns nothing [`btc08_chain::Chain`] doesn't already expose; it
//! is the thin free-function/table shape a host miner framework links
//! against instead of inheriting from a device base class. The framework
//! holds an opaque [`Btc08Device`] handle per chain (spec §9 "Non-owning
//! back-references": the framework owns the device, the chain only ever
//! calls back out through the `upstream`/`queue` arguments it is handed on
//! every call).

pub mod device;

pub use device::{Btc08Device, DriverTable};
pub use btc08_chain::{Chain, ChainConfig, ChainStats, Upstream, Work, WorkQueue};
