#![no_std]
//! BTC08-family ASIC chip state and PLL table.

mod error;

pub mod bist;
pub mod chip;
pub mod pll;

pub use self::error::{Error, Result};
pub use self::chip::{Chip, ChipState, ChipStats, FeatureClass};
