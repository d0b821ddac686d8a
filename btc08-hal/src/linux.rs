//! Concrete Linux backend (spec §6 "Linux sysfs GPIO and IIO ADC mechanics"):
//! `spidev` for the [`Transport`], [`SysfsPin`](linux_embedded_hal::SysfsPin)
//! for the GN/OON/RESET lines, and a small sysfs IIO reader for the ADC
//! channel. Gated behind the `linux` feature so the rest of the stack stays
//! `no_std`-friendly (SPEC_FULL §6).
//!
//! GPIO and ADC sysfs files are opened per call rather than held open for the
//! process lifetime (spec §5 "Shared resources": "opened per call (short-lived)
//! to avoid long-held file descriptors").

extern crate std;

use std::fs;
use std::path::PathBuf;
use std::vec::Vec;

use linux_embedded_hal::SysfsPin;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use crate::adc::AdcPort;
use crate::gpio::GpioPort;
use crate::transport::{FrameIo, Transport, DEFAULT_BUS_SPEED_HZ};

/// SPI transport against one hash board's `/dev/spidevB.C` node, reconfiguring
/// the clock per call between the default speed and the fast-path ceiling
/// (spec §4.1: two speeds, same device, mode 0, 8 bits per word).
pub struct SpidevTransport {
    dev: Spidev,
    bus_speed_hz: u32,
    fast_speed_hz: u32,
}

impl SpidevTransport {
    /// Open `path` (e.g. `/dev/spidev0.0`) and configure SPI mode 0, 8
    /// bits-per-word, no inter-word delay (spec §4.1).
    pub fn open(path: &str, bus_speed_hz: u32, fast_speed_hz: u32) -> std::io::Result<Self> {
        let mut dev = Spidev::open(path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(bus_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&options)?;
        Ok(SpidevTransport {
            dev,
            bus_speed_hz,
            fast_speed_hz,
        })
    }

    fn transfer_at(&mut self, tx: &[u8], rx: &mut [u8], speed_hz: u32) -> std::io::Result<()> {
        for b in rx.iter_mut() {
            *b = 0xFF;
        }
        let mut transfer = SpidevTransfer::read_write(tx, rx);
        transfer.speed_hz = Some(speed_hz);
        self.dev.transfer(&mut transfer)
    }
}

impl Transport for SpidevTransport {
    type Error = std::io::Error;

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_at(tx, rx, self.bus_speed_hz)
    }

    fn transfer_fast(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_at(tx, rx, self.fast_speed_hz)
    }

    fn transfer_batch(&mut self, frames: &mut [FrameIo<'_>]) -> Result<(), Self::Error> {
        for b in frames.iter_mut() {
            for byte in b.rx.iter_mut() {
                *byte = 0xFF;
            }
        }
        let mut transfers: Vec<SpidevTransfer<'_, '_>> = frames
            .iter_mut()
            .map(|f| {
                let mut t = SpidevTransfer::read_write(f.tx, f.rx);
                t.speed_hz = Some(self.fast_speed_hz);
                t.cs_change = Some(f.cs_change);
                t
            })
            .collect();
        self.dev.transfer_multiple(&mut transfers)
    }
}

impl Default for SpidevTransport {
    /// Opens `/dev/spidev0.0` at the configured default bus speed; callers
    /// wanting a different node or fast-path ceiling should use [`SpidevTransport::open`].
    fn default() -> Self {
        SpidevTransport::open("/dev/spidev0.0", DEFAULT_BUS_SPEED_HZ, DEFAULT_BUS_SPEED_HZ * 5)
            .expect("failed to open /dev/spidev0.0")
    }
}

/// GPIO port backed by four [`SysfsPin`] inputs (plug, body-detect, OON, GN)
/// and two outputs (reset, power-enable), matching spec §6's four-in/two-out
/// layout. GN/OON/body-detect are active-low on the wire; this type exposes
/// the already-inverted logical level.
pub struct SysfsGpioPort {
    pub plug: SysfsPin,
    pub body_detect: SysfsPin,
    pub gn: SysfsPin,
    pub oon: SysfsPin,
    pub reset: SysfsPin,
    pub power_enable: SysfsPin,
}

impl GpioPort for SysfsGpioPort {
    type Error = std::io::Error;

    fn plugged(&mut self) -> Result<bool, Self::Error> {
        Ok(self.plug.get_value()? == 0)
    }

    fn body_detected(&mut self) -> Result<bool, Self::Error> {
        Ok(self.body_detect.get_value()? == 0)
    }

    fn gn_asserted(&mut self) -> Result<bool, Self::Error> {
        Ok(self.gn.get_value()? == 0)
    }

    fn oon_asserted(&mut self) -> Result<bool, Self::Error> {
        Ok(self.oon.get_value()? == 0)
    }

    fn set_reset(&mut self, high: bool) -> Result<(), Self::Error> {
        self.reset.set_value(high as u8)
    }

    fn set_power_enable(&mut self, on: bool) -> Result<(), Self::Error> {
        self.power_enable.set_value(on as u8)
    }
}

/// One analog input read through the Linux IIO sysfs ABI (spec §6 "ADC"):
/// `/sys/bus/iio/devices/iio:deviceN/in_voltageM_raw`.
pub struct IioAdcPort {
    raw_path: PathBuf,
}

impl IioAdcPort {
    pub fn new(iio_device: u32, channel: u32) -> Self {
        IioAdcPort {
            raw_path: PathBuf::from(format!(
                "/sys/bus/iio/devices/iio:device{iio_device}/in_voltage{channel}_raw"
            )),
        }
    }
}

impl AdcPort for IioAdcPort {
    type Error = std::io::Error;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        let text = fs::read_to_string(&self.raw_path)?;
        text.trim()
            .parse::<u16>()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
