//! Thread-safe facade over one [`Device`]

use super::device::{Device, DeviceError};
use crate::core::events::{CoreEvent, CoreEventSender};
use deckhand_protocol::{capabilities_for, CapabilityRecord, DeviceModel, RawInputReport, Region};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Longest single transport read while polling, so disposal never waits out
/// a full poll timeout
pub const READ_SLICE: Duration = Duration::from_millis(10);

/// Serializes every operation on one device behind a single lock.
///
/// A non-recoverable transport error inside any operation marks the device
/// dead; from then on every operation fails with
/// [`DeviceError::Unavailable`] and the disconnect event has been sent once.
pub struct SharedDevice {
    device: Mutex<Device>,
    model: DeviceModel,
    serial: String,
    dead: AtomicBool,
    events: Option<CoreEventSender>,
}

impl SharedDevice {
    pub fn new(device: Device, events: Option<CoreEventSender>) -> Self {
        Self {
            model: device.model(),
            serial: device.serial().to_string(),
            device: Mutex::new(device),
            dead: AtomicBool::new(false),
            events,
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn capabilities(&self) -> &'static CapabilityRecord {
        capabilities_for(self.model)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Mark the device dead, returning `true` for the call that did it.
    ///
    /// Only that call publishes `DeviceDisconnected`.
    pub fn mark_dead(&self) -> bool {
        if self.dead.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Device {} ({}) disconnected", self.serial, self.model);
        if let Some(events) = &self.events {
            let _ = events.send(CoreEvent::DeviceDisconnected {
                serial: self.serial.clone(),
            });
        }
        true
    }

    fn unavailable(&self) -> DeviceError {
        DeviceError::Unavailable(self.serial.clone())
    }

    /// Run `op` with exclusive access to the device
    pub fn with_device<T>(
        &self,
        op: impl FnOnce(&mut Device) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        if self.is_dead() {
            return Err(self.unavailable());
        }
        let mut device = self.device.lock();
        if self.is_dead() {
            return Err(self.unavailable());
        }

        let result = op(&mut *device);
        if let Err(DeviceError::Transport(e)) = &result {
            if !e.is_recoverable() {
                drop(device);
                warn!("Transport failure on {}: {}", self.serial, e);
                self.mark_dead();
            }
        }
        result
    }

    /// Poll for one input report for up to `timeout`.
    ///
    /// The wait is split into [`READ_SLICE`] reads, each taking the device
    /// lock separately, so writes interleave with polling and a disposal
    /// is noticed within one slice.
    pub fn read_input(&self, timeout: Duration) -> Result<Option<RawInputReport>, DeviceError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining.min(READ_SLICE);
            if let Some(report) = self.with_device(|d| d.read_input(slice))? {
                return Ok(Some(report));
            }
            if remaining <= READ_SLICE {
                return Ok(None);
            }
        }
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        self.with_device(|d| d.reset())?;
        info!("Reset {}", self.serial);
        Ok(())
    }

    pub fn set_brightness(&self, percent: u8) -> Result<(), DeviceError> {
        self.with_device(|d| d.set_brightness(percent))?;
        info!("Brightness of {} set to {}%", self.serial, percent.min(100));
        Ok(())
    }

    pub fn write_button_image(&self, key: usize, image: &[u8]) -> Result<(), DeviceError> {
        self.with_device(|d| d.write_button_image(key, image))
    }

    pub fn write_lcd_region(&self, region: Region, image: &[u8]) -> Result<(), DeviceError> {
        self.with_device(|d| d.write_lcd_region(region, image))
    }

    pub fn serial_number(&self) -> Result<String, DeviceError> {
        self.with_device(|d| d.serial_number())
    }

    pub fn firmware_version(&self) -> Result<String, DeviceError> {
        self.with_device(|d| d.firmware_version())
    }

    /// Release the connection handle.
    ///
    /// Callers stop the reading loop first; this waits for any in-flight
    /// operation to finish.
    pub fn close(&self) {
        self.device.lock().close();
    }
}
