//! One open device connection and its high-level operations

use super::transport::{Transport, TransportError};
use deckhand_protocol::{
    build_brightness_report, build_reset_report, capabilities_for, decode_input_report,
    identity_request, parse_identity_string, CapabilityRecord, DeviceModel, FramePager,
    IdentityKind, ProtocolError, RawInputReport, Region,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by device operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The device is dead, disposed or closed
    #[error("device {0} is unavailable")]
    Unavailable(String),

    #[error("image encoding failed: {0}")]
    ImageCodec(String),
}

/// Exclusive owner of one connection.
///
/// Framing goes through the protocol codec; every image frame is assembled in
/// `write_buffer`, which lives as long as the device and is never reallocated
/// once it reaches the report length.
pub struct Device {
    model: DeviceModel,
    serial: String,
    transport: Option<Box<dyn Transport>>,
    write_buffer: Vec<u8>,
    read_buffer: Vec<u8>,
}

impl Device {
    pub fn new(model: DeviceModel, serial: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let caps = capabilities_for(model);
        Self {
            model,
            serial: serial.into(),
            transport: Some(transport),
            write_buffer: Vec::with_capacity(caps.reports.image),
            read_buffer: vec![0u8; caps.reports.input],
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

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, DeviceError> {
        match self.transport.as_mut() {
            Some(transport) => Ok(transport),
            None => Err(DeviceError::Unavailable(self.serial.clone())),
        }
    }

    /// Reset to the boot logo
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let report = build_reset_report(self.model);
        self.transport()?.send_feature_report(&report)?;
        Ok(())
    }

    /// Set backlight brightness (0-100 %)
    pub fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError> {
        let report = build_brightness_report(self.model, percent)?;
        self.transport()?.send_feature_report(&report)?;
        Ok(())
    }

    /// Write an encoded image to a key
    pub fn write_button_image(&mut self, key: usize, image: &[u8]) -> Result<(), DeviceError> {
        let pager = FramePager::for_key(self.model, key, image)?;
        self.write_frames(pager)
    }

    /// Write an encoded image to a touch strip region
    pub fn write_lcd_region(&mut self, region: Region, image: &[u8]) -> Result<(), DeviceError> {
        let pager = FramePager::for_lcd(self.model, region, image)?;
        self.write_frames(pager)
    }

    fn write_frames(&mut self, mut pager: FramePager<'_>) -> Result<(), DeviceError> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Err(DeviceError::Unavailable(self.serial.clone())),
        };

        let mut frames = 0;
        while pager.next_into(&mut self.write_buffer) {
            transport.write(&self.write_buffer)?;
            frames += 1;
        }
        debug!("Wrote {} image frames to {}", frames, self.serial);
        Ok(())
    }

    /// Read and decode one input report.
    ///
    /// `Ok(None)` when the timeout elapsed or the read was interrupted while
    /// idle. Undecodable reports surface as [`DeviceError::Protocol`].
    pub fn read_input(&mut self, timeout: Duration) -> Result<Option<RawInputReport>, DeviceError> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Err(DeviceError::Unavailable(self.serial.clone())),
        };

        let n = match transport.read(&mut self.read_buffer, timeout_ms) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) if e.is_recoverable() => {
                debug!("Read on {} interrupted while idle", self.serial);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let report = decode_input_report(self.model, &self.read_buffer[..n])?;
        Ok(Some(report))
    }

    /// Serial number as reported by the device itself
    pub fn serial_number(&mut self) -> Result<String, DeviceError> {
        self.read_identity(IdentityKind::Serial)
    }

    /// Firmware version string
    pub fn firmware_version(&mut self) -> Result<String, DeviceError> {
        self.read_identity(IdentityKind::Firmware)
    }

    fn read_identity(&mut self, kind: IdentityKind) -> Result<String, DeviceError> {
        let model = self.model;
        let (report_id, len) = identity_request(model, kind);
        let mut buf = vec![0u8; len];
        let n = self.transport()?.get_feature_report(report_id, &mut buf)?;
        Ok(parse_identity_string(model, kind, &buf[..n.min(len)]))
    }

    /// Release the connection; later operations fail with `Unavailable`
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Closed connection to {}", self.serial);
        }
    }
}
