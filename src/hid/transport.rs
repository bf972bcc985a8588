//! Raw HID transport contract and the hidapi-backed implementation

use deckhand_protocol::DeviceModel;
use hidapi::{HidApi, HidDevice, HidError};
use parking_lot::Mutex;
use std::ffi::CString;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call was interrupted while idle; nothing was transferred
    #[error("interrupted while idle")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the caller may treat this as "no data this cycle"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Interrupted)
    }
}

impl From<HidError> for TransportError {
    fn from(err: HidError) -> Self {
        match err {
            // hidapi reports EINTR only through its message text
            HidError::HidApiError { ref message } if message.contains("Interrupted system call") => {
                TransportError::Interrupted
            }
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// Blocking primitives every device connection provides.
///
/// Closing is dropping: a transport releases its handle in `Drop`.
pub trait Transport: Send {
    /// Read one input report into `buf`; `Ok(0)` means the timeout elapsed
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    /// Write one output report (report id in `data[0]`)
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Fetch feature report `report_id` into `buf`, returning its length
    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Send a feature report (report id in `data[0]`)
    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// A supported device found during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub model: DeviceModel,
    pub serial: String,
    /// Platform path used to open the device
    pub path: String,
}

/// Source of devices: enumeration plus opening.
///
/// Implemented by [`HidSubsystem`] for real hardware and by
/// [`MockBackend`](super::mock::MockBackend) for tests.
pub trait DeviceBackend: Send + Sync {
    /// List connected devices whose product id maps to a supported model
    fn enumerate(&self, vendor_id: u16) -> Result<Vec<DeviceDescriptor>, TransportError>;

    /// Open an exclusive connection to a listed device
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Transport>, TransportError>;
}

// ── hidapi ─────────────────────────────────────────────────────────

/// Process-wide hidapi context.
///
/// The context is reference counted: every open transport keeps a clone, so
/// it is torn down only after the last subsystem handle and every connection
/// it produced are gone.
#[derive(Clone)]
pub struct HidSubsystem {
    api: Arc<Mutex<HidApi>>,
}

impl HidSubsystem {
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        info!("HID subsystem initialized");
        Ok(Self {
            api: Arc::new(Mutex::new(api)),
        })
    }
}

impl DeviceBackend for HidSubsystem {
    fn enumerate(&self, vendor_id: u16) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let mut api = self.api.lock();
        api.refresh_devices()?;

        let mut found: Vec<DeviceDescriptor> = Vec::new();
        for info in api.device_list().filter(|d| d.vendor_id() == vendor_id) {
            let model = match DeviceModel::from_product_id(info.product_id()) {
                Ok(model) => model,
                Err(e) => {
                    debug!("Skipping device: {}", e);
                    continue;
                }
            };
            let path = info.path().to_string_lossy().into_owned();
            let serial = match info.serial_number() {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => path.clone(),
            };
            // Composite devices list one entry per interface
            if found.iter().any(|d| d.serial == serial) {
                continue;
            }
            found.push(DeviceDescriptor {
                model,
                serial,
                path,
            });
        }
        Ok(found)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Transport>, TransportError> {
        let path = CString::new(descriptor.path.as_str())
            .map_err(|_| TransportError::Io(format!("invalid device path: {}", descriptor.path)))?;
        let device = self.api.lock().open_path(&path)?;
        info!("Opened {} ({})", descriptor.model, descriptor.serial);
        Ok(Box::new(HidTransport {
            device,
            _api: Arc::clone(&self.api),
        }))
    }
}

/// Transport over one open hidapi device
pub struct HidTransport {
    device: HidDevice,
    _api: Arc<Mutex<HidApi>>,
}

impl Transport for HidTransport {
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(self.device.read_timeout(buf, timeout_ms)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.device.write(data)?;
        if written < data.len() {
            return Err(TransportError::Io(format!(
                "short write: {} of {} bytes",
                written,
                data.len()
            )));
        }
        Ok(())
    }

    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Err(TransportError::Io("empty feature report buffer".to_string()));
        }
        buf[0] = report_id;
        Ok(self.device.get_feature_report(buf)?)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        Ok(self.device.send_feature_report(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_call_is_recoverable() {
        let err = TransportError::from(HidError::HidApiError {
            message: "hid_read_timeout: Interrupted system call".to_string(),
        });
        assert_eq!(err, TransportError::Interrupted);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let err = TransportError::from(HidError::HidApiError {
            message: "No such device".to_string(),
        });
        assert!(matches!(err, TransportError::Io(_)));
        assert!(!err.is_recoverable());
    }
}
