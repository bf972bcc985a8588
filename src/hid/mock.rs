//! In-memory transport for exercising devices without hardware
//!
//! A [`MockHandle`] is the test's side of a simulated device: it queues input
//! reports, records everything written, and can make the device fail.
//! [`MockBackend`] lists and opens simulated devices like a HID subsystem.

use super::transport::{DeviceBackend, DeviceDescriptor, Transport, TransportError};
use deckhand_protocol::{encode_input_report, DeviceModel, RawInputReport};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    inputs: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    features_sent: Vec<Vec<u8>>,
    feature_responses: HashMap<u8, Vec<u8>>,
    broken: bool,
    interrupt_next: bool,
    open_transports: usize,
    reads: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    wake: Condvar,
}

/// Test-side control of one simulated device
#[derive(Clone)]
pub struct MockHandle {
    model: DeviceModel,
    shared: Arc<Shared>,
}

impl MockHandle {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Open a transport connected to this device
    pub fn transport(&self) -> MockTransport {
        self.shared.state.lock().open_transports += 1;
        MockTransport {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue raw input report bytes
    pub fn push_input(&self, bytes: Vec<u8>) {
        self.shared.state.lock().inputs.push_back(bytes);
        self.shared.wake.notify_all();
    }

    /// Queue the input report the device would send for `report`
    pub fn push_report(&self, report: &RawInputReport) -> deckhand_protocol::Result<()> {
        self.push_input(encode_input_report(self.model, report)?);
        Ok(())
    }

    /// Make every further call fail with an I/O error (device unplugged)
    pub fn break_device(&self) {
        self.shared.state.lock().broken = true;
        self.shared.wake.notify_all();
    }

    /// Fail the next read with an idle interruption
    pub fn interrupt_next_read(&self) {
        self.shared.state.lock().interrupt_next = true;
        self.shared.wake.notify_all();
    }

    /// Answer feature report `report_id` with `bytes`
    pub fn set_feature_response(&self, report_id: u8, bytes: Vec<u8>) {
        self.shared
            .state
            .lock()
            .feature_responses
            .insert(report_id, bytes);
    }

    /// Output reports written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().writes.clone()
    }

    /// Feature reports sent so far
    pub fn sent_features(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().features_sent.clone()
    }

    /// Input reports still waiting to be read
    pub fn pending_inputs(&self) -> usize {
        self.shared.state.lock().inputs.len()
    }

    /// Number of read calls served
    pub fn read_count(&self) -> usize {
        self.shared.state.lock().reads
    }

    /// Whether any transport for this device is still open
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open_transports > 0
    }
}

/// Transport half of a simulated device
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    fn check(state: &MockState) -> Result<(), TransportError> {
        if state.broken {
            return Err(TransportError::Io("device unplugged".to_string()));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let mut state = self.shared.state.lock();
        state.reads += 1;
        if state.inputs.is_empty() && !state.broken && !state.interrupt_next {
            let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
            self.shared.wake.wait_for(&mut state, timeout);
        }
        Self::check(&state)?;
        if state.interrupt_next {
            state.interrupt_next = false;
            return Err(TransportError::Interrupted);
        }
        match state.inputs.pop_front() {
            Some(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        Self::check(&state)?;
        state.writes.push(data.to_vec());
        Ok(())
    }

    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let state = self.shared.state.lock();
        Self::check(&state)?;
        buf.fill(0);
        if let Some(response) = state.feature_responses.get(&report_id) {
            let n = response.len().min(buf.len());
            buf[..n].copy_from_slice(&response[..n]);
        }
        if let Some(first) = buf.first_mut() {
            *first = report_id;
        }
        Ok(buf.len())
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        Self::check(&state)?;
        state.features_sent.push(data.to_vec());
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.open_transports = state.open_transports.saturating_sub(1);
    }
}

/// Simulated HID subsystem listing a mutable set of devices
#[derive(Clone, Default)]
pub struct MockBackend {
    devices: Arc<Mutex<Vec<(DeviceDescriptor, MockHandle)>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device
    pub fn add_device(&self, model: DeviceModel, serial: &str) -> MockHandle {
        let handle = MockHandle::new(model);
        let descriptor = DeviceDescriptor {
            model,
            serial: serial.to_string(),
            path: format!("mock://{}", serial),
        };
        self.devices.lock().push((descriptor, handle.clone()));
        handle
    }

    /// Unplug a device: it disappears from enumeration and open connections fail
    pub fn remove_device(&self, serial: &str) {
        self.devices.lock().retain(|(descriptor, handle)| {
            if descriptor.serial == serial {
                handle.break_device();
                false
            } else {
                true
            }
        });
    }
}

impl DeviceBackend for MockBackend {
    fn enumerate(&self, _vendor_id: u16) -> Result<Vec<DeviceDescriptor>, TransportError> {
        Ok(self
            .devices
            .lock()
            .iter()
            .map(|(descriptor, _)| descriptor.clone())
            .collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Transport>, TransportError> {
        self.devices
            .lock()
            .iter()
            .find(|(d, _)| d.serial == descriptor.serial)
            .map(|(_, handle)| Box::new(handle.transport()) as Box<dyn Transport>)
            .ok_or_else(|| TransportError::Io(format!("no such device: {}", descriptor.serial)))
    }
}
