//! HID module - transports, device connections and enumeration

mod device;
mod manager;
pub mod mock;
mod reader;
mod shared;
mod transport;

pub use device::{Device, DeviceError};
pub use manager::DeckManager;
pub use reader::{InputEdge, InputReader};
pub use shared::{SharedDevice, READ_SLICE};
pub use transport::{
    DeviceBackend, DeviceDescriptor, HidSubsystem, HidTransport, Transport, TransportError,
};
