//! Device lifecycle event definitions

use deckhand_protocol::DeviceModel;
use tokio::sync::mpsc;

/// Wrapper around `mpsc::UnboundedSender<CoreEvent>`.
///
/// Sends never block, so the reading loops and the enumeration monitor can
/// report from plain threads. A closed receiver is not an error for them.
#[derive(Clone, Debug)]
pub struct CoreEventSender {
    tx: mpsc::UnboundedSender<CoreEvent>,
}

impl CoreEventSender {
    pub fn new(tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: CoreEvent) -> Result<(), mpsc::error::SendError<CoreEvent>> {
        self.tx.send(event)
    }
}

/// Events published by the device layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A supported device showed up during enumeration
    DeviceAvailable { serial: String, model: DeviceModel },

    /// A device was opened and its reading loop started
    DeviceConnected { serial: String, model: DeviceModel },

    /// A device died or was disposed; sent exactly once per device
    DeviceDisconnected { serial: String },

    /// The device sent a report the codec could not decode
    ProtocolViolation { serial: String, message: String },
}

impl CoreEvent {
    /// Serial number of the device the event refers to
    pub fn serial(&self) -> &str {
        match self {
            CoreEvent::DeviceAvailable { serial, .. }
            | CoreEvent::DeviceConnected { serial, .. }
            | CoreEvent::DeviceDisconnected { serial }
            | CoreEvent::ProtocolViolation { serial, .. } => serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let (tx, mut rx) = CoreEventSender::channel();
        tx.send(CoreEvent::DeviceDisconnected {
            serial: "AL12".to_string(),
        })
        .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.serial(), "AL12");
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = CoreEventSender::channel();
        drop(rx);
        assert!(tx
            .send(CoreEvent::DeviceAvailable {
                serial: "AL12".to_string(),
                model: DeviceModel::Mini,
            })
            .is_err());
    }
}
