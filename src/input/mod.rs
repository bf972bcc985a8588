//! Capability-typed inputs
//!
//! Every physical position (key, encoder with its touch strip segment) is an
//! [`Input`] carrying a [`Capabilities`] bitset. Triggers test that bitset
//! instead of asking what kind of object an input is.

mod image;
mod position;

pub use image::{BmpEncoder, ImageCache, ImageEncoder, ImageError, RgbImage};
pub use position::{Input, Listener, SubscriptionId};

use crate::hid::DeviceError;
use deckhand_protocol::{CapabilityRecord, ImageMode, Region};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

/// Set of things a position can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const BUTTON: Capabilities = Capabilities(1);
    pub const ENCODER: Capabilities = Capabilities(1 << 1);
    pub const TOUCH_SCREEN: Capabilities = Capabilities(1 << 2);
    pub const DISPLAY: Capabilities = Capabilities(1 << 3);

    const NAMES: [(Capabilities, &'static str); 4] = [
        (Capabilities::BUTTON, "button"),
        (Capabilities::ENCODER, "encoder"),
        (Capabilities::TOUCH_SCREEN, "touch-screen"),
        (Capabilities::DISPLAY, "display"),
    ];

    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    /// Whether every capability in `other` is present
    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        self.union(rhs)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Notification published by an input.
///
/// Touch coordinates are touch strip pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonPressed,
    ButtonReleased,
    EncoderPressed,
    EncoderReleased,
    /// Relative motion, positive clockwise
    EncoderTwisted { delta: i8 },
    TouchPressed { x: u16, y: u16 },
    TouchReleased { x: u16, y: u16 },
    TouchLongPressed { x: u16, y: u16 },
    TouchSwiped { from: (u16, u16), to: (u16, u16) },
}

/// Event discriminant used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ButtonPressed,
    ButtonReleased,
    EncoderPressed,
    EncoderReleased,
    EncoderTwisted,
    TouchPressed,
    TouchReleased,
    TouchLongPressed,
    TouchSwiped,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::ButtonPressed => EventKind::ButtonPressed,
            InputEvent::ButtonReleased => EventKind::ButtonReleased,
            InputEvent::EncoderPressed => EventKind::EncoderPressed,
            InputEvent::EncoderReleased => EventKind::EncoderReleased,
            InputEvent::EncoderTwisted { .. } => EventKind::EncoderTwisted,
            InputEvent::TouchPressed { .. } => EventKind::TouchPressed,
            InputEvent::TouchReleased { .. } => EventKind::TouchReleased,
            InputEvent::TouchLongPressed { .. } => EventKind::TouchLongPressed,
            InputEvent::TouchSwiped { .. } => EventKind::TouchSwiped,
        }
    }
}

impl EventKind {
    /// Capability an input needs to publish this kind
    pub fn required_capability(self) -> Capabilities {
        match self {
            EventKind::ButtonPressed | EventKind::ButtonReleased => Capabilities::BUTTON,
            EventKind::EncoderPressed | EventKind::EncoderReleased | EventKind::EncoderTwisted => {
                Capabilities::ENCODER
            }
            EventKind::TouchPressed
            | EventKind::TouchReleased
            | EventKind::TouchLongPressed
            | EventKind::TouchSwiped => Capabilities::TOUCH_SCREEN,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Layout ─────────────────────────────────────────────────────────

/// Position on the device face in grid cells.
///
/// Keys occupy `rows x columns`; encoder positions form one extra row below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Where a display-capable input draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayTarget {
    Key { key: usize, mode: ImageMode },
    Strip { region: Region, mode: ImageMode },
}

impl DisplayTarget {
    pub fn mode(&self) -> ImageMode {
        match self {
            DisplayTarget::Key { mode, .. } | DisplayTarget::Strip { mode, .. } => *mode,
        }
    }
}

/// Static description of one input position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub position: Position,
    pub capabilities: Capabilities,
    pub display: Option<DisplayTarget>,
}

/// Positions of a model, keys first, then one per encoder
pub fn layout(caps: &CapabilityRecord) -> Vec<InputSlot> {
    let mut slots = Vec::with_capacity(caps.key_count + caps.encoder_count);

    for key in 0..caps.key_count {
        let display = caps
            .key_image
            .map(|mode| DisplayTarget::Key { key, mode });
        let mut capabilities = Capabilities::BUTTON;
        if display.is_some() {
            capabilities = capabilities | Capabilities::DISPLAY;
        }
        slots.push(InputSlot {
            position: Position {
                x: (key % caps.columns) as u16,
                y: (key / caps.columns) as u16,
                width: 1,
                height: 1,
            },
            capabilities,
            display,
        });
    }

    for index in 0..caps.encoder_count {
        let mut capabilities = Capabilities::ENCODER;
        let display = caps.touch_strip.map(|strip| {
            let width = strip.width / caps.encoder_count as u16;
            DisplayTarget::Strip {
                region: Region::new(width * index as u16, 0, width, strip.height),
                mode: strip.image.with_size(width, strip.height),
            }
        });
        if display.is_some() {
            capabilities = capabilities | Capabilities::TOUCH_SCREEN | Capabilities::DISPLAY;
        }
        slots.push(InputSlot {
            position: Position {
                x: index as u16,
                y: caps.rows as u16,
                width: 1,
                height: 1,
            },
            capabilities,
            display,
        });
    }

    slots
}

/// Errors raised by input operations
#[derive(Error, Debug)]
pub enum InputError {
    #[error("input {index} ({capabilities}) cannot publish {kind}")]
    UnsupportedEvent {
        index: usize,
        capabilities: Capabilities,
        kind: EventKind,
    },

    #[error("input {0} has no display")]
    NoDisplay(usize),

    #[error(transparent)]
    Device(#[from] DeviceError),
}


#[cfg(test)]
pub(crate) fn mock_inputs(
    model: deckhand_protocol::DeviceModel,
) -> (Vec<std::sync::Arc<Input>>, crate::hid::mock::MockHandle) {
    use crate::hid::{mock::MockHandle, Device, SharedDevice};
    use std::sync::Arc;

    let handle = MockHandle::new(model);
    let device = Device::new(model, "MOCK", Box::new(handle.transport()));
    let shared = Arc::new(SharedDevice::new(device, None));
    let encoder: Arc<dyn ImageEncoder> = Arc::new(BmpEncoder);
    let inputs = layout(deckhand_protocol::capabilities_for(model))
        .into_iter()
        .enumerate()
        .map(|(i, slot)| Arc::new(Input::new(i, slot, Arc::clone(&shared), Arc::clone(&encoder), 4)))
        .collect();
    (inputs, handle)
}
