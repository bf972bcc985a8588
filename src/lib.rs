//! Deckhand
//!
//! Drives Stream Deck hardware over HID and routes its input to a per-device
//! stack of screens.
//!
//! # Layers
//! - `deckhand_protocol`: capability table and report codec (bytes only)
//! - [`hid`]: transports, the locked device facade, edge detection, enumeration
//! - [`input`]: capability-typed input positions and their images
//! - [`screen`]: screens, triggers and the navigation stack
//! - [`deck`]: one connected device with its reading loop

pub mod core;
pub mod deck;
pub mod hid;
pub mod input;
pub mod screen;

pub use core::config::Config;
pub use core::events::{CoreEvent, CoreEventSender};
pub use deck::{Deck, DeckOptions};
pub use deckhand_protocol as protocol;
pub use hid::DeckManager;
