//! Integration tests against simulated devices

mod deck_tests;
mod manager_tests;

use deckhand::core::events::{CoreEvent, CoreEventSender};
use deckhand::deck::{Deck, DeckOptions};
use deckhand::hid::mock::MockHandle;
use deckhand::hid::Device;
use deckhand::protocol::DeviceModel;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Open a deck on a fresh simulated device
pub fn open_deck(model: DeviceModel, serial: &str) -> (Deck, MockHandle, UnboundedReceiver<CoreEvent>) {
    let handle = MockHandle::new(model);
    let (events, rx) = CoreEventSender::channel();
    let device = Device::new(model, serial, Box::new(handle.transport()));
    let options = DeckOptions {
        read_timeout: Duration::from_millis(20),
        ..DeckOptions::default()
    };
    let deck = Deck::open(device, options, Some(events)).unwrap();
    (deck, handle, rx)
}

/// Next core event, failing the test after five seconds
pub fn next_event(rx: &mut UnboundedReceiver<CoreEvent>) -> CoreEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(event) = rx.try_recv() {
            return event;
        }
        assert!(Instant::now() < deadline, "timed out waiting for a core event");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Poll `condition` for up to five seconds
pub fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
