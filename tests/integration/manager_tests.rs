//! Device manager integration tests with a simulated HID subsystem

use crate::{eventually, next_event};
use deckhand::core::config::Config;
use deckhand::core::events::{CoreEvent, CoreEventSender};
use deckhand::hid::mock::MockBackend;
use deckhand::hid::DeckManager;
use deckhand::protocol::DeviceModel;
use std::collections::HashSet;
use std::sync::Arc;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.hid.poll_interval_ms = 10;
    config.hid.max_poll_interval_ms = 40;
    config.hid.read_timeout_ms = 10;
    config.display.default_brightness = 35;
    config
}

#[test]
fn test_monitor_tracks_plug_and_unplug() {
    let backend = MockBackend::new();
    let (events, mut rx) = CoreEventSender::channel();
    let manager = DeckManager::with_backend(Arc::new(backend.clone()), fast_config(), events);

    let xl = backend.add_device(DeviceModel::XlV2, "XL-1");
    let mini = backend.add_device(DeviceModel::MiniMk2, "MINI-1");
    manager.start_monitor();

    let mut connected = HashSet::new();
    while connected.len() < 2 {
        if let CoreEvent::DeviceConnected { serial, .. } = next_event(&mut rx) {
            connected.insert(serial);
        }
    }
    assert_eq!(
        connected,
        HashSet::from(["XL-1".to_string(), "MINI-1".to_string()])
    );
    assert_eq!(manager.decks().len(), 2);

    // Default brightness in each family's format
    assert_eq!(&xl.sent_features()[0][..3], &[0x03, 0x08, 35]);
    assert_eq!(&mini.sent_features()[0][..6], &[0x05, 0x55, 0xAA, 0xD1, 0x01, 35]);

    backend.remove_device("MINI-1");
    assert_eq!(
        next_event(&mut rx),
        CoreEvent::DeviceDisconnected {
            serial: "MINI-1".to_string()
        }
    );
    eventually(|| manager.decks().len() == 1);
    assert!(manager.deck("MINI-1").is_none());
    assert!(manager.deck("XL-1").is_some());

    // Plugging it back in is announced again
    backend.add_device(DeviceModel::MiniMk2, "MINI-1");
    assert_eq!(
        next_event(&mut rx),
        CoreEvent::DeviceAvailable {
            serial: "MINI-1".to_string(),
            model: DeviceModel::MiniMk2
        }
    );
    eventually(|| manager.deck("MINI-1").is_some());

    manager.stop_monitor();
    manager.disconnect_all();
    assert!(manager.decks().is_empty());
    assert!(!xl.is_open());
}

#[test]
fn test_list_and_connect_by_serial() {
    let backend = MockBackend::new();
    let (events, _rx) = CoreEventSender::channel();
    let manager = DeckManager::with_backend(Arc::new(backend.clone()), fast_config(), events);
    backend.add_device(DeviceModel::Original, "ORIG");
    backend.add_device(DeviceModel::Pedal, "PEDAL");

    let serials: Vec<String> = manager
        .list_devices()
        .unwrap()
        .into_iter()
        .map(|d| d.serial)
        .collect();
    assert_eq!(serials, vec!["ORIG".to_string(), "PEDAL".to_string()]);

    let deck = manager.connect("PEDAL").unwrap();
    assert_eq!(deck.inputs().len(), 3);
    assert!(manager.connect("MISSING").is_err());

    drop(manager);
    assert!(!deck.is_alive());
}

#[test]
fn test_monitor_keeps_manually_connected_deck() {
    let backend = MockBackend::new();
    let (events, mut rx) = CoreEventSender::channel();
    let manager = DeckManager::with_backend(Arc::new(backend.clone()), fast_config(), events);
    backend.add_device(DeviceModel::Mini, "A");

    let deck = manager.connect("A").unwrap();
    assert_eq!(
        next_event(&mut rx),
        CoreEvent::DeviceConnected {
            serial: "A".to_string(),
            model: DeviceModel::Mini
        }
    );

    manager.start_monitor();
    std::thread::sleep(std::time::Duration::from_millis(300));

    assert!(rx.try_recv().is_err());
    assert!(Arc::ptr_eq(&deck, &manager.deck("A").unwrap()));
    assert!(Arc::ptr_eq(&deck, &manager.connect("A").unwrap()));
    assert!(deck.is_alive());
    assert_eq!(manager.decks().len(), 1);
}
