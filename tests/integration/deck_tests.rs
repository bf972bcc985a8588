//! Deck integration tests: input routing, navigation and device failure

use crate::{eventually, next_event, open_deck};
use deckhand::core::events::CoreEvent;
use deckhand::hid::DeviceError;
use deckhand::input::InputEvent;
use deckhand::protocol::{decode_button_image, DeviceModel, RawInputReport};
use deckhand::screen::{
    Action, ActionContext, EventTrigger, FnAction, ScreenError, ToggleTrigger,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Weak};
use std::thread;
use std::time::Duration;

fn recorder(label: &'static str) -> (Arc<dyn Action>, mpsc::Receiver<(&'static str, ActionContext)>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let action = FnAction::new(label, move |ctx: &ActionContext| {
        tx.lock().send((label, ctx.clone()))?;
        Ok(())
    });
    (Arc::new(action), rx)
}

fn press(keys: usize, key: usize) -> RawInputReport {
    let mut states = vec![false; keys];
    states[key] = true;
    RawInputReport::ButtonStates(states)
}

fn release(keys: usize) -> RawInputReport {
    RawInputReport::ButtonStates(vec![false; keys])
}

#[test]
fn test_press_fires_once_per_edge() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Original, "ORIG");
    let (action, fired) = recorder("press");
    deck.current_screen()
        .create_item(5)
        .unwrap()
        .add_trigger(Arc::new(EventTrigger::button_pressed()))
        .unwrap()
        .add_action(action);

    // Held across two reports, then released
    handle.push_report(&press(15, 5)).unwrap();
    handle.push_report(&press(15, 5)).unwrap();
    handle.push_report(&release(15)).unwrap();

    let (_, ctx) = fired.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ctx.serial, "ORIG");
    assert_eq!(ctx.input_index, 5);
    assert_eq!(ctx.event, InputEvent::ButtonPressed);
    eventually(|| handle.pending_inputs() == 0);
    assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_push_and_pop_move_subscriptions() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Mini, "MINI");
    let (tx, fired) = mpsc::channel();
    let tx = Arc::new(Mutex::new(tx));
    let labelled = |label: &'static str| -> Arc<dyn Action> {
        let tx = Arc::clone(&tx);
        Arc::new(FnAction::new(label, move |_: &ActionContext| {
            tx.lock().send(label)?;
            Ok(())
        }))
    };

    deck.current_screen()
        .create_item(0)
        .unwrap()
        .add_trigger(Arc::new(EventTrigger::button_pressed()))
        .unwrap()
        .add_action(labelled("root"));

    let menu = deck.new_screen(true);
    menu.create_item(0)
        .unwrap()
        .add_trigger(Arc::new(EventTrigger::button_pressed()))
        .unwrap()
        .add_action(labelled("menu"));
    deck.push_screen(Arc::clone(&menu)).unwrap();
    assert_eq!(deck.inputs()[0].subscription_count(), 1);

    handle.push_report(&press(6, 0)).unwrap();
    handle.push_report(&release(6)).unwrap();
    assert_eq!(fired.recv_timeout(Duration::from_secs(5)).unwrap(), "menu");

    eventually(|| handle.pending_inputs() == 0);
    let popped = deck.pop_screen().unwrap();
    assert!(Arc::ptr_eq(&popped, &menu));
    assert!(deck.pop_screen().is_none());

    handle.push_report(&press(6, 0)).unwrap();
    assert_eq!(fired.recv_timeout(Duration::from_secs(5)).unwrap(), "root");
    assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_screen_cannot_be_live_on_two_decks() {
    let (first, first_handle, _rx1) = open_deck(DeviceModel::Mini, "MINI-A");
    let (second, _second_handle, _rx2) = open_deck(DeviceModel::Mini, "MINI-B");

    let shared = first.new_screen(true);
    let toggle = shared
        .create_item(0)
        .unwrap()
        .add_trigger(Arc::new(ToggleTrigger))
        .unwrap();
    first.push_screen(Arc::clone(&shared)).unwrap();

    assert!(matches!(
        second.push_screen(Arc::clone(&shared)),
        Err(ScreenError::AlreadyLive(_))
    ));
    assert_eq!(second.screen_stack().len(), 1);
    assert_eq!(first.inputs()[0].subscription_count(), 1);
    assert_eq!(second.inputs()[0].subscription_count(), 0);

    first_handle.push_report(&press(6, 0)).unwrap();
    eventually(|| toggle.toggled());
}

#[test]
fn test_action_can_navigate() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Mini, "MINI");
    let deck = Arc::new(deck);
    let menu = deck.new_screen(true);

    let weak: Weak<deckhand::deck::Deck> = Arc::downgrade(&deck);
    let target = Arc::clone(&menu);
    deck.current_screen()
        .create_item(3)
        .unwrap()
        .add_trigger(Arc::new(EventTrigger::button_pressed()))
        .unwrap()
        .add_action(Arc::new(FnAction::new("open-menu", move |_: &ActionContext| {
            if let Some(deck) = weak.upgrade() {
                deck.push_screen(Arc::clone(&target))?;
            }
            Ok(())
        })));

    handle.push_report(&press(6, 3)).unwrap();
    eventually(|| Arc::ptr_eq(&deck.current_screen(), &menu));

    // The reading loop is still serving reports
    handle.push_report(&release(6)).unwrap();
    eventually(|| handle.pending_inputs() == 0);
    assert!(deck.is_alive());
}

#[test]
fn test_plus_encoder_and_touch_routing() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Plus, "PLUS");
    let (action, fired) = recorder("dial");
    let item = deck.current_screen().create_item(9).unwrap();
    for trigger in [
        EventTrigger::encoder_twisted(),
        EventTrigger::touch_pressed(),
        EventTrigger::touch_swiped(),
    ] {
        item.add_trigger(Arc::new(trigger))
            .unwrap()
            .add_action(Arc::clone(&action));
    }

    handle
        .push_report(&RawInputReport::EncoderTwist(vec![0, -2, 0, 0]))
        .unwrap();
    let (_, ctx) = fired.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ctx.input_index, 9);
    assert_eq!(ctx.event, InputEvent::EncoderTwisted { delta: -2 });

    handle
        .push_report(&RawInputReport::TouchPress { x: 260, y: 40 })
        .unwrap();
    let (_, ctx) = fired.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ctx.event, InputEvent::TouchPressed { x: 260, y: 40 });

    // Starts on segment 0, so it belongs to input 8
    handle
        .push_report(&RawInputReport::TouchSwipe {
            start_x: 100,
            start_y: 50,
            end_x: 300,
            end_y: 50,
        })
        .unwrap();
    assert!(fired.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_toggle_state_reaches_actions() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Pedal, "PEDAL");
    let (action, fired) = recorder("toggle");
    deck.current_screen()
        .create_item(1)
        .unwrap()
        .add_trigger(Arc::new(ToggleTrigger))
        .unwrap()
        .add_action(action);

    for _ in 0..2 {
        handle.push_report(&press(3, 1)).unwrap();
        handle.push_report(&release(3)).unwrap();
    }
    let states: Vec<Option<bool>> = (0..2)
        .map(|_| fired.recv_timeout(Duration::from_secs(5)).unwrap().1.toggled)
        .collect();
    assert_eq!(states, vec![Some(true), Some(false)]);
}

#[test]
fn test_concurrent_image_writes_do_not_interleave() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Xl, "XL");
    let deck = Arc::new(deck);
    let payloads: BTreeMap<usize, Vec<u8>> = (0..6)
        .map(|key| (key, (0..3000).map(|i| (i * 7 + key) as u8).collect()))
        .collect();

    let writers: Vec<_> = payloads
        .iter()
        .map(|(&key, payload)| {
            let deck = Arc::clone(&deck);
            let payload = payload.clone();
            thread::spawn(move || deck.device().write_button_image(key, &payload))
        })
        .collect();
    for _ in 0..10 {
        handle.push_report(&press(32, 3)).unwrap();
        handle.push_report(&release(32)).unwrap();
    }
    for writer in writers {
        writer.join().unwrap().unwrap();
    }

    // Each image's frames must be contiguous on the wire
    let writes = handle.writes();
    let mut decoded = BTreeMap::new();
    for frames in writes.chunks(3) {
        let (key, data) = decode_button_image(DeviceModel::Xl, frames).unwrap();
        decoded.insert(key, data);
    }
    assert_eq!(decoded, payloads);
}

#[test]
fn test_unplug_reports_disconnect_once() {
    let (deck, handle, mut rx) = open_deck(DeviceModel::Mk2, "MK2");
    let deck = Arc::new(deck);
    handle.break_device();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let deck = Arc::clone(&deck);
            thread::spawn(move || deck.set_brightness(50))
        })
        .collect();
    for worker in workers {
        assert!(worker.join().unwrap().is_err());
    }

    assert_eq!(
        next_event(&mut rx),
        CoreEvent::DeviceDisconnected {
            serial: "MK2".to_string()
        }
    );
    eventually(|| !deck.current_screen().is_live());
    assert!(!deck.is_alive());
    assert_eq!(
        deck.reset(),
        Err(DeviceError::Unavailable("MK2".to_string()))
    );
    deck.dispose();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_protocol_violation_is_reported_and_reading_continues() {
    let (deck, handle, mut rx) = open_deck(DeviceModel::Plus, "PLUS");
    let (action, fired) = recorder("press");
    deck.current_screen()
        .create_item(2)
        .unwrap()
        .add_trigger(Arc::new(EventTrigger::button_pressed()))
        .unwrap()
        .add_action(action);

    // Touch report with an unknown gesture byte
    let mut bad = vec![0u8; 14];
    bad[0] = 0x01;
    bad[1] = 0x02;
    bad[4] = 0x09;
    handle.push_input(bad);
    handle.push_report(&press(8, 2)).unwrap();

    assert!(matches!(
        next_event(&mut rx),
        CoreEvent::ProtocolViolation { .. }
    ));
    let (_, ctx) = fired.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ctx.input_index, 2);
    assert!(deck.is_alive());
}

#[test]
fn test_idle_interrupt_is_not_an_error() {
    let (deck, handle, mut rx) = open_deck(DeviceModel::Mini, "MINI");
    handle.interrupt_next_read();
    let reads = handle.read_count();
    eventually(|| handle.read_count() > reads + 2);
    assert!(deck.is_alive());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_identity_reports() {
    let (deck, handle, _rx) = open_deck(DeviceModel::Mk2, "MK2");
    let mut serial = vec![0x06, 0x00];
    serial.extend_from_slice(b"CL12K1A00042");
    handle.set_feature_response(0x06, serial);
    let mut firmware = vec![0x05, 0, 0, 0, 0, 0];
    firmware.extend_from_slice(b"1.01.000");
    handle.set_feature_response(0x05, firmware);

    assert_eq!(deck.serial_number().unwrap(), "CL12K1A00042");
    assert_eq!(deck.firmware_version().unwrap(), "1.01.000");
}
