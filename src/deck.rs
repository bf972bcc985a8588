//! One connected device: its inputs, its screen stack and its reading loop

use anyhow::Context;
use crate::core::config::Config;
use crate::core::events::{CoreEvent, CoreEventSender};
use crate::hid::{Device, DeviceError, InputEdge, InputReader, SharedDevice};
use crate::input::{layout, BmpEncoder, ImageEncoder, Input, InputEvent};
use crate::screen::{Screen, ScreenError, ScreenStack};
use deckhand_protocol::{CapabilityRecord, DeviceModel};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-deck settings
#[derive(Clone)]
pub struct DeckOptions {
    /// How long one poll of the reading loop may block
    pub read_timeout: Duration,
    /// Cached images per input
    pub image_cache_size: usize,
    pub encoder: Arc<dyn ImageEncoder>,
}

impl Default for DeckOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            image_cache_size: 16,
            encoder: Arc::new(BmpEncoder),
        }
    }
}

impl DeckOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_timeout: config.hid.read_timeout(),
            image_cache_size: config.display.image_cache_size,
            ..Self::default()
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }
}

struct DeckInner {
    device: Arc<SharedDevice>,
    inputs: Vec<Arc<Input>>,
    /// Guards both navigation and input dispatch
    stack: Mutex<ScreenStack>,
    events: Option<CoreEventSender>,
}

/// A connected device with its own reading thread.
///
/// Input events are published to the inputs under the stack guard, so a
/// screen switch never races an event into a half-detached screen.
pub struct Deck {
    inner: Arc<DeckInner>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Deck {
    /// Wrap an open device and start its reading loop.
    ///
    /// The root screen is writable and starts empty.
    pub fn open(
        device: Device,
        options: DeckOptions,
        events: Option<CoreEventSender>,
    ) -> anyhow::Result<Self> {
        let model = device.model();
        let serial = device.serial().to_string();
        let shared = Arc::new(SharedDevice::new(device, events.clone()));

        let inputs: Vec<Arc<Input>> = layout(shared.capabilities())
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                Arc::new(Input::new(
                    index,
                    slot,
                    Arc::clone(&shared),
                    Arc::clone(&options.encoder),
                    options.image_cache_size,
                ))
            })
            .collect();

        let root = Screen::new(true, inputs.iter().map(|i| i.capabilities()).collect());
        let stack = ScreenStack::new(root, inputs.clone()).context("Failed to attach root screen")?;

        let inner = Arc::new(DeckInner {
            device: shared,
            inputs,
            stack: Mutex::new(stack),
            events,
        });

        let loop_inner = Arc::clone(&inner);
        let read_timeout = options.read_timeout;
        let reader = thread::Builder::new()
            .name(format!("deck-reader-{}", serial))
            .spawn(move || reading_loop(loop_inner, read_timeout))
            .context("Failed to spawn reading loop")?;

        info!("Opened {} ({})", serial, model);
        Ok(Self {
            inner,
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn serial(&self) -> &str {
        self.inner.device.serial()
    }

    pub fn model(&self) -> DeviceModel {
        self.inner.device.model()
    }

    pub fn capabilities(&self) -> &'static CapabilityRecord {
        self.inner.device.capabilities()
    }

    pub fn device(&self) -> &Arc<SharedDevice> {
        &self.inner.device
    }

    /// Keys first, then encoders
    pub fn inputs(&self) -> &[Arc<Input>] {
        &self.inner.inputs
    }

    pub fn input(&self, index: usize) -> Option<&Arc<Input>> {
        self.inner.inputs.get(index)
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.device.is_dead()
    }

    // ── Navigation ─────────────────────────────────────────────────

    /// Empty screen sized for this device
    pub fn new_screen(&self, writable: bool) -> Arc<Screen> {
        Screen::new(
            writable,
            self.inner.inputs.iter().map(|i| i.capabilities()).collect(),
        )
    }

    pub fn push_screen(&self, screen: Arc<Screen>) -> Result<(), ScreenError> {
        self.inner.stack.lock().push(screen)
    }

    /// `None` when only the root is left
    pub fn pop_screen(&self) -> Option<Arc<Screen>> {
        self.inner.stack.lock().pop()
    }

    /// Swap the top screen, returning the one it replaced
    pub fn replace_screen(&self, screen: Arc<Screen>) -> Result<Arc<Screen>, ScreenError> {
        self.inner.stack.lock().replace(screen)
    }

    pub fn current_screen(&self) -> Arc<Screen> {
        self.inner.stack.lock().current()
    }

    /// Bottom to top
    pub fn screen_stack(&self) -> Vec<Arc<Screen>> {
        self.inner.stack.lock().screens()
    }

    // ── Device operations ──────────────────────────────────────────

    pub fn set_brightness(&self, percent: u8) -> Result<(), DeviceError> {
        self.inner.device.set_brightness(percent)
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        self.inner.device.reset()
    }

    pub fn serial_number(&self) -> Result<String, DeviceError> {
        self.inner.device.serial_number()
    }

    pub fn firmware_version(&self) -> Result<String, DeviceError> {
        self.inner.device.firmware_version()
    }

    /// Stop the reading loop and release the connection.
    ///
    /// Marks the device dead first, so the loop exits within one read slice,
    /// and closes the handle only once the loop has stopped. Safe to call
    /// more than once.
    pub fn dispose(&self) {
        self.inner.device.mark_dead();
        if let Some(handle) = self.reader.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Reading loop of {} panicked", self.serial());
            }
        }
        self.inner.device.close();
    }
}

impl Drop for Deck {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("serial", &self.serial())
            .field("model", &self.model())
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn reading_loop(inner: Arc<DeckInner>, read_timeout: Duration) {
    let device = &inner.device;
    let caps = device.capabilities();
    let mut reader = InputReader::for_model(device.model());
    debug!("Reading loop of {} started", device.serial());

    while !device.is_dead() {
        match device.read_input(read_timeout) {
            Ok(Some(report)) => {
                let edges = reader.process(&report);
                if edges.is_empty() {
                    continue;
                }
                // Listeners run under the stack guard and must not navigate
                let _stack = inner.stack.lock();
                for (index, event) in edges.into_iter().flat_map(|edge| route(caps, edge)) {
                    if let Some(input) = inner.inputs.get(index) {
                        input.publish(&event);
                    }
                }
            }
            Ok(None) => {}
            Err(DeviceError::Protocol(e)) => {
                warn!("Protocol violation on {}: {}", device.serial(), e);
                if let Some(events) = &inner.events {
                    let _ = events.send(CoreEvent::ProtocolViolation {
                        serial: device.serial().to_string(),
                        message: e.to_string(),
                    });
                }
            }
            Err(e) => {
                // Transport failures already marked the device dead
                debug!("Reading loop of {} stopping: {}", device.serial(), e);
                device.mark_dead();
            }
        }
    }

    inner.stack.lock().detach();
    debug!("Reading loop of {} stopped", device.serial());
}

/// Map one edge to the input(s) it belongs to.
///
/// Encoders follow the keys in input order. Touches go to the strip segment
/// under their x coordinate (a swipe to the segment it started in); a tap
/// publishes a press followed by a release.
pub fn route(caps: &CapabilityRecord, edge: InputEdge) -> Vec<(usize, InputEvent)> {
    let encoder = |index: usize| caps.key_count + index;
    let segment = |x: u16| -> Option<usize> {
        let strip = caps.touch_strip?;
        if caps.encoder_count == 0 {
            return None;
        }
        let width = (strip.width as usize / caps.encoder_count).max(1);
        Some(encoder((x as usize / width).min(caps.encoder_count - 1)))
    };

    match edge {
        InputEdge::Pressed(key) => vec![(key, InputEvent::ButtonPressed)],
        InputEdge::Released(key) => vec![(key, InputEvent::ButtonReleased)],
        InputEdge::EncoderPressed(index) => vec![(encoder(index), InputEvent::EncoderPressed)],
        InputEdge::EncoderReleased(index) => vec![(encoder(index), InputEvent::EncoderReleased)],
        InputEdge::Twisted { index, delta } => {
            vec![(encoder(index), InputEvent::EncoderTwisted { delta })]
        }
        InputEdge::TouchPressed { x, y } => segment(x)
            .map(|at| {
                vec![
                    (at, InputEvent::TouchPressed { x, y }),
                    (at, InputEvent::TouchReleased { x, y }),
                ]
            })
            .unwrap_or_default(),
        InputEdge::TouchLongPressed { x, y } => segment(x)
            .map(|at| vec![(at, InputEvent::TouchLongPressed { x, y })])
            .unwrap_or_default(),
        InputEdge::TouchSwiped { from, to } => segment(from.0)
            .map(|at| vec![(at, InputEvent::TouchSwiped { from, to })])
            .unwrap_or_default(),
    }
}
