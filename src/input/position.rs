//! One physical input position and its notification streams

use super::image::{ImageCache, ImageEncoder, RgbImage};
use super::{Capabilities, DisplayTarget, EventKind, InputError, InputEvent, InputSlot, Position};
use crate::hid::{DeviceError, SharedDevice};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Callback invoked for every published event of the subscribed kind
pub type Listener = Arc<dyn Fn(&InputEvent) + Send + Sync>;

/// Handle returned by [`Input::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A key or encoder position of one device.
///
/// Created once per device at connect time and never recreated while the
/// device lives.
pub struct Input {
    index: usize,
    slot: InputSlot,
    device: Arc<SharedDevice>,
    listeners: Mutex<Vec<(SubscriptionId, EventKind, Listener)>>,
    next_subscription: AtomicU64,
    images: Mutex<ImageCache>,
    encoder: Arc<dyn ImageEncoder>,
}

impl Input {
    pub fn new(
        index: usize,
        slot: InputSlot,
        device: Arc<SharedDevice>,
        encoder: Arc<dyn ImageEncoder>,
        cache_size: usize,
    ) -> Self {
        Self {
            index,
            slot,
            device,
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            images: Mutex::new(ImageCache::new(cache_size)),
            encoder,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Position {
        self.slot.position
    }

    pub fn capabilities(&self) -> Capabilities {
        self.slot.capabilities
    }

    pub fn display(&self) -> Option<DisplayTarget> {
        self.slot.display
    }

    /// Serial number of the owning device
    pub fn serial(&self) -> &str {
        self.device.serial()
    }

    /// Register `listener` for events of `kind`.
    ///
    /// On a [`Deck`](crate::deck::Deck) listeners run on the reading thread
    /// while the deck's screen stack is locked. They must return quickly and
    /// must not navigate (push, pop or replace screens) or they deadlock;
    /// hand such work to another thread, as trigger actions do.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> Result<SubscriptionId, InputError> {
        if !self.capabilities().contains(kind.required_capability()) {
            return Err(InputError::UnsupportedEvent {
                index: self.index,
                capabilities: self.capabilities(),
                kind,
            });
        }
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, listener));
        Ok(id)
    }

    /// Remove a subscription; `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sub, _, _)| *sub != id);
        listeners.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `event` to every listener of its kind.
    ///
    /// Listeners run on the caller's thread, outside the listener lock.
    pub fn publish(&self, event: &InputEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();
        debug!(
            "Input {} of {}: {:?} -> {} listener(s)",
            self.index,
            self.serial(),
            event,
            targets.len()
        );
        for listener in targets {
            listener(event);
        }
    }

    fn display_target(&self) -> Result<DisplayTarget, InputError> {
        self.slot.display.ok_or(InputError::NoDisplay(self.index))
    }

    /// Encode `image` for this position and cache it under `key`
    pub fn upload_image(&self, key: &str, image: &RgbImage) -> Result<(), InputError> {
        let target = self.display_target()?;
        let bytes = self
            .encoder
            .encode(image, &target.mode())
            .map_err(|e| DeviceError::ImageCodec(e.to_string()))?;
        self.store(key, bytes);
        Ok(())
    }

    /// Cache bytes already encoded for this position under `key`
    pub fn upload_encoded(&self, key: &str, bytes: Vec<u8>) -> Result<(), InputError> {
        self.display_target()?;
        self.store(key, bytes);
        Ok(())
    }

    fn store(&self, key: &str, bytes: Vec<u8>) {
        if let Some(evicted) = self.images.lock().insert(key, Arc::from(bytes)) {
            debug!("Input {} evicted cached image {:?}", self.index, evicted);
        }
    }

    /// Send the image cached under `key` to the device.
    ///
    /// Returns `false` if nothing is cached under `key`, e.g. because it was
    /// evicted before it could be applied.
    pub fn apply_image(&self, key: &str) -> Result<bool, InputError> {
        let target = self.display_target()?;
        let Some(bytes) = self.images.lock().get(key) else {
            return Ok(false);
        };
        match target {
            DisplayTarget::Key { key: index, .. } => self.device.write_button_image(index, &bytes)?,
            DisplayTarget::Strip { region, .. } => self.device.write_lcd_region(region, &bytes)?,
        }
        Ok(true)
    }

    pub fn has_image(&self, key: &str) -> bool {
        self.images.lock().contains(key)
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("index", &self.index)
            .field("serial", &self.serial())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
