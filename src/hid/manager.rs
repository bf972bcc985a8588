//! Device enumeration, connection management and the polling monitor

use super::device::Device;
use super::transport::{DeviceBackend, DeviceDescriptor, HidSubsystem};
use crate::core::config::Config;
use crate::core::events::{CoreEvent, CoreEventSender};
use crate::deck::{Deck, DeckOptions};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Granularity of the monitor's sleep, so stopping never waits out a full
/// backoff interval
const MONITOR_TICK: Duration = Duration::from_millis(50);

struct ManagerShared {
    backend: Arc<dyn DeviceBackend>,
    config: Config,
    options: DeckOptions,
    decks: Mutex<HashMap<String, Arc<Deck>>>,
    events: CoreEventSender,
}

/// Owns every connected [`Deck`]
pub struct DeckManager {
    shared: Arc<ManagerShared>,
    stop_monitor: Arc<AtomicBool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl DeckManager {
    /// Manager over the system HID subsystem
    pub fn new(config: Config, events: CoreEventSender) -> Result<Self> {
        let hid = HidSubsystem::new().context("Failed to initialize HID API")?;
        Ok(Self::with_backend(Arc::new(hid), config, events))
    }

    pub fn with_backend(backend: Arc<dyn DeviceBackend>, config: Config, events: CoreEventSender) -> Self {
        let options = DeckOptions::from_config(&config);
        Self::with_options(backend, config, options, events)
    }

    /// Like [`with_backend`](Self::with_backend) with explicit deck options
    pub fn with_options(
        backend: Arc<dyn DeviceBackend>,
        config: Config,
        options: DeckOptions,
        events: CoreEventSender,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                backend,
                config,
                options,
                decks: Mutex::new(HashMap::new()),
                events,
            }),
            stop_monitor: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(None),
        }
    }

    /// Supported devices currently plugged in
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.shared
            .backend
            .enumerate(self.shared.config.hid.vendor_id)
            .context("Failed to enumerate HID devices")
    }

    /// Connect the device with `serial`, or return it if already connected
    pub fn connect(&self, serial: &str) -> Result<Arc<Deck>> {
        if let Some(deck) = self.deck(serial) {
            return Ok(deck);
        }
        let descriptor = self
            .list_devices()?
            .into_iter()
            .find(|d| d.serial == serial)
            .ok_or_else(|| anyhow!("Device {} not found", serial))?;
        self.shared.connect(&descriptor)
    }

    /// Dispose the deck with `serial`; `false` if it was not connected
    pub fn disconnect(&self, serial: &str) -> bool {
        let removed = self.shared.decks.lock().remove(serial);
        match removed {
            Some(deck) => {
                deck.dispose();
                info!("Disconnected {}", serial);
                true
            }
            None => false,
        }
    }

    /// Connected decks whose device is still alive
    pub fn decks(&self) -> Vec<Arc<Deck>> {
        self.shared
            .decks
            .lock()
            .values()
            .filter(|deck| deck.is_alive())
            .cloned()
            .collect()
    }

    pub fn deck(&self, serial: &str) -> Option<Arc<Deck>> {
        self.shared
            .decks
            .lock()
            .get(serial)
            .filter(|deck| deck.is_alive())
            .cloned()
    }

    /// Start polling for devices in the background.
    ///
    /// Every newly seen device is announced with `DeviceAvailable` and, with
    /// `auto_connect`, connected. The poll interval starts at
    /// `poll_interval_ms`, grows by half after each poll that finds nothing
    /// new, up to `max_poll_interval_ms`, and resets when something appears.
    pub fn start_monitor(&self) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }
        self.stop_monitor.store(false, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let stop_monitor = Arc::clone(&self.stop_monitor);

        *monitor = Some(thread::spawn(move || {
            info!("Device monitor thread started");
            let hid = &shared.config.hid;
            let initial = hid.poll_interval_ms.max(1);
            let max_interval = hid.max_poll_interval_ms.max(initial);
            let mut interval_ms = initial;
            // Decks connected before the monitor started are not announced again
            let mut known: HashSet<String> = shared.decks.lock().keys().cloned().collect();

            while !stop_monitor.load(Ordering::Relaxed) {
                // A device that died is announced again once it reappears
                for serial in shared.prune() {
                    known.remove(&serial);
                }
                match shared.backend.enumerate(hid.vendor_id) {
                    Ok(descriptors) => {
                        let mut found_new = false;
                        let mut failed = HashSet::new();
                        for descriptor in &descriptors {
                            if known.contains(&descriptor.serial)
                                || shared.is_connected(&descriptor.serial)
                            {
                                continue;
                            }
                            found_new = true;
                            info!("Found {} ({})", descriptor.serial, descriptor.model);
                            let _ = shared.events.send(CoreEvent::DeviceAvailable {
                                serial: descriptor.serial.clone(),
                                model: descriptor.model,
                            });
                            if hid.auto_connect {
                                if let Err(e) = shared.connect(descriptor) {
                                    warn!("Failed to connect {}: {:#}", descriptor.serial, e);
                                    failed.insert(descriptor.serial.clone());
                                }
                            }
                        }
                        // Forget unplugged devices so a replug is announced again;
                        // failed connects are retried on the next poll
                        known = descriptors
                            .into_iter()
                            .map(|d| d.serial)
                            .filter(|serial| !failed.contains(serial))
                            .collect();

                        if found_new {
                            interval_ms = initial;
                        } else {
                            interval_ms = (interval_ms * 3 / 2).min(max_interval);
                        }
                    }
                    Err(e) => {
                        interval_ms = (interval_ms * 3 / 2).min(max_interval);
                        debug!("Enumeration failed: {}, next attempt in {}ms", e, interval_ms);
                    }
                }

                let mut slept = Duration::ZERO;
                let interval = Duration::from_millis(interval_ms);
                while slept < interval && !stop_monitor.load(Ordering::Relaxed) {
                    let tick = MONITOR_TICK.min(interval - slept);
                    thread::sleep(tick);
                    slept += tick;
                }
            }
            info!("Device monitor thread stopped");
        }));
    }

    /// Stop the monitor thread and wait for it
    pub fn stop_monitor(&self) {
        self.stop_monitor.store(true, Ordering::Relaxed);
        if let Some(handle) = self.monitor.lock().take() {
            if handle.join().is_err() {
                warn!("Device monitor thread panicked");
            }
        }
    }

    /// Dispose every deck
    pub fn disconnect_all(&self) {
        let decks: Vec<Arc<Deck>> = self.shared.decks.lock().drain().map(|(_, deck)| deck).collect();
        for deck in decks {
            deck.dispose();
        }
    }
}

impl ManagerShared {
    /// Open `descriptor`, or return its deck if that is still alive.
    ///
    /// The map stays locked while opening, so a manual connect and a monitor
    /// tick never open the same device twice.
    fn connect(&self, descriptor: &DeviceDescriptor) -> Result<Arc<Deck>> {
        let mut decks = self.decks.lock();
        if let Some(deck) = decks.get(&descriptor.serial).filter(|deck| deck.is_alive()) {
            return Ok(Arc::clone(deck));
        }

        let transport = self
            .backend
            .open(descriptor)
            .with_context(|| format!("Failed to open {}", descriptor.serial))?;
        let device = Device::new(descriptor.model, descriptor.serial.clone(), transport);
        let deck = Arc::new(Deck::open(device, self.options.clone(), Some(self.events.clone()))?);

        let caps = deck.capabilities();
        if caps.key_image.is_some() || caps.touch_strip.is_some() {
            deck.set_brightness(self.config.display.default_brightness)
                .with_context(|| format!("Failed to set brightness of {}", descriptor.serial))?;
        }

        let stale = decks.insert(descriptor.serial.clone(), Arc::clone(&deck));
        drop(decks);
        if let Some(stale) = stale {
            stale.dispose();
        }
        let _ = self.events.send(CoreEvent::DeviceConnected {
            serial: descriptor.serial.clone(),
            model: descriptor.model,
        });
        info!("Connected {} ({})", descriptor.serial, descriptor.model);
        Ok(deck)
    }

    fn is_connected(&self, serial: &str) -> bool {
        self.decks
            .lock()
            .get(serial)
            .is_some_and(|deck| deck.is_alive())
    }

    /// Drop decks whose device died, joining their reading loops.
    /// Returns the serials that were dropped.
    fn prune(&self) -> Vec<String> {
        let dead: Vec<Arc<Deck>> = {
            let mut decks = self.decks.lock();
            let serials: Vec<String> = decks
                .iter()
                .filter(|(_, deck)| !deck.is_alive())
                .map(|(serial, _)| serial.clone())
                .collect();
            serials.iter().filter_map(|serial| decks.remove(serial)).collect()
        };
        dead.iter()
            .map(|deck| {
                debug!("Pruning dead deck {}", deck.serial());
                deck.dispose();
                deck.serial().to_string()
            })
            .collect()
    }
}

impl Drop for DeckManager {
    fn drop(&mut self) {
        self.stop_monitor();
        self.disconnect_all();
    }
}
