//! Screens and the items placed in their slots

use super::trigger::{Trigger, TriggerInstance};
use super::ScreenError;
use crate::input::{Capabilities, Input};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_SCREEN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScreenId(u64);

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen-{}", self.0)
    }
}

/// Named renderer with opaque settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererBinding {
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl RendererBinding {
    pub fn new(name: impl Into<String>, settings: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

// ── Items ──────────────────────────────────────────────────────────

/// Content of one screen slot
pub struct ScreenItem {
    slot: usize,
    capabilities: Capabilities,
    writable: bool,
    triggers: Mutex<Vec<Arc<TriggerInstance>>>,
    renderer: Mutex<Option<RendererBinding>>,
    input: Mutex<Option<Arc<Input>>>,
}

impl ScreenItem {
    fn new(slot: usize, capabilities: Capabilities, writable: bool) -> Self {
        Self {
            slot,
            capabilities,
            writable,
            triggers: Mutex::new(Vec::new()),
            renderer: Mutex::new(None),
            input: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Capabilities of the input position this slot maps to
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn triggers(&self) -> Vec<Arc<TriggerInstance>> {
        self.triggers.lock().clone()
    }

    /// Place `trigger` on this item.
    ///
    /// The instance subscribes right away when the item is attached.
    pub fn add_trigger(&self, trigger: Arc<dyn Trigger>) -> Result<Arc<TriggerInstance>, ScreenError> {
        if !self.writable {
            return Err(ScreenError::ReadOnly);
        }
        if !trigger.is_applicable_to(self.capabilities) {
            return Err(ScreenError::IncompatibleInput {
                trigger: trigger.name().to_string(),
                index: self.slot,
                capabilities: self.capabilities,
            });
        }

        let instance = TriggerInstance::new(trigger);
        let input = self.input.lock();
        if let Some(input) = input.as_ref() {
            instance.attach(input)?;
        }
        self.triggers.lock().push(Arc::clone(&instance));
        Ok(instance)
    }

    /// Remove and detach `instance`; `false` if it is not on this item
    pub fn remove_trigger(&self, instance: &Arc<TriggerInstance>) -> Result<bool, ScreenError> {
        if !self.writable {
            return Err(ScreenError::ReadOnly);
        }
        let mut triggers = self.triggers.lock();
        let Some(at) = triggers.iter().position(|t| Arc::ptr_eq(t, instance)) else {
            return Ok(false);
        };
        triggers.remove(at).detach();
        Ok(true)
    }

    pub fn renderer(&self) -> Option<RendererBinding> {
        self.renderer.lock().clone()
    }

    pub fn set_renderer(&self, renderer: Option<RendererBinding>) -> Result<(), ScreenError> {
        if !self.writable {
            return Err(ScreenError::ReadOnly);
        }
        *self.renderer.lock() = renderer;
        Ok(())
    }

    /// Index of the input this item is attached to
    pub fn attached_input(&self) -> Option<usize> {
        self.input.lock().as_ref().map(|input| input.index())
    }

    /// Subscribe every trigger instance to `input`.
    ///
    /// Repeating the call for the same input changes nothing. On failure
    /// the item is left detached.
    pub fn attach(&self, input: &Arc<Input>) -> Result<(), ScreenError> {
        let mut current = self.input.lock();
        let triggers = self.triggers.lock();
        let result = triggers.iter().try_for_each(|instance| instance.attach(input));
        match result {
            Ok(()) => {
                *current = Some(Arc::clone(input));
                Ok(())
            }
            Err(e) => {
                triggers.iter().for_each(|instance| instance.detach());
                *current = None;
                Err(e)
            }
        }
    }

    /// Drop every subscription; safe to call when already detached
    pub fn detach(&self) {
        let mut current = self.input.lock();
        self.triggers.lock().iter().for_each(|instance| instance.detach());
        *current = None;
    }

    pub fn is_attached(&self) -> bool {
        self.input.lock().is_some()
    }
}

impl fmt::Debug for ScreenItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenItem")
            .field("slot", &self.slot)
            .field("capabilities", &self.capabilities)
            .field("triggers", &self.triggers.lock().len())
            .field("renderer", &self.renderer.lock().as_ref().map(|r| r.name.clone()))
            .field("attached", &self.attached_input())
            .finish()
    }
}

// ── Screens ────────────────────────────────────────────────────────

struct ScreenState {
    items: Vec<Option<Arc<ScreenItem>>>,
    /// Inputs of the device while this screen is live
    live: Option<Vec<Arc<Input>>>,
}

/// Ordered slots matching a device's input positions
pub struct Screen {
    id: ScreenId,
    writable: bool,
    slots: Vec<Capabilities>,
    state: Mutex<ScreenState>,
}

impl Screen {
    /// Empty screen for a device whose inputs have `slots` capabilities
    pub fn new(writable: bool, slots: Vec<Capabilities>) -> Arc<Self> {
        let items = vec![None; slots.len()];
        Arc::new(Self {
            id: ScreenId(NEXT_SCREEN_ID.fetch_add(1, Ordering::Relaxed)),
            writable,
            slots,
            state: Mutex::new(ScreenState { items, live: None }),
        })
    }

    pub fn id(&self) -> ScreenId {
        self.id
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_capabilities(&self, slot: usize) -> Option<Capabilities> {
        self.slots.get(slot).copied()
    }

    /// Whether this screen is the top of a stack
    pub fn is_live(&self) -> bool {
        self.state.lock().live.is_some()
    }

    fn check_slot(&self, slot: usize) -> Result<(), ScreenError> {
        if slot >= self.slots.len() {
            return Err(ScreenError::SlotOutOfRange {
                slot,
                count: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Create an empty item in `slot`, attaching it if the screen is live
    pub fn create_item(&self, slot: usize) -> Result<Arc<ScreenItem>, ScreenError> {
        if !self.writable {
            return Err(ScreenError::ReadOnly);
        }
        self.check_slot(slot)?;

        let mut state = self.state.lock();
        if state.items[slot].is_some() {
            return Err(ScreenError::SlotOccupied(slot));
        }
        let item = Arc::new(ScreenItem::new(slot, self.slots[slot], self.writable));
        if let Some(inputs) = state.live.as_ref() {
            item.attach(&inputs[slot])?;
        }
        state.items[slot] = Some(Arc::clone(&item));
        Ok(item)
    }

    /// Remove the item in `slot`, detaching it first
    pub fn delete_item(&self, slot: usize) -> Result<Option<Arc<ScreenItem>>, ScreenError> {
        if !self.writable {
            return Err(ScreenError::ReadOnly);
        }
        self.check_slot(slot)?;

        let removed = self.state.lock().items[slot].take();
        if let Some(item) = removed.as_ref() {
            item.detach();
        }
        Ok(removed)
    }

    pub fn item(&self, slot: usize) -> Option<Arc<ScreenItem>> {
        self.state.lock().items.get(slot).cloned().flatten()
    }

    /// Occupied slots in order
    pub fn items(&self) -> Vec<Arc<ScreenItem>> {
        self.state.lock().items.iter().flatten().cloned().collect()
    }

    /// Check that this screen fits a device with `inputs`
    pub fn validate(&self, inputs: &[Arc<Input>]) -> Result<(), ScreenError> {
        if inputs.len() != self.slots.len() {
            return Err(ScreenError::SlotCountMismatch {
                screen: self.slots.len(),
                device: inputs.len(),
            });
        }
        for item in self.items() {
            let input = &inputs[item.slot()];
            if let Some(instance) = item
                .triggers()
                .into_iter()
                .find(|instance| !instance.trigger().is_applicable_to(input.capabilities()))
            {
                return Err(ScreenError::IncompatibleInput {
                    trigger: instance.trigger().name().to_string(),
                    index: input.index(),
                    capabilities: input.capabilities(),
                });
            }
        }
        Ok(())
    }

    /// Attach every item to the input at its slot and mark the screen live.
    ///
    /// All-or-nothing: on error every item is detached again. A screen live
    /// on a different set of inputs is left untouched.
    pub(crate) fn attach_all(&self, inputs: &[Arc<Input>]) -> Result<(), ScreenError> {
        self.validate(inputs)?;
        let mut state = self.state.lock();
        if let Some(live) = state.live.as_ref() {
            let same = live.len() == inputs.len()
                && live.iter().zip(inputs).all(|(a, b)| Arc::ptr_eq(a, b));
            if !same {
                return Err(ScreenError::AlreadyLive(self.id));
            }
        }
        let attached = state
            .items
            .iter()
            .flatten()
            .try_for_each(|item| item.attach(&inputs[item.slot()]));
        if let Err(e) = attached {
            warn!("Attaching {} failed: {}", self.id, e);
            state.items.iter().flatten().for_each(|item| item.detach());
            state.live = None;
            return Err(e);
        }
        state.live = Some(inputs.to_vec());
        debug!("{} attached", self.id);
        Ok(())
    }

    /// Detach every item and mark the screen suspended
    pub(crate) fn detach_all(&self) {
        let mut state = self.state.lock();
        state.items.iter().flatten().for_each(|item| item.detach());
        if state.live.take().is_some() {
            debug!("{} detached", self.id);
        }
    }
}

impl fmt::Debug for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screen")
            .field("id", &self.id)
            .field("writable", &self.writable)
            .field("slots", &self.slots.len())
            .field("items", &self.items())
            .field("live", &self.is_live())
            .finish()
    }
}
