//! Triggers, trigger instances and the actions they fire

use super::dispatch::{panic_message, ActionPool};
use super::ScreenError;
use crate::input::{Capabilities, EventKind, Input, InputEvent, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

// ── Triggers ───────────────────────────────────────────────────────

/// Definition of when something should fire
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str;

    /// Event this trigger subscribes to
    fn event_kind(&self) -> EventKind;

    /// Whether an input with `capabilities` can host this trigger
    fn is_applicable_to(&self, capabilities: Capabilities) -> bool {
        capabilities.contains(self.event_kind().required_capability())
    }

    /// Further filter on the subscribed events
    fn matches(&self, _event: &InputEvent) -> bool {
        true
    }

    /// Whether each fire flips the instance's toggle state
    fn is_toggle(&self) -> bool {
        false
    }
}

/// Fires on every event of one kind
#[derive(Debug, Clone)]
pub struct EventTrigger {
    name: &'static str,
    kind: EventKind,
}

impl EventTrigger {
    pub fn new(name: &'static str, kind: EventKind) -> Self {
        Self { name, kind }
    }

    pub fn button_pressed() -> Self {
        Self::new("button-pressed", EventKind::ButtonPressed)
    }

    pub fn button_released() -> Self {
        Self::new("button-released", EventKind::ButtonReleased)
    }

    pub fn encoder_pressed() -> Self {
        Self::new("encoder-pressed", EventKind::EncoderPressed)
    }

    pub fn encoder_twisted() -> Self {
        Self::new("encoder-twisted", EventKind::EncoderTwisted)
    }

    pub fn touch_pressed() -> Self {
        Self::new("touch-pressed", EventKind::TouchPressed)
    }

    pub fn touch_long_pressed() -> Self {
        Self::new("touch-long-pressed", EventKind::TouchLongPressed)
    }

    pub fn touch_swiped() -> Self {
        Self::new("touch-swiped", EventKind::TouchSwiped)
    }
}

impl Trigger for EventTrigger {
    fn name(&self) -> &str {
        self.name
    }

    fn event_kind(&self) -> EventKind {
        self.kind
    }
}

/// Flips an on/off state on every button press
#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleTrigger;

impl Trigger for ToggleTrigger {
    fn name(&self) -> &str {
        "toggle"
    }

    fn event_kind(&self) -> EventKind {
        EventKind::ButtonPressed
    }

    fn is_toggle(&self) -> bool {
        true
    }
}

// ── Actions ────────────────────────────────────────────────────────

/// What an action learns about the fire that invoked it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub serial: String,
    pub input_index: usize,
    pub event: InputEvent,
    /// Toggle state after the flip, for toggle triggers
    pub toggled: Option<bool>,
}

/// Work bound to a trigger instance
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, context: &ActionContext) -> anyhow::Result<()>;
}

/// Action backed by a closure
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ActionContext) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&ActionContext) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, context: &ActionContext) -> anyhow::Result<()> {
        (self.f)(context)
    }
}

/// Logs every invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAction;

impl Action for LogAction {
    fn name(&self) -> &str {
        "log"
    }

    fn invoke(&self, context: &ActionContext) -> anyhow::Result<()> {
        tracing::info!(
            "{} input {}: {:?}{}",
            context.serial,
            context.input_index,
            context.event,
            context
                .toggled
                .map(|on| format!(" (toggle {})", if on { "on" } else { "off" }))
                .unwrap_or_default()
        );
        Ok(())
    }
}

/// Result of one action invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: String,
    pub result: Result<(), String>,
}

type Pending = oneshot::Receiver<thread::Result<Result<(), String>>>;

/// Running actions of one fire.
///
/// Dropping the handle does not cancel anything; failures are logged
/// either way.
pub struct FireHandle {
    running: Vec<(String, Pending)>,
}

impl FireHandle {
    /// Number of actions started
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Wait for every action and report each outcome in binding order.
    ///
    /// Blocks the calling thread, so it must not be called from async code.
    pub fn wait(self) -> Vec<ActionOutcome> {
        self.running
            .into_iter()
            .map(|(action, pending)| {
                let result = match pending.blocking_recv() {
                    Ok(Ok(result)) => result,
                    Ok(Err(payload)) => Err(format!("action panicked: {}", panic_message(&*payload))),
                    Err(_) => Err("action was dropped before it ran".to_string()),
                };
                ActionOutcome { action, result }
            })
            .collect()
    }
}

// ── Instances ──────────────────────────────────────────────────────

struct Binding {
    input: Arc<Input>,
    subscription: SubscriptionId,
}

/// One trigger placed on a screen item, with its actions
pub struct TriggerInstance {
    trigger: Arc<dyn Trigger>,
    actions: RwLock<Vec<Arc<dyn Action>>>,
    binding: Mutex<Option<Binding>>,
    toggled: AtomicBool,
}

impl TriggerInstance {
    pub fn new(trigger: Arc<dyn Trigger>) -> Arc<Self> {
        Arc::new(Self {
            trigger,
            actions: RwLock::new(Vec::new()),
            binding: Mutex::new(None),
            toggled: AtomicBool::new(false),
        })
    }

    pub fn trigger(&self) -> &Arc<dyn Trigger> {
        &self.trigger
    }

    pub fn add_action(&self, action: Arc<dyn Action>) {
        self.actions.write().push(action);
    }

    pub fn actions(&self) -> Vec<Arc<dyn Action>> {
        self.actions.read().clone()
    }

    /// Current toggle state (always `false` for non-toggle triggers)
    pub fn toggled(&self) -> bool {
        self.toggled.load(Ordering::SeqCst)
    }

    /// Index of the input this instance is subscribed to
    pub fn attached_input(&self) -> Option<usize> {
        self.binding.lock().as_ref().map(|b| b.input.index())
    }

    pub fn is_attached(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// Subscribe to `input`.
    ///
    /// Attaching to the input already bound is a no-op; attaching elsewhere
    /// moves the subscription. An input whose capabilities the trigger does
    /// not accept is rejected.
    pub fn attach(self: &Arc<Self>, input: &Arc<Input>) -> Result<(), ScreenError> {
        let mut binding = self.binding.lock();
        if let Some(current) = binding.as_ref() {
            if Arc::ptr_eq(&current.input, input) {
                return Ok(());
            }
        }
        if !self.trigger.is_applicable_to(input.capabilities()) {
            return Err(ScreenError::IncompatibleInput {
                trigger: self.trigger.name().to_string(),
                index: input.index(),
                capabilities: input.capabilities(),
            });
        }
        if let Some(previous) = binding.take() {
            previous.input.unsubscribe(previous.subscription);
        }

        let weak: Weak<TriggerInstance> = Arc::downgrade(self);
        let serial = input.serial().to_string();
        let index = input.index();
        let subscription = input.subscribe(
            self.trigger.event_kind(),
            Arc::new(move |event: &InputEvent| {
                if let Some(instance) = weak.upgrade() {
                    instance.on_event(&serial, index, event);
                }
            }),
        )?;

        debug!("Trigger {} attached to input {}", self.trigger.name(), index);
        *binding = Some(Binding {
            input: Arc::clone(input),
            subscription,
        });
        Ok(())
    }

    /// Drop the subscription, if any; safe to call repeatedly
    pub fn detach(&self) {
        if let Some(binding) = self.binding.lock().take() {
            binding.input.unsubscribe(binding.subscription);
            debug!(
                "Trigger {} detached from input {}",
                self.trigger.name(),
                binding.input.index()
            );
        }
    }

    fn on_event(&self, serial: &str, index: usize, event: &InputEvent) {
        // A detach may race with an event already being delivered
        if !self.is_attached() || !self.trigger.matches(event) {
            return;
        }
        // Outcomes are logged by the action workers
        let _ = self.fire(serial, index, *event);
    }

    /// Hand every bound action to the action pool.
    ///
    /// Actions run concurrently; a failing or panicking action is logged and
    /// does not affect the others.
    pub fn fire(&self, serial: &str, input_index: usize, event: InputEvent) -> FireHandle {
        let toggled = self.trigger.is_toggle().then(|| {
            // fetch_xor returns the previous value
            !self.toggled.fetch_xor(true, Ordering::SeqCst)
        });
        let context = Arc::new(ActionContext {
            serial: serial.to_string(),
            input_index,
            event,
            toggled,
        });

        let running = self
            .actions()
            .into_iter()
            .map(|action| {
                let name = action.name().to_string();
                let context = Arc::clone(&context);
                let trigger = self.trigger.name().to_string();
                let pending = ActionPool::global().run(move || {
                    let result = match panic::catch_unwind(AssertUnwindSafe(|| action.invoke(&context))) {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(format!("{:#}", e)),
                        Err(payload) => Err(format!("action panicked: {}", panic_message(&*payload))),
                    };
                    if let Err(e) = &result {
                        warn!("Action {} of trigger {} failed: {}", action.name(), trigger, e);
                    }
                    result
                });
                (name, pending)
            })
            .collect();
        FireHandle { running }
    }
}

impl Drop for TriggerInstance {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.input.unsubscribe(binding.subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mock::MockHandle;
    use crate::hid::{Device, SharedDevice};
    use crate::input::{layout, BmpEncoder, ImageEncoder};
    use anyhow::bail;
    use deckhand_protocol::{capabilities_for, DeviceModel};
    use std::sync::mpsc;
    use std::time::Duration;

    fn inputs(model: DeviceModel) -> Vec<Arc<Input>> {
        let handle = MockHandle::new(model);
        let device = Device::new(model, "TRIG", Box::new(handle.transport()));
        let shared = Arc::new(SharedDevice::new(device, None));
        let encoder: Arc<dyn ImageEncoder> = Arc::new(BmpEncoder);
        layout(capabilities_for(model))
            .into_iter()
            .enumerate()
            .map(|(i, slot)| Arc::new(Input::new(i, slot, Arc::clone(&shared), Arc::clone(&encoder), 4)))
            .collect()
    }

    fn recording_action(tx: mpsc::Sender<ActionContext>) -> Arc<dyn Action> {
        let tx = Mutex::new(tx);
        Arc::new(FnAction::new("record", move |ctx: &ActionContext| {
            tx.lock().send(ctx.clone())?;
            Ok(())
        }))
    }

    #[test]
    fn test_attach_is_idempotent() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_pressed()));
        instance.attach(&inputs[1]).unwrap();
        instance.attach(&inputs[1]).unwrap();
        assert_eq!(inputs[1].subscription_count(), 1);
        assert_eq!(instance.attached_input(), Some(1));

        instance.detach();
        instance.detach();
        assert_eq!(inputs[1].subscription_count(), 0);
        assert!(!instance.is_attached());
    }

    #[test]
    fn test_attach_elsewhere_moves_subscription() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_pressed()));
        instance.attach(&inputs[0]).unwrap();
        instance.attach(&inputs[3]).unwrap();
        assert_eq!(inputs[0].subscription_count(), 0);
        assert_eq!(inputs[3].subscription_count(), 1);
    }

    #[test]
    fn test_incompatible_input_is_rejected() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::encoder_twisted()));
        let err = instance.attach(&inputs[0]).unwrap_err();
        assert!(matches!(err, ScreenError::IncompatibleInput { index: 0, .. }));
        assert!(!instance.is_attached());
    }

    #[test]
    fn test_publish_fires_actions() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_pressed()));
        let (tx, rx) = mpsc::channel();
        instance.add_action(recording_action(tx));
        instance.attach(&inputs[2]).unwrap();

        inputs[2].publish(&InputEvent::ButtonPressed);
        let ctx = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(ctx.serial, "TRIG");
        assert_eq!(ctx.input_index, 2);
        assert_eq!(ctx.event, InputEvent::ButtonPressed);
        assert_eq!(ctx.toggled, None);

        instance.detach();
        inputs[2].publish(&InputEvent::ButtonPressed);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_failing_action_does_not_stop_others() {
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_pressed()));
        instance.add_action(Arc::new(FnAction::new("fails", |_: &ActionContext| {
            bail!("boom")
        })));
        instance.add_action(Arc::new(FnAction::new("panics", |_: &ActionContext| {
            panic!("action exploded")
        })));
        instance.add_action(Arc::new(FnAction::new("works", |_: &ActionContext| Ok(()))));

        let outcomes = instance.fire("S", 0, InputEvent::ButtonPressed).wait();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result, Err("boom".to_string()));
        assert_eq!(
            outcomes[1].result,
            Err("action panicked: action exploded".to_string())
        );
        assert_eq!(outcomes[2], ActionOutcome {
            action: "works".to_string(),
            result: Ok(())
        });
    }

    #[test]
    fn test_panicking_action_keeps_input_firing() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_pressed()));
        instance.add_action(Arc::new(FnAction::new("panics", |_: &ActionContext| {
            panic!("listener action failed")
        })));
        let (tx, rx) = mpsc::channel();
        instance.add_action(recording_action(tx));
        instance.attach(&inputs[0]).unwrap();

        for _ in 0..3 {
            inputs[0].publish(&InputEvent::ButtonPressed);
            assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        }
        let outcomes = instance.fire("TRIG", 0, InputEvent::ButtonPressed).wait();
        assert_eq!(
            outcomes[0].result,
            Err("action panicked: listener action failed".to_string())
        );
        assert_eq!(outcomes[1].result, Ok(()));
    }

    #[test]
    fn test_toggle_flips_state() {
        let instance = TriggerInstance::new(Arc::new(ToggleTrigger));
        let (tx, rx) = mpsc::channel();
        instance.add_action(recording_action(tx));

        instance.fire("S", 0, InputEvent::ButtonPressed).wait();
        instance.fire("S", 0, InputEvent::ButtonPressed).wait();
        assert_eq!(rx.recv().unwrap().toggled, Some(true));
        assert_eq!(rx.recv().unwrap().toggled, Some(false));
        assert!(!instance.toggled());
    }

    #[test]
    fn test_dropped_instance_unsubscribes() {
        let inputs = inputs(DeviceModel::Mini);
        let instance = TriggerInstance::new(Arc::new(EventTrigger::button_released()));
        instance.attach(&inputs[0]).unwrap();
        drop(instance);
        assert_eq!(inputs[0].subscription_count(), 0);
    }
}
