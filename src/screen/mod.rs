//! Screens, screen items and the per-device navigation stack

mod dispatch;
mod item;
mod stack;
pub mod trigger;

pub use item::{RendererBinding, Screen, ScreenId, ScreenItem};
pub use stack::ScreenStack;
pub use trigger::{
    Action, ActionContext, ActionOutcome, EventTrigger, FireHandle, FnAction, LogAction,
    ToggleTrigger, Trigger, TriggerInstance,
};

use crate::input::{Capabilities, InputError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("screen is read-only")]
    ReadOnly,

    #[error("slot {slot} out of range (screen has {count} slots)")]
    SlotOutOfRange { slot: usize, count: usize },

    #[error("slot {0} already holds an item")]
    SlotOccupied(usize),

    #[error("trigger {trigger} does not apply to input {index} ({capabilities})")]
    IncompatibleInput {
        trigger: String,
        index: usize,
        capabilities: Capabilities,
    },

    #[error("screen is already on the stack")]
    AlreadyOnStack,

    /// The screen is the live top of another device's stack
    #[error("{0} is live on another device")]
    AlreadyLive(ScreenId),

    #[error("screen has {screen} slots, device has {device} inputs")]
    SlotCountMismatch { screen: usize, device: usize },

    #[error("the root screen cannot be popped")]
    RootScreen,

    #[error(transparent)]
    Input(#[from] InputError),
}
