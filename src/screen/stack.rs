//! Per-device navigation stack

use super::{Screen, ScreenError};
use crate::input::Input;
use std::sync::Arc;
use tracing::{info, warn};

/// Non-empty stack of screens; only the top is attached to the inputs.
///
/// Callers serialize access (the deck keeps it behind the same guard the
/// reading loop dispatches under).
pub struct ScreenStack {
    screens: Vec<Arc<Screen>>,
    inputs: Vec<Arc<Input>>,
}

impl ScreenStack {
    /// Stack holding `root`, attached to `inputs`
    pub fn new(root: Arc<Screen>, inputs: Vec<Arc<Input>>) -> Result<Self, ScreenError> {
        root.attach_all(&inputs)?;
        Ok(Self {
            screens: vec![root],
            inputs,
        })
    }

    pub fn inputs(&self) -> &[Arc<Input>] {
        &self.inputs
    }

    pub fn current(&self) -> Arc<Screen> {
        // The root is never removed
        Arc::clone(&self.screens[self.screens.len() - 1])
    }

    /// Bottom to top
    pub fn screens(&self) -> Vec<Arc<Screen>> {
        self.screens.clone()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    fn contains(&self, screen: &Arc<Screen>) -> bool {
        self.screens.iter().any(|s| Arc::ptr_eq(s, screen))
    }

    /// Detach the top and attach `next` in its place, restoring the top if
    /// `next` cannot be attached
    fn switch_to(&self, next: &Arc<Screen>) -> Result<(), ScreenError> {
        next.validate(&self.inputs)?;
        let top = self.current();
        top.detach_all();
        if let Err(e) = next.attach_all(&self.inputs) {
            if let Err(restore) = top.attach_all(&self.inputs) {
                warn!("Could not restore {} after failed switch: {}", top.id(), restore);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Suspend the top and make `screen` live
    pub fn push(&mut self, screen: Arc<Screen>) -> Result<(), ScreenError> {
        if self.contains(&screen) {
            return Err(ScreenError::AlreadyOnStack);
        }
        self.switch_to(&screen)?;
        info!("Pushed {} (depth {})", screen.id(), self.screens.len() + 1);
        self.screens.push(screen);
        Ok(())
    }

    /// Remove the top, making the screen below live.
    ///
    /// Fails with [`ScreenError::RootScreen`] on a single-screen stack,
    /// leaving it unchanged.
    pub fn try_pop(&mut self) -> Result<Arc<Screen>, ScreenError> {
        if self.screens.len() == 1 {
            return Err(ScreenError::RootScreen);
        }
        let below = Arc::clone(&self.screens[self.screens.len() - 2]);
        self.switch_to(&below)?;
        let popped = self.screens.pop().ok_or(ScreenError::RootScreen)?;
        info!("Popped {} (depth {})", popped.id(), self.screens.len());
        Ok(popped)
    }

    /// [`try_pop`](Self::try_pop) reporting "nothing popped" as `None`
    pub fn pop(&mut self) -> Option<Arc<Screen>> {
        match self.try_pop() {
            Ok(screen) => Some(screen),
            Err(ScreenError::RootScreen) => None,
            Err(e) => {
                warn!("Pop failed: {}", e);
                None
            }
        }
    }

    /// Swap the top for `screen`, returning the old top.
    ///
    /// Replacing a single-screen stack replaces the root.
    pub fn replace(&mut self, screen: Arc<Screen>) -> Result<Arc<Screen>, ScreenError> {
        let top = self.current();
        if Arc::ptr_eq(&top, &screen) {
            return Ok(top);
        }
        if self.contains(&screen) {
            return Err(ScreenError::AlreadyOnStack);
        }
        self.switch_to(&screen)?;
        info!("Replaced {} with {}", top.id(), screen.id());
        let last = self.screens.len() - 1;
        Ok(std::mem::replace(&mut self.screens[last], screen))
    }

    /// Detach the live screen; used when the device goes away
    pub fn detach(&self) {
        self.current().detach_all();
    }
}

impl std::fmt::Debug for ScreenStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenStack")
            .field("screens", &self.screens.iter().map(|s| s.id()).collect::<Vec<_>>())
            .field("inputs", &self.inputs.len())
            .finish()
    }
}
