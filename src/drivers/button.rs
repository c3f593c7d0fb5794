//! Button gesture classification.
//!
//! Edges arrive from the ISR queue; this driver turns them into exactly
//! one gesture per press. While the button is held, the 10s check fires
//! an update session directly and wins over the 5s provisioning check;
//! provisioning only fires on release, so a hold that reaches 10s never
//! double-triggers. Short presses are debounced both by minimum hold and
//! by spacing from the previous accepted short press.

/// Hold duration that triggers an update session (fires while held).
pub const HOLD_UPDATE_MS: u64 = 10_000;
/// Hold duration that triggers provisioning (fires on release).
pub const HOLD_PROVISION_MS: u64 = 5_000;
/// Minimum hold for a short press.
pub const SHORT_MIN_MS: u64 = 500;
/// Minimum spacing between accepted short presses.
pub const SHORT_SPACING_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Wake the display, or advance its mode if already awake.
    ShortPress,
    /// Enter provisioning mode.
    EnterProvisioning,
    /// Start an update session with the stored URL.
    TriggerUpdate,
}

#[derive(Default)]
pub struct ButtonGestures {
    press_start_ms: Option<u64>,
    long_handled: bool,
    last_short_ms: Option<u64>,
}

impl ButtonGestures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.press_start_ms.is_some()
    }

    /// Falling edge.
    pub fn on_down(&mut self, now_ms: u64) {
        self.press_start_ms = Some(now_ms);
        self.long_handled = false;
    }

    /// Held-duration check, once per tick.
    pub fn tick(&mut self, now_ms: u64) -> Option<ButtonAction> {
        let start = self.press_start_ms?;
        if !self.long_handled && now_ms.saturating_sub(start) >= HOLD_UPDATE_MS {
            self.long_handled = true;
            return Some(ButtonAction::TriggerUpdate);
        }
        None
    }

    /// Rising edge: classify the completed press.
    pub fn on_up(&mut self, now_ms: u64) -> Option<ButtonAction> {
        let start = self.press_start_ms.take()?;
        let held = now_ms.saturating_sub(start);

        if self.long_handled {
            // The 10s action already fired while held.
            self.long_handled = false;
            return None;
        }
        if held >= HOLD_PROVISION_MS {
            return Some(ButtonAction::EnterProvisioning);
        }
        if held >= SHORT_MIN_MS {
            let spaced = match self.last_short_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= SHORT_SPACING_MS,
            };
            if spaced {
                self.last_short_ms = Some(now_ms);
                return Some(ButtonAction::ShortPress);
            }
        }
        None
    }
}
