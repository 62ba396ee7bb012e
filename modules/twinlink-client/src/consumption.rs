use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;
use twinlink_signals::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionState {
    Stopped,
    Started,
}

/// Per-client gate on event and message delivery, one flag per channel.
/// Command replies are never gated.
#[derive(Debug, Default)]
pub struct ConsumptionController {
    twin: AtomicBool,
    live: AtomicBool,
}

impl ConsumptionController {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, channel: Channel) -> &AtomicBool {
        match channel {
            Channel::Twin => &self.twin,
            Channel::Live => &self.live,
        }
    }

    /// Returns true if the channel was stopped before.
    pub fn start(&self, channel: Channel) -> bool {
        let changed = !self.flag(channel).swap(true, Ordering::AcqRel);
        if changed {
            info!(channel = %channel, "Consumption started");
        }
        changed
    }

    /// Returns true if the channel was started before.
    pub fn stop(&self, channel: Channel) -> bool {
        let changed = self.flag(channel).swap(false, Ordering::AcqRel);
        if changed {
            info!(channel = %channel, "Consumption stopped");
        }
        changed
    }

    pub fn is_started(&self, channel: Channel) -> bool {
        self.flag(channel).load(Ordering::Acquire)
    }

    pub fn state(&self, channel: Channel) -> ConsumptionState {
        if self.is_started(channel) {
            ConsumptionState::Started
        } else {
            ConsumptionState::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_start_stopped() {
        let ctl = ConsumptionController::new();
        for channel in Channel::ALL {
            assert_eq!(ctl.state(channel), ConsumptionState::Stopped);
        }
    }

    #[test]
    fn transitions_are_idempotent() {
        let ctl = ConsumptionController::new();
        assert!(ctl.start(Channel::Twin));
        assert!(!ctl.start(Channel::Twin));
        assert!(ctl.is_started(Channel::Twin));
        assert!(!ctl.is_started(Channel::Live));

        assert!(ctl.stop(Channel::Twin));
        assert!(!ctl.stop(Channel::Twin));
        assert!(!ctl.stop(Channel::Live));
    }
}
