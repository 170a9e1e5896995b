use tracing::{error, warn};

use crate::inspect::{FailureKind, InspectError};
use crate::tracker::PollState;

pub const DEFAULT_PERMISSION_THRESHOLD: u32 = 3;

pub const PERMISSION_TITLE: &str = "Time tracking stopped";

pub const PERMISSION_REMEDIATION: &str = "The tracker lost permission to read the focused window. \
Grant access again (macOS: System Settings > Privacy & Security > Accessibility and Automation; \
allow the collector to control System Events and your browser), then restart the collector.";

/// Delivers the one user-visible message the tracker ever raises.
pub trait FatalNotifier: Send + Sync {
    fn notify_fatal(&self, title: &str, body: &str);
}

/// Notifier that only logs; used when notifications are disabled.
pub struct LogNotifier;

impl FatalNotifier for LogNotifier {
    fn notify_fatal(&self, title: &str, body: &str) {
        error!("{title}: {body}");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// Keep polling; the tick counts as "no activity".
    Continue,
    /// Stop polling for the rest of the process lifetime.
    Halt,
}

/// Decides what a failed poll means for the loop.
///
/// Permission loss right after access is granted can be flaky, so only a run
/// of `permission_threshold` consecutive permission failures halts tracking.
#[derive(Clone, Copy, Debug)]
pub struct Governor {
    permission_threshold: u32,
}

impl Default for Governor {
    fn default() -> Self {
        Governor::new(DEFAULT_PERMISSION_THRESHOLD)
    }
}

impl Governor {
    pub fn new(permission_threshold: u32) -> Self {
        Governor {
            permission_threshold: permission_threshold.max(1),
        }
    }

    pub fn on_success(&self, state: &mut PollState) {
        state.consecutive_failures = 0;
        state.permission_failures = 0;
    }

    pub fn on_failure(&self, state: &mut PollState, err: &InspectError) -> Escalation {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        match err.kind() {
            FailureKind::Transient => {
                state.permission_failures = 0;
                warn!(
                    "focus poll failed ({} in a row): {err}",
                    state.consecutive_failures
                );
                Escalation::Continue
            }
            FailureKind::PermissionDenied => {
                state.permission_failures = state.permission_failures.saturating_add(1);
                if state.permission_failures >= self.permission_threshold {
                    error!(
                        "permission denied {} times in a row, halting: {err}",
                        state.permission_failures
                    );
                    Escalation::Halt
                } else {
                    warn!(
                        "permission denied ({}/{}): {err}",
                        state.permission_failures, self.permission_threshold
                    );
                    Escalation::Continue
                }
            }
        }
    }
}
