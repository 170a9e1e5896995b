use std::future::Future;

use timetrack_core::inspect::{FocusInspector, FocusWindow, InspectError};
use tracing::info;

/// Source of "seconds since the user last touched keyboard or mouse".
pub trait IdleProbe: Send {
    fn idle_seconds(&mut self) -> impl Future<Output = Option<u64>> + Send;
}

/// The host's own input idle timer; `None` where none is available.
pub struct SystemIdle;

impl IdleProbe for SystemIdle {
    async fn idle_seconds(&mut self) -> Option<u64> {
        system_idle_seconds().await
    }
}

#[cfg(windows)]
async fn system_idle_seconds() -> Option<u64> {
    crate::win::last_input_idle_seconds()
}

#[cfg(target_os = "macos")]
async fn system_idle_seconds() -> Option<u64> {
    let out = tokio::process::Command::new("ioreg")
        .args(["-c", "IOHIDSystem", "-d", "4"])
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    parse_hid_idle_seconds(&String::from_utf8_lossy(&out.stdout))
}

#[cfg(not(any(windows, target_os = "macos")))]
async fn system_idle_seconds() -> Option<u64> {
    None
}

/// Reads `"HIDIdleTime" = <nanoseconds>` from `ioreg` output.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_hid_idle_seconds(ioreg: &str) -> Option<u64> {
    ioreg.lines().find_map(|line| {
        let (_, rest) = line.split_once("\"HIDIdleTime\"")?;
        let ns: u64 = rest.trim_start().strip_prefix('=')?.trim().parse().ok()?;
        Some(ns / 1_000_000_000)
    })
}

/// Reports no focus while the user has been idle for `cutoff_seconds`, so
/// an unattended machine does not accrue time. `0` disables the cutoff.
pub struct IdleCutoff<I, P> {
    inner: I,
    probe: P,
    cutoff_seconds: u64,
    idle: bool,
}

impl<I, P> IdleCutoff<I, P> {
    pub fn new(inner: I, probe: P, cutoff_seconds: u64) -> Self {
        IdleCutoff {
            inner,
            probe,
            cutoff_seconds,
            idle: false,
        }
    }
}

impl<I: FocusInspector, P: IdleProbe> FocusInspector for IdleCutoff<I, P> {
    async fn inspect_focus(&mut self) -> Result<Option<FocusWindow>, InspectError> {
        if self.cutoff_seconds > 0 {
            let idle_for = self.probe.idle_seconds().await.unwrap_or(0);
            let idle = idle_for >= self.cutoff_seconds;
            if idle != self.idle {
                self.idle = idle;
                if idle {
                    info!("user idle for {idle_for}s, pausing attribution");
                } else {
                    info!("user input resumed");
                }
            }
            if idle {
                return Ok(None);
            }
        }
        self.inner.inspect_focus().await
    }
}
