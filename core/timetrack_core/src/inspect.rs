//! Contracts for the platform primitives the tracker samples every tick.
//!
//! Implementations live with the collector; the tracker only sees these
//! traits, so tests can drive it with scripted fakes.

use std::future::Future;

use crate::classify::Browser;

/// The foreground window as reported by the OS.
#[derive(Clone, Debug, Default)]
pub struct FocusWindow {
    pub owner_name: String,
    pub bundle_id: Option<String>,
    pub window_title: String,
}

/// Active tab of a recognized browser.
#[derive(Clone, Debug, Default)]
pub struct BrowserTab {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("transient inspection failure: {0}")]
    Transient(String),
}

impl InspectError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InspectError::PermissionDenied(_) => FailureKind::PermissionDenied,
            InspectError::Transient(_) => FailureKind::Transient,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    PermissionDenied,
}

pub trait FocusInspector: Send {
    /// `Ok(None)` means no window has focus.
    fn inspect_focus(
        &mut self,
    ) -> impl Future<Output = Result<Option<FocusWindow>, InspectError>> + Send;
}

pub trait TabResolver: Send {
    /// Failures and timeouts are reported as `None`.
    fn resolve_tab(&mut self, browser: &Browser) -> impl Future<Output = Option<BrowserTab>> + Send;
}

/// Resolver for platforms that cannot read browser tabs; browsers are then
/// tracked as plain processes.
pub struct NoTabs;

impl TabResolver for NoTabs {
    async fn resolve_tab(&mut self, _browser: &Browser) -> Option<BrowserTab> {
        None
    }
}
