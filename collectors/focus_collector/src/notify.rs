use timetrack_core::governor::{FatalNotifier, LogNotifier};

/// Logs the fatal condition and, when enabled, raises a desktop
/// notification as well.
pub struct DesktopNotifier {
    pub enabled: bool,
}

impl FatalNotifier for DesktopNotifier {
    fn notify_fatal(&self, title: &str, body: &str) {
        LogNotifier.notify_fatal(title, body);
        if self.enabled {
            show(title, body);
        }
    }
}

#[cfg(windows)]
fn show(title: &str, body: &str) {
    use win_toast_notify::{Duration, Scenario, WinToastNotify};

    let _ = WinToastNotify::new()
        .set_duration(Duration::Long)
        .set_scenario(Scenario::Reminder)
        .set_title(title)
        .set_messages(vec![body])
        .show();
}

#[cfg(target_os = "macos")]
fn show(title: &str, body: &str) {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(body),
        applescript_escape(title)
    );
    if let Err(err) = std::process::Command::new("osascript")
        .arg("-e")
        .arg(script)
        .spawn()
    {
        tracing::warn!("could not show notification: {err}");
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
fn show(_title: &str, _body: &str) {}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
