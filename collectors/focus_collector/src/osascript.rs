//! macOS focus and tab inspection through `osascript`.
//!
//! System Events answers for the frontmost process and its window; each
//! browser answers for its own active tab. Both need the user to grant
//! Accessibility and Automation access, and a refusal surfaces on stderr.

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use timetrack_core::classify::Browser;
use timetrack_core::inspect::{BrowserTab, FocusInspector, FocusWindow, InspectError, TabResolver};

/// stderr fragments that mean access was refused rather than a flaky call.
const PERMISSION_MARKERS: &[&str] = &[
    "-1743",
    "-25211",
    "not allowed assistive",
    "not authorized to send apple events",
];

const FOCUS_SCRIPT: &str = r#"
tell application "System Events"
  set frontProc to first application process whose frontmost is true
  set procName to name of frontProc
  set bundleId to ""
  try
    set bundleId to bundle identifier of frontProc
  end try
  if bundleId is missing value then set bundleId to ""
  set winTitle to ""
  try
    set winTitle to name of front window of frontProc
  end try
  if winTitle is missing value then set winTitle to ""
end tell
return procName & linefeed & bundleId & linefeed & winTitle
"#;

const DESCRIPTION_JS: &str =
    r#"var m=document.querySelector(\"meta[name=description]\");m?m.content:\"\""#;

async fn run_script(script: &str, timeout: Duration) -> Result<String, InspectError> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(timeout, output).await {
        Err(_) => {
            return Err(InspectError::Transient(format!(
                "osascript timed out after {}ms",
                timeout.as_millis()
            )))
        }
        Ok(Err(err)) => {
            return Err(InspectError::Transient(format!(
                "failed to run osascript: {err}"
            )))
        }
        Ok(Ok(out)) => out,
    };

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(script_failure(&String::from_utf8_lossy(&output.stderr)))
    }
}

fn script_failure(stderr: &str) -> InspectError {
    let msg = stderr.trim().to_string();
    let lower = msg.to_lowercase();
    if PERMISSION_MARKERS.iter().any(|m| lower.contains(m)) {
        InspectError::PermissionDenied(msg)
    } else {
        InspectError::Transient(msg)
    }
}

fn field(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty() && *s != "missing value")
        .map(str::to_string)
}

/// `name \n bundle id \n window title`; the title may itself span lines.
fn parse_focus(stdout: &str) -> Option<FocusWindow> {
    let mut parts = stdout.splitn(3, '\n');
    let owner_name = field(parts.next())?;
    Some(FocusWindow {
        owner_name,
        bundle_id: field(parts.next()),
        window_title: field(parts.next()).unwrap_or_default(),
    })
}

/// `url \n title \n description`.
fn parse_tab(stdout: &str) -> Option<BrowserTab> {
    let mut parts = stdout.splitn(3, '\n');
    let url = field(parts.next())?;
    Some(BrowserTab {
        url,
        title: field(parts.next()),
        description: field(parts.next()),
    })
}

fn tab_script(browser: &Browser) -> String {
    let app = browser.app_name.replace('\\', "\\\\").replace('"', "\\\"");
    if browser.app_name == "Safari" {
        format!(
            r#"
tell application "{app}"
  if (count of windows) is 0 then return ""
  set t to current tab of front window
  set d to ""
  try
    set d to do JavaScript "{DESCRIPTION_JS}" in t
  end try
  return (URL of t) & linefeed & (name of t) & linefeed & d
end tell
"#
        )
    } else {
        format!(
            r#"
tell application "{app}"
  if (count of windows) is 0 then return ""
  set t to active tab of front window
  set d to ""
  try
    set d to execute t javascript "{DESCRIPTION_JS}"
  end try
  return (URL of t) & linefeed & (title of t) & linefeed & d
end tell
"#
        )
    }
}

pub struct MacFocus {
    timeout: Duration,
}

impl MacFocus {
    pub fn new(timeout: Duration) -> Self {
        MacFocus { timeout }
    }
}

impl FocusInspector for MacFocus {
    async fn inspect_focus(&mut self) -> Result<Option<FocusWindow>, InspectError> {
        let out = run_script(FOCUS_SCRIPT, self.timeout).await?;
        Ok(parse_focus(&out))
    }
}

/// Asks the focused browser for its active tab. Any failure, including a
/// timeout, yields no tab.
pub struct MacTabs {
    timeout: Duration,
}

impl MacTabs {
    pub fn new(timeout: Duration) -> Self {
        MacTabs { timeout }
    }
}

impl TabResolver for MacTabs {
    async fn resolve_tab(&mut self, browser: &Browser) -> Option<BrowserTab> {
        match run_script(&tab_script(browser), self.timeout).await {
            Ok(out) => parse_tab(&out),
            Err(err) => {
                debug!("no tab from {}: {err}", browser.app_name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetrack_core::inspect::FailureKind;

    #[test]
    fn refusals_are_permission_failures() {
        let denied = [
            "execution error: Not authorized to send Apple events to System Events. (-1743)",
            "System Events got an error: osascript is not allowed assistive access. (-25211)",
        ];
        for stderr in denied {
            assert_eq!(script_failure(stderr).kind(), FailureKind::PermissionDenied);
        }
        let flaky = script_failure("execution error: Connection is invalid. (-609)");
        assert_eq!(flaky.kind(), FailureKind::Transient);
    }

    #[test]
    fn focus_output_is_split_into_fields() {
        let w = parse_focus("Terminal\ncom.apple.Terminal\nzsh\n  more title").unwrap();
        assert_eq!(w.owner_name, "Terminal");
        assert_eq!(w.bundle_id.as_deref(), Some("com.apple.Terminal"));
        assert_eq!(w.window_title, "zsh\n  more title");

        let bare = parse_focus("Finder\n\n").unwrap();
        assert_eq!(bare.bundle_id, None);
        assert_eq!(bare.window_title, "");

        assert!(parse_focus("").is_none());
    }

    #[test]
    fn tab_output_drops_missing_values() {
        let tab = parse_tab("https://github.com/rust-lang\nrust-lang\nmissing value").unwrap();
        assert_eq!(tab.url, "https://github.com/rust-lang");
        assert_eq!(tab.title.as_deref(), Some("rust-lang"));
        assert_eq!(tab.description, None);
        assert!(parse_tab("").is_none());
    }

    #[test]
    fn safari_uses_its_own_dictionary() {
        let safari = tab_script(&Browser::new("Safari", &["com.apple.safari"]));
        assert!(safari.contains("current tab of front window"));
        assert!(safari.contains("do JavaScript"));
        let chrome = tab_script(&Browser::new("Google Chrome", &["com.google.chrome"]));
        assert!(chrome.contains("tell application \"Google Chrome\""));
        assert!(chrome.contains("active tab of front window"));
    }
}
