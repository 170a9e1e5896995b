use url::Url;

use crate::activity::{Activity, ActivityKind};
use crate::inspect::{BrowserTab, FocusWindow};

/// A browser whose active tab can be resolved into a web origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Browser {
    /// Name the browser's scripting interface answers to, e.g. "Google Chrome".
    pub app_name: String,
    /// Lower-cased owner names / bundle ids / executables that identify it.
    pub aliases: Vec<String>,
}

impl Browser {
    pub fn new(app_name: &str, aliases: &[&str]) -> Self {
        Browser {
            app_name: app_name.to_string(),
            aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    fn matches(&self, window: &FocusWindow) -> bool {
        let owner = window.owner_name.trim().to_lowercase();
        let owner_base = owner.rsplit(['\\', '/']).next().unwrap_or(&owner).to_string();
        let bundle = window.bundle_id.as_deref().map(|b| b.trim().to_lowercase());
        self.app_name.to_lowercase() == owner
            || self
                .aliases
                .iter()
                .any(|a| *a == owner_base || Some(a) == bundle.as_ref())
    }
}

/// The closed set of browsers recognized at startup.
#[derive(Clone, Debug)]
pub struct BrowserSet {
    browsers: Vec<Browser>,
}

impl Default for BrowserSet {
    fn default() -> Self {
        BrowserSet {
            browsers: vec![
                Browser::new("Google Chrome", &["com.google.chrome", "chrome.exe"]),
                Browser::new("Brave Browser", &["com.brave.browser", "brave.exe"]),
                Browser::new("Microsoft Edge", &["com.microsoft.edgemac", "msedge.exe"]),
                Browser::new("Arc", &["company.thebrowser.browser"]),
                Browser::new("Safari", &["com.apple.safari"]),
            ],
        }
    }
}

impl BrowserSet {
    pub fn new(browsers: Vec<Browser>) -> Self {
        BrowserSet { browsers }
    }

    /// Adds a browser known only by a single identifier (owner name, bundle id
    /// or executable).
    pub fn with_extra(mut self, identifier: &str) -> Self {
        let id = identifier.trim();
        if !id.is_empty() {
            self.browsers.push(Browser::new(id, &[id]));
        }
        self
    }

    pub fn recognize(&self, window: &FocusWindow) -> Option<&Browser> {
        self.browsers.iter().find(|b| b.matches(window))
    }
}

/// Stable process identifier: bundle id or executable, else the display name.
fn process_identifier(window: &FocusWindow) -> String {
    window
        .bundle_id
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| window.owner_name.trim())
        .to_string()
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// `scheme://host` of a tab URL; the raw string when it has no host.
pub fn web_origin(raw_url: &str) -> String {
    match Url::parse(raw_url.trim()) {
        Ok(u) => match u.host_str() {
            Some(host) => format!("{}://{}", u.scheme(), host),
            None => raw_url.to_string(),
        },
        Err(_) => raw_url.to_string(),
    }
}

/// Maps one inspector sample (and the tab, when the owner is a browser) into
/// an activity. `tab` is ignored for non-browser owners.
pub fn classify(
    browsers: &BrowserSet,
    window: Option<&FocusWindow>,
    tab: Option<&BrowserTab>,
) -> Option<Activity> {
    let window = window?;
    let window_title = non_empty(Some(&window.window_title));

    if browsers.recognize(window).is_none() {
        return Some(Activity::process(process_identifier(window), window_title));
    }

    match tab.filter(|t| !t.url.trim().is_empty()) {
        Some(tab) => Some(Activity {
            kind: ActivityKind::WebOrigin,
            identifier: web_origin(&tab.url),
            title: non_empty(tab.title.as_deref()),
            description: non_empty(tab.description.as_deref()),
            full_locator: Some(tab.url.clone()),
        }),
        None => Some(Activity::process(process_identifier(window), window_title)),
    }
}
