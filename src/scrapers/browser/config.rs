//! Browser renderer configuration.

use serde::{Deserialize, Serialize};

/// Settings for the headless browser renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a window. Set to false when debugging selectors.
    pub headless: bool,

    /// Page load timeout in seconds.
    pub timeout: u64,

    /// Remote Chrome DevTools URL (e.g. "ws://localhost:9222").
    /// If set, connects to that browser instead of launching one.
    pub remote_url: Option<String>,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Wait for this CSS selector before reading the page.
    pub wait_for_selector: Option<String>,

    /// Scroll half way, then to the bottom, to trigger lazy loading.
    pub scroll: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: 30,
            remote_url: None,
            chrome_args: Vec::new(),
            wait_for_selector: Some(".topic-container".to_string()),
            scroll: true,
        }
    }
}
