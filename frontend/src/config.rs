use log::Level;

use crate::consent::error::ConsentError;
use crate::consent::record::Category;

/// localStorage key holding the serialized consent record.
pub const CONSENT_STORAGE_KEY: &str = "prism-cookie-consent";

/// Bumping this forces every visitor through the banner again.
pub const CONSENT_VERSION: &str = "3.0.0";

pub const CONSENT_EXPIRY_DAYS: i64 = 365;

/// `<meta name=...>` tags carrying the third-party script sources.
pub const ANALYTICS_SRC_META: &str = "prism-analytics-src";
pub const MARKETING_SRC_META: &str = "prism-marketing-src";

#[cfg(debug_assertions)]
pub fn log_level() -> Level {
    Level::Debug // Verbose console output while developing locally
}

#[cfg(not(debug_assertions))]
pub fn log_level() -> Level {
    Level::Info
}

/// Keyboard shortcuts for resetting/inspecting consent are only wired in dev builds.
#[cfg(debug_assertions)]
pub fn debug_shortcuts_enabled() -> bool {
    true
}

#[cfg(not(debug_assertions))]
pub fn debug_shortcuts_enabled() -> bool {
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentConfig {
    pub storage_key: String,
    pub version: String,
    pub expiry_days: i64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            storage_key: CONSENT_STORAGE_KEY.to_string(),
            version: CONSENT_VERSION.to_string(),
            expiry_days: CONSENT_EXPIRY_DAYS,
        }
    }
}

impl ConsentConfig {
    pub fn expiry(&self) -> Result<chrono::Duration, ConsentError> {
        chrono::Duration::try_days(self.expiry_days).ok_or_else(|| {
            ConsentError::InvalidConfig(format!("expiry of {} days is out of range", self.expiry_days))
        })
    }
}

/// Text shown next to each checkbox in the settings modal.
pub fn category_label(category: Category) -> (&'static str, &'static str) {
    match category {
        Category::Essential => (
            "Essential",
            "Required for the website to function. Cannot be disabled.",
        ),
        Category::Analytics => (
            "Analytics",
            "Help us understand how visitors use our site to improve it.",
        ),
        Category::Marketing => (
            "Marketing",
            "Used to track visitors across websites for advertising.",
        ),
    }
}
