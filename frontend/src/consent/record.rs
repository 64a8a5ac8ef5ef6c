use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Essential,
    Analytics,
    Marketing,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Essential, Category::Analytics, Category::Marketing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Essential => "essential",
            Category::Analytics => "analytics",
            Category::Marketing => "marketing",
        }
    }

    /// Essential cookies cannot be switched off by the visitor.
    pub fn is_required(&self) -> bool {
        matches!(self, Category::Essential)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "essential" => Ok(Category::Essential),
            "analytics" => Ok(Category::Analytics),
            "marketing" => Ok(Category::Marketing),
            other => Err(format!("unknown consent category: {}", other)),
        }
    }
}

/// What the visitor picked. There is deliberately no `essential` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentChoice {
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
}

impl ConsentChoice {
    pub fn accept_all() -> Self {
        Self { analytics: true, marketing: true }
    }

    pub fn reject_all() -> Self {
        Self::default()
    }

    pub fn custom(analytics: bool, marketing: bool) -> Self {
        Self { analytics, marketing }
    }
}

/// The persisted consent decision, stored as JSON under a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub version: String,
    #[serde(rename = "timestamp")]
    pub issued_at: DateTime<Utc>,
    pub essential: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
}

impl ConsentRecord {
    pub fn new(version: impl Into<String>, issued_at: DateTime<Utc>, choice: ConsentChoice) -> Self {
        Self {
            version: version.into(),
            issued_at,
            essential: true,
            analytics: choice.analytics,
            marketing: choice.marketing,
        }
    }

    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::Essential => self.essential,
            Category::Analytics => self.analytics,
            Category::Marketing => self.marketing,
        }
    }

    pub fn choice(&self) -> ConsentChoice {
        ConsentChoice::custom(self.analytics, self.marketing)
    }

    /// `None` when the stored timestamp is so far out that the sum overflows.
    pub fn expires_at(&self, expiry: Duration) -> Option<DateTime<Utc>> {
        self.issued_at.checked_add_signed(expiry)
    }

    /// An expiry that cannot be computed counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        self.expires_at(expiry).map_or(true, |expires_at| now >= expires_at)
    }
}
