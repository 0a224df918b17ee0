//! Product tiers and per-tier session policy.

use serde::{Deserialize, Serialize};

/// The three paid feature tiers gated by session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Product {
    Diagnostic,
    StudioScenarios,
    PreBriefBoard,
}

impl Product {
    pub const ALL: [Product; 3] = [
        Product::Diagnostic,
        Product::StudioScenarios,
        Product::PreBriefBoard,
    ];

    /// Key used in entitlement rows and checkout routing.
    pub fn key(self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic",
            Self::StudioScenarios => "studio",
            Self::PreBriefBoard => "pre-brief",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "diagnostic" => Some(Self::Diagnostic),
            "studio" => Some(Self::StudioScenarios),
            "pre-brief" => Some(Self::PreBriefBoard),
            _ => None,
        }
    }

    /// Slug of the product's site pages, used in checkout redirect URLs and
    /// API route paths.
    pub fn page_slug(self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic-ia",
            Self::StudioScenarios => "studio-scenarios",
            Self::PreBriefBoard => "pre-brief-board",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// How much a purchased session is worth for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Billable generation calls per session.
    pub max_uses: u32,
    /// Session lifetime from mint, in seconds. Rotation never extends it.
    pub ttl_seconds: i64,
}

impl SessionPolicy {
    /// Tier defaults; higher tiers buy more iterations and a longer window.
    pub fn default_for(product: Product) -> Self {
        match product {
            Product::Diagnostic => Self {
                max_uses: 5,
                ttl_seconds: 3_600,
            },
            Product::StudioScenarios => Self {
                max_uses: 10,
                ttl_seconds: 7_200,
            },
            Product::PreBriefBoard => Self {
                max_uses: 15,
                ttl_seconds: 14_400,
            },
        }
    }
}
