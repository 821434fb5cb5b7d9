//! Learning context identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::LearningError;

/// Placeholder rendered for an absent context segment.
const ANY_SEGMENT: &str = "any";

/// Downstream scoring service that consumes learned weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Deal risk evaluation.
    Risk,
    /// Revenue forecasting.
    Forecast,
    /// Next-best-action recommendations.
    Recommendations,
}

impl ServiceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Risk => "risk",
            Self::Forecast => "forecast",
            Self::Recommendations => "recommendations",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "risk" => Ok(Self::Risk),
            "forecast" => Ok(Self::Forecast),
            "recommendations" | "recommendation" => Ok(Self::Recommendations),
            other => Err(LearningError::InvalidInput(format!(
                "unknown service type: {other}"
            ))),
        }
    }
}

/// Deal size bucket used as the middle segment of a context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealSizeBucket {
    Small,
    Medium,
    Large,
    Enterprise,
}

impl DealSizeBucket {
    /// Bucket a deal amount. Negative or NaN amounts fall into `Small`.
    pub fn from_amount(amount: f64) -> Self {
        if amount.is_nan() || amount < 10_000.0 {
            Self::Small
        } else if amount < 100_000.0 {
            Self::Medium
        } else if amount < 1_000_000.0 {
            Self::Large
        } else {
            Self::Enterprise
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Tenant-scoped learning context: `industry:dealSize:stage`.
///
/// A context key is never unique on its own; it is always paired with a
/// tenant id and a [`ServiceType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub industry: Option<String>,
    pub deal_size: Option<String>,
    pub stage: Option<String>,
}

impl ContextKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = normalize(industry.into());
        self
    }

    pub fn with_deal_size(mut self, deal_size: impl Into<String>) -> Self {
        self.deal_size = normalize(deal_size.into());
        self
    }

    pub fn with_deal_amount(self, amount: f64) -> Self {
        self.with_deal_size(DealSizeBucket::from_amount(amount).as_str())
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = normalize(stage.into());
        self
    }

    /// Render the key. Absent segments become `any`.
    pub fn as_key(&self) -> String {
        [&self.industry, &self.deal_size, &self.stage]
            .iter()
            .map(|segment| segment.as_deref().unwrap_or(ANY_SEGMENT))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Parse a rendered key back into its segments.
    pub fn parse(key: &str) -> Result<Self, LearningError> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() != 3 {
            return Err(LearningError::InvalidInput(format!(
                "context key must have 3 segments, got {}: {key}",
                parts.len()
            )));
        }
        let segment = |s: &str| {
            if s == ANY_SEGMENT {
                None
            } else {
                normalize(s.to_string())
            }
        };
        Ok(Self {
            industry: segment(parts[0]),
            deal_size: segment(parts[1]),
            stage: segment(parts[2]),
        })
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

fn normalize(segment: String) -> Option<String> {
    let trimmed = segment.trim().to_lowercase().replace(':', "_");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
