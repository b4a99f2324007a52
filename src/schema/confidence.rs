//! Ordinal confidence ratings attached to every measured quantity.

use serde::Serialize;

/// Text sentinel used for absent optional values.
pub const UNKNOWN: &str = "unknown";

/// Points subtracted from every rating when no real-time data backed a result.
pub const OFFLINE_PENALTY: u8 = 2;

/// Highest rating a result may carry once degraded for missing real-time data.
pub const OFFLINE_CONFIDENCE_CAP: u8 = 2;

/// Confidence rating on the 0..=5 scale.
///
/// 0 is an unsupported guess, 5 means multiple independent sources agree.
/// The only constructors either reject or clamp, so a `Confidence` is always
/// in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Confidence(u8);

impl Confidence {
    pub const MIN: Confidence = Confidence(0);
    pub const MAX: Confidence = Confidence(5);

    /// Build a rating, returning `None` when the value is outside 0..=5.
    pub fn new(value: i64) -> Option<Self> {
        if (0..=Self::MAX.0 as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    /// Build a rating, clamping into 0..=5.
    pub fn saturating(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX.0 as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Rating after accounting for research done without real-time data.
    pub fn degraded(self) -> Self {
        Self(self.0.saturating_sub(OFFLINE_PENALTY).min(OFFLINE_CONFIDENCE_CAP))
    }

    /// Verbal anchor for the rating.
    pub fn label(self) -> &'static str {
        match self.0 {
            5 => "multiple corroborating sources",
            4 => "strong agreement, minor variations",
            3 => "moderate, some conflicting information",
            2 => "low, significant gaps or conflicts",
            1 => "very low, mostly educated guesses",
            _ => "speculation",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

/// A measured quantity with its confidence annotation.
///
/// `value` is `None` when the quantity could not be determined; it renders
/// as [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measured<T> {
    pub value: Option<T>,
    pub confidence: Confidence,
    pub confidence_explanation: String,
}

impl<T> Measured<T> {
    pub fn new(value: T, confidence: Confidence, explanation: &str) -> Self {
        Self {
            value: Some(value),
            confidence,
            confidence_explanation: explanation.to_string(),
        }
    }

    pub fn unknown(confidence: Confidence, explanation: &str) -> Self {
        Self {
            value: None,
            confidence,
            confidence_explanation: explanation.to_string(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    pub fn degrade(&mut self) {
        self.confidence = self.confidence.degraded();
    }
}

impl<T: std::fmt::Display> Measured<T> {
    /// Value rendered for display, or the unknown sentinel.
    pub fn display_value(&self) -> String {
        self.value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}
