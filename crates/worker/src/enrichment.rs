//! Device detection from user agent strings.
//!
//! Feeds `lastDevice` on customer profiles during folds.

use analytics_core::DeviceSummary;
use woothee::parser::Parser;

/// Parses user agents into a [`DeviceSummary`].
pub struct DeviceEnricher {
    parser: Parser,
}

impl DeviceEnricher {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Device for a user agent, or `None` when nothing is recognized.
    pub fn device(&self, user_agent: &str) -> Option<DeviceSummary> {
        if user_agent.trim().is_empty() {
            return None;
        }

        let result = self.parser.parse(user_agent)?;
        let known = |s: &str| !s.is_empty() && s != "UNKNOWN";
        if !known(result.name) && !known(result.os) {
            return None;
        }

        // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
        let category = match result.category {
            "pc" => "desktop",
            "smartphone" | "mobilephone" => "mobile",
            "crawler" => "bot",
            "appliance" => "other",
            _ => "unknown",
        };

        let label = |s: &str| {
            if known(s) {
                s.to_string()
            } else {
                "unknown".to_string()
            }
        };

        Some(DeviceSummary {
            browser: label(result.name),
            os: label(result.os),
            category: category.to_string(),
        })
    }
}

impl Default for DeviceEnricher {
    fn default() -> Self {
        Self::new()
    }
}
