use serde::Serialize;

pub const DEFAULT_MAX_TOKENS: u64 = 200_000;

const INFO_THRESHOLD: f64 = 60.0;
const WARNING_THRESHOLD: f64 = 80.0;
const ERROR_THRESHOLD: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    None,
    Info,
    Warning,
    Error,
}

impl BudgetLevel {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            BudgetLevel::None => None,
            BudgetLevel::Info => Some("Context is over 60% of the token limit"),
            BudgetLevel::Warning => Some("Context is approaching the token limit"),
            BudgetLevel::Error => Some("Context is at the token limit"),
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            BudgetLevel::None => None,
            BudgetLevel::Info => Some("Keep an eye on large files as you add more context"),
            BudgetLevel::Warning => {
                Some("Consider excluding generated or rarely relevant files")
            }
            BudgetLevel::Error => {
                Some("Exclude files before sending, or the request may be truncated")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenBudget {
    pub total_tokens: u64,
    pub max_tokens: u64,
    /// Share of the ceiling in use, capped at 100 for display.
    pub percentage: f64,
    pub level: BudgetLevel,
}

/// Level for an uncapped usage percentage.
pub fn level_for_percentage(percentage: f64) -> BudgetLevel {
    if percentage >= ERROR_THRESHOLD {
        BudgetLevel::Error
    } else if percentage >= WARNING_THRESHOLD {
        BudgetLevel::Warning
    } else if percentage >= INFO_THRESHOLD {
        BudgetLevel::Info
    } else {
        BudgetLevel::None
    }
}

pub fn classify(total_tokens: u64, max_tokens: u64) -> TokenBudget {
    let raw = if max_tokens == 0 {
        if total_tokens == 0 { 0.0 } else { 100.0 }
    } else {
        total_tokens as f64 * 100.0 / max_tokens as f64
    };

    TokenBudget {
        total_tokens,
        max_tokens,
        percentage: raw.min(100.0),
        level: level_for_percentage(raw),
    }
}
