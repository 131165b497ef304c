use thiserror::Error;

pub mod classifier;
pub mod config;
pub mod defaults;

pub use config::{
    Exclusion, ListOverride, Matcher, RuleSet, RuleSetBuilder, Validation, is_mostly_uppercase,
};
// Re-export domain types from core (canonical definitions live there)
pub use pidtag_core::{ExtractError, RejectReason, TagCandidate, TagType, Token, Verdict};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{rule}': invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        source: regex::Error,
    },
    #[error("rule '{rule}': unknown tag type '{value}'")]
    UnknownTagType { rule: String, value: String },
    #[error("rule '{0}' has no patterns")]
    NoPatterns(String),
    #[error("rule '{rule}': no matcher named '{before}' to insert before")]
    UnknownMatcher { rule: String, before: String },
    #[error("rule set has no matchers")]
    NoMatchers,
    #[error("{0}")]
    InvalidSetting(String),
}

impl From<RuleError> for ExtractError {
    fn from(e: RuleError) -> Self {
        ExtractError::RuleConfigurationInvalid(e.to_string())
    }
}
