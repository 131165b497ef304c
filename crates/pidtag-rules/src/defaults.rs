//! Built-in rule table.

use pidtag_core::TagType;
use pidtag_core::config_file::{
    ExclusionSpec, ListSpec, MatcherSpec, RulesConfig, ValidationSpec,
};

pub const DEFAULT_MAX_TAG_LEN: usize = 50;
pub const DEFAULT_BORDER_MARGIN: f32 = 0.05;

fn exclusion(name: &str, pattern: &str, near_border: bool) -> ExclusionSpec {
    ExclusionSpec {
        name: name.into(),
        pattern: pattern.into(),
        near_border,
    }
}

pub fn exclusions() -> Vec<ExclusionSpec> {
    vec![
        exclusion("drawing_number", r"^ST\d{4}$", false),
        exclusion("sheet_number", r"^P\d{4}-\d+-\d+$", false),
        exclusion("sheet_number", r"^P\d{4}-\d+$", false),
        exclusion("note_reference", r"^NOTE \d+$", false),
        exclusion("grid_letter", r"^[A-G]$", true),
        exclusion("grid_number", r"^\d{1,2}$", true),
    ]
}

/// Legend and title-block words.
pub fn stoplist() -> Vec<String> {
    [
        "EXISTING",
        "PROPOSED",
        "WATER CANNON",
        "WATER HYDRANT",
        "SHEET NO.",
        "DRAWING STATUS",
        "REVISION",
        "COPYRIGHT",
        "APPROVAL",
        "DRAWN BY",
        "CHECKED BY",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn matcher(name: &str, tag_type: TagType, patterns: &[&str], validation: ValidationSpec) -> MatcherSpec {
    MatcherSpec {
        name: name.into(),
        tag_type: tag_type.as_str().into(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        before: None,
        validation,
    }
}

/// Type matchers in priority order; the first match wins.
pub fn matchers() -> Vec<MatcherSpec> {
    vec![
        matcher(
            "instrument",
            TagType::Instrument,
            &[r"^[A-Z]{2}-[A-Z0-9]{2,4}-[A-Z0-9]{2,4}-\d{4}$"],
            ValidationSpec {
                hyphen_groups: Some(4),
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "equipment_prefixed",
            TagType::Equipment,
            &[r"^STORM_P\d{4}(-\d+)?$", r"^ROCK TRAP \d+$"],
            ValidationSpec {
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "actuated_valve",
            TagType::ActuatedValve,
            &[r"^(XV|HV|FCV|LCV|PCV|TCV|MOV|AOV|SDV|BDV)-?\d{3,4}$"],
            ValidationSpec {
                require_digit: true,
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "equipment",
            TagType::Equipment,
            &[r"^[A-Z]{1,2}\d{1,4}$"],
            ValidationSpec {
                require_digit: true,
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "valve",
            TagType::Valve,
            &[r"^VLV\d{4}$"],
            ValidationSpec {
                prefix_then_digits: Some("VLV".into()),
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "isa_instrument",
            TagType::Instrument,
            &[r"^[A-Z]{3,4}\d{4}$"],
            ValidationSpec {
                require_digit: true,
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
        matcher(
            "catch_all",
            TagType::Equipment,
            &[r"^[A-Z][A-Z0-9]*([-_][A-Z0-9]+)+$"],
            ValidationSpec {
                require_digit: true,
                max_len: Some(30),
                mostly_uppercase: true,
                ..Default::default()
            },
        ),
    ]
}

/// The full built-in table as a `[rules]` section with every list in
/// replace mode, as written by `init-config`.
pub fn rules_config() -> RulesConfig {
    RulesConfig {
        max_tag_len: Some(DEFAULT_MAX_TAG_LEN),
        border_margin: Some(DEFAULT_BORDER_MARGIN),
        exclusions: Some(ListSpec::replace(exclusions())),
        stoplist: Some(ListSpec::replace(stoplist())),
        matchers: Some(ListSpec::replace(matchers())),
    }
}
