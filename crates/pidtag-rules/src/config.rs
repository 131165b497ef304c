use once_cell::sync::Lazy;
use pidtag_core::TagType;
use pidtag_core::config_file::{ExclusionSpec, ListMode, ListSpec, MatcherSpec, RulesConfig};
use pidtag_core::normalize_text;
use regex::Regex;

use crate::RuleError;
use crate::defaults;

/// Controls how a list of rules is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

impl<T> From<ListSpec<T>> for ListOverride<T> {
    fn from(spec: ListSpec<T>) -> Self {
        match spec.mode {
            ListMode::Replace => ListOverride::Replace(spec.items),
            ListMode::Extend => ListOverride::Extend(spec.items),
        }
    }
}

/// A compiled exclusion filter.
#[derive(Debug, Clone)]
pub struct Exclusion {
    pub name: String,
    pub regex: Regex,
    /// Only applies to tokens within the page border margin.
    pub near_border: bool,
}

/// Post-match checks for one matcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub hyphen_groups: Option<usize>,
    pub prefix_then_digits: Option<String>,
    pub require_digit: bool,
    pub max_len: Option<usize>,
    pub mostly_uppercase: bool,
}

impl Validation {
    /// Returns the name of the first failing check.
    pub fn check(&self, normalized: &str, raw: &str) -> Result<(), &'static str> {
        if let Some(groups) = self.hyphen_groups
            && normalized.split('-').count() != groups
        {
            return Err("hyphen_groups");
        }
        if let Some(prefix) = &self.prefix_then_digits {
            let rest = normalized.strip_prefix(prefix.as_str()).unwrap_or("");
            if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
                return Err("prefix_then_digits");
            }
        }
        if self.require_digit && !normalized.chars().any(|c| c.is_ascii_digit()) {
            return Err("require_digit");
        }
        if let Some(max) = self.max_len
            && normalized.chars().count() > max
        {
            return Err("max_len");
        }
        if self.mostly_uppercase && !is_mostly_uppercase(raw) {
            return Err("mostly_uppercase");
        }
        Ok(())
    }
}

/// More than half of the letters are uppercase. Text with no letters fails.
pub fn is_mostly_uppercase(text: &str) -> bool {
    let (upper, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(u, n), c| {
            (u + usize::from(c.is_uppercase()), n + 1)
        });
    letters > 0 && upper * 2 > letters
}

/// A compiled type matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub name: String,
    pub tag_type: TagType,
    pub patterns: Vec<Regex>,
    pub validation: Validation,
}

impl Matcher {
    pub fn is_match(&self, normalized: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(normalized))
    }
}

/// The compiled, ordered rule table.
///
/// Use [`RuleSetBuilder`] to construct from string patterns;
/// [`RuleSet::default`] is the built-in table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub(crate) max_tag_len: usize,
    pub(crate) border_margin: f32,
    pub(crate) exclusions: Vec<Exclusion>,
    /// Normalized stop words.
    pub(crate) stoplist: Vec<String>,
    pub(crate) matchers: Vec<Matcher>,
}

static BUILTIN: Lazy<RuleSet> = Lazy::new(|| {
    RuleSetBuilder::new()
        .build()
        .expect("built-in rule table compiles")
});

impl Default for RuleSet {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl RuleSet {
    pub fn max_tag_len(&self) -> usize {
        self.max_tag_len
    }

    pub fn border_margin(&self) -> f32 {
        self.border_margin
    }

    pub fn exclusions(&self) -> &[Exclusion] {
        &self.exclusions
    }

    pub fn stoplist(&self) -> &[String] {
        &self.stoplist
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }
}

/// Builder for [`RuleSet`].
///
/// Accepts string patterns that are compiled in [`build()`](Self::build).
/// Fails fast with [`RuleError`] if any rule is invalid.
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    max_tag_len: Option<usize>,
    border_margin: Option<f32>,
    exclusions: ListOverride<ExclusionSpec>,
    stoplist: ListOverride<String>,
    matchers: ListOverride<MatcherSpec>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a `[rules]` config section.
    pub fn from_config(config: &RulesConfig) -> Self {
        Self {
            max_tag_len: config.max_tag_len,
            border_margin: config.border_margin,
            exclusions: config.exclusions.clone().map(Into::into).unwrap_or_default(),
            stoplist: config.stoplist.clone().map(Into::into).unwrap_or_default(),
            matchers: config.matchers.clone().map(Into::into).unwrap_or_default(),
        }
    }

    // ── Scalars ──

    pub fn max_tag_len(mut self, n: usize) -> Self {
        self.max_tag_len = Some(n);
        self
    }

    pub fn border_margin(mut self, margin: f32) -> Self {
        self.border_margin = Some(margin);
        self
    }

    // ── Exclusions ──

    pub fn set_exclusions(mut self, exclusions: Vec<ExclusionSpec>) -> Self {
        self.exclusions = ListOverride::Replace(exclusions);
        self
    }

    pub fn add_exclusion(mut self, exclusion: ExclusionSpec) -> Self {
        match &mut self.exclusions {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(exclusion),
            ListOverride::Default => self.exclusions = ListOverride::Extend(vec![exclusion]),
        }
        self
    }

    // ── Stoplist ──

    pub fn set_stoplist(mut self, words: Vec<String>) -> Self {
        self.stoplist = ListOverride::Replace(words);
        self
    }

    pub fn add_stop_word(mut self, word: String) -> Self {
        match &mut self.stoplist {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(word),
            ListOverride::Default => self.stoplist = ListOverride::Extend(vec![word]),
        }
        self
    }

    // ── Matchers ──

    pub fn set_matchers(mut self, matchers: Vec<MatcherSpec>) -> Self {
        self.matchers = ListOverride::Replace(matchers);
        self
    }

    pub fn add_matcher(mut self, matcher: MatcherSpec) -> Self {
        match &mut self.matchers {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(matcher),
            ListOverride::Default => self.matchers = ListOverride::Extend(vec![matcher]),
        }
        self
    }

    /// Compile all rules and produce a [`RuleSet`].
    pub fn build(self) -> Result<RuleSet, RuleError> {
        let max_tag_len = self.max_tag_len.unwrap_or(defaults::DEFAULT_MAX_TAG_LEN);
        if max_tag_len == 0 {
            return Err(RuleError::InvalidSetting("max_tag_len must be positive".into()));
        }
        let border_margin = self.border_margin.unwrap_or(defaults::DEFAULT_BORDER_MARGIN);
        if !(0.0..0.5).contains(&border_margin) {
            return Err(RuleError::InvalidSetting(format!(
                "border_margin {} outside [0, 0.5)",
                border_margin
            )));
        }

        let exclusions = self
            .exclusions
            .resolve(&defaults::exclusions())
            .into_iter()
            .map(|spec| {
                Ok(Exclusion {
                    regex: compile(&spec.name, &spec.pattern)?,
                    name: spec.name,
                    near_border: spec.near_border,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let stoplist = self
            .stoplist
            .resolve(&defaults::stoplist())
            .iter()
            .map(|w| normalize_text(w))
            .filter(|w| !w.is_empty())
            .collect();

        let matchers = resolve_matchers(&self.matchers)?
            .into_iter()
            .map(compile_matcher)
            .collect::<Result<Vec<_>, RuleError>>()?;
        if matchers.is_empty() {
            return Err(RuleError::NoMatchers);
        }

        tracing::debug!(
            exclusions = exclusions.len(),
            matchers = matchers.len(),
            max_tag_len,
            "rule set compiled"
        );

        Ok(RuleSet {
            max_tag_len,
            border_margin,
            exclusions,
            stoplist,
            matchers,
        })
    }
}

fn compile(rule: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
        rule: rule.to_string(),
        source,
    })
}

/// Extend mode honours `before` and replaces same-named defaults in place.
fn resolve_matchers(list: &ListOverride<MatcherSpec>) -> Result<Vec<MatcherSpec>, RuleError> {
    let ListOverride::Extend(extra) = list else {
        return Ok(list.resolve(&defaults::matchers()));
    };
    let mut resolved = defaults::matchers();
    for spec in extra {
        if let Some(slot) = resolved.iter_mut().find(|m| m.name == spec.name) {
            *slot = spec.clone();
            continue;
        }
        match &spec.before {
            Some(anchor) => {
                let idx = resolved.iter().position(|m| &m.name == anchor).ok_or_else(|| {
                    RuleError::UnknownMatcher {
                        rule: spec.name.clone(),
                        before: anchor.clone(),
                    }
                })?;
                resolved.insert(idx, spec.clone());
            }
            None => resolved.push(spec.clone()),
        }
    }
    Ok(resolved)
}

fn compile_matcher(spec: MatcherSpec) -> Result<Matcher, RuleError> {
    let tag_type = TagType::parse(&spec.tag_type).ok_or_else(|| RuleError::UnknownTagType {
        rule: spec.name.clone(),
        value: spec.tag_type.clone(),
    })?;
    if spec.patterns.is_empty() {
        return Err(RuleError::NoPatterns(spec.name));
    }
    let patterns = spec
        .patterns
        .iter()
        .map(|p| compile(&spec.name, p))
        .collect::<Result<Vec<_>, _>>()?;
    let v = spec.validation;
    Ok(Matcher {
        name: spec.name,
        tag_type,
        patterns,
        validation: Validation {
            hyphen_groups: v.hyphen_groups,
            prefix_then_digits: v.prefix_then_digits.map(|p| p.to_uppercase()),
            require_digit: v.require_digit,
            max_len: v.max_len,
            mostly_uppercase: v.mostly_uppercase,
        },
    })
}
