//! Token → candidate classification.
//!
//! Order per token: empty and length checks, exclusion filters, stoplist,
//! then the matchers in priority order. The first matching matcher decides
//! the outcome; a failed validation rejects rather than falling through.

use pidtag_core::{
    BoundingBox, PageTokens, RejectReason, TagCandidate, Token, Verdict, normalize_text,
};

use crate::RuleSet;

impl RuleSet {
    /// Classify one token. `page_bounds` enables the border-only exclusions.
    pub fn classify(&self, token: &Token, page_bounds: Option<&BoundingBox>) -> TagCandidate {
        let normalized = normalize_text(&token.text);
        let near_border = page_bounds
            .is_some_and(|page| token.bbox.is_near_border(page, self.border_margin));
        let (verdict, matcher) = self.verdict(&normalized, &token.text, near_border);
        TagCandidate {
            raw_text: token.text.clone(),
            normalized,
            verdict,
            matcher,
            origin: token.clone(),
        }
    }

    /// Classify every token of a page, in token order.
    pub fn classify_page(&self, page: &PageTokens) -> Vec<TagCandidate> {
        page.tokens
            .iter()
            .map(|t| self.classify(t, Some(&page.bounds)))
            .collect()
    }

    /// Classify bare text with no geometry.
    pub fn classify_text(&self, text: &str, near_border: bool) -> (Verdict, Option<String>) {
        self.verdict(&normalize_text(text), text, near_border)
    }

    fn verdict(
        &self,
        normalized: &str,
        raw: &str,
        near_border: bool,
    ) -> (Verdict, Option<String>) {
        let reject = |reason: RejectReason| -> (Verdict, Option<String>) {
            (Verdict::Rejected(reason), None)
        };

        if normalized.is_empty() {
            return reject(RejectReason::Empty);
        }
        if normalized.chars().count() > self.max_tag_len {
            return reject(RejectReason::TooLong);
        }
        if let Some(ex) = self
            .exclusions
            .iter()
            .find(|ex| (!ex.near_border || near_border) && ex.regex.is_match(normalized))
        {
            return reject(RejectReason::Excluded {
                rule: ex.name.clone(),
            });
        }
        if self.stoplist.iter().any(|w| w == normalized) {
            return reject(RejectReason::Stoplisted);
        }

        let Some(matcher) = self.matchers.iter().find(|m| m.is_match(normalized)) else {
            return reject(RejectReason::NoPatternMatch);
        };
        match matcher.validation.check(normalized, raw) {
            Ok(()) => (Verdict::Tag(matcher.tag_type), Some(matcher.name.clone())),
            Err(check) => {
                tracing::trace!(text = normalized, matcher = %matcher.name, check, "validation failed");
                (
                    Verdict::Rejected(RejectReason::ValidationFailed {
                        matcher: matcher.name.clone(),
                        check: check.to_string(),
                    }),
                    Some(matcher.name.clone()),
                )
            }
        }
    }
}
