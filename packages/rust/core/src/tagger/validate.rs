//! Stage 3: domain overrides and final validation.
//!
//! Some phrasings are unambiguous in policy terms and beat whatever the rule
//! or classifier stage said. Overrides are checked in precedence order and
//! only the first match applies, so exclusion always wins over coverage.

use std::sync::LazyLock;

use regex::Regex;

use policytag_shared::{ClauseType, LabelSet, Tag, normalize_domains, truncate_chars};

use super::rules::EXCLUSION_SIGNAL;

/// Notes are cut to this length when an override rewrites the tag.
pub const OVERRIDE_NOTE_CHARS: usize = 150;

struct Override {
    pattern: Regex,
    clause_type: ClauseType,
    min_confidence: f64,
}

fn compile(rules: &[(&str, ClauseType, f64)]) -> Vec<Override> {
    rules
        .iter()
        .map(|(pattern, clause_type, min_confidence)| Override {
            pattern: Regex::new(pattern).expect("valid regex"),
            clause_type: *clause_type,
            min_confidence: *min_confidence,
        })
        .collect()
}

static BASIC_OVERRIDES: LazyLock<Vec<Override>> = LazyLock::new(|| {
    compile(&[
        (EXCLUSION_SIGNAL, ClauseType::Exclusion, 0.85),
        (r"(보장|지급\s*사유|보험금\s*지급|보상)", ClauseType::Coverage, 0.80),
    ])
});

static EXTENDED_OVERRIDES: LazyLock<Vec<Override>> = LazyLock::new(|| {
    compile(&[
        (EXCLUSION_SIGNAL, ClauseType::Exclusion, 0.85),
        (r"(자기부담|본인부담|공제금)", ClauseType::Deductible, 0.85),
        (r"(지급한도|연간\s*한도|1회\s*한도|최대\s*지급|한도)", ClauseType::Limit, 0.80),
        (r"(보장|지급\s*사유|보험금\s*지급)", ClauseType::Coverage, 0.80),
    ])
});

fn overrides(label_set: LabelSet) -> &'static [Override] {
    match label_set {
        LabelSet::Basic => &BASIC_OVERRIDES,
        LabelSet::Extended => &EXTENDED_OVERRIDES,
    }
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Apply the first matching override, then re-validate the tag.
pub fn validate_and_override(text: &str, mut tag: Tag, label_set: LabelSet) -> Tag {
    if let Some(rule) = overrides(label_set)
        .iter()
        .find(|rule| rule.pattern.is_match(text))
    {
        tag.clause_type = rule.clause_type;
        tag.confidence = clamp_confidence(tag.confidence).max(rule.min_confidence);
        tag.note = tag.note.map(|n| truncate_chars(&n, OVERRIDE_NOTE_CHARS));
    }

    if !label_set.allows(tag.clause_type) {
        tag.clause_type = ClauseType::Other;
    }
    tag.risk_domains = normalize_domains(tag.risk_domains);
    tag.confidence = clamp_confidence(tag.confidence);
    tag
}
