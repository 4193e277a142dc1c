//! Closed label sets and the `Tag` value produced by the tagger.
//!
//! Every label that leaves the tagger has been decoded into one of these
//! enums. Strings from outside (classifier output, chunk metadata) go through
//! [`ClauseType::from_label`] / [`RiskDomain::from_label`] first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length (in chars) of a tag note.
pub const MAX_NOTE_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// ClauseType
// ---------------------------------------------------------------------------

/// Function of an insurance clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseType {
    Coverage,
    Exclusion,
    Waiting,
    Deductible,
    Limit,
    Claim,
    Definition,
    Renewal,
    Other,
}

impl ClauseType {
    pub const ALL: [ClauseType; 9] = [
        Self::Coverage,
        Self::Exclusion,
        Self::Waiting,
        Self::Deductible,
        Self::Limit,
        Self::Claim,
        Self::Definition,
        Self::Renewal,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::Exclusion => "exclusion",
            Self::Waiting => "waiting",
            Self::Deductible => "deductible",
            Self::Limit => "limit",
            Self::Claim => "claim",
            Self::Definition => "definition",
            Self::Renewal => "renewal",
            Self::Other => "other",
        }
    }

    /// Decode an external label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RiskDomain
// ---------------------------------------------------------------------------

/// Body-system / disease category a clause concerns.
///
/// Ordering follows declaration order; tag domain lists are kept sorted by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDomain {
    Head,
    Dental,
    Skin,
    Joint,
    Urinary,
    Eye,
    Digestive,
    Other,
}

impl RiskDomain {
    pub const ALL: [RiskDomain; 8] = [
        Self::Head,
        Self::Dental,
        Self::Skin,
        Self::Joint,
        Self::Urinary,
        Self::Eye,
        Self::Digestive,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Dental => "dental",
            Self::Skin => "skin",
            Self::Joint => "joint",
            Self::Urinary => "urinary",
            Self::Eye => "eye",
            Self::Digestive => "digestive",
            Self::Other => "other",
        }
    }

    /// Decode an external label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|d| d.as_str() == label)
    }
}

impl fmt::Display for RiskDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort, dedup, and default an arbitrary domain list to `[Other]` when empty.
pub fn normalize_domains(mut domains: Vec<RiskDomain>) -> Vec<RiskDomain> {
    domains.sort();
    domains.dedup();
    if domains.is_empty() {
        domains.push(RiskDomain::Other);
    }
    domains
}

// ---------------------------------------------------------------------------
// LabelSet
// ---------------------------------------------------------------------------

/// Which clause-type vocabulary is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSet {
    /// coverage / exclusion / other
    #[default]
    Basic,
    /// All nine clause types.
    Extended,
}

impl LabelSet {
    pub fn clause_types(&self) -> &'static [ClauseType] {
        const BASIC: [ClauseType; 3] = [ClauseType::Coverage, ClauseType::Exclusion, ClauseType::Other];
        match self {
            Self::Basic => &BASIC,
            Self::Extended => &ClauseType::ALL,
        }
    }

    pub fn allows(&self, clause_type: ClauseType) -> bool {
        self.clause_types().contains(&clause_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Extended => "extended",
        }
    }
}

impl FromStr for LabelSet {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "extended" => Ok(Self::Extended),
            other => Err(format!("unknown label set '{other}': expected basic or extended")),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmPolicy
// ---------------------------------------------------------------------------

/// When the tagger escalates a chunk to the LLM classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmPolicy {
    /// Every chunk.
    Always,
    /// Rule result is final; no network, no credential.
    Never,
    /// Only when the rule pass found nothing or is below the threshold.
    #[default]
    UnknownOrLowConf,
}

impl LlmPolicy {
    /// Whether this policy may ever call the classifier.
    pub fn requires_classifier(&self) -> bool {
        !matches!(self, Self::Never)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::UnknownOrLowConf => "unknown_or_low_conf",
        }
    }
}

impl fmt::Display for LlmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "unknown_or_low_conf" => Ok(Self::UnknownOrLowConf),
            other => Err(format!(
                "unknown llm policy '{other}': expected always, never, or unknown_or_low_conf"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Which stage produced the tag's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMethod {
    Rule,
    Llm,
}

/// Final classification of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub clause_type: ClauseType,
    /// Sorted, unique, never empty.
    pub risk_domains: Vec<RiskDomain>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub method: TagMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Truncate to at most `max_chars` characters (not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
