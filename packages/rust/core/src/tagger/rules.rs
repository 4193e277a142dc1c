//! Stage 1: ordered regex rules.
//!
//! Clause rules are first-match-wins, so exclusion phrasing must come before
//! the generic coverage vocabulary it usually contains. Risk-domain rules are
//! OR-combined.

use std::sync::LazyLock;

use regex::Regex;

use policytag_shared::{ClauseType, LabelSet, RiskDomain, Tag, TagMethod, normalize_domains};

/// Rule confidence when a clause rule matched.
pub const MATCHED_CONFIDENCE: f64 = 0.55;
/// Rule confidence when nothing matched (`other`).
pub const UNMATCHED_CONFIDENCE: f64 = 0.25;

/// Phrasing that marks a clause as an exclusion under either label set.
pub(crate) const EXCLUSION_SIGNAL: &str = r"(면책|보상하지\s*않|지급하지\s*않|제외|부지급)";

type RuleTable<L> = Vec<(Regex, L)>;

fn compile<L: Copy>(rules: &[(&str, L)]) -> RuleTable<L> {
    rules
        .iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("valid regex"), *label))
        .collect()
}

static BASIC_CLAUSE_RULES: LazyLock<RuleTable<ClauseType>> = LazyLock::new(|| {
    compile(&[
        (EXCLUSION_SIGNAL, ClauseType::Exclusion),
        (r"(보장|지급\s*사유|보험금\s*지급|보상)", ClauseType::Coverage),
    ])
});

static EXTENDED_CLAUSE_RULES: LazyLock<RuleTable<ClauseType>> = LazyLock::new(|| {
    compile(&[
        (EXCLUSION_SIGNAL, ClauseType::Exclusion),
        (r"(대기기간|면책기간|경과\s*\d+\s*일)", ClauseType::Waiting),
        (r"(자기부담|공제금|본인부담)", ClauseType::Deductible),
        (r"(한도|지급한도|연간\s*한도|1회\s*한도|최대\s*지급)", ClauseType::Limit),
        (r"(보험금\s*청구|청구\s*서류|접수|지급\s*절차)", ClauseType::Claim),
        (r"(정의|용어의\s*정의)", ClauseType::Definition),
        (r"(갱신|재가입|갱신형)", ClauseType::Renewal),
        (r"(보장|지급\s*사유|보험금\s*지급)", ClauseType::Coverage),
    ])
});

static RISK_DOMAIN_RULES: LazyLock<RuleTable<RiskDomain>> = LazyLock::new(|| {
    compile(&[
        (r"(뇌|두부|머리|경련|신경)", RiskDomain::Head),
        (r"(치아|치주|스케일링|구강)", RiskDomain::Dental),
        (r"(피부|습진|알레르기|가려움)", RiskDomain::Skin),
        (r"(관절|슬개골|탈구|고관절|십자인대)", RiskDomain::Joint),
        (r"(비뇨|방광|요로|신장|결석)", RiskDomain::Urinary),
        (r"(눈|각막|백내장|망막)", RiskDomain::Eye),
        (r"(위|장|소화|구토|설사)", RiskDomain::Digestive),
    ])
});

fn clause_rules(label_set: LabelSet) -> &'static RuleTable<ClauseType> {
    match label_set {
        LabelSet::Basic => &BASIC_CLAUSE_RULES,
        LabelSet::Extended => &EXTENDED_CLAUSE_RULES,
    }
}

/// First matching clause rule, or `Other`.
pub fn match_clause(text: &str, label_set: LabelSet) -> ClauseType {
    clause_rules(label_set)
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
        .unwrap_or(ClauseType::Other)
}

/// Every matching risk domain, sorted; `[Other]` when none matched.
pub fn match_domains(text: &str) -> Vec<RiskDomain> {
    let matched = RISK_DOMAIN_RULES
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, domain)| *domain)
        .collect();
    normalize_domains(matched)
}

/// Rule-only tag for `text`.
pub fn rule_tag(text: &str, label_set: LabelSet) -> Tag {
    let clause_type = match_clause(text, label_set);
    let confidence = if clause_type == ClauseType::Other {
        UNMATCHED_CONFIDENCE
    } else {
        MATCHED_CONFIDENCE
    };

    Tag {
        clause_type,
        risk_domains: match_domains(text),
        confidence,
        method: TagMethod::Rule,
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_precedes_coverage() {
        // contains both 보상 and 보상하지 않
        let tag = rule_tag("회사는 다음의 사유로 생긴 손해는 보상하지 않습니다.", LabelSet::Basic);
        assert_eq!(tag.clause_type, ClauseType::Exclusion);
        assert_eq!(tag.confidence, MATCHED_CONFIDENCE);
        assert_eq!(tag.method, TagMethod::Rule);
    }

    #[test]
    fn coverage_rule() {
        let tag = rule_tag("보험금 지급 사유가 발생한 때", LabelSet::Basic);
        assert_eq!(tag.clause_type, ClauseType::Coverage);
    }

    #[test]
    fn no_match_is_other_with_low_confidence() {
        let tag = rule_tag("이 약관은 계약자에게 교부합니다", LabelSet::Basic);
        assert_eq!(tag.clause_type, ClauseType::Other);
        assert_eq!(tag.confidence, UNMATCHED_CONFIDENCE);
        assert_eq!(tag.risk_domains, vec![RiskDomain::Other]);
    }

    #[test]
    fn domains_are_or_combined_and_sorted() {
        let domains = match_domains("슬개골 탈구 및 치주 질환, 망막 박리");
        assert_eq!(
            domains,
            vec![RiskDomain::Dental, RiskDomain::Joint, RiskDomain::Eye]
        );
    }

    #[test]
    fn extended_rules_follow_order() {
        assert_eq!(
            match_clause("가입 후 경과 30 일 이내 발생한 질병", LabelSet::Extended),
            ClauseType::Waiting
        );
        assert_eq!(
            match_clause("자기부담금 30%를 공제합니다", LabelSet::Extended),
            ClauseType::Deductible
        );
        // 면책기간 hits exclusion first (면책)
        assert_eq!(
            match_clause("면책기간 90일", LabelSet::Extended),
            ClauseType::Exclusion
        );
        assert_eq!(
            match_clause("연간 한도 500만원", LabelSet::Extended),
            ClauseType::Limit
        );
        assert_eq!(
            match_clause("이 계약은 3년마다 갱신됩니다", LabelSet::Extended),
            ClauseType::Renewal
        );
    }

    #[test]
    fn non_payment_is_exclusion_under_both_label_sets() {
        for label_set in [LabelSet::Basic, LabelSet::Extended] {
            assert_eq!(
                match_clause("보험금 부지급 사유 안내", label_set),
                ClauseType::Exclusion
            );
        }
    }

    #[test]
    fn basic_rules_never_yield_extended_types() {
        let tag = rule_tag("자기부담금 30%", LabelSet::Basic);
        assert_eq!(tag.clause_type, ClauseType::Other);
    }
}
