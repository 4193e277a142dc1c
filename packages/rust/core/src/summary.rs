//! Label-frequency summaries over tagged chunks, for QA.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;

use policytag_shared::{Chunk, LabelSet};

/// Term-type labels counted in summaries. Unassigned pages count as `other`.
pub const TERM_TYPE_LABELS: [&str; 3] = ["basic", "special", "other"];

/// Counts per label, plus the number of chunks looked at.
///
/// Every closed-set label is present (zero when unobserved), in closed-set
/// order, followed by any unexpected labels in first-seen order. Serializes
/// as a flat object with `total` first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCounts {
    total: usize,
    counts: Vec<(String, usize)>,
}

impl LabelCounts {
    fn tally<'a>(
        total: usize,
        labels: impl IntoIterator<Item = &'a str>,
        observed: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut counts: Vec<(String, usize)> =
            labels.into_iter().map(|l| (l.to_string(), 0)).collect();

        for value in observed {
            match counts.iter_mut().find(|(label, _)| *label == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value, 1)),
            }
        }

        Self { total, counts }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Count for `label`, or `None` if it is neither closed-set nor observed.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(l, n)| (l.as_str(), *n))
    }
}

impl Serialize for LabelCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len() + 1))?;
        map.serialize_entry("total", &self.total)?;
        for (label, count) in &self.counts {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

/// Combined clause-type and term-type summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggingSummary {
    pub clause_type: LabelCounts,
    pub term_type: LabelCounts,
}

fn clause_type_of(chunk: &Chunk) -> Option<String> {
    chunk
        .metadata
        .get("clause")
        .and_then(|c| c.get("clause_type"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn term_type_of(chunk: &Chunk) -> String {
    chunk
        .metadata
        .get("term_type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("other")
        .to_string()
}

/// Count clause types (over the active label set) and term types.
pub fn summarize(chunks: &[Chunk], label_set: LabelSet) -> TaggingSummary {
    let total = chunks.len();

    TaggingSummary {
        clause_type: LabelCounts::tally(
            total,
            label_set.clause_types().iter().map(|c| c.as_str()),
            chunks.iter().filter_map(clause_type_of),
        ),
        term_type: LabelCounts::tally(
            total,
            TERM_TYPE_LABELS,
            chunks.iter().map(term_type_of),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn tagged(clause: &str, term: &str) -> Chunk {
        let mut metadata = Map::new();
        metadata.insert("clause".into(), json!({ "clause_type": clause, "risk_domains": ["other"] }));
        metadata.insert("term_type".into(), json!(term));
        Chunk::new("text", metadata)
    }

    #[test]
    fn counts_with_zero_fill() {
        let chunks = vec![
            tagged("coverage", "basic"),
            tagged("coverage", "special"),
            tagged("exclusion", ""),
        ];
        let summary = summarize(&chunks, LabelSet::Basic);

        assert_eq!(summary.clause_type.total(), 3);
        assert_eq!(summary.clause_type.get("coverage"), Some(2));
        assert_eq!(summary.clause_type.get("exclusion"), Some(1));
        assert_eq!(summary.clause_type.get("other"), Some(0));

        assert_eq!(summary.term_type.get("basic"), Some(1));
        assert_eq!(summary.term_type.get("special"), Some(1));
        assert_eq!(summary.term_type.get("other"), Some(1));
    }

    #[test]
    fn empty_input_still_zero_fills() {
        let summary = summarize(&[], LabelSet::Extended);
        assert_eq!(summary.clause_type.total(), 0);
        assert_eq!(summary.clause_type.iter().count(), 9);
        assert!(summary.clause_type.iter().all(|(_, n)| n == 0));
        assert_eq!(summary.term_type.get("special"), Some(0));
    }

    #[test]
    fn unexpected_labels_are_appended() {
        let summary = summarize(&[tagged("payout", "basic")], LabelSet::Basic);
        let labels: Vec<&str> = summary.clause_type.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["coverage", "exclusion", "other", "payout"]);
    }

    #[test]
    fn serializes_flat_with_total_first() {
        let summary = summarize(&[tagged("exclusion", "basic")], LabelSet::Basic);
        let json = serde_json::to_string(&summary.clause_type).unwrap();
        assert_eq!(json, r#"{"total":1,"coverage":0,"exclusion":1,"other":0}"#);
    }

    #[test]
    fn untagged_chunks_count_only_toward_total() {
        let chunk = Chunk::new("raw", Map::new());
        let summary = summarize(&[chunk], LabelSet::Basic);
        assert_eq!(summary.clause_type.total(), 1);
        assert!(summary.clause_type.iter().all(|(_, n)| n == 0));
        assert_eq!(summary.term_type.get("other"), Some(1));
    }
}
