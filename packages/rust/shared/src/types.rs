//! Core domain types: reconstructed pages, enriched pages, and chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `doc_type` recorded on every enriched page.
pub const DOC_TYPE_TERMS: &str = "terms";

// ---------------------------------------------------------------------------
// PageDocument
// ---------------------------------------------------------------------------

/// One reconstructed page. Immutable once emitted by the reconstructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    page_number: u32,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_markup: Option<String>,
    anchor_ids: Vec<String>,
}

impl PageDocument {
    /// `anchor_ids` is expected to be deduplicated already.
    pub fn new(page_number: u32, text: String, anchor_ids: Vec<String>) -> Self {
        Self {
            page_number,
            text,
            raw_markup: None,
            anchor_ids,
        }
    }

    pub fn with_raw_markup(mut self, raw: Option<String>) -> Self {
        self.raw_markup = raw;
        self
    }

    /// Page number as printed in the source footer.
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn raw_markup(&self) -> Option<&str> {
        self.raw_markup.as_deref()
    }

    pub fn anchor_ids(&self) -> &[String] {
        &self.anchor_ids
    }
}

// ---------------------------------------------------------------------------
// TermType
// ---------------------------------------------------------------------------

/// Which policy-terms section a page belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermType {
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "special")]
    Special,
    /// Outside both configured ranges.
    #[default]
    #[serde(rename = "")]
    Unassigned,
}

impl TermType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Special => "special",
            Self::Unassigned => "",
        }
    }
}

// ---------------------------------------------------------------------------
// Enriched pages
// ---------------------------------------------------------------------------

/// Four 1-based inclusive page boundaries, in footer numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRanges {
    pub basic_start: u32,
    pub basic_end: u32,
    pub special_start: u32,
    pub special_end: u32,
}

/// `metadata.doc` of an enriched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub doc_type: String,
    /// Source file name including extension.
    pub file_name: String,
    pub insurer_code: String,
    pub insurer_name: String,
    pub product_code: String,
    pub product_name: String,
    pub total_pages: usize,
    pub page: u32,
    pub anchor_ids: Vec<String>,
}

/// Nested metadata attached to each enriched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Whatever the external parser reported about the source document.
    #[serde(default)]
    pub source: Map<String, Value>,
    pub doc: DocInfo,
    pub term_type: TermType,
}

/// A page with document/term metadata, ready for the external chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPage {
    pub page_content: String,
    pub metadata: PageMetadata,
    /// Source markup of the page, when reconstruction kept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_markup: Option<String>,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A text segment plus inherited metadata, as produced by the chunker.
///
/// Metadata is kept as an open JSON map so keys added by upstream stages
/// survive tagging untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Chunk {
    pub fn new(page_content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// `metadata.doc.file_name`, if present.
    pub fn file_name(&self) -> Option<&str> {
        self.metadata
            .get("doc")
            .and_then(|d| d.get("file_name"))
            .and_then(Value::as_str)
    }
}

impl From<&EnrichedPage> for Chunk {
    fn from(page: &EnrichedPage) -> Self {
        let metadata = match serde_json::to_value(&page.metadata) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            page_content: page.page_content.clone(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> EnrichedPage {
        EnrichedPage {
            page_content: "제1조 보장내용".into(),
            metadata: PageMetadata {
                source: Map::new(),
                doc: DocInfo {
                    doc_type: DOC_TYPE_TERMS.into(),
                    file_name: "meritz_1_maum.pdf".into(),
                    insurer_code: "meritz".into(),
                    insurer_name: "메리츠화재".into(),
                    product_code: "1".into(),
                    product_name: "메리츠 마음든든 반려동물보험".into(),
                    total_pages: 2,
                    page: 21,
                    anchor_ids: vec!["3".into()],
                },
                term_type: TermType::Unassigned,
            },
            raw_markup: None,
        }
    }

    #[test]
    fn unassigned_term_type_serializes_as_empty_string() {
        let json = serde_json::to_string(&TermType::Unassigned).unwrap();
        assert_eq!(json, r#""""#);
        let parsed: TermType = serde_json::from_str(r#""special""#).unwrap();
        assert_eq!(parsed, TermType::Special);
    }

    #[test]
    fn chunk_from_page_carries_nested_metadata() {
        let chunk = Chunk::from(&sample_page());
        assert_eq!(chunk.file_name(), Some("meritz_1_maum.pdf"));
        assert_eq!(chunk.metadata["doc"]["page"], 21);
        assert_eq!(chunk.metadata["term_type"], "");
    }

    #[test]
    fn page_document_accessors() {
        let page = PageDocument::new(7, "text".into(), vec!["a".into()])
            .with_raw_markup(Some("<p id=\"a\">text</p>".into()));
        assert_eq!(page.page_number(), 7);
        assert_eq!(page.anchor_ids(), ["a".to_string()]);
        assert!(page.raw_markup().unwrap().contains("<p"));
    }
}
