//! Hand-off point to the text splitter.
//!
//! Real chunking happens outside this workspace; chunks produced elsewhere
//! can be fed to `policytag tag` as JSON. [`PageChunker`] keeps the built-in
//! pipeline runnable by treating every non-blank page as one chunk.

use policytag_shared::{Chunk, EnrichedPage};

/// Splits enriched pages into chunks that inherit page metadata.
pub trait Chunker {
    fn chunk(&self, pages: &[EnrichedPage]) -> Vec<Chunk>;
}

/// One chunk per non-blank page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageChunker;

impl Chunker for PageChunker {
    fn chunk(&self, pages: &[EnrichedPage]) -> Vec<Chunk> {
        pages
            .iter()
            .filter(|p| !p.page_content.trim().is_empty())
            .map(Chunk::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policytag_shared::{DocInfo, PageMetadata, TermType};
    use serde_json::Map;

    fn page(n: u32, text: &str) -> EnrichedPage {
        EnrichedPage {
            page_content: text.into(),
            metadata: PageMetadata {
                source: Map::new(),
                doc: DocInfo {
                    doc_type: "terms".into(),
                    file_name: "meritz_2_x.pdf".into(),
                    insurer_code: "meritz".into(),
                    insurer_name: "메리츠화재".into(),
                    product_code: "2".into(),
                    product_name: "펫퍼민트".into(),
                    total_pages: 3,
                    page: n,
                    anchor_ids: vec![],
                },
                term_type: TermType::Special,
            },
            raw_markup: None,
        }
    }

    #[test]
    fn blank_pages_are_skipped() {
        let chunks = PageChunker.chunk(&[page(1, "제1조"), page(2, "  \n"), page(3, "제2조")]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].page_content, "제2조");
        assert_eq!(chunks[1].metadata["doc"]["page"], 3);
        assert_eq!(chunks[1].metadata["term_type"], "special");
    }
}
