//! Metadata enrichment: document identifiers and term-type ranges per page.
//!
//! The insurer and product codes are read from the first two `_`-delimited
//! segments of the source file name and resolved through the product table.
//! Each page is then assigned `basic`, `special`, or no term type from the
//! four configured page boundaries.

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use policytag_shared::{
    DOC_TYPE_TERMS, DocInfo, EnrichedPage, Insurer, PageDocument, PageMetadata, PolicyTagError,
    ProductTable, Result, TermRanges, TermType, parse_file_identifiers,
};

/// Reject boundaries that are zero; page numbers are 1-based.
pub fn validate_ranges(ranges: &TermRanges) -> Result<()> {
    let fields = [
        ("basic_start", ranges.basic_start),
        ("basic_end", ranges.basic_end),
        ("special_start", ranges.special_start),
        ("special_end", ranges.special_end),
    ];
    for (name, value) in fields {
        if value == 0 {
            return Err(PolicyTagError::validation(format!(
                "{name} must be a 1-based page number, got 0"
            )));
        }
    }
    Ok(())
}

/// Term type of a page. The basic range is checked first and wins on overlap.
pub fn term_type_for(page: u32, ranges: &TermRanges) -> TermType {
    if (ranges.basic_start..=ranges.basic_end).contains(&page) {
        TermType::Basic
    } else if (ranges.special_start..=ranges.special_end).contains(&page) {
        TermType::Special
    } else {
        TermType::Unassigned
    }
}

/// Wrap reconstructed pages with document and term-type metadata.
///
/// `source` is whatever the parse service reported about the document; it is
/// copied verbatim into every page's `metadata.source`.
#[instrument(skip_all, fields(file_name = %file_name, pages = pages.len()))]
pub fn enrich_pages(
    pages: &[PageDocument],
    ranges: &TermRanges,
    file_name: &str,
    products: &ProductTable,
    source: &Map<String, Value>,
) -> Result<Vec<EnrichedPage>> {
    validate_ranges(ranges)?;

    let (insurer_code, product_code) = parse_file_identifiers(file_name)?;
    let product_name = products.product_name(insurer_code, product_code)?;
    let insurer_name = Insurer::from_code(insurer_code).display_name();
    let total_pages = pages.len();

    let enriched: Vec<EnrichedPage> = pages
        .iter()
        .map(|page| {
            let term_type = term_type_for(page.page_number(), ranges);
            debug!(page = page.page_number(), term_type = term_type.as_str(), "page enriched");

            EnrichedPage {
                page_content: page.text().to_string(),
                metadata: PageMetadata {
                    source: source.clone(),
                    doc: DocInfo {
                        doc_type: DOC_TYPE_TERMS.to_string(),
                        file_name: file_name.to_string(),
                        insurer_code: insurer_code.to_string(),
                        insurer_name: insurer_name.to_string(),
                        product_code: product_code.to_string(),
                        product_name: product_name.to_string(),
                        total_pages,
                        page: page.page_number(),
                        anchor_ids: page.anchor_ids().to_vec(),
                    },
                    term_type,
                },
                raw_markup: page.raw_markup().map(str::to_string),
            }
        })
        .collect();

    let basic = enriched
        .iter()
        .filter(|p| p.metadata.term_type == TermType::Basic)
        .count();
    let special = enriched
        .iter()
        .filter(|p| p.metadata.term_type == TermType::Special)
        .count();
    info!(%product_name, basic, special, "metadata enrichment complete");

    Ok(enriched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use policytag_shared::default_products;

    fn ranges() -> TermRanges {
        TermRanges {
            basic_start: 1,
            basic_end: 10,
            special_start: 8,
            special_end: 20,
        }
    }

    fn pages(numbers: &[u32]) -> Vec<PageDocument> {
        numbers
            .iter()
            .map(|n| PageDocument::new(*n, format!("page {n}"), vec![n.to_string()]))
            .collect()
    }

    #[test]
    fn basic_range_wins_on_overlap() {
        let r = ranges();
        assert_eq!(term_type_for(1, &r), TermType::Basic);
        assert_eq!(term_type_for(9, &r), TermType::Basic);
        assert_eq!(term_type_for(11, &r), TermType::Special);
        assert_eq!(term_type_for(20, &r), TermType::Special);
        assert_eq!(term_type_for(21, &r), TermType::Unassigned);
    }

    #[test]
    fn enriches_with_doc_info() {
        let table = ProductTable::new(default_products());
        let mut source = Map::new();
        source.insert("model".into(), Value::from("document-parse"));

        let out = enrich_pages(
            &pages(&[5, 12, 40]),
            &ranges(),
            "meritz_1_마음든든.pdf",
            &table,
            &source,
        )
        .unwrap();

        assert_eq!(out.len(), 3);
        let doc = &out[1].metadata.doc;
        assert_eq!(doc.doc_type, "terms");
        assert_eq!(doc.insurer_code, "meritz");
        assert_eq!(doc.insurer_name, "메리츠화재");
        assert_eq!(doc.product_code, "1");
        assert_eq!(doc.product_name, "메리츠 마음든든 반려동물보험");
        assert_eq!(doc.total_pages, 3);
        assert_eq!(doc.page, 12);
        assert_eq!(doc.anchor_ids, vec!["12".to_string()]);
        assert_eq!(out[1].page_content, "page 12");
        assert_eq!(out[1].metadata.source["model"], "document-parse");

        let types: Vec<TermType> = out.iter().map(|p| p.metadata.term_type).collect();
        assert_eq!(
            types,
            vec![TermType::Basic, TermType::Special, TermType::Unassigned]
        );
    }

    #[test]
    fn unknown_product_is_fatal() {
        let table = ProductTable::new(default_products());
        let err = enrich_pages(&pages(&[1]), &ranges(), "kb_7_x.pdf", &table, &Map::new())
            .unwrap_err();
        assert!(matches!(err, PolicyTagError::UnknownProductMapping { .. }));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn zero_boundary_is_rejected() {
        let table = ProductTable::new(default_products());
        let mut r = ranges();
        r.special_end = 0;
        let err =
            enrich_pages(&pages(&[1]), &r, "meritz_1_x.pdf", &table, &Map::new()).unwrap_err();
        assert!(matches!(err, PolicyTagError::Validation { .. }));
        assert!(err.to_string().contains("special_end"));
    }

    #[test]
    fn file_name_without_identifiers_is_rejected() {
        let table = ProductTable::new(default_products());
        let err =
            enrich_pages(&pages(&[1]), &ranges(), "terms.pdf", &table, &Map::new()).unwrap_err();
        assert!(matches!(err, PolicyTagError::Validation { .. }));
    }
}
