//! Page reconstruction from parsed policy markup.
//!
//! The document-parse service returns one markup stream per document with
//! unreliable page structure. This crate walks that tree in document order and
//! rebuilds page units from the rendered footer page numbers:
//!
//! 1. `<footer>` whose text looks like a page number (`21`, `- 21 -`) closes a page
//! 2. `<table>` is linearized row by row (`cell | cell`) as one text block
//! 3. paragraph/heading/list/container elements contribute their visible text
//! 4. anchor ids of contributing elements are kept, deduplicated per page
//!
//! Content after the last footer becomes one extra page numbered after the
//! last emitted one.

mod markup;
mod normalize;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use policytag_shared::{PageDocument, PolicyTagError, Result};

pub use markup::{MarkupChild, MarkupNode};

/// Elements whose visible text is buffered.
const CONTENT_TAGS: [&str; 7] = ["p", "h1", "h2", "h3", "li", "div", "span"];

/// Elements that make an enclosing content element act as a plain container.
const BLOCK_TAGS: [&str; 8] = ["p", "h1", "h2", "h3", "li", "div", "table", "footer"];

/// Elements whose text never reaches page text.
const NON_TEXT_TAGS: [&str; 3] = ["script", "style", "template"];

/// Footer text recognized as a page marker.
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s*)?(\d{1,4})(?:\s*-\s*)?\s*$").expect("valid regex")
});

/// Options for [`reconstruct_pages`].
#[derive(Debug, Clone, Default)]
pub struct ReconstructOptions {
    /// Keep the serialized markup of contributing elements on each page.
    pub keep_raw_markup: bool,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Reconstruct pages from an HTML document produced by the parse service.
pub fn reconstruct_html(
    html: &str,
    file_name: &str,
    opts: &ReconstructOptions,
) -> Result<Vec<PageDocument>> {
    let doc = Html::parse_document(html);

    let body_sel = Selector::parse("body").map_err(|e| PolicyTagError::parse(e.to_string()))?;
    let root = doc
        .select(&body_sel)
        .next()
        .unwrap_or_else(|| doc.root_element());

    reconstruct_pages(&root, file_name, opts)
}

/// Reconstruct pages by walking `root` depth-first in document order.
///
/// Returns [`PolicyTagError::EmptyDocument`] when no page marker matched and
/// there is no trailing content to fall back on.
#[instrument(skip(root, opts), fields(file_name = %file_name))]
pub fn reconstruct_pages<N: MarkupNode>(
    root: &N,
    file_name: &str,
    opts: &ReconstructOptions,
) -> Result<Vec<PageDocument>> {
    let mut builder = PageBuilder::new(opts.keep_raw_markup);
    builder.walk(root);
    let pages = builder.finish();

    if pages.is_empty() {
        return Err(PolicyTagError::EmptyDocument {
            file_name: file_name.to_string(),
        });
    }

    info!(pages = pages.len(), "pages reconstructed");
    Ok(pages)
}

/// Parse a footer's text as a page number. `0` is not a page.
pub fn parse_page_marker(text: &str) -> Option<u32> {
    PAGE_MARKER_RE
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Linearize a table: non-empty cells joined by `" | "`, rows by newline.
pub fn linearize_table<N: MarkupNode>(table: &N) -> String {
    let mut rows = Vec::new();
    collect_rows(table, &mut rows);

    rows.iter()
        .filter_map(|tr| {
            let cells: Vec<String> = tr
                .children()
                .iter()
                .filter(|c| matches!(c.tag_name(), "td" | "th"))
                .map(|c| normalize::collapse_inline(&c.text_segments().join(" ")))
                .filter(|t| !t.is_empty())
                .collect();
            (!cells.is_empty()).then(|| cells.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_rows<N: MarkupNode>(node: &N, out: &mut Vec<N>) {
    for child in node.children() {
        if child.tag_name() == "tr" {
            out.push(child);
        } else {
            collect_rows(&child, out);
        }
    }
}

/// Elements whose text joins the surrounding run instead of forming a block.
fn is_inline<N: MarkupNode>(node: &N) -> bool {
    !BLOCK_TAGS.contains(&node.tag_name()) && !has_block_descendant(node)
}

fn has_block_descendant<N: MarkupNode>(node: &N) -> bool {
    node.children()
        .iter()
        .any(|c| BLOCK_TAGS.contains(&c.tag_name()) || has_block_descendant(c))
}

// ---------------------------------------------------------------------------
// PageBuilder
// ---------------------------------------------------------------------------

/// Traversal state: buffers for the page currently being filled.
struct PageBuilder {
    pages: Vec<PageDocument>,
    text: Vec<String>,
    ids: Vec<String>,
    raw: Vec<String>,
    keep_raw: bool,
}

impl PageBuilder {
    fn new(keep_raw: bool) -> Self {
        Self {
            pages: Vec::new(),
            text: Vec::new(),
            ids: Vec::new(),
            raw: Vec::new(),
            keep_raw,
        }
    }

    fn walk<N: MarkupNode>(&mut self, node: &N) {
        match node.tag_name() {
            "footer" => self.on_footer(node),
            "table" => self.on_table(node),
            tag if CONTENT_TAGS.contains(&tag) && !has_block_descendant(node) => {
                self.on_content(node)
            }
            tag => {
                if CONTENT_TAGS.contains(&tag) {
                    self.push_id(node);
                }
                self.walk_mixed(node);
            }
        }
    }

    /// Walk a container. Block children recurse; loose text and inline
    /// children between them are buffered as runs in document order.
    fn walk_mixed<N: MarkupNode>(&mut self, node: &N) {
        let mut run = Vec::new();
        for item in node.child_items() {
            match item {
                MarkupChild::Text(text) => run.push(text),
                MarkupChild::Element(child) if NON_TEXT_TAGS.contains(&child.tag_name()) => {}
                MarkupChild::Element(child) if is_inline(&child) => {
                    run.extend(child.text_segments());
                    if CONTENT_TAGS.contains(&child.tag_name()) {
                        self.push_id(&child);
                    }
                    self.push_nested_ids(&child);
                }
                MarkupChild::Element(child) => {
                    self.flush_run(&mut run);
                    self.walk(&child);
                }
            }
        }
        self.flush_run(&mut run);
    }

    fn flush_run(&mut self, run: &mut Vec<String>) {
        let text = normalize::collapse_inline(&run.join(" "));
        if !text.is_empty() {
            self.text.push(text);
        }
        run.clear();
    }

    fn on_footer<N: MarkupNode>(&mut self, node: &N) {
        let raw = normalize::join_trimmed(&node.text_segments(), "");
        match parse_page_marker(&raw) {
            Some(page) => self.emit(page),
            None => debug!(footer = %raw, "footer is not a page marker, ignoring"),
        }
    }

    fn on_table<N: MarkupNode>(&mut self, node: &N) {
        let table_text = linearize_table(node);
        if !table_text.is_empty() {
            self.text.push(table_text);
            self.push_raw(node);
        }
        self.push_id(node);
    }

    fn on_content<N: MarkupNode>(&mut self, node: &N) {
        let text = normalize::collapse_inline(&node.text_segments().join(" "));
        if !text.is_empty() {
            self.text.push(text);
            self.push_raw(node);
        }
        self.push_id(node);
        self.push_nested_ids(node);
    }

    /// Ids of content elements nested anywhere below `node`.
    fn push_nested_ids<N: MarkupNode>(&mut self, node: &N) {
        for child in node.children() {
            if CONTENT_TAGS.contains(&child.tag_name()) {
                self.push_id(&child);
            }
            self.push_nested_ids(&child);
        }
    }

    fn push_id<N: MarkupNode>(&mut self, node: &N) {
        if let Some(id) = node.id().filter(|id| !id.is_empty()) {
            self.ids.push(id.to_string());
        }
    }

    fn push_raw<N: MarkupNode>(&mut self, node: &N) {
        if !self.keep_raw {
            return;
        }
        if let Some(markup) = node.outer_markup() {
            self.raw.push(markup);
        }
    }

    fn emit(&mut self, page_number: u32) {
        let text = normalize::normalize_page_text(&self.text.join("\n"));
        let anchor_ids = normalize::dedup_keep_order(&self.ids);
        let raw = (self.keep_raw && !self.raw.is_empty()).then(|| self.raw.join("\n"));

        debug!(
            page = page_number,
            chars = text.chars().count(),
            anchors = anchor_ids.len(),
            "page emitted"
        );

        self.pages
            .push(PageDocument::new(page_number, text, anchor_ids).with_raw_markup(raw));

        self.text.clear();
        self.ids.clear();
        self.raw.clear();
    }

    fn finish(mut self) -> Vec<PageDocument> {
        if !self.text.is_empty() || !self.ids.is_empty() {
            let inferred = self
                .pages
                .last()
                .map(|p| p.page_number().saturating_add(1))
                .unwrap_or(1);
            debug!(page = inferred, "trailing content without footer, inferring page");
            self.emit(inferred);
        }
        self.pages
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
