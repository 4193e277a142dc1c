//! End-to-end `run` pipeline: document → pages → enrichment → chunks → tags → files.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{info, instrument};

use policytag_artifacts::{
    PageWriteReport, RunManifest, document_dir, sha256_hex, write_chunk_files, write_manifest,
    write_page_files, write_summary,
};
use policytag_pages::{ReconstructOptions, reconstruct_html};
use policytag_shared::{
    Chunk, EnrichedPage, PageFormat, PolicyTagError, ProductTable, Result, TermRanges,
};

use crate::chunker::Chunker;
use crate::enrichment::enrich_pages;
use crate::parse::DocumentParser;
use crate::summary::{TaggingSummary, summarize};
use crate::tagger::{CacheStats, Classifier, TagCache, Tagger, TaggingProgress};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Where a policy document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentInput {
    /// Original PDF, sent to the document-parse service.
    Pdf(PathBuf),
    /// HTML already produced by the parse service.
    Html(PathBuf),
}

impl DocumentInput {
    /// `.html`/`.htm` files are taken as pre-parsed; anything else is a PDF.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
        if is_html {
            Self::Html(path)
        } else {
            Self::Pdf(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Pdf(p) | Self::Html(p) => p,
        }
    }
}

/// A document ready for reconstruction.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Name used for product lookup and output layout.
    pub file_name: String,
    pub html: String,
    /// Parse-service fields copied onto every page.
    pub source: Map<String, Value>,
    pub sha256: String,
}

/// Read `input`, sending PDFs through `parser`.
///
/// `file_name` overrides the on-disk name; useful when an HTML dump was saved
/// under a different name than the PDF it came from.
#[instrument(skip_all, fields(path = %input.path().display()))]
pub async fn load_document(
    input: &DocumentInput,
    file_name: Option<&str>,
    parser: Option<&DocumentParser>,
) -> Result<LoadedDocument> {
    let path = input.path();
    let file_name = match file_name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PolicyTagError::validation(format!("no file name in {}", path.display()))
            })?
            .to_string(),
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PolicyTagError::io(path, e))?;
    let sha256 = sha256_hex(&bytes);

    let (html, source) = match input {
        DocumentInput::Html(_) => {
            let html = String::from_utf8(bytes).map_err(|e| {
                PolicyTagError::parse(format!("{} is not UTF-8: {e}", path.display()))
            })?;
            let mut source = Map::new();
            source.insert("file_name".into(), Value::from(file_name.as_str()));
            (html, source)
        }
        DocumentInput::Pdf(_) => {
            let parser = parser.ok_or_else(|| {
                PolicyTagError::config("a PDF input needs the document-parse service")
            })?;
            let parsed = parser.parse_bytes(&file_name, bytes).await?;
            (parsed.html, parsed.source)
        }
    };

    Ok(LoadedDocument {
        file_name,
        html,
        source,
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Reconstruct pages from parsed HTML and enrich them.
pub fn build_pages(
    doc: &LoadedDocument,
    ranges: &TermRanges,
    products: &ProductTable,
    opts: &ReconstructOptions,
) -> Result<Vec<EnrichedPage>> {
    let pages = reconstruct_html(&doc.html, &doc.file_name, opts)?;
    enrich_pages(&pages, ranges, &doc.file_name, products, &doc.source)
}

/// Result of [`tag_and_write`].
#[derive(Debug, Clone)]
pub struct TagReport {
    pub file_name: String,
    pub chunk_count: usize,
    pub llm_used: usize,
    pub summary: TaggingSummary,
    pub summary_path: PathBuf,
    /// Cache activity during this call only.
    pub cache: CacheStats,
}

/// Tag `chunks`, write one JSON file per chunk plus the tagging summary.
///
/// The summary lands next to the chunks of the first chunk's document.
#[instrument(skip_all, fields(chunks = chunks.len()))]
pub async fn tag_and_write<C: Classifier>(
    chunks: Vec<Chunk>,
    tagger: &Tagger<C>,
    cache: &mut TagCache,
    output_dir: &Path,
    progress: &dyn TaggingProgress,
) -> Result<TagReport> {
    let file_name = chunks
        .first()
        .ok_or_else(|| PolicyTagError::validation("no chunks to tag"))?
        .file_name()
        .ok_or_else(|| PolicyTagError::validation("chunk has no doc.file_name"))?
        .to_string();

    let before = cache.stats();
    let outcome = tagger.tag_chunks(chunks, cache, progress).await?;
    let after = cache.stats();

    write_chunk_files(output_dir, &outcome.chunks)?;

    let summary = summarize(&outcome.chunks, tagger.settings().label_set);
    let summary_path = write_summary(output_dir, &file_name, &summary)?;

    info!(
        chunks = outcome.chunks.len(),
        llm_used = outcome.llm_used,
        summary = %summary_path.display(),
        "tagging complete"
    );

    Ok(TagReport {
        file_name,
        chunk_count: outcome.chunks.len(),
        llm_used: outcome.llm_used,
        summary,
        summary_path,
        cache: CacheStats {
            hits: after.hits - before.hits,
            misses: after.misses - before.misses,
        },
    })
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Configuration for [`run_document`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub ranges: TermRanges,
    pub page_format: PageFormat,
    pub reconstruct: ReconstructOptions,
    /// See [`load_document`].
    pub file_name: Option<String>,
    pub tool_version: String,
}

/// Result of [`run_document`].
#[derive(Debug)]
pub struct RunReport {
    pub document_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: RunManifest,
    pub pages: PageWriteReport,
    pub summary: TaggingSummary,
    pub elapsed: Duration,
}

/// Progress callback for a full run.
pub trait RunProgress: TaggingProgress {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl TaggingProgress for SilentProgress {
    fn chunks_tagged(&self, _done: usize, _total: usize, _llm_used: usize) {}
}

impl RunProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &RunReport) {}
}

/// Run the whole pipeline over one document.
///
/// A policy that needs a classifier without one configured fails before
/// any input is read.
///
/// 1. Load: read HTML, or parse the PDF
/// 2. Reconstruct and enrich pages
/// 3. Write page files
/// 4. Chunk, tag, write chunk files and summary
/// 5. Write the run manifest
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(path = %input.path().display()))]
pub async fn run_document<C: Classifier, P: RunProgress>(
    input: &DocumentInput,
    opts: &RunOptions,
    parser: Option<&DocumentParser>,
    products: &ProductTable,
    chunker: &dyn Chunker,
    tagger: &Tagger<C>,
    cache: &mut TagCache,
    progress: &P,
) -> Result<RunReport> {
    let start = Instant::now();
    tagger.ensure_ready()?;

    // --- Phase 1: Load ---
    progress.phase("Loading document");
    let doc = load_document(input, opts.file_name.as_deref(), parser).await?;

    let mut manifest = RunManifest::begin(&opts.tool_version, &doc.file_name);
    manifest.source_sha256 = Some(doc.sha256.clone());
    manifest.llm_policy = tagger.settings().llm_policy.to_string();
    manifest.label_set = tagger.settings().label_set.as_str().to_string();

    info!(run_id = %manifest.run_id, file_name = %doc.file_name, "starting run");

    // --- Phase 2: Pages ---
    progress.phase("Reconstructing pages");
    let pages = build_pages(&doc, &opts.ranges, products, &opts.reconstruct)?;
    manifest.page_count = pages.len();

    progress.phase("Writing page files");
    let page_report = write_page_files(&opts.output_dir, &pages, opts.page_format)?;

    // --- Phase 3: Chunk + tag ---
    progress.phase("Chunking pages");
    let chunks = chunker.chunk(&pages);
    if chunks.is_empty() {
        return Err(PolicyTagError::EmptyDocument {
            file_name: doc.file_name.clone(),
        });
    }

    progress.phase("Tagging chunks");
    let tag_report = tag_and_write(chunks, tagger, cache, &opts.output_dir, progress).await?;
    manifest.chunk_count = tag_report.chunk_count;
    manifest.llm_used = tag_report.llm_used;
    manifest.cache_hits = tag_report.cache.hits;
    manifest.cache_misses = tag_report.cache.misses;

    // --- Phase 4: Manifest ---
    progress.phase("Writing manifest");
    let dir = document_dir(&opts.output_dir, &doc.file_name);
    let manifest_path = write_manifest(&dir, &mut manifest)?;

    let report = RunReport {
        document_dir: dir,
        manifest_path,
        manifest,
        pages: page_report,
        summary: tag_report.summary,
        elapsed: start.elapsed(),
    };

    progress.done(&report);

    info!(
        run_id = %report.manifest.run_id,
        pages = report.manifest.page_count,
        chunks = report.manifest.chunk_count,
        llm_used = report.manifest.llm_used,
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
