//! On-disk outputs for a processed policy document.
//!
//! Everything for one source file lives under `<output_dir>/<stem>/`:
//!
//! ```text
//! <output_dir>/<stem>/
//! ├── manifest.json
//! ├── <stem>_<page>.<ext>              one per enriched page, never overwritten
//! └── chunks/
//!     ├── <stem>_000000.json           one per tagged chunk
//!     └── <stem>_tagging_summary.json
//! ```
//!
//! `<stem>` is the file name up to its first `.`.

mod manifest;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use policytag_shared::{Chunk, EnrichedPage, PageFormat, PolicyTagError, Result};

pub use manifest::{MANIFEST_FILE, RunManifest, read_manifest, write_manifest};

/// Subdirectory holding chunk files.
pub const CHUNKS_DIR: &str = "chunks";

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// File name up to the first `.` (`meritz_1_x.v2.pdf` → `meritz_1_x`).
pub fn document_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Output directory for one source document.
pub fn document_dir(output_dir: &Path, file_name: &str) -> PathBuf {
    output_dir.join(document_stem(file_name))
}

/// Path of the tagging summary for one source document.
pub fn summary_path(output_dir: &Path, file_name: &str) -> PathBuf {
    let stem = document_stem(file_name);
    output_dir
        .join(stem)
        .join(CHUNKS_DIR)
        .join(format!("{stem}_tagging_summary.json"))
}

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Page files
// ---------------------------------------------------------------------------

/// Outcome of [`write_page_files`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWriteReport {
    pub written: usize,
    /// Files that already existed and were left untouched.
    pub skipped: usize,
}

/// Write each page to `<stem>_<page>.<ext>`, skipping existing files.
///
/// HTML files hold the page's raw markup when it was kept; every other case
/// writes the normalized text.
#[instrument(skip_all, fields(pages = pages.len(), format = format.extension()))]
pub fn write_page_files(
    output_dir: &Path,
    pages: &[EnrichedPage],
    format: PageFormat,
) -> Result<PageWriteReport> {
    let mut report = PageWriteReport::default();

    for page in pages {
        let file_name = &page.metadata.doc.file_name;
        let dir = document_dir(output_dir, file_name);
        create_dir(&dir)?;

        let path = dir.join(format!(
            "{}_{}.{}",
            document_stem(file_name),
            page.metadata.doc.page,
            format.extension()
        ));
        if path.exists() {
            debug!(path = %path.display(), "page file exists, skipping");
            report.skipped += 1;
            continue;
        }

        let body = match (format, &page.raw_markup) {
            (PageFormat::Html, Some(raw)) => raw,
            _ => &page.page_content,
        };
        std::fs::write(&path, body).map_err(|e| PolicyTagError::io(&path, e))?;
        report.written += 1;
    }

    info!(written = report.written, skipped = report.skipped, "page files written");
    Ok(report)
}

// ---------------------------------------------------------------------------
// Chunk files
// ---------------------------------------------------------------------------

fn chunk_number(chunk: &Chunk) -> Result<&str> {
    chunk
        .metadata
        .get("indexing")
        .and_then(|i| i.get("chunk_id"))
        .and_then(Value::as_str)
        .and_then(|id| id.rsplit('_').next())
        .ok_or_else(|| PolicyTagError::validation("chunk has no indexing.chunk_id"))
}

/// Write each tagged chunk to `chunks/<stem>_<nnnnnn>.json`, overwriting.
#[instrument(skip_all, fields(chunks = chunks.len()))]
pub fn write_chunk_files(output_dir: &Path, chunks: &[Chunk]) -> Result<usize> {
    for chunk in chunks {
        let file_name = chunk
            .file_name()
            .ok_or_else(|| PolicyTagError::validation("chunk has no doc.file_name"))?;
        let dir = document_dir(output_dir, file_name).join(CHUNKS_DIR);
        create_dir(&dir)?;

        let path = dir.join(format!(
            "{}_{}.json",
            document_stem(file_name),
            chunk_number(chunk)?
        ));
        write_json(&path, chunk)?;
    }

    info!(count = chunks.len(), "chunk files written");
    Ok(chunks.len())
}

/// Write the combined tagging summary next to the chunk files.
pub fn write_summary<T: Serialize>(output_dir: &Path, file_name: &str, summary: &T) -> Result<PathBuf> {
    let path = summary_path(output_dir, file_name);
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    write_json(&path, summary)?;
    Ok(path)
}

/// Load chunks produced by an external splitter: a JSON array of
/// `{ "page_content": ..., "metadata": {...} }` objects.
pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path).map_err(|e| PolicyTagError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        PolicyTagError::parse(format!("invalid chunk file {}: {e}", path.display()))
    })
}

/// Load enriched pages previously dumped as a JSON array.
pub fn read_pages(path: &Path) -> Result<Vec<EnrichedPage>> {
    let content = std::fs::read_to_string(path).map_err(|e| PolicyTagError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        PolicyTagError::parse(format!("invalid page file {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PolicyTagError::io(dir, e))
}

/// Write pretty JSON via a temp file and rename.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PolicyTagError::validation(format!("invalid output path {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| PolicyTagError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PolicyTagError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use policytag_shared::{DocInfo, PageMetadata, TermType};
    use serde_json::{Map, json};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "policytag-artifacts-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn page(n: u32, text: &str) -> EnrichedPage {
        EnrichedPage {
            page_content: text.into(),
            metadata: PageMetadata {
                source: Map::new(),
                doc: DocInfo {
                    doc_type: "terms".into(),
                    file_name: "meritz_1_maum.pdf".into(),
                    insurer_code: "meritz".into(),
                    insurer_name: "메리츠화재".into(),
                    product_code: "1".into(),
                    product_name: "메리츠 마음든든 반려동물보험".into(),
                    total_pages: 2,
                    page: n,
                    anchor_ids: vec![],
                },
                term_type: TermType::Basic,
            },
            raw_markup: None,
        }
    }

    fn tagged_chunk(idx: usize) -> Chunk {
        let mut metadata = Map::new();
        metadata.insert("doc".into(), json!({ "file_name": "meritz_1_maum.pdf" }));
        metadata.insert("indexing".into(), json!({ "chunk_id": format!("chunk_{idx:06}") }));
        Chunk::new(format!("chunk {idx}"), metadata)
    }

    #[test]
    fn stem_stops_at_first_dot() {
        assert_eq!(document_stem("meritz_1_maum.pdf"), "meritz_1_maum");
        assert_eq!(document_stem("meritz_1_maum.v2.pdf"), "meritz_1_maum");
        assert_eq!(document_stem("noext"), "noext");
    }

    #[test]
    fn page_files_are_not_overwritten() {
        let tmp = temp_dir();
        let pages = vec![page(21, "제1조"), page(22, "제2조")];

        let first = write_page_files(&tmp, &pages, PageFormat::Text).unwrap();
        assert_eq!(first, PageWriteReport { written: 2, skipped: 0 });

        let path = tmp.join("meritz_1_maum").join("meritz_1_maum_21.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "제1조");

        let edited = vec![page(21, "changed"), page(22, "changed")];
        let second = write_page_files(&tmp, &edited, PageFormat::Text).unwrap();
        assert_eq!(second, PageWriteReport { written: 0, skipped: 2 });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "제1조");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn page_extension_follows_format() {
        let tmp = temp_dir();
        write_page_files(&tmp, &[page(3, "x")], PageFormat::Html).unwrap();
        assert!(tmp.join("meritz_1_maum/meritz_1_maum_3.html").exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn html_pages_prefer_raw_markup() {
        let tmp = temp_dir();
        let mut with_raw = page(4, "제4조");
        with_raw.raw_markup = Some("<p id=\"9\">제4조</p>".into());

        write_page_files(&tmp, &[with_raw.clone()], PageFormat::Html).unwrap();
        let html = std::fs::read_to_string(tmp.join("meritz_1_maum/meritz_1_maum_4.html")).unwrap();
        assert_eq!(html, "<p id=\"9\">제4조</p>");

        write_page_files(&tmp, &[with_raw], PageFormat::Markdown).unwrap();
        let md = std::fs::read_to_string(tmp.join("meritz_1_maum/meritz_1_maum_4.md")).unwrap();
        assert_eq!(md, "제4조");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn chunk_files_round_trip() {
        let tmp = temp_dir();
        let chunks = vec![tagged_chunk(0), tagged_chunk(1)];

        assert_eq!(write_chunk_files(&tmp, &chunks).unwrap(), 2);
        let path = tmp.join("meritz_1_maum/chunks/meritz_1_maum_000001.json");
        let loaded: Chunk = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, chunks[1]);

        // no temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn chunk_without_id_is_rejected() {
        let tmp = temp_dir();
        let mut chunk = tagged_chunk(0);
        chunk.metadata.remove("indexing");
        let err = write_chunk_files(&tmp, &[chunk]).unwrap_err();
        assert!(matches!(err, PolicyTagError::Validation { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn summary_and_chunk_reader() {
        let tmp = temp_dir();
        let path = write_summary(&tmp, "meritz_1_maum.pdf", &json!({ "clause_type": { "total": 0 } }))
            .unwrap();
        assert!(path.ends_with("meritz_1_maum/chunks/meritz_1_maum_tagging_summary.json"));

        let input = tmp.join("chunks.json");
        std::fs::write(&input, serde_json::to_string(&vec![tagged_chunk(4)]).unwrap()).unwrap();
        let chunks = read_chunks(&input).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_content, "chunk 4");

        std::fs::write(&input, "{ not json").unwrap();
        assert!(matches!(read_chunks(&input).unwrap_err(), PolicyTagError::Parse { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sha256_is_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
