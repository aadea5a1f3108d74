use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{extract_page_texts, PageText};
use crate::index::{IndexLock, SearchIndex};
use crate::models::{ChunkRecord, IngestionOptions};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A source file that could not be ingested. Reported, never fatal: one bad
/// PDF must not sink the rest of the batch.
#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub document_count: usize,
    pub chunk_count: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Recursively collects PDF paths under `folder`, sorted for a deterministic
/// ingestion order. Extension matching is case-insensitive.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = entry.map_err(|error| {
            IngestError::InvalidArgument(format!(
                "cannot read {}: {error}",
                folder.to_string_lossy()
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Full ingestion pipeline: discover PDFs, extract and chunk each file,
/// embed every chunk, then build and atomically persist the index pair.
///
/// Per-file extraction failures land in `skipped_files`; an embedding
/// failure is fatal so no partially embedded index is ever written. When
/// every discovered file is skipped or empty, no artifacts are touched and
/// the report says so.
pub fn ingest_folder<E: Embedder>(
    folder: &Path,
    embedder: &E,
    options: IngestionOptions,
    index_path: &Path,
    meta_path: &Path,
) -> Result<IngestionReport, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let files = discover_pdf_files(folder)?;
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no PDF files found under {}",
            folder.to_string_lossy()
        )));
    }

    // Held for the whole build so two rebuilds of the same index cannot
    // interleave their artifact writes.
    let _lock = IndexLock::acquire(index_path)?;

    let mut report = IngestionReport::default();
    let mut chunks: Vec<ChunkRecord> = Vec::new();

    for path in &files {
        let source_file = file_name(path)?;

        let pages: Vec<PageText> = match extract_page_texts(path) {
            Ok(pages) => pages,
            Err(error) => {
                report.skipped_files.push(SkippedPdf {
                    path: path.clone(),
                    reason: error.to_string(),
                });
                continue;
            }
        };

        // chunk_index restarts per file so citations are stable within a
        // document regardless of batch composition.
        let (file_chunks, _) = chunk_pages(&pages, &source_file, config, 0)?;
        if file_chunks.is_empty() {
            report.skipped_files.push(SkippedPdf {
                path: path.clone(),
                reason: "no extractable text".to_string(),
            });
            continue;
        }

        report.document_count += 1;
        chunks.extend(file_chunks);
    }

    if chunks.is_empty() {
        return Ok(report);
    }

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts)?;
    for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
        chunk.embedding = embedding;
    }

    let index = SearchIndex::build(&chunks)?;
    index.save(index_path, meta_path)?;

    report.chunk_count = chunks.len();
    Ok(report)
}

fn file_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| IngestError::MissingFileName(path.to_string_lossy().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashedTokenEmbedder;

    fn touch(path: &Path) {
        std::fs::write(path, b"%PDF-1.4\nstub").expect("write");
    }

    #[test]
    fn discovery_is_recursive_sorted_and_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).expect("mkdir");

        touch(&dir.path().join("b.pdf"));
        touch(&dir.path().join("a.PDF"));
        touch(&nested.join("c.pdf"));
        std::fs::write(dir.path().join("notes.txt"), b"not a pdf").expect("write");

        let files = discover_pdf_files(dir.path()).expect("discover");
        let names: Vec<String> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(files.len(), 3);
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn folder_without_pdfs_is_an_invalid_argument() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("readme.md"), b"# docs").expect("write");

        let embedder = HashedTokenEmbedder::default();
        let result = ingest_folder(
            dir.path(),
            &embedder,
            IngestionOptions::default(),
            &dir.path().join("index.json"),
            &dir.path().join("metadata.json"),
        );
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn unreadable_pdf_is_skipped_and_no_artifacts_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("broken.pdf"));

        let index_path = dir.path().join("index.json");
        let meta_path = dir.path().join("metadata.json");
        let embedder = HashedTokenEmbedder::default();

        let report = ingest_folder(
            dir.path(),
            &embedder,
            IngestionOptions::default(),
            &index_path,
            &meta_path,
        )
        .expect("report");

        assert_eq!(report.document_count, 0);
        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.skipped_files[0]
            .path
            .to_string_lossy()
            .ends_with("broken.pdf"));
        assert!(!index_path.exists());
        assert!(!meta_path.exists());
        // The rebuild lock was released with the failed run.
        assert!(!dir.path().join("index.json.lock").exists());
    }

    #[test]
    fn invalid_chunk_config_fails_before_touching_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("doc.pdf"));

        let embedder = HashedTokenEmbedder::default();
        let result = ingest_folder(
            dir.path(),
            &embedder,
            IngestionOptions {
                chunk_size: 100,
                chunk_overlap: 100,
            },
            &dir.path().join("index.json"),
            &dir.path().join("metadata.json"),
        );
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn concurrent_rebuild_of_the_same_index_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("doc.pdf"));

        let index_path = dir.path().join("index.json");
        let held = IndexLock::acquire(&index_path).expect("lock");

        let embedder = HashedTokenEmbedder::default();
        let result = ingest_folder(
            dir.path(),
            &embedder,
            IngestionOptions::default(),
            &index_path,
            &dir.path().join("metadata.json"),
        );
        assert!(matches!(result, Err(IngestError::BuildInProgress(_))));
        drop(held);
    }
}
