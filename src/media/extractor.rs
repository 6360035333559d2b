//! Workflow extractor.
//!
//! Search order, stopping as soon as a ui document turns up:
//! 1. PNG text chunks `workflow` then `prompt` (images)
//! 2. `workflow:{` marker inside the EXIF block (images)
//! 3. brace scan of the whole EXIF block (images, only while nothing was found)
//! 4. container tags from the probe report (videos)
//! 5. brace scan of the raw file (any kind)
//!
//! An api document is kept as the fallback while the search continues.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::scanner::{scan_bytes, JsonCandidates};
use super::MediaError;
use crate::adapters::ProbeMetadata;
use crate::domain::{classify, MediaKind, WorkflowDocument, WorkflowFormat};

/// PNG text keys that carry workflows, in lookup order
const PNG_TEXT_KEYS: [&str; 2] = ["workflow", "prompt"];

const EXIF_MARKER: &str = "workflow:{";

/// Where a workflow was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowSource {
    PngText(String),
    ExifMarker,
    ExifScan,
    ContainerTag(String),
    RawScan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedWorkflow {
    pub document: WorkflowDocument,
    pub source: WorkflowSource,
}

impl ExtractedWorkflow {
    pub fn format(&self) -> WorkflowFormat {
        self.document.format()
    }
}

/// Best candidate seen so far
#[derive(Debug, Default)]
struct Search {
    best: Option<ExtractedWorkflow>,
}

impl Search {
    /// Offer a candidate. Returns true once a ui document has been found.
    fn offer(&mut self, value: &Value, source: impl FnOnce() -> WorkflowSource) -> bool {
        match classify(value) {
            Some(document @ WorkflowDocument::Ui(_)) => {
                self.best = Some(ExtractedWorkflow {
                    document,
                    source: source(),
                });
                true
            }
            Some(document) => {
                if self.best.is_none() {
                    self.best = Some(ExtractedWorkflow {
                        document,
                        source: source(),
                    });
                }
                false
            }
            None => false,
        }
    }

    fn found_ui(&self) -> bool {
        matches!(
            self.best,
            Some(ExtractedWorkflow {
                document: WorkflowDocument::Ui(_),
                ..
            })
        )
    }
}

/// Locate the embedded workflow of a file, if any.
///
/// `container` is the probe report the analyzer already took for a video.
pub async fn extract_workflow(
    path: &Path,
    kind: MediaKind,
    container: Option<&ProbeMetadata>,
) -> Option<ExtractedWorkflow> {
    let mut search = Search::default();

    if kind.is_image() {
        search = run_blocking(path, search, search_image_metadata).await;
    } else if let (MediaKind::Video, Some(meta)) = (kind, container) {
        search_container_tags(meta, &mut search);
    }

    if !search.found_ui() {
        search = run_blocking(path, search, search_raw_bytes).await;
    }

    search.best
}

async fn run_blocking(
    path: &Path,
    search: Search,
    step: fn(&Path, &mut Search) -> Result<(), MediaError>,
) -> Search {
    let owned: PathBuf = path.to_path_buf();
    let task = tokio::task::spawn_blocking(move || {
        let mut search = search;
        if let Err(e) = step(&owned, &mut search) {
            tracing::debug!("Workflow search step failed for {}: {}", owned.display(), e);
        }
        search
    });

    match task.await {
        Ok(search) => search,
        Err(e) => {
            tracing::warn!("Workflow search task failed for {}: {}", path.display(), e);
            Search::default()
        }
    }
}

fn search_image_metadata(path: &Path, search: &mut Search) -> Result<(), MediaError> {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
    {
        for (key, text) in png_text_chunks(path) {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                if search.offer(&value, || WorkflowSource::PngText(key.clone())) {
                    return Ok(());
                }
            }
        }
    }

    let Some(exif) = raw_exif(path) else {
        return Ok(());
    };

    let text = String::from_utf8_lossy(&exif);
    if let Some(pos) = text.find(EXIF_MARKER) {
        let tail = &text[pos + EXIF_MARKER.len() - 1..];
        for value in JsonCandidates::new(tail) {
            if classify(&value).is_some() {
                if search.offer(&value, || WorkflowSource::ExifMarker) {
                    return Ok(());
                }
                break;
            }
        }
    }

    if search.best.is_none() {
        for value in JsonCandidates::new(&text) {
            if search.offer(&value, || WorkflowSource::ExifScan) {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// `workflow` and `prompt` text chunks, in that order
fn png_text_chunks(path: &Path) -> Vec<(String, String)> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    let decoder = png::Decoder::new(BufReader::new(file));
    let reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!("PNG header unreadable for {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    let info = reader.info();

    let mut chunks = Vec::new();
    for key in PNG_TEXT_KEYS {
        let text = info
            .uncompressed_latin1_text
            .iter()
            .find(|c| c.keyword == key)
            .map(|c| c.text.clone())
            .or_else(|| {
                info.compressed_latin1_text
                    .iter()
                    .find(|c| c.keyword == key)
                    .and_then(|c| c.get_text().ok())
            })
            .or_else(|| {
                info.utf8_text
                    .iter()
                    .find(|c| c.keyword == key)
                    .and_then(|c| c.get_text().ok())
            });

        if let Some(text) = text {
            chunks.push((key.to_string(), text));
        }
    }

    chunks
}

/// Raw EXIF block of a JPEG, PNG, WebP or TIFF file
fn raw_exif(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()
        .map(|exif| exif.buf().to_vec())
}

fn search_container_tags(meta: &ProbeMetadata, search: &mut Search) {
    for (tag, raw) in &meta.tags {
        let raw = raw.trim();
        if !raw.starts_with('{') {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            if search.offer(&value, || WorkflowSource::ContainerTag(tag.clone())) {
                return;
            }
        }
    }
}

fn search_raw_bytes(path: &Path, search: &mut Search) -> Result<(), MediaError> {
    let bytes = std::fs::read(path)?;
    for value in scan_bytes(&bytes) {
        if search.offer(&value, || WorkflowSource::RawScan) {
            break;
        }
    }
    Ok(())
}
