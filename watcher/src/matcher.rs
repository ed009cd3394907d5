use crate::corpus::{CorpusEntry, CorpusIndex, StorageError};
use crate::ocr::{OcrBackend, OcrError};
use image::ImageReader;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
enum CorpusEntryError {
    #[error(transparent)]
    Read(#[from] StorageError),
    #[error("failed to decode photo: {0}")]
    Decode(image::ImageError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Finds library photos whose recognized text contains the freshly extracted
/// text. Containment is case-sensitive and whitespace-sensitive; fuzzier
/// policies belong in an explicit extension, not here.
pub struct MatchEngine {
    /// Minimum non-whitespace characters the needle must carry before any
    /// scan happens. Without it, empty text is a substring of every photo's
    /// text and the whole corpus "matches".
    min_match_len: usize,
}

impl MatchEngine {
    pub fn new(min_match_len: usize) -> Self {
        Self { min_match_len }
    }

    /// Scan the corpus in enumeration order and return the matching paths.
    ///
    /// Each entry's text is computed lazily via the index (once per path per
    /// process lifetime). An unreadable or undecodable entry is skipped with
    /// a warning; it never aborts the scan. Entries retired by the dispatcher
    /// are excluded outright.
    pub async fn find_matches(
        &self,
        needle: &str,
        entries: &[CorpusEntry],
        index: &mut CorpusIndex,
        ocr: &dyn OcrBackend,
    ) -> Vec<PathBuf> {
        let meaningful = needle.chars().filter(|c| !c.is_whitespace()).count();
        if meaningful < self.min_match_len {
            debug!(
                chars = meaningful,
                min = self.min_match_len,
                "extracted text below minimum match length, skipping scan"
            );
            return Vec::new();
        }

        let mut matched = Vec::new();
        for entry in entries {
            if index.is_dropped(&entry.path) {
                continue;
            }

            if index.cached_text(&entry.path).is_none() {
                match Self::recognize_entry(entry, ocr).await {
                    Ok(text) => index.insert_text(entry.path.clone(), text),
                    Err(e) => {
                        warn!(photo = %entry.path.display(), error = %e, "skipping unreadable corpus entry");
                        continue;
                    }
                }
            }

            if let Some(text) = index.cached_text(&entry.path) {
                if text.contains(needle) {
                    matched.push(entry.path.clone());
                }
            }
        }

        debug!(
            scanned = entries.len(),
            matched = matched.len(),
            "corpus scan complete"
        );
        matched
    }

    async fn recognize_entry(
        entry: &CorpusEntry,
        ocr: &dyn OcrBackend,
    ) -> Result<String, CorpusEntryError> {
        let bytes = entry.read_bytes()?;
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.decode())
            .map_err(CorpusEntryError::Decode)?;
        let text = ocr.recognize(&img).await?;
        Ok(text)
    }
}
