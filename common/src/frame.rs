use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a frame's image bytes live — a temporary file written by an external
/// camera command, or memory for sources that hand us the bytes directly.
#[derive(Debug)]
pub enum FramePayload {
    /// Temporary artifact on disk. The frame owns it and removes it on drop.
    Temp { path: PathBuf },
    /// In-memory JPEG (from the HTTP camera).
    Memory(Vec<u8>),
}

/// One captured camera frame with timestamp metadata.
///
/// A `Frame` is owned by exactly one capture cycle. Dropping it releases the
/// temporary artifact (if any), so cleanup happens on every exit path of the
/// cycle whether processing succeeded, failed, or panicked.
#[derive(Debug)]
pub struct Frame {
    payload: FramePayload,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    /// Frame backed by a camera-written temp file; ownership of the file
    /// transfers to the frame.
    pub fn from_temp_file(path: PathBuf, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            payload: FramePayload::Temp { path },
            captured_at_ms,
            seq,
        }
    }

    /// Frame backed by in-memory bytes; nothing to clean up.
    pub fn from_bytes(bytes: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            payload: FramePayload::Memory(bytes),
            captured_at_ms,
            seq,
        }
    }

    /// Path of the temporary artifact, if this frame has one.
    pub fn artifact_path(&self) -> Option<&Path> {
        match &self.payload {
            FramePayload::Temp { path } => Some(path),
            FramePayload::Memory(_) => None,
        }
    }

    /// Raw image bytes, reading the temp artifact if necessary.
    pub fn read_bytes(&self) -> Result<Vec<u8>, FrameError> {
        match &self.payload {
            FramePayload::Temp { path } => std::fs::read(path)
                .map_err(|e| FrameError::ReadArtifact(path.display().to_string(), e)),
            FramePayload::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn captured_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let FramePayload::Temp { path } = &self.payload {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(seq = self.seq, path = %path.display(), "removed frame artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(seq = self.seq, path = %path.display(), error = %e, "failed to remove frame artifact");
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to read frame artifact {0}: {1}")]
    ReadArtifact(String, std::io::Error),
}
