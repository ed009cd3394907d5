use async_trait::async_trait;
use snapmatch_common::config::CaptureConfig;
use snapmatch_common::frame::Frame;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The capture primitive itself is missing or unreachable.
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    /// The camera ran but failed to produce a usable frame.
    #[error("camera device error: {0}")]
    Device(String),
}

/// One frame on demand. Implementations select the device-specific capture
/// mechanism; the worker only sees this seam.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn acquire(&self, seq: u64) -> Result<Frame, CaptureError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[async_trait]
impl<T: FrameSource + ?Sized> FrameSource for std::sync::Arc<T> {
    async fn acquire(&self, seq: u64) -> Result<Frame, CaptureError> {
        (**self).acquire(seq).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Camera driven by an external CLI (e.g. `termux-camera-photo`) that writes
/// a JPEG to the path given as its last argument. The written artifact is
/// owned by the returned `Frame` and removed when the frame is dropped.
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    staging_dir: PathBuf,
}

impl CommandCamera {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            staging_dir: PathBuf::from(&config.staging_dir),
        }
    }

    /// Unique per-acquisition path so a slow cycle can never collide with a
    /// leftover artifact from an earlier run.
    fn staging_path(&self, seq: u64) -> PathBuf {
        self.staging_dir
            .join(format!("frame_{}_{seq:06}.jpg", std::process::id()))
    }
}

#[async_trait]
impl FrameSource for CommandCamera {
    async fn acquire(&self, seq: u64) -> Result<Frame, CaptureError> {
        let path = self.staging_path(seq);
        debug!(program = self.program, path = %path.display(), "invoking camera command");

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .output()
            .await
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            // The command may have left a partial artifact behind.
            let _ = std::fs::remove_file(&path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if !path.exists() {
            return Err(CaptureError::Device(format!(
                "camera wrote no artifact at {}",
                path.display()
            )));
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        Ok(Frame::from_temp_file(path, now_ms, seq))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Single-frame fetch from an IP camera's frame endpoint. Timeouts bound the
/// acquisition so a dead camera cannot stall the worker indefinitely.
pub struct HttpCamera {
    client: reqwest::Client,
    url: String,
}

impl HttpCamera {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl FrameSource for HttpCamera {
    async fn acquire(&self, seq: u64) -> Result<Frame, CaptureError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptureError::Device(format!(
                "camera returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        debug!(seq, bytes = bytes.len(), "fetched camera frame");

        let now_ms = chrono::Utc::now().timestamp_millis();
        Ok(Frame::from_bytes(bytes.to_vec(), now_ms, seq))
    }

    fn name(&self) -> &str {
        "http"
    }
}
