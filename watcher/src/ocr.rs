use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::DynamicImage;
use snapmatch_common::config::OcrConfig;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to encode image for OCR: {0}")]
    Encode(image::ImageError),
    #[error("OCR backend unavailable: {0}")]
    Spawn(std::io::Error),
    #[error("OCR backend I/O error: {0}")]
    Io(std::io::Error),
    #[error("OCR backend exited with failure: {0}")]
    Backend(String),
}

/// Best-effort text extraction from an image. Backends may fail; callers on
/// the capture path go through [`recognize_degraded`] instead of handling
/// errors themselves.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[async_trait]
impl<T: OcrBackend + ?Sized> OcrBackend for std::sync::Arc<T> {
    async fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        (**self).recognize(image).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Wraps the `tesseract` CLI: encodes the image to PNG in memory and pipes it
/// through `tesseract stdin stdout -l <lang>`.
pub struct TesseractOcr {
    command: String,
    lang: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            lang: config.lang.clone(),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractOcr {
    async fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png_data = Vec::new();
        image
            .write_with_encoder(PngEncoder::new(&mut png_data))
            .map_err(OcrError::Encode)?;

        let mut child = Command::new(&self.command)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(OcrError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png_data).await.map_err(OcrError::Io)?;
            // Dropping stdin closes the pipe so the backend sees EOF.
        }

        let output = child.wait_with_output().await.map_err(OcrError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Backend(stderr.trim().to_string()));
        }

        // The CLI terminates its output with newlines; raw containment
        // matching would never fire against them, so trim the tail once here.
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string())
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// OCR quality is out of the pipeline's hands: any backend error degrades to
/// empty text with a recorded warning instead of aborting the cycle.
pub async fn recognize_degraded(backend: &dyn OcrBackend, image: &DynamicImage) -> String {
    match backend.recognize(image).await {
        Ok(text) => text,
        Err(e) => {
            warn!(backend = backend.name(), error = %e, "OCR failed, degrading to empty text");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    struct FailingBackend;

    #[async_trait]
    impl OcrBackend for FailingBackend {
        async fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Err(OcrError::Backend("model exploded".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn blank_image() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([255])))
    }

    #[tokio::test]
    async fn missing_backend_binary_is_a_spawn_error() {
        let backend = TesseractOcr::new(&OcrConfig {
            command: "/nonexistent/tesseract".into(),
            lang: "eng".into(),
        });
        assert!(matches!(
            backend.recognize(&blank_image()).await,
            Err(OcrError::Spawn(_))
        ));
    }

    #[tokio::test]
    async fn degraded_recognition_never_fails() {
        let text = recognize_degraded(&FailingBackend, &blank_image()).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn backend_failure_surfaces_stderr() {
        // `sh` called with tesseract's argument shape exits non-zero and
        // complains on stderr, exercising the Backend error path.
        let backend = TesseractOcr::new(&OcrConfig {
            command: "/bin/sh".into(),
            lang: "eng".into(),
        });
        let result = backend.recognize(&blank_image()).await;
        assert!(matches!(result, Err(OcrError::Backend(_)) | Err(OcrError::Io(_))));
    }
}
