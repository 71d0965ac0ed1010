//! Transform orchestration: validate, normalize, generate, persist.
//!
//! The upload and the temp artifact are removed on every exit path via drop
//! guards; a result artifact is created only on success.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::normalize;
use crate::provider::{GenerationError, GenerationRequest, ImageGenerator};
use crate::styles::StyleCatalog;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown style or empty prompt")]
    UnknownStyle,

    #[error("provider call exceeded its deadline")]
    UpstreamTimeout,

    #[error("provider rate limit hit")]
    UpstreamRateLimit,

    #[error("no image data in provider response")]
    NoResult,

    #[error("provider request failed: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GenerationError> for TransformError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout => TransformError::UpstreamTimeout,
            GenerationError::RateLimited => TransformError::UpstreamRateLimit,
            GenerationError::NoResult => TransformError::NoResult,
            GenerationError::Upstream(msg) => TransformError::Upstream(msg),
        }
    }
}

/// Deletes the wrapped file on drop. Removal failures are ignored; the
/// retention sweeper is the backstop.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

pub struct TransformOrchestrator {
    catalog: StyleCatalog,
    store: Arc<ArtifactStore>,
    generator: Arc<dyn ImageGenerator>,
    target_dim: u32,
}

impl TransformOrchestrator {
    pub fn new(
        catalog: StyleCatalog,
        store: Arc<ArtifactStore>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            catalog,
            store,
            generator,
            target_dim: normalize::TARGET_DIM,
        }
    }

    /// Override the normalization edge length (tests use small images).
    pub fn with_target_dim(mut self, dim: u32) -> Self {
        self.target_dim = dim;
        self
    }

    /// Resolution order for the effective prompt: known catalog key, then
    /// the style text itself as a raw prompt, then the `prompt` field.
    pub fn resolve_prompt(
        &self,
        style: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String, TransformError> {
        if let Some(s) = style.map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(known) = self.catalog.get(s) {
                return Ok(known.to_string());
            }
            return Ok(s.to_string());
        }
        if let Some(p) = prompt.map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(p.to_string());
        }
        if style.is_some() {
            Err(TransformError::UnknownStyle)
        } else {
            Err(TransformError::Validation(
                "Missing image or style/prompt".to_string(),
            ))
        }
    }

    /// Run one transform end to end; returns the result image id.
    pub async fn transform(
        &self,
        upload_path: PathBuf,
        style: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String, TransformError> {
        let _upload = RemoveOnDrop(upload_path.clone());

        let prompt = self.resolve_prompt(style, prompt)?;

        let bytes = tokio::fs::read(&upload_path)
            .await
            .map_err(|e| TransformError::Internal(format!("reading upload: {e}")))?;
        if bytes.is_empty() {
            return Err(TransformError::Validation("Empty image upload".to_string()));
        }

        let dim = self.target_dim;
        let png = tokio::task::spawn_blocking(move || normalize::normalize_to_png(&bytes, dim))
            .await
            .map_err(|e| TransformError::Internal(format!("normalization task failed: {e}")))?
            .map_err(|e| TransformError::Validation(format!("Unreadable image: {e}")))?;

        let temp_path = self
            .store
            .save_temp(&png)
            .map_err(|e| TransformError::Internal(format!("writing temp artifact: {e}")))?;
        let _temp = RemoveOnDrop(temp_path);

        let generated = self
            .generator
            .edit(GenerationRequest::new(png, prompt))
            .await?;

        let image_id = self
            .store
            .save_result(&generated.bytes)
            .map_err(|e| TransformError::Internal(format!("writing result artifact: {e}")))?;
        Ok(image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GeneratedImage;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    struct StaticGenerator {
        bytes: Vec<u8>,
        seen_prompts: Mutex<Vec<String>>,
    }

    impl StaticGenerator {
        fn new(bytes: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                bytes,
                seen_prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ImageGenerator for StaticGenerator {
        async fn edit(
            &self,
            request: GenerationRequest,
        ) -> Result<GeneratedImage, GenerationError> {
            self.seen_prompts.lock().unwrap().push(request.prompt);
            Ok(GeneratedImage {
                bytes: self.bytes.clone(),
            })
        }
    }

    struct FailingGenerator(GenerationError);

    #[async_trait]
    impl ImageGenerator for FailingGenerator {
        async fn edit(&self, _: GenerationRequest) -> Result<GeneratedImage, GenerationError> {
            Err(self.0.clone())
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([20, 120, 220]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn orchestrator(
        generator: Arc<dyn ImageGenerator>,
    ) -> (TransformOrchestrator, Arc<ArtifactStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path()).unwrap());
        let orch = TransformOrchestrator::new(StyleCatalog::builtin(), Arc::clone(&store), generator)
            .with_target_dim(16);
        (orch, store, dir)
    }

    fn dir_entries(path: &std::path::Path) -> usize {
        fs::read_dir(path).unwrap().count()
    }

    #[tokio::test]
    async fn success_persists_result_and_cleans_everything_else() {
        let generator = StaticGenerator::new(b"generated output".to_vec());
        let (orch, store, _dir) = orchestrator(generator);

        let upload = store.save_upload("png", &sample_png()).unwrap();
        let image_id = orch
            .transform(upload.clone(), Some("og-gigachad"), None)
            .await
            .unwrap();

        let result = store.result_path(&image_id).unwrap();
        assert_eq!(fs::read(result).unwrap(), b"generated output");
        assert!(!upload.is_file());
        assert_eq!(dir_entries(store.tmp_dir()), 0);
    }

    #[tokio::test]
    async fn catalog_key_resolves_to_catalog_prompt() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, store, _dir) = orchestrator(generator.clone());

        let upload = store.save_upload("png", &sample_png()).unwrap();
        orch.transform(upload, Some("og-gigachad"), None)
            .await
            .unwrap();

        let seen = generator.seen_prompts.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("gigachad"));
        assert_ne!(seen[0], "og-gigachad");
    }

    #[tokio::test]
    async fn unknown_style_text_is_used_verbatim_as_prompt() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, store, _dir) = orchestrator(generator.clone());

        let upload = store.save_upload("png", &sample_png()).unwrap();
        orch.transform(upload, Some("freeform text"), None)
            .await
            .unwrap();

        assert_eq!(
            generator.seen_prompts.lock().unwrap().as_slice(),
            &["freeform text".to_string()]
        );
    }

    #[tokio::test]
    async fn prompt_field_is_the_fallback_after_style() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, store, _dir) = orchestrator(generator.clone());

        let upload = store.save_upload("png", &sample_png()).unwrap();
        orch.transform(upload, None, Some("painterly sunset"))
            .await
            .unwrap();

        assert_eq!(
            generator.seen_prompts.lock().unwrap().as_slice(),
            &["painterly sunset".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_style_and_prompt_is_a_validation_error() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, store, _dir) = orchestrator(generator);

        let upload = store.save_upload("png", &sample_png()).unwrap();
        let err = orch.transform(upload.clone(), None, None).await.unwrap_err();

        assert!(matches!(err, TransformError::Validation(_)));
        // No artifacts survive a failed transform.
        assert!(!upload.is_file());
        assert_eq!(dir_entries(store.tmp_dir()), 0);
        assert_eq!(dir_entries(store.results_dir()), 0);
    }

    #[tokio::test]
    async fn blank_style_with_no_prompt_is_unknown_style() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, _store, _dir) = orchestrator(generator);

        let err = orch.resolve_prompt(Some("   "), None).unwrap_err();
        assert!(matches!(err, TransformError::UnknownStyle));
    }

    #[tokio::test]
    async fn provider_failure_leaves_no_artifacts_behind() {
        let generator = Arc::new(FailingGenerator(GenerationError::Timeout));
        let (orch, store, _dir) = orchestrator(generator);

        let upload = store.save_upload("png", &sample_png()).unwrap();
        let err = orch
            .transform(upload.clone(), Some("og-gigachad"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::UpstreamTimeout));
        assert!(!upload.is_file());
        assert_eq!(dir_entries(store.tmp_dir()), 0);
        assert_eq!(dir_entries(store.results_dir()), 0);
    }

    #[tokio::test]
    async fn undecodable_upload_is_a_validation_error() {
        let generator = StaticGenerator::new(b"out".to_vec());
        let (orch, store, _dir) = orchestrator(generator);

        let upload = store.save_upload("png", b"not an image").unwrap();
        let err = orch
            .transform(upload.clone(), Some("og-gigachad"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Validation(_)));
        assert!(!upload.is_file());
    }
}
