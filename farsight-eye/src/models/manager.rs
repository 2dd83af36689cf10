//! Model manager with auto-download functionality

use crate::config::VisionConfig;
use crate::error::VisionError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default detector: YOLOv8n exported to ONNX (COCO, 640x640)
pub const YOLO_V8N_NAME: &str = "yolov8n.onnx";
const YOLO_V8N_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.2.0/yolov8n.onnx";
const YOLO_V8N_CHECKSUM: &str = "";

const MAX_MODEL_SIZE: u64 = 2_000_000_000;
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Downloads and locates detector models
pub struct ModelManager {
    config: Arc<VisionConfig>,
}

impl ModelManager {
    pub fn new(config: Arc<VisionConfig>) -> Self {
        Self { config }
    }

    /// Ensure model directory exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, VisionError> {
        let model_dir = &self.config.model_dir;
        if !model_dir.exists() {
            fs::create_dir_all(model_dir)?;
            info!("Created model directory: {:?}", model_dir);
        }
        Ok(model_dir.clone())
    }

    /// Download `model_name` from `url` unless it is already present
    pub async fn ensure_model(
        &self,
        model_name: &str,
        url: &str,
        checksum: &str,
    ) -> Result<PathBuf, VisionError> {
        if model_name.is_empty() || model_name.len() > 255 {
            return Err(VisionError::Model("Invalid model name".to_string()));
        }

        if model_name.contains("..") || model_name.contains('/') || model_name.contains('\\') {
            return Err(VisionError::Model(
                "Model name contains invalid characters".to_string(),
            ));
        }

        if url.is_empty() || url.len() > 2048 {
            return Err(VisionError::Model("Invalid URL".to_string()));
        }

        if !url.starts_with("https://") {
            return Err(VisionError::Model(
                "Only HTTPS URLs are allowed for model downloads".to_string(),
            ));
        }

        let model_dir = self.ensure_model_dir()?;
        let model_path = model_dir.join(model_name);

        if model_path.exists() {
            info!("Model {} already exists at {:?}", model_name, model_path);
            return Ok(model_path);
        }

        info!("Downloading model {} from {}", model_name, url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(VisionError::Model(format!(
                "Failed to download model: HTTP {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE {
                return Err(VisionError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;

        if bytes.len() as u64 > MAX_MODEL_SIZE {
            return Err(VisionError::Model(format!(
                "Downloaded model too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_MODEL_SIZE
            )));
        }

        if bytes.len() < 1024 {
            return Err(VisionError::Model(
                "Downloaded file too small, likely corrupted".to_string(),
            ));
        }

        verify_checksum(model_name, &bytes, checksum)?;

        // Write to a temp file first so a partial download never looks complete
        let temp_path = model_path.with_extension("tmp");
        fs::write(&temp_path, &bytes)?;
        fs::rename(&temp_path, &model_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            VisionError::Io(e)
        })?;

        info!("Model {} saved to {:?}", model_name, model_path);
        Ok(model_path)
    }

    /// Where the default YOLO model lives once downloaded
    pub fn yolo_model_path(&self) -> PathBuf {
        self.config.model_dir.join(YOLO_V8N_NAME)
    }

    /// Default YOLO model path, downloading if needed
    pub async fn get_yolo_model(&self) -> Result<PathBuf, VisionError> {
        self.ensure_model(YOLO_V8N_NAME, YOLO_V8N_URL, YOLO_V8N_CHECKSUM)
            .await
    }
}

/// Compare the SHA-256 of `bytes` against `checksum` (skipped when empty)
pub fn verify_checksum(model_name: &str, bytes: &[u8], checksum: &str) -> Result<(), VisionError> {
    if checksum.is_empty() {
        info!(
            "Downloaded {} bytes for model {} (checksum verification skipped)",
            bytes.len(),
            model_name
        );
        return Ok(());
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let computed = hex::encode(hasher.finalize());

    if !computed.eq_ignore_ascii_case(checksum) {
        return Err(VisionError::Model(format!(
            "Checksum mismatch for model {}: expected {}, got {}",
            model_name, checksum, computed
        )));
    }

    info!("Verified checksum for model {}", model_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> ModelManager {
        let mut config = VisionConfig::default();
        config.model_dir = dir.path().join("models");
        ModelManager::new(Arc::new(config))
    }

    #[test]
    fn test_ensure_model_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);
        let dir = manager.ensure_model_dir().unwrap();
        assert!(dir.exists());

        // Should be idempotent
        assert!(manager.ensure_model_dir().is_ok());
    }

    #[tokio::test]
    async fn test_ensure_model_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);

        for name in ["", "../evil", "model/name", "model\\name"] {
            let result = manager
                .ensure_model(name, "https://example.com/model.onnx", "")
                .await;
            assert!(result.is_err(), "name {:?} should be rejected", name);
        }
    }

    #[tokio::test]
    async fn test_ensure_model_invalid_url() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);

        for url in ["", "http://example.com/model.onnx", "ftp://example.com/model.onnx"] {
            let result = manager.ensure_model("model.onnx", url, "").await;
            assert!(result.is_err(), "url {:?} should be rejected", url);
        }
    }

    #[tokio::test]
    async fn test_ensure_model_existing_file_skips_download() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);
        let dir = manager.ensure_model_dir().unwrap();
        let existing = dir.join("cached.onnx");
        fs::write(&existing, b"onnx").unwrap();

        let path = manager
            .ensure_model("cached.onnx", "https://invalid.invalid/cached.onnx", "")
            .await
            .unwrap();
        assert_eq!(path, existing);
    }

    #[tokio::test]
    async fn test_default_weights_are_the_fetched_model() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = VisionConfig::default();
        config.model_dir = temp_dir.path().join("models");
        config.weights = config.model_dir.join(YOLO_V8N_NAME);
        let manager = ModelManager::new(Arc::new(config.clone()));

        assert_eq!(manager.yolo_model_path(), config.weights);
        assert_eq!(
            VisionConfig::default().weights,
            ModelManager::new(Arc::new(VisionConfig::default())).yolo_model_path()
        );

        // Already downloaded: no network, same file the detector loads
        manager.ensure_model_dir().unwrap();
        fs::write(&config.weights, b"onnx").unwrap();
        assert_eq!(manager.get_yolo_model().await.unwrap(), config.weights);
    }

    #[test]
    fn test_verify_checksum() {
        let digest = hex::encode(Sha256::digest(b"weights"));
        assert!(verify_checksum("m", b"weights", &digest).is_ok());
        assert!(verify_checksum("m", b"weights", &digest.to_uppercase()).is_ok());
        assert!(verify_checksum("m", b"weights", "").is_ok());
        assert!(verify_checksum("m", b"other", &digest).is_err());
    }
}
