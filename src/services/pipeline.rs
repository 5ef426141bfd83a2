use crate::config::StorageConfig;
use crate::db::models::{HistoryPage, HistoryParams, NewDetectionEvent};
use crate::db::repositories::ResultStore;
use crate::detector::PersonDetector;
use crate::error::{Error, Result};
use crate::services::annotator::Annotator;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of annotated output file names
pub const OUTPUT_PREFIX: &str = "vis_";

/// Response of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub person_count: u32,
    pub output_image_path: String,
}

/// Reduce a client-supplied filename to its final path component.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c| c == '/' || c == '\\').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Upload → detect → annotate → persist, plus history queries.
///
/// Holds no per-request state. Staged and output files are named after the
/// uploaded filename, so a later upload with the same name overwrites both.
pub struct DetectionPipeline {
    detector: PersonDetector,
    annotator: Arc<Annotator>,
    store: Arc<dyn ResultStore>,
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl DetectionPipeline {
    pub fn new(
        detector: PersonDetector,
        annotator: Arc<Annotator>,
        store: Arc<dyn ResultStore>,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            detector,
            annotator,
            store,
            upload_dir: storage.upload_dir.clone(),
            output_dir: storage.output_dir.clone(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the staging and output directories
    pub fn prepare_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Where the annotated image for `filename` is written
    pub fn output_path_for(&self, filename: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", OUTPUT_PREFIX, filename))
    }

    /// Run the full pipeline for one uploaded image
    pub async fn process_upload(&self, filename: Option<&str>, data: &[u8]) -> Result<UploadOutcome> {
        let filename = filename
            .and_then(sanitize_filename)
            .ok_or_else(|| Error::BadUpload("Uploaded file has no usable filename".to_string()))?;
        if data.is_empty() {
            return Err(Error::BadUpload(format!("Uploaded file {} is empty", filename)));
        }

        // Stage
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let staged_path = self.upload_dir.join(&filename);
        tokio::fs::write(&staged_path, data).await?;
        debug!("Staged {} ({} bytes)", staged_path.display(), data.len());

        // Detect + annotate off the async runtime
        let output_path = self.output_path_for(&filename);
        let detector = self.detector.clone();
        let annotator = Arc::clone(&self.annotator);
        let (detection, summary) = {
            let staged_path = staged_path.clone();
            let output_path = output_path.clone();
            tokio::task::spawn_blocking(move || -> Result<_> {
                let detection = detector.detect(&staged_path)?;
                let summary = annotator.annotate(&staged_path, &detection.boxes, &output_path)?;
                Ok((detection, summary))
            })
            .await
            .map_err(|e| Error::Internal(format!("Detection task failed: {}", e)))?
        }
        .map_err(|e| {
            warn!("Detection failed for {}: {}", staged_path.display(), e);
            e
        })?;

        if summary.boxes_drawn != detection.person_count {
            warn!(
                "Drew {} boxes for {} detected people in {}",
                summary.boxes_drawn,
                detection.person_count,
                filename
            );
        }

        // Persist
        let person_count = u32::try_from(detection.person_count)
            .map_err(|_| Error::Internal("person count out of range".to_string()))?;
        let output_image_path = output_path.to_string_lossy().into_owned();
        let event = self
            .store
            .insert(NewDetectionEvent::new(person_count, output_image_path.clone()))
            .await?;

        info!(
            "Detection {} recorded: {} people in {} -> {}",
            event.id, person_count, filename, output_image_path
        );

        Ok(UploadOutcome {
            person_count,
            output_image_path,
        })
    }

    /// Filtered, paginated detection history
    pub async fn history(&self, params: HistoryParams) -> Result<HistoryPage> {
        let filter = params.into_filter()?;
        self.store.query(&filter).await
    }

    pub async fn store_healthy(&self) -> bool {
        self.store.health_check().await
    }
}
