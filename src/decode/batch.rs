//! Parallel analysis of many images
//!
//! Each image is decoded and analyzed on the blocking pool, with at most
//! `workers` images in flight. A failure only affects its own image, which
//! comes back with empty features and the failure reason.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::loader::decode_file;
use crate::analysis::{extract, ExtractionError, Features};
use crate::state::{ImageId, ImageMetadata};

/// One image to analyze
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub id: ImageId,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub id: ImageId,
    pub features: Features,
    /// Why extraction fell back to empty features, if it did
    pub error: Option<String>,
}

impl AnalysisOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Fold the extracted groups into `metadata`.
    ///
    /// A failed extraction is not a re-tag: groups from an earlier
    /// successful run are kept. Returns whether `metadata` was updated.
    pub fn merge_into(&self, metadata: &mut ImageMetadata) -> bool {
        if !self.succeeded() && metadata.has_visual_tags() {
            return false;
        }
        metadata.apply_features(&self.features);
        true
    }
}

/// Decode and extract one file synchronously
pub fn analyze_path(path: &std::path::Path, max_dimension: u32) -> Result<Features, ExtractionError> {
    let decoded = decode_file(path, max_dimension)?;
    let pixels = decoded.pixels()?;
    extract(&pixels)
}

/// Analyze every job, returning outcomes in job-id order
pub async fn analyze_batch(jobs: Vec<AnalysisJob>, max_dimension: u32, workers: usize) -> Vec<AnalysisOutcome> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    let total = jobs.len();

    for job in jobs {
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            // Held until this image is done
            let _permit = semaphore.acquire_owned().await.ok();

            let AnalysisJob { id, path } = job;
            let display = path.display().to_string();
            let result = tokio::task::spawn_blocking(move || analyze_path(&path, max_dimension))
                .await
                .unwrap_or_else(|e| {
                    Err(ExtractionError::Decode {
                        path: display,
                        reason: format!("analysis task failed: {}", e),
                    })
                });

            match result {
                Ok(features) => AnalysisOutcome {
                    id,
                    features,
                    error: None,
                },
                Err(e) => {
                    warn!("Image {} analyzed as empty: {}", id, e);
                    AnalysisOutcome {
                        id,
                        features: Features::empty(),
                        error: Some(e.to_string()),
                    }
                }
            }
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("Analysis worker aborted: {}", e),
        }
    }
    outcomes.sort_by_key(|o| o.id);

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    info!(total, failed, "Batch analysis finished");
    outcomes
}
