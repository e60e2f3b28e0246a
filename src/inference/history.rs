//! Log of past detections, one JSON object per line.
//!
//! Records are appended as predictions are made and listed newest first.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::inference::classifier::Prediction;

/// One recorded detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Probability of the detected class, in [0, 1].
    pub confidence: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl Detection {
    /// Stamps `prediction` with the current wall-clock time.
    pub fn now(prediction: &Prediction) -> Detection {
        Detection {
            label: prediction.label.clone(),
            confidence: prediction.confidence,
            timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// JSON-lines file of [`Detection`]s. A missing file is an empty history.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    path: PathBuf,
}

impl DetectionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DetectionHistory { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating the file and its directory on first use.
    pub fn record(&self, detection: &Detection) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(detection)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        debug!(label = %detection.label, confidence = detection.confidence, "recorded detection");
        Ok(())
    }

    /// Every record, most recently appended first.
    pub fn list(&self) -> Result<Vec<Detection>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let mut detections = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    PipelineError::Serialization(format!("{} line {}: {}", self.path.display(), i + 1, e))
                })
            })
            .collect::<Result<Vec<Detection>>>()?;
        detections.reverse();
        Ok(detections)
    }

    /// Deletes every record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.list()?.len();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        info!(removed, path = %self.path.display(), "cleared detection history");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, timestamp_ms: u64) -> Detection {
        Detection { label: label.into(), confidence: 0.9, timestamp_ms }
    }

    #[test]
    fn records_are_listed_newest_first_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let history = DetectionHistory::new(dir.path().join("logs/detections.jsonl"));
        assert!(history.list().unwrap().is_empty());

        history.record(&detection("Tomato___Spider_mites", 1)).unwrap();
        history.record(&detection("Tomato___healthy", 2)).unwrap();
        history.record(&detection("Tomato___Leaf_Mold", 2)).unwrap();

        let labels: Vec<String> = history.list().unwrap().into_iter().map(|d| d.label).collect();
        assert_eq!(labels, vec!["Tomato___Leaf_Mold", "Tomato___healthy", "Tomato___Spider_mites"]);

        assert_eq!(history.clear().unwrap(), 3);
        assert!(history.list().unwrap().is_empty());
        assert_eq!(history.clear().unwrap(), 0);
    }

    #[test]
    fn detection_copies_the_prediction() {
        let p = Prediction { index: 1, label: "Tomato___healthy".into(), confidence: 0.75 };
        let d = Detection::now(&p);
        assert_eq!(d.label, p.label);
        assert_eq!(d.confidence, 0.75);
        assert!(d.timestamp_ms > 0);
    }

    #[test]
    fn corrupt_line_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.jsonl");
        std::fs::write(&path, "{\"label\":\"a\",\"confidence\":0.6,\"timestamp_ms\":1}\nnot json\n").unwrap();
        let err = DetectionHistory::new(&path).list().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
