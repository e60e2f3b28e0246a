use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ensure_exists, ConversionError, PipelineError, Result};
use crate::export::calibration::{CalibrationDataset, CalibrationPolicy, CalibrationSource};
use crate::export::converter::{ConversionOptions, Converter, NativeConverter};
use crate::inference::labels::write_labels;
use crate::network::network::Network;

/// How the written artifact was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExportMode {
    /// Int8 weights, integer op set, calibrated activation ranges.
    Quantized,
    /// Float weights on the relaxed op set, after the quantized attempt failed.
    Fallback { reason: String },
}

/// Outcome of a successful export. Exactly one artifact file exists at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub mode: ExportMode,
    pub bytes: u64,
    /// Calibration inputs drawn by the attempt that produced the artifact.
    pub calibration_samples: usize,
}

impl ExportReport {
    pub fn is_fallback(&self) -> bool {
        matches!(self.mode, ExportMode::Fallback { .. })
    }
}

/// Export settings.
///
/// - `calibration_samples` — inputs drawn to estimate activation ranges
/// - `representative`      — calibrate on real training images instead of noise
/// - `require_quantized`   — treat a fallback as a failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub calibration_samples: usize,
    pub representative: bool,
    pub require_quantized: bool,
    pub seed: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig { calibration_samples: 100, representative: false, require_quantized: false, seed: 42 }
    }
}

impl ExportConfig {
    /// `representative_root` is used only when `representative` is set.
    pub fn calibration_policy(&self, representative_root: &Path) -> CalibrationPolicy {
        let source = if self.representative {
            CalibrationSource::Representative { root: representative_root.to_path_buf() }
        } else {
            CalibrationSource::Synthetic { seed: self.seed }
        };
        CalibrationPolicy { samples: self.calibration_samples, source }
    }
}

// ---------------------------------------------------------------------------
// Two-stage export policy
// ---------------------------------------------------------------------------

/// Attempts a quantized conversion and falls back to a float conversion.
///
/// Nothing is written unless one attempt succeeds. With `require_quantized`
/// a failed quantized attempt is returned as `QuantizationRequired`.
pub fn export_network(
    converter: &dyn Converter,
    network: &Network,
    calibration: &CalibrationDataset,
    config: &ExportConfig,
    output: &Path,
) -> Result<ExportReport> {
    let drawn_before = calibration.drawn();
    let primary = converter
        .convert(network, &ConversionOptions::quantized(), Some(calibration))
        .and_then(|artifact| artifact.to_bytes());

    let (bytes, mode, calibration_samples) = match primary {
        Ok(bytes) => (bytes, ExportMode::Quantized, calibration.drawn() - drawn_before),
        Err(primary_err) => {
            if config.require_quantized {
                return Err(PipelineError::QuantizationRequired(primary_err));
            }
            warn!(reason = %primary_err, "quantized export failed, falling back to float export");
            let bytes = converter
                .convert(network, &ConversionOptions::float(), None)
                .and_then(|artifact| artifact.to_bytes())
                .map_err(|fallback: ConversionError| PipelineError::Export {
                    primary: primary_err.clone(),
                    fallback,
                })?;
            (bytes, ExportMode::Fallback { reason: primary_err.to_string() }, 0)
        }
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, &bytes)?;
    info!(
        path = %output.display(),
        bytes = bytes.len(),
        mode = ?mode,
        calibration_samples,
        "wrote inference artifact"
    );

    Ok(ExportReport {
        path: output.to_path_buf(),
        labels_path: None,
        mode,
        bytes: bytes.len() as u64,
        calibration_samples,
    })
}

/// Loads a saved full-precision model and exports it with its label file.
#[derive(Debug, Clone)]
pub struct Exporter {
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    /// Defaults to `labels.txt` next to the artifact.
    pub labels_path: Option<PathBuf>,
    /// Image directory for representative calibration.
    pub representative_dir: PathBuf,
    /// Used when the model carries no input metadata.
    pub default_image_size: u32,
    pub config: ExportConfig,
}

impl Exporter {
    pub fn run(&self) -> Result<ExportReport> {
        self.run_with(&NativeConverter)
    }

    pub fn run_with(&self, converter: &dyn Converter) -> Result<ExportReport> {
        ensure_exists(&self.model_path)?;
        let network = Network::load_json(&self.model_path)?;
        info!(path = %self.model_path.display(), "loaded model for export");

        let image_size = network.metadata.image_size().unwrap_or(self.default_image_size);
        let calibration = self.config
            .calibration_policy(&self.representative_dir)
            .dataset(network.input_size(), image_size)?;

        let mut report = export_network(converter, &network, &calibration, &self.config, &self.output_path)?;

        if let Some(labels) = &network.metadata.output_labels {
            let path = self.labels_path.clone()
                .unwrap_or_else(|| self.output_path.with_file_name("labels.txt"));
            write_labels(&path, labels)?;
            info!(path = %path.display(), classes = labels.len(), "wrote label file");
            report.labels_path = Some(path);
        }
        Ok(report)
    }
}
