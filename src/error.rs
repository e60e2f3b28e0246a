//! Error types shared by every pipeline stage.
//!
//! Fatal conditions surface as `PipelineError`. A failed quantized conversion
//! is reported as a `ConversionError` first so the exporter can recover from
//! it; only a failed fallback turns into `PipelineError::Export`.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single conversion attempt (full precision → inference artifact).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// A layer uses an operator the selected op set cannot express.
    #[error("layer {layer}: operator '{op}' is not supported by the {op_set} op set")]
    UnsupportedOperator {
        layer: usize,
        op: String,
        op_set: String,
    },

    /// Activation ranges could not be estimated.
    #[error("calibration failed: {0}")]
    Calibration(String),

    /// The artifact could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Main error type for the training / evaluation / export pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required input file or directory does not exist.
    #[error("required path does not exist: {}", .0.display())]
    MissingPath(PathBuf),

    /// A partition directory holds no class directories or no images.
    #[error("partition at '{}' contains no labeled images", .0.display())]
    EmptyPartition(PathBuf),

    /// Class weighting is undefined when a class has no training samples.
    #[error("class {class} ('{name}') has no training samples; class weights are undefined")]
    EmptyClass { class: usize, name: String },

    /// Train/test partitions or artifact/partition disagree on the class set.
    #[error("class set mismatch: {0}")]
    ClassMismatch(String),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An image could not be decoded or encoded.
    #[error("image error at '{}': {reason}", path.display())]
    Image { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON / binary (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A file exists but is not a valid artifact.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Both the quantized and the fallback export attempts failed.
    #[error("export failed: primary attempt: {primary}; fallback attempt: {fallback}")]
    Export {
        primary: ConversionError,
        fallback: ConversionError,
    },

    /// Quantized export failed and the configuration forbids the fallback.
    #[error("quantized export required but failed: {0}")]
    QuantizationRequired(ConversionError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

/// Fails with `MissingPath` unless `path` exists.
///
/// Every stage calls this before attempting a load so the diagnostic names
/// the missing resource instead of a lower-level IO error.
pub fn ensure_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingPath(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_names_the_resource() {
        let err = ensure_exists(std::path::Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn empty_class_message_names_class() {
        let err = PipelineError::EmptyClass { class: 4, name: "leaf_miner".into() };
        let msg = err.to_string();
        assert!(msg.contains("leaf_miner"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn export_error_carries_both_reasons() {
        let err = PipelineError::Export {
            primary: ConversionError::Calibration("no samples".into()),
            fallback: ConversionError::Encode("disk full".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("no samples"));
        assert!(msg.contains("disk full"));
    }
}
