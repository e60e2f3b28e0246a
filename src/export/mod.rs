pub mod artifact;
pub mod calibration;
pub mod converter;
pub mod exporter;
pub mod quantize;

pub use artifact::{ArtifactLayer, InferenceArtifact, TensorData};
pub use calibration::{CalibrationDataset, CalibrationPolicy, CalibrationSource};
pub use converter::{ConversionOptions, Converter, NativeConverter, OpSet};
pub use exporter::{export_network, ExportConfig, ExportMode, ExportReport, Exporter};
