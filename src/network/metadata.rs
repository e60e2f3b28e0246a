use serde::{Deserialize, Serialize};

use crate::train::train_config::BackboneMode;

/// Describes how to interpret the input fed to a Network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// RGB image resized to width×height, scaled to [-1, 1], flattened as R,G,B,...
    ImageRgb { width: u32, height: u32 },
}

/// Annotations attached to a saved Network and carried into exported artifacts.
/// All fields are Option<> so bare networks deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Class names in label-index order (sorted class directory names).
    pub output_labels: Option<Vec<String>>,
    /// Backbone policy the weights were trained under.
    pub backbone_mode: Option<BackboneMode>,
}

impl ModelMetadata {
    /// Side length of square image inputs, if the model takes images.
    pub fn image_size(&self) -> Option<u32> {
        match self.input_type {
            Some(InputType::ImageRgb { width, .. }) => Some(width),
            None => None,
        }
    }
}
