pub mod augment;
pub mod image;
pub mod partition;
pub mod tensor_set;

pub use augment::Augmentation;
pub use partition::{LabeledSample, Partition};
pub use tensor_set::{AugmentedSource, DecodedPartition, EpochSource, TensorSet};
