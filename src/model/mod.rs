//! Model architectures
//!
//! - `vit`: Vision Transformer backbone
//! - `classifier`: backbone + binary classification head, record I/O

pub mod classifier;
pub mod vit;

pub use classifier::{
    load_model, save_model, Backbone, BackboneConfig, BinaryClassifier, ClassificationHead,
    ClassifierConfig,
};
pub use vit::{VisionTransformer, VitConfig};
