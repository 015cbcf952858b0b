//! Binary classifier: pretrained backbone plus a small trainable head
//!
//! Architecture:
//! - Backbone producing one embedding per image (ViT CLS token, or global
//!   mean pooling for lightweight runs)
//! - Dropout -> Linear(width -> hidden) -> ReLU -> Dropout -> Linear(hidden -> 1)
//! - Raw logit output, one per image

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::vit::{VisionTransformer, VitConfig};
use crate::utils::error::{CrossValError, Result};

/// Which feature extractor sits under the head
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackboneConfig {
    /// Vision transformer, optionally loaded from a pretrained record
    Vit(VitConfig),
    /// Per-channel global average pooling; embedding width equals channel count
    MeanPool,
}

impl BackboneConfig {
    pub fn embedding_width(&self) -> usize {
        match self {
            BackboneConfig::Vit(vit) => vit.hidden_size,
            BackboneConfig::MeanPool => 3,
        }
    }

    /// Input resolution the backbone expects, if it has a fixed one
    pub fn expected_image_size(&self) -> Option<usize> {
        match self {
            BackboneConfig::Vit(vit) => Some(vit.image_size),
            BackboneConfig::MeanPool => None,
        }
    }
}

/// Classifier hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backbone: BackboneConfig,

    /// Full-precision burn record holding pretrained backbone weights
    pub pretrained: Option<PathBuf>,

    /// Width of the hidden head layer
    pub hidden_units: usize,

    /// Dropout applied before each head layer (training mode only)
    pub dropout: f64,

    /// Detach backbone output so only the head receives gradients
    pub freeze_backbone: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneConfig::Vit(VitConfig::new()),
            pretrained: None,
            hidden_units: 128,
            dropout: 0.5,
            freeze_backbone: false,
        }
    }
}

impl ClassifierConfig {
    /// Build with freshly initialized parameters everywhere
    pub fn build<B: Backend>(&self, device: &B::Device) -> BinaryClassifier<B> {
        let backbone = match &self.backbone {
            BackboneConfig::Vit(vit) => Backbone::Vit(vit.init(device)),
            BackboneConfig::MeanPool => {
                Backbone::MeanPool(AdaptiveAvgPool2dConfig::new([1, 1]).init())
            }
        };

        let width = self.backbone.embedding_width();
        BinaryClassifier {
            backbone,
            head: ClassificationHead::new(width, self.hidden_units, self.dropout, device),
            freeze_backbone: self.freeze_backbone,
        }
    }

    /// Build a model with a random head and, when configured, pretrained backbone weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<BinaryClassifier<B>> {
        let mut model = self.build(device);

        if let Some(path) = &self.pretrained {
            model.backbone = match model.backbone {
                Backbone::Vit(vit) => {
                    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
                    let vit: VisionTransformer<B> = vit
                        .load_file(path.clone(), &recorder, device)
                        .map_err(|e| {
                            CrossValError::Record(format!(
                                "failed to load pretrained backbone from {}: {:?}",
                                path.display(),
                                e
                            ))
                        })?;
                    info!("Loaded pretrained backbone from {}", path.display());
                    Backbone::Vit(vit)
                }
                Backbone::MeanPool(_) => {
                    return Err(CrossValError::Config(
                        "pretrained weights require a vit backbone".to_string(),
                    ))
                }
            };
        }

        Ok(model)
    }
}

#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Vit(VisionTransformer<B>),
    MeanPool(AdaptiveAvgPool2d),
}

impl<B: Backend> Backbone<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Backbone::Vit(vit) => vit.forward(images),
            Backbone::MeanPool(pool) => {
                let [batch, channels, _, _] = images.dims();
                pool.forward(images).reshape([batch, channels])
            }
        }
    }
}

/// Dropout -> Linear -> ReLU -> Dropout -> Linear
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub dropout: Dropout,
    pub hidden: Linear<B>,
    pub activation: Relu,
    pub output: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    pub fn new(input: usize, hidden: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            dropout: DropoutConfig::new(dropout).init(),
            hidden: LinearConfig::new(input, hidden).init(device),
            activation: Relu::new(),
            output: LinearConfig::new(hidden, 1).init(device),
        }
    }

    /// `[N, width]` embeddings to `[N]` logits
    pub fn forward(&self, embedding: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = embedding.dims();

        let x = self.dropout.forward(embedding);
        let x = self.activation.forward(self.hidden.forward(x));
        let x = self.dropout.forward(x);

        self.output.forward(x).reshape([batch])
    }
}

#[derive(Module, Debug)]
pub struct BinaryClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: ClassificationHead<B>,
    freeze_backbone: bool,
}

impl<B: Backend> BinaryClassifier<B> {
    /// Raw logits, one per image
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let embedding = self.backbone.forward(images);
        let embedding = if self.freeze_backbone {
            embedding.detach()
        } else {
            embedding
        };
        self.head.forward(embedding)
    }
}

/// `path` with a `.bin` suffix appended unless it already ends in `.bin`.
///
/// The file recorder replaces whatever follows the last dot, so dotted
/// stems must carry the extension before they reach it.
pub fn record_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "bin") {
        return path.to_path_buf();
    }
    let mut file = path.as_os_str().to_owned();
    file.push(".bin");
    PathBuf::from(file)
}

/// Save parameters with full precision; returns the written path
pub fn save_model<B: Backend>(model: &BinaryClassifier<B>, path: &Path) -> Result<PathBuf> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let file = record_path(path);
    model
        .clone()
        .save_file(file.clone(), &recorder)
        .map_err(|e| CrossValError::Record(format!("failed to save {}: {:?}", file.display(), e)))?;
    Ok(file)
}

/// Load parameters saved by [`save_model`] into a model built from `config`
pub fn load_model<B: Backend>(
    config: &ClassifierConfig,
    path: &Path,
    device: &B::Device,
) -> Result<BinaryClassifier<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    config
        .build(device)
        .load_file(record_path(path), &recorder, device)
        .map_err(|e| CrossValError::Record(format!("failed to load {}: {:?}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_vit() -> ClassifierConfig {
        ClassifierConfig {
            backbone: BackboneConfig::Vit(
                VitConfig::new()
                    .with_image_size(16)
                    .with_patch_size(8)
                    .with_hidden_size(8)
                    .with_num_layers(1)
                    .with_num_heads(2)
                    .with_mlp_size(16),
            ),
            hidden_units: 4,
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn test_default_head_geometry() {
        let config = ClassifierConfig::default();
        assert_eq!(config.hidden_units, 128);
        assert_eq!(config.dropout, 0.5);
        assert_eq!(config.backbone.embedding_width(), 768);
        assert_eq!(config.backbone.expected_image_size(), Some(384));
    }

    #[test]
    fn test_mean_pool_forward_shape() {
        let device = Default::default();
        let config = ClassifierConfig {
            backbone: BackboneConfig::MeanPool,
            ..ClassifierConfig::default()
        };
        let model = config.build::<TestBackend>(&device);
        let logits = model.forward(Tensor::ones([5, 3, 4, 4], &device));
        assert_eq!(logits.dims(), [5]);
    }

    #[test]
    fn test_vit_forward_shape() {
        let device = Default::default();
        let model = tiny_vit().build::<TestBackend>(&device);
        let logits = model.forward(Tensor::zeros([3, 3, 16, 16], &device));
        assert_eq!(logits.dims(), [3]);
    }

    #[test]
    fn test_pretrained_requires_vit() {
        let device = Default::default();
        let config = ClassifierConfig {
            backbone: BackboneConfig::MeanPool,
            pretrained: Some(PathBuf::from("weights")),
            ..ClassifierConfig::default()
        };
        let err = config.init::<TestBackend>(&device).unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_pretrained_backbone_is_loaded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let config = tiny_vit();

        let source = config.build::<TestBackend>(&device);
        let Backbone::Vit(vit) = source.backbone.clone() else {
            panic!("expected vit backbone");
        };
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        vit.clone()
            .save_file(dir.path().join("backbone"), &recorder)
            .map_err(|e| CrossValError::Record(format!("{:?}", e)))?;

        let config = ClassifierConfig {
            pretrained: Some(dir.path().join("backbone.bin")),
            ..config
        };
        let model = config.init::<TestBackend>(&device)?;
        let Backbone::Vit(loaded) = model.backbone else {
            panic!("expected vit backbone");
        };

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        vit.forward(images.clone())
            .into_data()
            .assert_eq(&loaded.forward(images).into_data(), true);
        Ok(())
    }

    #[test]
    fn test_save_load_round_trip_is_bit_identical() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let config = tiny_vit();
        let model = config.build::<TestBackend>(&device);

        let written = save_model(&model, &dir.path().join("model"))?;
        assert!(written.exists());
        let restored = load_model::<TestBackend>(&config, &written, &device)?;

        let values: Vec<f32> = (0..3 * 3 * 16 * 16).map(|i| (i % 17) as f32 / 17.0).collect();
        let images =
            Tensor::<TestBackend, 4>::from_floats(TensorData::new(values, [3, 3, 16, 16]), &device);

        let before: Vec<f32> = model.forward(images.clone()).into_data().iter::<f32>().collect();
        let after: Vec<f32> = restored.forward(images).into_data().iter::<f32>().collect();
        assert_eq!(
            before.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            after.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn test_record_path_keeps_dotted_stems() {
        assert_eq!(
            record_path(Path::new("out/ms_vit.v2_20240309_070501")),
            PathBuf::from("out/ms_vit.v2_20240309_070501.bin")
        );
        assert_eq!(record_path(Path::new("out/model")), PathBuf::from("out/model.bin"));
        assert_eq!(record_path(Path::new("out/model.bin")), PathBuf::from("out/model.bin"));
    }

    #[test]
    fn test_dotted_stem_survives_save() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let config = ClassifierConfig {
            backbone: BackboneConfig::MeanPool,
            hidden_units: 4,
            ..ClassifierConfig::default()
        };
        let model = config.build::<TestBackend>(&device);

        let written = save_model(&model, &dir.path().join("ms_vit.v2_20240309_070501"))?;
        assert_eq!(
            written.file_name().and_then(|n| n.to_str()),
            Some("ms_vit.v2_20240309_070501.bin")
        );
        assert!(written.exists());
        load_model::<TestBackend>(&config, &written, &device)?;
        Ok(())
    }

    #[test]
    fn test_frozen_backbone_only_trains_head() {
        use burn::backend::Autodiff;
        use burn::nn::loss::BinaryCrossEntropyLossConfig;
        use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
        use burn::tensor::Int;

        type TrainBackend = Autodiff<NdArray<f32>>;

        let device = Default::default();
        let config = ClassifierConfig {
            dropout: 0.0,
            freeze_backbone: true,
            ..tiny_vit()
        };
        let model = config.build::<TrainBackend>(&device);
        let before = model.clone();

        let values: Vec<f32> = (0..2 * 3 * 16 * 16).map(|i| (i % 13) as f32 / 13.0).collect();
        let images =
            Tensor::<TrainBackend, 4>::from_floats(TensorData::new(values, [2, 3, 16, 16]), &device);
        let targets = Tensor::<TrainBackend, 1, Int>::from_data(
            TensorData::new(vec![1i64, 0], [2]),
            &device,
        );

        let loss = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&device)
            .forward(model.forward(images.clone()), targets);
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(0.01)
            .init::<TrainBackend, BinaryClassifier<TrainBackend>>();
        let after = optimizer.step(0.1, model, grads);

        let embedding = |m: &BinaryClassifier<TrainBackend>| -> Vec<u32> {
            m.backbone
                .forward(images.clone())
                .into_data()
                .iter::<f32>()
                .map(f32::to_bits)
                .collect()
        };
        assert_eq!(embedding(&before), embedding(&after));

        let head_weights = |m: &BinaryClassifier<TrainBackend>| -> Vec<f32> {
            m.head.output.weight.val().into_data().iter::<f32>().collect()
        };
        assert_ne!(head_weights(&before), head_weights(&after));
    }
}
