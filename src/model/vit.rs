//! Vision Transformer backbone
//!
//! ViT encoder returning the layer-normalized CLS token. The classification
//! head of the pretrained network is not part of this module, so the output
//! is the raw embedding consumed by [`crate::model::ClassificationHead`].

use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Dropout, DropoutConfig, LayerNorm, LayerNormConfig,
    },
    tensor::{backend::Backend, Distribution, Tensor},
};

/// Geometry of the ViT encoder. Defaults match ViT-Base/16 at 384x384.
#[derive(Config, Debug)]
pub struct VitConfig {
    /// Input image size (square)
    #[config(default = "384")]
    pub image_size: usize,

    /// Patch size (square)
    #[config(default = "16")]
    pub patch_size: usize,

    /// Number of input channels
    #[config(default = "3")]
    pub in_channels: usize,

    /// Embedding width
    #[config(default = "768")]
    pub hidden_size: usize,

    /// Number of encoder layers
    #[config(default = "12")]
    pub num_layers: usize,

    /// Attention heads per layer
    #[config(default = "12")]
    pub num_heads: usize,

    /// Width of the feed-forward block
    #[config(default = "3072")]
    pub mlp_size: usize,

    /// Dropout inside the encoder
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Epsilon of the final layer norm; encoder blocks keep burn's default
    #[config(default = "1e-12")]
    pub layer_norm_eps: f64,
}

impl VitConfig {
    /// Number of patches per image
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }

    /// Build a randomly initialized encoder
    pub fn init<B: Backend>(&self, device: &B::Device) -> VisionTransformer<B> {
        let patch_embedding = Conv2dConfig::new(
            [self.in_channels, self.hidden_size],
            [self.patch_size, self.patch_size],
        )
        .with_stride([self.patch_size, self.patch_size])
        .init(device);

        let cls_token = Param::from_tensor(Tensor::random(
            [1, 1, self.hidden_size],
            Distribution::Normal(0.0, 0.02),
            device,
        ));
        let position_embedding = Param::from_tensor(Tensor::random(
            [1, self.num_patches() + 1, self.hidden_size],
            Distribution::Normal(0.0, 0.02),
            device,
        ));

        let encoder = TransformerEncoderConfig::new(
            self.hidden_size,
            self.mlp_size,
            self.num_heads,
            self.num_layers,
        )
        .with_dropout(self.dropout)
        .with_norm_first(true)
        .init(device);

        let norm = LayerNormConfig::new(self.hidden_size)
            .with_epsilon(self.layer_norm_eps)
            .init(device);

        VisionTransformer {
            patch_embedding,
            cls_token,
            position_embedding,
            dropout: DropoutConfig::new(self.dropout).init(),
            encoder,
            norm,
            hidden_size: self.hidden_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    pub patch_embedding: Conv2d<B>,
    pub cls_token: Param<Tensor<B, 3>>,
    pub position_embedding: Param<Tensor<B, 3>>,
    pub dropout: Dropout,
    pub encoder: TransformerEncoder<B>,
    pub norm: LayerNorm<B>,
    hidden_size: usize,
}

impl<B: Backend> VisionTransformer<B> {
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// `[N, C, S, S]` images to `[N, hidden]` CLS embeddings
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, _, _, _] = images.dims();

        // [N, D, S/P, S/P] -> [N, patches, D]
        let patches = self
            .patch_embedding
            .forward(images)
            .flatten::<3>(2, 3)
            .swap_dims(1, 2);

        let cls = self.cls_token.val().expand([batch, 1, self.hidden_size]);
        let tokens = Tensor::cat(vec![cls, patches], 1) + self.position_embedding.val();
        let tokens = self.dropout.forward(tokens);

        let encoded = self.encoder.forward(TransformerEncoderInput::new(tokens));
        let encoded = self.norm.forward(encoded);

        encoded
            .slice([0..batch, 0..1, 0..self.hidden_size])
            .reshape([batch, self.hidden_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny() -> VitConfig {
        VitConfig::new()
            .with_image_size(16)
            .with_patch_size(8)
            .with_hidden_size(8)
            .with_num_layers(1)
            .with_num_heads(2)
            .with_mlp_size(16)
    }

    #[test]
    fn test_num_patches() {
        assert_eq!(VitConfig::new().num_patches(), 576);
        assert_eq!(tiny().num_patches(), 4);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let vit = tiny().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let embedding = vit.forward(images);
        assert_eq!(embedding.dims(), [2, 8]);
    }
}
