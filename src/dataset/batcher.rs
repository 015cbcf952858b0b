//! Burn batching for the binary classifier
//!
//! Items already carry normalized CHW pixels, so the batcher only stacks
//! them into tensors on the target device.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

/// One preprocessed sample
#[derive(Clone, Debug)]
pub struct ClassifierItem {
    /// Normalized image as flattened CHW `[3 * S * S]`
    pub image: Vec<f32>,
    /// Integer class label
    pub label: usize,
    /// Label as float, the target of BCE-with-logits
    pub target: f32,
}

#[derive(Clone, Debug)]
pub struct ClassifierBatch<B: Backend> {
    /// `[N, 3, S, S]`
    pub images: Tensor<B, 4>,
    /// `[N]` binary targets
    pub targets: Tensor<B, 1, Int>,
    /// Host copy of the labels for metric bookkeeping
    pub labels: Vec<usize>,
}

impl<B: Backend> ClassifierBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ClassifierBatcher {
    image_size: usize,
}

impl ClassifierBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ClassifierItem, ClassifierBatch<B>> for ClassifierBatcher {
    fn batch(&self, items: Vec<ClassifierItem>, device: &B::Device) -> ClassifierBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let mut pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut labels = Vec::with_capacity(batch_size);
        let mut targets = Vec::with_capacity(batch_size);
        for item in items {
            pixels.extend_from_slice(&item.image);
            targets.push(item.target.round() as i64);
            labels.push(item.label);
        }

        let images =
            Tensor::<B, 4>::from_floats(TensorData::new(pixels, [batch_size, 3, size, size]), device);
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), device);

        ClassifierBatch {
            images,
            targets,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_shapes_and_targets() {
        let device = Default::default();
        let batcher = ClassifierBatcher::new(2);
        let items = vec![
            ClassifierItem {
                image: vec![0.5; 12],
                label: 0,
                target: 0.0,
            },
            ClassifierItem {
                image: vec![-0.5; 12],
                label: 1,
                target: 1.0,
            },
        ];

        let batch: ClassifierBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.labels, vec![0, 1]);
        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 1]);
    }
}
