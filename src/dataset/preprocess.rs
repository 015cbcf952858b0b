//! Image preprocessing for the backbone
//!
//! Turns a decoded image into the flattened CHW float layout the model
//! consumes. The ViT processor mirrors the usual pretrained-ViT settings:
//! bilinear resize, rescale to [0, 1], normalize with mean 0.5 and std 0.5.

use image::imageops::FilterType;
use image::DynamicImage;

pub trait ImagePreprocessor: Send + Sync {
    /// Side length of the square output
    fn image_size(&self) -> usize;

    /// RGB, resized and normalized, as `[3 * S * S]` in CHW order
    fn preprocess(&self, image: &DynamicImage) -> Vec<f32>;
}

#[derive(Debug, Clone)]
pub struct VitImageProcessor {
    image_size: usize,
    mean: [f32; 3],
    std: [f32; 3],
    filter: FilterType,
}

impl VitImageProcessor {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            mean: [0.5; 3],
            std: [0.5; 3],
            filter: FilterType::Triangle,
        }
    }

    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }
}

impl ImagePreprocessor for VitImageProcessor {
    fn image_size(&self) -> usize {
        self.image_size
    }

    fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let rgb = image
            .resize_exact(size as u32, size as u32, self.filter)
            .to_rgb8();

        let plane = size * size;
        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                data[c * plane + offset] = (value - self.mean[c]) / self.std[c];
            }
        }
        data
    }
}
