//! Sample loading
//!
//! Fetches a sample's bytes from the blob store, decodes and preprocesses it,
//! and pairs it with its label. Batches are loaded on a dedicated rayon pool
//! since fetches are I/O bound.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageReader;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use crate::config::LoadPolicy;
use crate::dataset::batcher::ClassifierItem;
use crate::dataset::preprocess::ImagePreprocessor;
use crate::dataset::Sample;
use crate::storage::BlobStore;
use crate::utils::error::{CrossValError, Result};

pub struct SampleLoader {
    store: Arc<dyn BlobStore>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    policy: LoadPolicy,
    pool: ThreadPool,
}

impl SampleLoader {
    pub fn new(
        store: Arc<dyn BlobStore>,
        preprocessor: Arc<dyn ImagePreprocessor>,
        policy: LoadPolicy,
        num_workers: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .thread_name(|i| format!("sample-loader-{}", i))
            .build()
            .map_err(|e| CrossValError::Config(format!("cannot start loader threads: {}", e)))?;

        Ok(Self {
            store,
            preprocessor,
            policy,
            pool,
        })
    }

    pub fn image_size(&self) -> usize {
        self.preprocessor.image_size()
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Fetch, decode and preprocess one sample; no retries
    pub fn load(&self, sample: &Sample) -> Result<ClassifierItem> {
        let bytes = self.store.read_all(&sample.path)?;
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CrossValError::Decode {
                path: sample.path.clone(),
                message: e.to_string(),
            })?
            .decode()
            .map_err(|e| CrossValError::Decode {
                path: sample.path.clone(),
                message: e.to_string(),
            })?;

        Ok(ClassifierItem {
            image: self.preprocessor.preprocess(&image),
            label: sample.label,
            target: sample.label as f32,
        })
    }

    /// Load one sample under the configured policy.
    ///
    /// `Ok(None)` means the sample was skipped.
    fn load_with_policy(&self, sample: &Sample) -> Result<Option<ClassifierItem>> {
        match self.policy {
            LoadPolicy::Strict => self.load(sample).map(Some),
            LoadPolicy::Retry { attempts } => {
                let mut attempt = 1;
                loop {
                    match self.load(sample) {
                        Ok(item) => return Ok(Some(item)),
                        Err(err) if attempt < attempts => {
                            debug!(
                                "Attempt {}/{} failed for {}: {}",
                                attempt, attempts, sample.path, err
                            );
                            attempt += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            LoadPolicy::Skip => match self.load(sample) {
                Ok(item) => Ok(Some(item)),
                Err(err) => {
                    warn!("Skipping {}: {}", sample.path, err);
                    Ok(None)
                }
            },
        }
    }

    /// Load a batch in parallel, preserving sample order
    pub fn load_batch(&self, samples: &[Sample]) -> Result<Vec<ClassifierItem>> {
        let loaded: Vec<Result<Option<ClassifierItem>>> = self.pool.install(|| {
            samples
                .par_iter()
                .map(|sample| self.load_with_policy(sample))
                .collect()
        });

        let mut items = Vec::with_capacity(samples.len());
        for result in loaded {
            if let Some(item) = result? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::preprocess::VitImageProcessor;
    use crate::storage::MemoryBlobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn png(value: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([value, value, value])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn loader(policy: LoadPolicy) -> Result<SampleLoader> {
        let store = MemoryBlobStore::new();
        store.insert("c/white.png", png(255));
        store.insert("c/black.png", png(0));
        store.insert("c/broken.png", b"not an image".to_vec());
        SampleLoader::new(
            Arc::new(store),
            Arc::new(VitImageProcessor::new(4)),
            policy,
            2,
        )
    }

    fn sample(path: &str, label: usize) -> Sample {
        Sample {
            path: path.to_string(),
            label,
        }
    }

    #[test]
    fn test_load_pairs_image_with_float_label() -> Result<()> {
        let loader = loader(LoadPolicy::Strict)?;
        let item = loader.load(&sample("c/white.png", 1))?;
        assert_eq!(item.image.len(), 3 * 4 * 4);
        assert_eq!(item.label, 1);
        assert_eq!(item.target, 1.0);
        Ok(())
    }

    #[test]
    fn test_strict_policy_fails_batch_on_decode_error() -> Result<()> {
        let loader = loader(LoadPolicy::Strict)?;
        let batch = vec![sample("c/white.png", 1), sample("c/broken.png", 0)];
        let err = loader.load_batch(&batch).unwrap_err();
        assert!(matches!(err, CrossValError::Decode { ref path, .. } if path == "c/broken.png"));
        Ok(())
    }

    #[test]
    fn test_skip_policy_drops_bad_samples() -> Result<()> {
        let loader = loader(LoadPolicy::Skip)?;
        let batch = vec![
            sample("c/white.png", 1),
            sample("c/broken.png", 0),
            sample("c/black.png", 0),
        ];
        let items = loader.load_batch(&batch)?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, 1);
        assert_eq!(items[1].label, 0);
        Ok(())
    }

    #[test]
    fn test_retry_policy_gives_up_after_attempts() -> Result<()> {
        let loader = loader(LoadPolicy::Retry { attempts: 3 })?;
        assert!(loader.load_batch(&[sample("c/missing.png", 0)]).is_err());
        assert_eq!(loader.load_batch(&[sample("c/black.png", 0)])?.len(), 1);
        Ok(())
    }

    /// Fails the first `failures` opens, then serves from memory
    struct FlakyStore {
        inner: MemoryBlobStore,
        failures: AtomicUsize,
    }

    impl BlobStore for FlakyStore {
        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix)
        }

        fn open(&self, path: &str) -> Result<Box<dyn std::io::Read + Send>> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CrossValError::Blob {
                    path: path.to_string(),
                    message: "transient failure".to_string(),
                });
            }
            self.inner.open(path)
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    fn flaky_loader(failures: usize, policy: LoadPolicy) -> Result<SampleLoader> {
        let inner = MemoryBlobStore::new();
        inner.insert("c/white.png", png(255));
        let store = FlakyStore {
            inner,
            failures: AtomicUsize::new(failures),
        };
        SampleLoader::new(
            Arc::new(store),
            Arc::new(VitImageProcessor::new(4)),
            policy,
            1,
        )
    }

    #[test]
    fn test_retry_policy_recovers_from_transient_failure() -> Result<()> {
        let loader = flaky_loader(1, LoadPolicy::Retry { attempts: 2 })?;
        let items = loader.load_batch(&[sample("c/white.png", 1)])?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, 1);
        Ok(())
    }

    #[test]
    fn test_strict_policy_does_not_retry() -> Result<()> {
        let loader = flaky_loader(1, LoadPolicy::Strict)?;
        let err = loader.load_batch(&[sample("c/white.png", 1)]).unwrap_err();
        assert!(matches!(err, CrossValError::Blob { .. }));
        Ok(())
    }
}
