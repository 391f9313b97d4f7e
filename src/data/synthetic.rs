use rand::{SeedableRng, distributions::Uniform, prelude::Distribution, rngs::StdRng};

use super::dataset::Dataset;

/// Deterministic stand-in for MNIST: class `k` lights up the `k`-th block of
/// pixels, on top of a little uniform noise.
pub struct SyntheticDigits {
    samples: Vec<(Vec<f32>, u8)>,
    features: usize,
    num_classes: usize,
}

impl SyntheticDigits {
    pub const FEATURES: usize = 784;
    pub const CLASSES: usize = 10;
    const NOISE: f32 = 0.05;

    /// `count` samples of 784 pixels over 10 classes, cycling through the labels.
    pub fn new(count: usize, seed: u64) -> Self {
        Self::with_shape(count, Self::FEATURES, Self::CLASSES, seed)
    }

    pub fn with_shape(count: usize, features: usize, num_classes: usize, seed: u64) -> Self {
        assert!(
            num_classes > 0 && num_classes <= u8::MAX as usize + 1,
            "num_classes must be in 1..=256"
        );
        assert!(
            features >= num_classes,
            "need at least one feature per class"
        );
        let block = features / num_classes;
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Uniform::new_inclusive(0.0, Self::NOISE);

        let samples = (0..count)
            .map(|i| {
                let label = i % num_classes;
                let mut pixels: Vec<f32> = (0..features).map(|_| noise.sample(&mut rng)).collect();
                for px in &mut pixels[label * block..(label + 1) * block] {
                    *px = 1.0 - *px;
                }
                (pixels, label as u8)
            })
            .collect();

        Self {
            samples,
            features,
            num_classes,
        }
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Dataset for SyntheticDigits {
    type Item = (Vec<f32>, u8);

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Self::Item {
        self.samples[index].clone()
    }
}
