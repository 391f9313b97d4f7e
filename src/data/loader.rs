use std::cell::Cell;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom, thread_rng};

use super::dataset::Dataset;

pub struct DataLoader<'a, D: Dataset> {
    dataset: &'a D,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
    // シード付きシャッフルでもエポックごとに異なる順序にするためのカウンタ
    epoch: Cell<u64>,
    indices: Vec<usize>,
}

impl<'a, D: Dataset> DataLoader<'a, D> {
    pub fn new(dataset: &'a D, batch_size: usize, shuffle: bool) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        let indices: Vec<usize> = (0..dataset.len()).collect();
        Self {
            dataset,
            batch_size,
            shuffle,
            seed: None,
            epoch: Cell::new(0),
            indices,
        }
    }

    /// Makes the shuffled order reproducible. Epoch `k` uses seed `seed + k`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch, counting a trailing partial batch.
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn iter(&self) -> DataLoaderIterator<'a, D> {
        let mut indices = self.indices.clone();
        let epoch = self.epoch.get();
        self.epoch.set(epoch + 1);
        if self.shuffle {
            match self.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch));
                    indices.shuffle(&mut rng);
                }
                None => {
                    let mut rng = thread_rng();
                    indices.shuffle(&mut rng);
                }
            }
        }

        DataLoaderIterator {
            dataset: self.dataset,
            indices,
            batch_size: self.batch_size,
            current_idx: 0,
        }
    }
}

pub struct DataLoaderIterator<'a, D: Dataset> {
    dataset: &'a D,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
}

impl<D: Dataset> Iterator for DataLoaderIterator<'_, D> {
    type Item = Vec<D::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        let batch: Vec<D::Item> = batch_indices.iter().map(|&i| self.dataset.get(i)).collect();

        self.current_idx += self.batch_size;
        Some(batch)
    }
}
