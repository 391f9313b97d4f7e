use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use byteorder::{BigEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::GzEncoder;
use lamina::NnError;
use lamina::backend::Backend;
use lamina::backend::ndarray::NdArray;
use lamina::data::collate::collate_batch;
use lamina::data::dataset::Dataset;
use lamina::data::loader::DataLoader;
use lamina::data::mnist::Mnist;
use lamina::data::synthetic::SyntheticDigits;

struct DummyDataset {
    data: Vec<i32>,
}

impl Dataset for DummyDataset {
    type Item = i32;

    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> Self::Item {
        self.data[index]
    }
}

fn flatten(loader: &DataLoader<'_, DummyDataset>) -> Vec<i32> {
    loader.iter().flatten().collect()
}

#[test]
fn test_dataloader_batching() {
    let data: Vec<i32> = (0..10).collect();
    let dataset = DummyDataset { data };
    let loader = DataLoader::new(&dataset, 3, false);

    let batches: Vec<Vec<i32>> = loader.iter().collect();

    assert_eq!(loader.num_batches(), 4);
    assert_eq!(batches.len(), 4);
    assert_eq!(batches[0], vec![0, 1, 2]);
    assert_eq!(batches[1], vec![3, 4, 5]);
    assert_eq!(batches[2], vec![6, 7, 8]);
    assert_eq!(batches[3], vec![9]);
}

#[test]
fn test_dataloader_shuffle() {
    let data: Vec<i32> = (0..100).collect();
    let dataset = DummyDataset { data: data.clone() };
    let loader = DataLoader::new(&dataset, 10, true);

    let all_items = flatten(&loader);

    // Sort to verify all items are present
    let mut sorted_items = all_items.clone();
    sorted_items.sort();

    assert_eq!(sorted_items, data);

    // Likely not equal to original order (probabilistic but very likely)
    assert_ne!(all_items, data);
}

#[test]
fn test_dataloader_seeded_shuffle() {
    let dataset = DummyDataset {
        data: (0..50).collect(),
    };
    let a = DataLoader::new(&dataset, 7, true).with_seed(42);
    let b = DataLoader::new(&dataset, 7, true).with_seed(42);

    let first_a = flatten(&a);
    let first_b = flatten(&b);
    assert_eq!(first_a, first_b);

    // 2エポック目は別の順序、ただし再現可能
    let second_a = flatten(&a);
    let second_b = flatten(&b);
    assert_eq!(second_a, second_b);
    assert_ne!(first_a, second_a);
}

#[test]
fn test_dataloader_empty_dataset() {
    let dataset = DummyDataset { data: Vec::new() };
    let loader = DataLoader::new(&dataset, 4, true);
    assert!(dataset.is_empty());
    assert_eq!(loader.num_batches(), 0);
    assert_eq!(loader.iter().count(), 0);
}

#[test]
#[should_panic(expected = "batch_size must be positive")]
fn test_dataloader_rejects_zero_batch() {
    let dataset = DummyDataset { data: vec![1] };
    DataLoader::new(&dataset, 0, false);
}

#[test]
fn test_collate_one_hot() {
    let batch = vec![(vec![0.1, 0.2, 0.3, 0.4], 2u8), (vec![0.5, 0.6, 0.7, 0.8], 0u8)];
    let (inputs, targets) = collate_batch::<NdArray>(batch, &[1, 2, 2], 3);

    assert_eq!(NdArray::shape(&inputs), vec![2, 1, 2, 2]);
    assert_eq!(NdArray::shape(&targets), vec![2, 3]);
    assert_eq!(NdArray::to_vec(&inputs)[4], 0.5);
    assert_eq!(
        NdArray::to_vec(&targets),
        vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]
    );
}

#[test]
#[should_panic(expected = "out of range")]
fn test_collate_rejects_large_label() {
    collate_batch::<NdArray>(vec![(vec![0.0; 2], 5u8)], &[2], 3);
}

#[test]
fn test_synthetic_digits() {
    let digits = SyntheticDigits::new(25, 7);
    assert_eq!(digits.len(), 25);
    assert_eq!(digits.features(), 784);
    assert_eq!(digits.num_classes(), 10);

    let (pixels, label) = digits.get(13);
    assert_eq!(label, 3);
    assert_eq!(pixels.len(), 784);
    // class 3 -> pixels 234..312 are bright
    assert!(pixels[234..312].iter().all(|&p| p >= 0.95));
    assert!(pixels[..234].iter().all(|&p| (0.0..=0.05).contains(&p)));

    let again = SyntheticDigits::new(25, 7);
    assert_eq!(again.get(13).0, pixels);
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lamina-{}-{}", std::process::id(), name))
}

fn write_gz(path: &PathBuf, bytes: &[u8]) {
    let file = File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap();
}

fn idx3(count: u32, rows: u32, cols: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in [2051, count, rows, cols] {
        buf.write_u32::<BigEndian>(v).unwrap();
    }
    for i in 0..count * rows * cols {
        buf.push((i * 17 % 256) as u8);
    }
    buf
}

fn idx1(labels: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<BigEndian>(2049).unwrap();
    buf.write_u32::<BigEndian>(labels.len() as u32).unwrap();
    buf.extend_from_slice(labels);
    buf
}

#[test]
fn test_mnist_from_gzip_files() {
    let images = temp_path("ok-images.gz");
    let labels = temp_path("ok-labels.gz");
    write_gz(&images, &idx3(3, 2, 2));
    write_gz(&labels, &idx1(&[4, 1, 9]));

    let mnist = Mnist::from_files(&images, &labels).unwrap();
    assert_eq!(mnist.len(), 3);
    assert_eq!(mnist.image_size(), 4);
    assert_eq!(mnist.labels(), &[4, 1, 9]);

    let (pixels, label) = mnist.get(1);
    assert_eq!(label, 1);
    // 5番目のバイトは 4 * 17 = 68
    assert!((pixels[0] - 68.0 / 255.0).abs() < 1e-6);
    assert!(pixels.iter().all(|p| (0.0..=1.0).contains(p)));

    std::fs::remove_file(images).ok();
    std::fs::remove_file(labels).ok();
}

#[test]
fn test_mnist_bad_magic() {
    let images = temp_path("magic-images.gz");
    let labels = temp_path("magic-labels.gz");
    // label file where the image file should be
    write_gz(&images, &idx1(&[1, 2]));
    write_gz(&labels, &idx1(&[1, 2]));

    let err = Mnist::from_files(&images, &labels).err().unwrap();
    assert!(matches!(err, NnError::Dataset(ref msg) if msg.contains("magic")));

    std::fs::remove_file(images).ok();
    std::fs::remove_file(labels).ok();
}

#[test]
fn test_mnist_count_mismatch() {
    let images = temp_path("count-images.gz");
    let labels = temp_path("count-labels.gz");
    write_gz(&images, &idx3(2, 2, 2));
    write_gz(&labels, &idx1(&[1, 2, 3]));

    let err = Mnist::from_files(&images, &labels).err().unwrap();
    assert!(matches!(err, NnError::Dataset(ref msg) if msg.contains("mismatch")));

    std::fs::remove_file(images).ok();
    std::fs::remove_file(labels).ok();
}

#[test]
fn test_mnist_missing_file_is_io_error() {
    let err = Mnist::new(temp_path("does-not-exist"), true).err().unwrap();
    assert!(matches!(err, NnError::Io(_)));
}
