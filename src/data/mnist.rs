use std::{
    fs::File,
    io::{Cursor, Read},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use tracing::debug;

use super::dataset::Dataset;
use crate::error::{NnError, Result};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// MNIST-style images and labels decoded from gzip IDX files.
pub struct Mnist {
    images: Vec<Vec<u8>>,
    labels: Vec<u8>,
    pub num_rows: usize,
    pub num_cols: usize,
}

impl Mnist {
    /// Reads the standard file pair under `root`: the training split when
    /// `train` is set, the `t10k` split otherwise.
    pub fn new(root: impl AsRef<Path>, train: bool) -> Result<Self> {
        let (image_filename, label_filename) = if train {
            ("train-images-idx3-ubyte.gz", "train-labels-idx1-ubyte.gz")
        } else {
            ("t10k-images-idx3-ubyte.gz", "t10k-labels-idx1-ubyte.gz")
        };
        let root = root.as_ref();
        Self::from_files(root.join(image_filename), root.join(label_filename))
    }

    pub fn from_files(images: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<Self> {
        let (images_path, labels_path) = (images.as_ref(), labels.as_ref());
        let (images, num_rows, num_cols) = read_idx3(&gunzip(images_path)?)?;
        let labels = read_idx1(&gunzip(labels_path)?)?;

        if images.len() != labels.len() {
            return Err(NnError::Dataset(format!(
                "image and label count mismatch: {} images, {} labels",
                images.len(),
                labels.len()
            )));
        }
        debug!(
            images = %images_path.display(),
            count = images.len(),
            rows = num_rows,
            cols = num_cols,
            "loaded IDX dataset"
        );

        Ok(Self {
            images,
            labels,
            num_rows,
            num_cols,
        })
    }

    /// Pixels per image.
    pub fn image_size(&self) -> usize {
        self.num_rows * self.num_cols
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

impl Dataset for Mnist {
    type Item = (Vec<f32>, u8); // Normalized pixels [0, 1], label

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Self::Item {
        let img_data = &self.images[index];
        let label = self.labels[index];

        let normalized: Vec<f32> = img_data.iter().map(|&x| x as f32 / 255.0).collect();
        (normalized, label)
    }
}

fn gunzip(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(file);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn check_magic(found: u32, expected: u32, kind: &str) -> Result<()> {
    if found != expected {
        return Err(NnError::Dataset(format!(
            "invalid magic number for IDX {} file: expected {}, found {}",
            kind, expected, found
        )));
    }
    Ok(())
}

// ヘッダの件数を信用して確保する前に、実際のデータ長と突き合わせる
fn check_payload(declared: Option<usize>, available: usize, kind: &str) -> Result<()> {
    match declared {
        Some(bytes) if bytes <= available => Ok(()),
        Some(bytes) => Err(NnError::Dataset(format!(
            "IDX {} file is truncated: header declares {} bytes, found {}",
            kind, bytes, available
        ))),
        None => Err(NnError::Dataset(format!(
            "IDX {} header declares an impossible payload size",
            kind
        ))),
    }
}

// 16バイトのヘッダ: magic, count, rows, cols (すべてビッグエンディアン)
fn read_idx3(buffer: &[u8]) -> Result<(Vec<Vec<u8>>, usize, usize)> {
    let mut reader = Cursor::new(buffer);

    check_magic(reader.read_u32::<BigEndian>()?, IMAGES_MAGIC, "image")?;
    let count = reader.read_u32::<BigEndian>()? as usize;
    let rows = reader.read_u32::<BigEndian>()? as usize;
    let cols = reader.read_u32::<BigEndian>()? as usize;

    let image_size = rows
        .checked_mul(cols)
        .ok_or_else(|| NnError::Dataset(format!("IDX image size overflows: {}x{}", rows, cols)))?;
    check_payload(count.checked_mul(image_size), buffer.len() - 16, "image")?;

    let mut images = Vec::with_capacity(count);

    for _ in 0..count {
        let mut img_buf = vec![0u8; image_size];
        reader.read_exact(&mut img_buf)?;
        images.push(img_buf);
    }

    Ok((images, rows, cols))
}

// 8バイトのヘッダ: magic, count
fn read_idx1(buffer: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Cursor::new(buffer);

    check_magic(reader.read_u32::<BigEndian>()?, LABELS_MAGIC, "label")?;
    let count = reader.read_u32::<BigEndian>()? as usize;
    check_payload(Some(count), buffer.len() - 8, "label")?;
    let mut labels = vec![0u8; count];
    reader.read_exact(&mut labels)?;

    Ok(labels)
}
