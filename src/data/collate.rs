use crate::backend::Backend;

/// Stacks a batch of `(pixels, label)` samples into backend tensors.
///
/// Returns (inputs, targets):
/// inputs: [Batch, ..sample_shape]
/// targets: [Batch, num_classes] (one-hot)
///
/// A trailing partial batch stays smaller; nothing is padded.
pub fn collate_batch<B: Backend>(
    batch: Vec<(Vec<f32>, u8)>,
    sample_shape: &[usize],
    num_classes: usize,
) -> (B::Tensor, B::Tensor) {
    let batch_size = batch.len();
    let sample_len: usize = sample_shape.iter().product();

    let mut pixels = Vec::with_capacity(batch_size * sample_len);
    let mut one_hot = vec![0.0; batch_size * num_classes];
    for (row, (sample, label)) in batch.into_iter().enumerate() {
        assert_eq!(
            sample.len(),
            sample_len,
            "sample {} has {} values, expected shape {:?}",
            row,
            sample.len(),
            sample_shape
        );
        assert!(
            (label as usize) < num_classes,
            "label {} out of range for {} classes",
            label,
            num_classes
        );
        pixels.extend(sample);
        one_hot[row * num_classes + label as usize] = 1.0;
    }

    let mut input_shape = Vec::with_capacity(sample_shape.len() + 1);
    input_shape.push(batch_size);
    input_shape.extend_from_slice(sample_shape);

    (
        B::from_vec(pixels, &input_shape),
        B::from_vec(one_hot, &[batch_size, num_classes]),
    )
}
