use approx::assert_abs_diff_eq;
use lamina::backend::Backend;
use lamina::backend::ndarray::NdArray;
use lamina::engine::loss::{Loss, MeanSquaredError, SoftmaxCrossEntropy};
use lamina::engine::metric::Accuracy;

#[test]
fn test_mse_value_and_gradient() {
    let pred = NdArray::from_vec(vec![1.0, 2.0, 3.0], &[1, 3]);
    let target = NdArray::from_vec(vec![1.0, 0.0, 5.0], &[1, 3]);
    let (value, grad) = Loss::<NdArray>::value_with_gradient(&MeanSquaredError, &pred, &target);
    // (0 + 4 + 4) / 3
    assert_abs_diff_eq!(value, 8.0 / 3.0, epsilon = 1e-6);
    let grad = NdArray::to_vec(&grad);
    let expected = [0.0, 4.0 / 3.0, -4.0 / 3.0];
    for (g, e) in grad.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*g, *e, epsilon = 1e-6);
    }
}

#[test]
fn test_mse_zero_for_identical_inputs() {
    let x = NdArray::from_vec(vec![0.5, -1.5, 2.0, 4.0], &[2, 2]);
    let value = Loss::<NdArray>::value(&MeanSquaredError, &x, &x);
    assert_abs_diff_eq!(value, 0.0);
}

#[test]
fn test_cross_entropy_uniform_logits() {
    let logits = NdArray::zeros(&[2, 4]);
    let target = NdArray::from_vec(
        vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        &[2, 4],
    );
    let (value, grad) =
        Loss::<NdArray>::value_with_gradient(&SoftmaxCrossEntropy, &logits, &target);
    assert_abs_diff_eq!(value, 4.0f32.ln(), epsilon = 1e-6);

    // (softmax - target) / batch
    let grad = NdArray::to_vec(&grad);
    assert_abs_diff_eq!(grad[0], (0.25 - 1.0) / 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(grad[1], 0.25 / 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(grad[6], (0.25 - 1.0) / 2.0, epsilon = 1e-6);
}

#[test]
fn test_cross_entropy_value() {
    let logits = NdArray::from_vec(vec![2.0, 1.0, 0.1], &[1, 3]);
    let target = NdArray::from_vec(vec![1.0, 0.0, 0.0], &[1, 3]);
    let value = Loss::<NdArray>::value(&SoftmaxCrossEntropy, &logits, &target);
    let denom = 2.0f32.exp() + 1.0f32.exp() + 0.1f32.exp();
    assert_abs_diff_eq!(value, -(2.0f32.exp() / denom).ln(), epsilon = 1e-5);
}

#[test]
fn test_cross_entropy_stable_for_large_logits() {
    let logits = NdArray::from_vec(vec![1000.0, 0.0], &[1, 2]);
    let target = NdArray::from_vec(vec![0.0, 1.0], &[1, 2]);
    let (value, grad) =
        Loss::<NdArray>::value_with_gradient(&SoftmaxCrossEntropy, &logits, &target);
    assert!(value.is_finite());
    assert_abs_diff_eq!(value, 1000.0, epsilon = 1e-2);
    assert!(NdArray::to_vec(&grad).iter().all(|g| g.is_finite()));
}

#[test]
fn test_cross_entropy_gradient_matches_finite_difference() {
    let logits = vec![0.3, -1.2, 0.8, 0.1, 0.5, -0.4];
    let target = NdArray::from_vec(vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0], &[2, 3]);
    let (_, grad) = Loss::<NdArray>::value_with_gradient(
        &SoftmaxCrossEntropy,
        &NdArray::from_vec(logits.clone(), &[2, 3]),
        &target,
    );
    let grad = NdArray::to_vec(&grad);
    let eps = 1e-2;
    for i in 0..logits.len() {
        let mut plus = logits.clone();
        let mut minus = logits.clone();
        plus[i] += eps;
        minus[i] -= eps;
        let f = |v: Vec<f32>| {
            Loss::<NdArray>::value(&SoftmaxCrossEntropy, &NdArray::from_vec(v, &[2, 3]), &target)
        };
        let numeric = (f(plus) - f(minus)) / (2.0 * eps);
        assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-3);
    }
}

#[test]
#[should_panic(expected = "same shape")]
fn test_loss_rejects_mismatched_shapes() {
    let a = NdArray::zeros(&[2, 3]);
    let b = NdArray::zeros(&[3, 2]);
    Loss::<NdArray>::value(&MeanSquaredError, &a, &b);
}

#[test]
fn test_accuracy() {
    // batch=3, classes=3
    let pred = NdArray::from_vec(
        vec![0.1, 0.8, 0.1, 0.9, 0.05, 0.05, 0.2, 0.3, 0.5],
        &[3, 3],
    );
    let target = NdArray::from_vec(
        vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        &[3, 3],
    );
    assert_eq!(Accuracy::count_correct::<NdArray>(&pred, &target), 2);
    assert_abs_diff_eq!(Accuracy::compute::<NdArray>(&pred, &target), 2.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_accuracy_on_empty_batch() {
    let empty = NdArray::zeros(&[0, 3]);
    assert_abs_diff_eq!(Accuracy::compute::<NdArray>(&empty, &empty), 0.0);
}
