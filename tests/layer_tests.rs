mod common;

use approx::assert_abs_diff_eq;
use lamina::NnError;
use lamina::backend::ndarray::NdArray;
use lamina::backend::{Backend, Padding};
use lamina::engine::autodiff::value_with_pullback;
use lamina::engine::context::TrainingContext;
use lamina::engine::layer::{
    AvgPool2D, Chain, Conv2D, Dense, Flatten, InitStrategy, Layer, MaxPool2D, Relu, Sigmoid, Tanh,
};
use lamina::engine::tree::ParameterTree;

use common::{check_input_gradient, check_parameter_gradients};

fn ctx() -> TrainingContext {
    TrainingContext::training()
}

#[test]
fn test_dense_forward_shape_and_values() {
    let weight = NdArray::from_vec(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);
    let bias = NdArray::from_vec(vec![0.5, -0.5], &[2]);
    let layer = Dense::<NdArray>::from_parts(weight, bias).unwrap();

    let x = NdArray::from_vec(
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
        &[4, 3],
    );
    let y = layer.forward(&ctx(), &x);
    assert_eq!(NdArray::shape(&y), vec![4, 2]);
    // row 0: [1 + 3, 2 + 3] + bias
    assert_eq!(&NdArray::to_vec(&y)[..2], &[4.5, 4.5]);
}

#[test]
fn test_dense_glorot_uniform_bound() {
    let layer = Dense::<NdArray>::seeded(100, 100, InitStrategy::GlorotUniform, 42).unwrap();
    let limit = (6.0f32 / 200.0).sqrt();
    assert!(layer.weight.iter().all(|w| w.abs() <= limit));
    assert!(layer.weight.iter().any(|w| w.abs() > limit * 0.9));
    assert!(layer.bias.iter().all(|&b| b == 0.0));
    assert_eq!(layer.in_features(), 100);
    assert_eq!(layer.out_features(), 100);
}

#[test]
fn test_dense_he_normal_statistics() {
    // HeNormal: std = sqrt(2/in) = sqrt(0.02) ~= 0.1414
    let layer = Dense::<NdArray>::seeded(100, 100, InitStrategy::HeNormal, 7).unwrap();
    let values = NdArray::to_vec(&layer.weight);
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    assert_abs_diff_eq!(mean, 0.0, epsilon = 0.01);
    assert_abs_diff_eq!(std, 0.02f32.sqrt(), epsilon = 0.01);
}

#[test]
fn test_seeded_initialisation_is_reproducible() {
    let a = Dense::<NdArray>::seeded(5, 4, InitStrategy::GlorotNormal, 9).unwrap();
    let b = Dense::<NdArray>::seeded(5, 4, InitStrategy::GlorotNormal, 9).unwrap();
    let c = Dense::<NdArray>::seeded(5, 4, InitStrategy::GlorotNormal, 10).unwrap();
    assert_eq!(a.weight, b.weight);
    assert_ne!(a.weight, c.weight);
}

#[test]
fn test_zero_fan_is_rejected() {
    assert!(matches!(
        Dense::<NdArray>::new(0, 0, InitStrategy::GlorotUniform),
        Err(NnError::InvalidShape(_))
    ));
    assert!(matches!(
        Dense::<NdArray>::new(0, 3, InitStrategy::HeUniform),
        Err(NnError::InvalidShape(_))
    ));
    assert!(matches!(
        Conv2D::<NdArray>::new(3, 4, (0, 0), (1, 1), Padding::Valid, InitStrategy::GlorotUniform),
        Err(NnError::InvalidShape(_))
    ));
    assert!(matches!(
        Conv2D::<NdArray>::new(3, 4, (3, 3), (0, 1), Padding::Valid, InitStrategy::GlorotUniform),
        Err(NnError::InvalidShape(_))
    ));
    assert!(MaxPool2D::new((0, 2), (2, 2), Padding::Valid).is_err());
    assert!(AvgPool2D::new((2, 2), (2, 0), Padding::Valid).is_err());
}

#[test]
fn test_dense_from_parts_checks_shapes() {
    let result = Dense::<NdArray>::from_parts(NdArray::zeros(&[3, 2]), NdArray::zeros(&[3]));
    assert!(matches!(result, Err(NnError::InvalidShape(_))));
}

#[test]
fn test_dense_gradients() {
    let layer = Dense::<NdArray>::seeded(4, 3, InitStrategy::GlorotUniform, 1).unwrap();
    let x = NdArray::random_normal(&[5, 4], 0.0, 1.0, Some(2));
    check_parameter_gradients(&layer, &ctx(), &x, 1e-2);
    check_input_gradient(&layer, &ctx(), &x, 1e-2);
}

#[test]
fn test_conv_glorot_bound_uses_receptive_field() {
    let conv = Conv2D::<NdArray>::seeded(
        3,
        8,
        (3, 3),
        (1, 1),
        Padding::Same,
        InitStrategy::GlorotUniform,
        3,
    )
    .unwrap();
    assert_eq!(conv.filter_shape(), vec![8, 3, 3, 3]);
    // fanIn = 3*3*3, fanOut = 8*3*3
    let limit = (6.0f32 / (27.0 + 72.0)).sqrt();
    assert!(conv.filter.iter().all(|w| w.abs() <= limit));
    assert_eq!(
        conv.addresses()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>(),
        vec!["filter"]
    );
}

#[test]
fn test_conv_output_shapes() {
    let x = NdArray::random_normal(&[2, 3, 7, 7], 0.0, 1.0, Some(4));
    let build = |padding| {
        Conv2D::<NdArray>::seeded(3, 4, (3, 3), (2, 2), padding, InitStrategy::GlorotUniform, 1)
            .unwrap()
    };
    let (same, valid) = (build(Padding::Same), build(Padding::Valid));
    assert_eq!(NdArray::shape(&same.forward(&ctx(), &x)), vec![2, 4, 4, 4]);
    assert_eq!(NdArray::shape(&valid.forward(&ctx(), &x)), vec![2, 4, 3, 3]);
}

#[test]
fn test_conv_same_padding_extra_cell_is_bottom_right() {
    let conv =
        Conv2D::<NdArray>::from_filter(NdArray::ones(&[1, 1, 2, 2]), (1, 1), Padding::Same).unwrap();
    let x = NdArray::ones(&[1, 1, 3, 3]);
    let y = NdArray::to_vec(&conv.forward(&ctx(), &x));
    assert_eq!(y, vec![4.0, 4.0, 2.0, 4.0, 4.0, 2.0, 2.0, 2.0, 1.0]);

    let valid =
        Conv2D::<NdArray>::from_filter(NdArray::ones(&[1, 1, 2, 2]), (1, 1), Padding::Valid).unwrap();
    assert_eq!(NdArray::to_vec(&valid.forward(&ctx(), &x)), vec![4.0; 4]);
}

#[test]
fn test_conv_gradients() {
    let x = NdArray::random_normal(&[2, 2, 5, 5], 0.0, 1.0, Some(5));
    for padding in [Padding::Valid, Padding::Same] {
        let conv =
            Conv2D::<NdArray>::seeded(2, 3, (3, 3), (2, 2), padding, InitStrategy::GlorotUniform, 6)
                .unwrap();
        check_parameter_gradients(&conv, &ctx(), &x, 2e-2);
        check_input_gradient(&conv, &ctx(), &x, 2e-2);
    }
}

#[test]
fn test_max_pool_values_and_first_argmax() {
    let pool = MaxPool2D::new((2, 2), (2, 2), Padding::Valid).unwrap();
    let x = NdArray::from_vec((1..=16).map(|v| v as f32).collect(), &[1, 1, 4, 4]);
    let y = Layer::<NdArray>::forward(&pool, &ctx(), &x);
    assert_eq!(NdArray::to_vec(&y), vec![6.0, 8.0, 14.0, 16.0]);

    let ties = NdArray::ones(&[1, 1, 2, 2]);
    let (_, pullback) = value_with_pullback::<NdArray, _>(&pool, &ctx(), &ties);
    let (grads, dx) = pullback.apply(&NdArray::ones(&[1, 1, 1, 1]));
    assert!(grads.is_empty());
    assert_eq!(NdArray::to_vec(&dx), vec![1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_avg_pool_ignores_padding_cells() {
    let pool = AvgPool2D::new((2, 2), (2, 2), Padding::Same).unwrap();
    let x = NdArray::from_vec((1..=9).map(|v| v as f32).collect(), &[1, 1, 3, 3]);
    let y = Layer::<NdArray>::forward(&pool, &ctx(), &x);
    assert_eq!(NdArray::to_vec(&y), vec![3.0, 4.5, 7.5, 9.0]);
}

#[test]
fn test_max_pool_same_padding_ignores_padding_cells() {
    let pool = MaxPool2D::new((2, 2), (2, 2), Padding::Same).unwrap();
    let x = NdArray::from_vec((1..=9).map(|v| -(v as f32)).collect(), &[1, 1, 3, 3]);
    let y = Layer::<NdArray>::forward(&pool, &ctx(), &x);
    // 全て負の値なので、パディングの0が混ざれば結果が変わる
    assert_eq!(NdArray::to_vec(&y), vec![-1.0, -3.0, -7.0, -9.0]);
}

#[test]
fn test_pool_gradients() {
    // 窓内の値の差が差分幅より十分大きくなるように並べる
    let values: Vec<f32> = (0..50).map(|v| ((v * 37) % 50) as f32 * 0.1).collect();
    let x = NdArray::from_vec(values, &[1, 2, 5, 5]);
    for padding in [Padding::Valid, Padding::Same] {
        let max = MaxPool2D::new((2, 2), (2, 2), padding).unwrap();
        let avg = AvgPool2D::new((3, 3), (2, 2), padding).unwrap();
        check_input_gradient::<MaxPool2D>(&max, &ctx(), &x, 1e-2);
        check_input_gradient::<AvgPool2D>(&avg, &ctx(), &x, 1e-2);
    }
}

#[test]
fn test_sigmoid() {
    let layer = Sigmoid;
    let x = NdArray::from_vec(vec![0.0], &[1]);
    let (y, pullback) = value_with_pullback::<NdArray, _>(&layer, &ctx(), &x);
    assert_abs_diff_eq!(NdArray::to_vec(&y)[0], 0.5, epsilon = 1e-6);
    let (_, dx) = pullback.apply(&NdArray::ones(&[1]));
    assert_abs_diff_eq!(NdArray::to_vec(&dx)[0], 0.25, epsilon = 1e-6);
}

#[test]
fn test_tanh() {
    let layer = Tanh;
    let x = NdArray::from_vec(vec![0.0], &[1]);
    let (y, pullback) = value_with_pullback::<NdArray, _>(&layer, &ctx(), &x);
    assert_abs_diff_eq!(NdArray::to_vec(&y)[0], 0.0, epsilon = 1e-6);
    let (_, dx) = pullback.apply(&NdArray::ones(&[1]));
    assert_abs_diff_eq!(NdArray::to_vec(&dx)[0], 1.0, epsilon = 1e-6);
}

#[test]
fn test_relu() {
    let layer = Relu;
    let x = NdArray::from_vec(vec![-1.0, 1.0], &[2]);
    let (y, pullback) = value_with_pullback::<NdArray, _>(&layer, &ctx(), &x);
    assert_eq!(NdArray::to_vec(&y), vec![0.0, 1.0]);
    let (_, dx) = pullback.apply(&NdArray::ones(&[2]));
    assert_eq!(NdArray::to_vec(&dx), vec![0.0, 1.0]);
}

#[test]
fn test_flatten_round_trip() {
    let layer = Flatten;
    let x = NdArray::random_normal(&[2, 3, 2, 2], 0.0, 1.0, Some(8));
    let (y, pullback) = value_with_pullback::<NdArray, _>(&layer, &ctx(), &x);
    assert_eq!(NdArray::shape(&y), vec![2, 12]);
    let (_, dx) = pullback.apply(&y);
    assert_eq!(dx, x);
}

#[test]
fn test_chain_addresses_and_gradients() {
    let chain = Chain::new(
        Dense::<NdArray>::seeded(3, 4, InitStrategy::GlorotUniform, 1).unwrap(),
        Chain::new(
            Tanh,
            Dense::<NdArray>::seeded(4, 2, InitStrategy::GlorotUniform, 2).unwrap(),
        ),
    );
    let names: Vec<String> = ParameterTree::<NdArray>::addresses(&chain)
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "first.weight",
            "first.bias",
            "second.second.weight",
            "second.second.bias"
        ]
    );
    let x = NdArray::random_normal(&[3, 3], 0.0, 1.0, Some(3));
    check_parameter_gradients(&chain, &ctx(), &x, 1e-2);
    check_input_gradient(&chain, &ctx(), &x, 1e-2);
}
